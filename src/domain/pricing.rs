//! Pricing rule evaluation.
//!
//! Every supplier's price math flows through this one pure evaluator;
//! supplier differences are rule parameters, not code branches. The
//! selling price is deterministic for a fixed rule and cost price.

use serde::{Deserialize, Serialize};

/// Supplier-specific pricing parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricingRule {
    pub vat_percentage: f64,
    pub margin_percentage: f64,
    /// Apply VAT on top of the cost price before margin.
    pub apply_vat_to_cost: bool,
    /// Apply the margin to the VAT-inclusive base rather than raw cost.
    pub apply_margin_to_vat_inclusive: bool,
}

impl Default for PricingRule {
    fn default() -> Self {
        Self {
            vat_percentage: 0.0,
            margin_percentage: 0.0,
            apply_vat_to_cost: false,
            apply_margin_to_vat_inclusive: false,
        }
    }
}

impl PricingRule {
    /// Derive the selling price from a cost price.
    ///
    /// ```
    /// use supplier_sync::domain::pricing::PricingRule;
    ///
    /// let rule = PricingRule {
    ///     vat_percentage: 15.0,
    ///     margin_percentage: 15.0,
    ///     apply_vat_to_cost: true,
    ///     apply_margin_to_vat_inclusive: true,
    /// };
    /// assert_eq!(rule.selling_price(1000.0), 1322.50);
    /// ```
    pub fn selling_price(&self, cost_price: f64) -> f64 {
        let mut base = cost_price;
        if self.apply_vat_to_cost {
            base *= 1.0 + self.vat_percentage / 100.0;
        }
        if self.apply_margin_to_vat_inclusive {
            base *= 1.0 + self.margin_percentage / 100.0;
        }
        round2(base)
    }
}

/// Round to 2 decimal places, the resolution the catalog stores prices at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    // Nology-style: VAT on cost, margin on the VAT-inclusive base.
    #[case(1000.0, 15.0, 15.0, true, true, 1322.50)]
    #[case(100.0, 15.0, 15.0, true, true, 132.25)]
    // Margin only.
    #[case(200.0, 15.0, 10.0, false, true, 220.0)]
    // VAT only.
    #[case(200.0, 15.0, 10.0, true, false, 230.0)]
    // Pass-through rule.
    #[case(199.99, 0.0, 0.0, false, false, 199.99)]
    fn selling_price_cases(
        #[case] cost: f64,
        #[case] vat: f64,
        #[case] margin: f64,
        #[case] apply_vat: bool,
        #[case] apply_margin: bool,
        #[case] expected: f64,
    ) {
        let rule = PricingRule {
            vat_percentage: vat,
            margin_percentage: margin,
            apply_vat_to_cost: apply_vat,
            apply_margin_to_vat_inclusive: apply_margin,
        };
        assert!((rule.selling_price(cost) - expected).abs() < 1e-9);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let rule = PricingRule {
            vat_percentage: 15.0,
            margin_percentage: 15.0,
            apply_vat_to_cost: true,
            apply_margin_to_vat_inclusive: true,
        };
        let price = rule.selling_price(33.33);
        assert!((price * 100.0 - (price * 100.0).round()).abs() < 1e-9);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Determinism: repeated evaluation yields the identical price.
            #[test]
            fn deterministic(cost in 0.0f64..1_000_000.0, vat in 0.0f64..30.0, margin in 0.0f64..60.0) {
                let rule = PricingRule {
                    vat_percentage: vat,
                    margin_percentage: margin,
                    apply_vat_to_cost: true,
                    apply_margin_to_vat_inclusive: true,
                };
                let first = rule.selling_price(cost);
                for _ in 0..10 {
                    prop_assert_eq!(first, rule.selling_price(cost));
                }
            }

            // Selling price never undercuts cost for non-negative markups.
            #[test]
            fn never_below_cost(cost in 0.0f64..1_000_000.0, vat in 0.0f64..30.0, margin in 0.0f64..60.0) {
                let rule = PricingRule {
                    vat_percentage: vat,
                    margin_percentage: margin,
                    apply_vat_to_cost: true,
                    apply_margin_to_vat_inclusive: true,
                };
                prop_assert!(rule.selling_price(cost) >= round2(cost) - 0.01);
            }
        }
    }
}
