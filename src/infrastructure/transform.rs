//! Raw record transformation
//!
//! Maps one supplier-native raw record into the canonical
//! `UnifiedProduct`, applying the supplier's pricing rule, category
//! inference, and stock aggregation. The transform is a pure function of
//! (record, profile); supplier differences are profile data, not code.
//!
//! Upstream payloads are wildly inconsistent - numbers arrive as strings,
//! stock as regional columns or booleans, images as plain URLs or nested
//! objects - so every accessor here coerces defensively and gives up with
//! `None` rather than guessing.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde_json::{Map, Value};

use crate::domain::pricing::{round2, PricingRule};
use crate::domain::product::{StockInfo, UnifiedProduct};
use crate::domain::supplier::Supplier;
use crate::infrastructure::config::{CategoryRule, SupplierConfig};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Supplier-specific transformation parameters.
#[derive(Debug, Clone)]
pub struct TransformProfile {
    pub pricing: PricingRule,
    /// Feed prices are already retail; pass them through unchanged.
    pub retail_priced: bool,
    pub category_map: Vec<CategoryRule>,
    pub default_category: Option<String>,
    /// Stock assumed for "available but uncounted" records.
    pub placeholder_stock: u32,
}

impl TransformProfile {
    pub fn from_config(config: &SupplierConfig) -> Self {
        Self {
            pricing: config.pricing,
            retail_priced: config.retail_priced,
            category_map: config.category_map.clone(),
            default_category: config.default_category.clone(),
            placeholder_stock: config.placeholder_stock,
        }
    }
}

/// A record that cannot be normalized. Never aborts a run; the
/// orchestrator records it as a warning and moves on.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no usable product name")]
    MissingName,
    #[error("record has no usable price")]
    MissingPrice,
}

/// Normalizes raw records for one supplier.
pub struct Transformer {
    supplier_id: i64,
    profile: TransformProfile,
}

impl Transformer {
    pub fn new(supplier: &Supplier, profile: TransformProfile) -> Self {
        Self {
            supplier_id: supplier.id,
            profile,
        }
    }

    pub fn transform(&self, raw: &Value) -> Result<UnifiedProduct, TransformError> {
        let obj = raw.as_object().ok_or(TransformError::NotAnObject)?;

        let name = string_field(obj, &["name", "title", "product_name"])
            .ok_or(TransformError::MissingName)?;
        let sku = string_field(obj, &["sku", "variant_sku", "product_code", "code"]);
        let supplier_sku = string_field(obj, &["supplier_sku", "sku", "variant_sku", "id"]);
        let model = string_field(obj, &["model", "model_number", "mpn"]);
        let brand = string_field(obj, &["brand", "vendor", "manufacturer"]);

        let cost = number_field(obj, &["cost_price", "cost", "wholesale_price", "dealer_price"]);
        let retail = number_field(obj, &["price", "selling_price", "retail_price"]);
        let (cost_price, selling_price) = if self.profile.retail_priced {
            let price = retail.or(cost).ok_or(TransformError::MissingPrice)?;
            (cost.unwrap_or(price), round2(price))
        } else {
            let cost_price = cost.or(retail).ok_or(TransformError::MissingPrice)?;
            (cost_price, self.profile.pricing.selling_price(cost_price))
        };

        let category = self.infer_category(obj, &name);
        let stock = stock_from(obj, self.profile.placeholder_stock);
        let images = images_from(obj);
        let description = string_field(obj, &["description", "body_html", "details"])
            .map(|html| strip_html(&html))
            .filter(|text| !text.is_empty());

        let specifications = obj
            .get("specifications")
            .or_else(|| obj.get("specs"))
            .or_else(|| obj.get("attributes"))
            .and_then(Value::as_object)
            .map(|specs| {
                specs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        let now = Utc::now();
        Ok(UnifiedProduct {
            name,
            sku,
            model,
            brand,
            category,
            description,
            cost_price,
            selling_price,
            margin_percentage: self.profile.pricing.margin_percentage,
            stock,
            images,
            specifications,
            supplier_id: self.supplier_id,
            supplier_sku,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Keyword → canonical category mapping, first match wins. The
    /// product-type field is checked before the name; unmatched records
    /// fall back to the supplier's default category.
    fn infer_category(&self, obj: &Map<String, Value>, name: &str) -> Option<String> {
        let type_text = string_field(obj, &["category", "product_type", "type", "device_type"]);

        for haystack in [type_text.as_deref(), Some(name)].into_iter().flatten() {
            let haystack = haystack.to_lowercase();
            for rule in &self.profile.category_map {
                if haystack.contains(&rule.keyword.to_lowercase()) {
                    return Some(rule.category.clone());
                }
            }
        }
        self.profile.default_category.clone()
    }
}

/// First non-empty string (or stringified number) among the given keys.
fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First numeric value among the given keys, coercing price-like strings.
fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Some(parsed) = parse_price(s) {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

fn bool_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::Bool(b)) => return Some(*b),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => return Some(true),
                "false" | "no" | "n" | "0" => return Some(false),
                _ => {}
            },
            _ => {}
        }
    }
    None
}

fn value_as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u32),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Parse a price out of human or feed formatting: currency symbols,
/// thousands separators, comma decimals ("R 1.322,50", "1,322.50").
pub(crate) fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    // Whichever separator occurs last is the decimal point; a lone comma
    // is decimal only when exactly two digits follow (",00" style).
    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => cleaned.replace(',', ""),
        (Some(_), Some(comma)) | (None, Some(comma)) => {
            let decimal_comma =
                cleaned.contains('.') || cleaned.len() - comma - 1 == 2;
            if decimal_comma {
                let head: String = cleaned[..comma].replace(['.', ','], "");
                format!("{}.{}", head, &cleaned[comma + 1..])
            } else {
                cleaned.replace(',', "")
            }
        }
        _ => cleaned,
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
}

/// Aggregate the stock signals a record carries, tagging how trustworthy
/// the resulting quantity is.
fn stock_from(obj: &Map<String, Value>, placeholder: u32) -> StockInfo {
    // Regional columns: stock_gauteng, stock_cape_town, ...
    const NON_REGION_SUFFIXES: &[&str] = &["quantity", "level", "count", "total", "status"];
    let mut by_region = BTreeMap::new();
    for (key, value) in obj {
        if let Some(region) = key.strip_prefix("stock_") {
            if NON_REGION_SUFFIXES.contains(&region) {
                continue;
            }
            if let Some(qty) = value_as_u32(value) {
                by_region.insert(region.to_string(), qty);
            }
        }
    }
    if !by_region.is_empty() {
        let total = by_region.values().sum();
        return StockInfo::counted(by_region, total);
    }

    for key in ["stock_quantity", "inventory_quantity", "quantity", "qty", "stock"] {
        if let Some(qty) = obj.get(key).and_then(value_as_u32) {
            return StockInfo::counted(BTreeMap::new(), qty);
        }
    }

    // Nested regional object: {"stock": {"gauteng": 5, "cape_town": 3}}
    if let Some(Value::Object(regions)) = obj.get("stock") {
        let by_region: BTreeMap<String, u32> = regions
            .iter()
            .filter_map(|(region, qty)| value_as_u32(qty).map(|q| (region.clone(), q)))
            .collect();
        if !by_region.is_empty() {
            let total = by_region.values().sum();
            return StockInfo::counted(by_region, total);
        }
    }

    match bool_field(obj, &["available", "in_stock"]) {
        Some(true) => StockInfo::assumed_available(placeholder),
        Some(false) => StockInfo::counted(BTreeMap::new(), 0),
        None => StockInfo::unknown(),
    }
}

/// Image URLs in document order, duplicates removed. Accepts plain URL
/// strings and Shopify-style `{"src": ...}` objects.
fn images_from(obj: &Map<String, Value>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    let mut push = |url: Option<&str>| {
        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            if seen.insert(url.to_string()) {
                images.push(url.to_string());
            }
        }
    };

    if let Some(Value::Array(entries)) = obj.get("images") {
        for entry in entries {
            match entry {
                Value::String(url) => push(Some(url)),
                Value::Object(image) => push(
                    image
                        .get("src")
                        .or_else(|| image.get("url"))
                        .and_then(Value::as_str),
                ),
                _ => {}
            }
        }
    }
    for key in ["image", "image_url", "thumbnail"] {
        match obj.get(key) {
            Some(Value::String(url)) => push(Some(url)),
            Some(Value::Object(image)) => push(
                image
                    .get("src")
                    .or_else(|| image.get("url"))
                    .and_then(Value::as_str),
            ),
            _ => {}
        }
    }

    images
}

/// Strip markup from an HTML-bearing field, collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    WHITESPACE_RE.replace_all(text.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::StockConfidence;
    use crate::domain::supplier::ConnectorType;
    use serde_json::json;

    fn nology_transformer() -> Transformer {
        let supplier = Supplier::new(1, "Nology", ConnectorType::Api);
        let profile = TransformProfile {
            pricing: PricingRule {
                vat_percentage: 15.0,
                margin_percentage: 15.0,
                apply_vat_to_cost: true,
                apply_margin_to_vat_inclusive: true,
            },
            retail_priced: false,
            category_map: vec![
                CategoryRule {
                    keyword: "Converters".to_string(),
                    category: "Audio Visual".to_string(),
                },
                CategoryRule {
                    keyword: "router".to_string(),
                    category: "Networking".to_string(),
                },
            ],
            default_category: Some("Accessories".to_string()),
            placeholder_stock: 10,
        };
        Transformer::new(&supplier, profile)
    }

    #[test]
    fn applies_cost_pricing_rule() {
        let raw = json!({
            "name": "HDMI to VGA Converter",
            "sku": "NOL-CONV-01",
            "product_type": "Converters",
            "cost_price": 1000.0
        });
        let product = nology_transformer().transform(&raw).unwrap();
        assert!((product.selling_price - 1322.50).abs() < 1e-9);
        assert!((product.cost_price - 1000.0).abs() < 1e-9);
        assert_eq!(product.category.as_deref(), Some("Audio Visual"));
        assert_eq!(product.supplier_id, 1);
    }

    #[test]
    fn retail_priced_feeds_pass_through() {
        let supplier = Supplier::new(4, "Syntech", ConnectorType::Feed);
        let profile = TransformProfile {
            pricing: PricingRule::default(),
            retail_priced: true,
            category_map: vec![],
            default_category: None,
            placeholder_stock: 10,
        };
        let transformer = Transformer::new(&supplier, profile);

        let raw = json!({"name": "USB Hub", "sku": "SYN-001", "price": "499,00"});
        let product = transformer.transform(&raw).unwrap();
        assert!((product.selling_price - 499.0).abs() < 1e-9);
    }

    #[test]
    fn category_falls_back_to_default() {
        let raw = json!({
            "name": "Mystery Gadget",
            "sku": "X-1",
            "product_type": "Widgets",
            "cost_price": 10.0
        });
        let product = nology_transformer().transform(&raw).unwrap();
        assert_eq!(product.category.as_deref(), Some("Accessories"));
    }

    #[test]
    fn regional_stock_is_summed() {
        let raw = json!({
            "name": "Router",
            "sku": "R-1",
            "cost_price": 100.0,
            "stock_gauteng": 5,
            "stock_cape_town": "3"
        });
        let product = nology_transformer().transform(&raw).unwrap();
        assert_eq!(product.stock.total, 8);
        assert_eq!(product.stock.confidence, StockConfidence::Counted);
        assert_eq!(product.stock.by_region.get("gauteng"), Some(&5));
    }

    #[test]
    fn available_flag_gets_placeholder_with_assumed_confidence() {
        let raw = json!({
            "name": "Switch",
            "sku": "S-1",
            "cost_price": 100.0,
            "available": true
        });
        let product = nology_transformer().transform(&raw).unwrap();
        assert_eq!(product.stock.total, 10);
        assert_eq!(product.stock.confidence, StockConfidence::AssumedAvailable);
    }

    #[test]
    fn missing_stock_signal_is_unknown_not_zero_confidence() {
        let raw = json!({"name": "Cable", "sku": "C-1", "cost_price": 10.0});
        let product = nology_transformer().transform(&raw).unwrap();
        assert_eq!(product.stock.confidence, StockConfidence::Unknown);
    }

    #[test]
    fn images_keep_order_and_drop_duplicates() {
        let raw = json!({
            "name": "Camera",
            "sku": "CAM-1",
            "cost_price": 100.0,
            "images": [
                {"src": "https://cdn.example/a.jpg"},
                "https://cdn.example/b.jpg",
                "https://cdn.example/a.jpg"
            ],
            "image": "https://cdn.example/c.jpg"
        });
        let product = nology_transformer().transform(&raw).unwrap();
        assert_eq!(
            product.images,
            vec![
                "https://cdn.example/a.jpg",
                "https://cdn.example/b.jpg",
                "https://cdn.example/c.jpg"
            ]
        );
    }

    #[test]
    fn description_html_is_stripped() {
        let raw = json!({
            "name": "Cable",
            "sku": "C-1",
            "cost_price": 10.0,
            "body_html": "<p>Braided <b>2m</b>   cable</p>"
        });
        let product = nology_transformer().transform(&raw).unwrap();
        assert_eq!(product.description.as_deref(), Some("Braided 2m cable"));
    }

    #[test]
    fn unusable_records_fail_without_panicking() {
        let transformer = nology_transformer();
        assert!(matches!(
            transformer.transform(&json!("not an object")),
            Err(TransformError::NotAnObject)
        ));
        assert!(matches!(
            transformer.transform(&json!({"sku": "X"})),
            Err(TransformError::MissingName)
        ));
        assert!(matches!(
            transformer.transform(&json!({"name": "No price"})),
            Err(TransformError::MissingPrice)
        ));
    }

    #[test]
    fn price_parsing_handles_feed_formats() {
        assert_eq!(parse_price("R 199,00"), Some(199.0));
        assert_eq!(parse_price("1,322.50"), Some(1322.5));
        assert_eq!(parse_price("R1.322,50"), Some(1322.5));
        assert_eq!(parse_price("1,234"), Some(1234.0));
        assert_eq!(parse_price("499"), Some(499.0));
        assert_eq!(parse_price("free"), None);
    }
}
