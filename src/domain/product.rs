//! Canonical product model
//!
//! `UnifiedProduct` is the single cross-supplier schema stored by the
//! catalog. Every connector-specific raw record is normalized into this
//! shape before it reaches the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much trust the sync run places in a product's stock figure.
///
/// Several upstream feeds expose only an "available" boolean; those records
/// carry a supplier-configured placeholder quantity and must stay
/// distinguishable from a genuinely counted quantity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockConfidence {
    /// Quantity reported numerically by the upstream source.
    Counted,
    /// Upstream only said "available"; quantity is a placeholder.
    AssumedAvailable,
    /// Upstream exposed no stock signal at all.
    Unknown,
}

/// Aggregated stock information, overall and per region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockInfo {
    pub total: u32,
    pub by_region: BTreeMap<String, u32>,
    pub confidence: StockConfidence,
}

impl StockInfo {
    /// Stock summed from numeric quantities reported by the source.
    pub fn counted(by_region: BTreeMap<String, u32>, total: u32) -> Self {
        Self {
            total,
            by_region,
            confidence: StockConfidence::Counted,
        }
    }

    /// "Available" flag without quantities; `placeholder` units are assumed.
    pub fn assumed_available(placeholder: u32) -> Self {
        Self {
            total: placeholder,
            by_region: BTreeMap::new(),
            confidence: StockConfidence::AssumedAvailable,
        }
    }

    pub fn unknown() -> Self {
        Self {
            total: 0,
            by_region: BTreeMap::new(),
            confidence: StockConfidence::Unknown,
        }
    }
}

/// Canonical product record.
///
/// `selling_price` is always derived from `cost_price` through the
/// supplier's pricing rule (or passed through for retail-priced feeds);
/// the sync path never hand-edits it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnifiedProduct {
    pub name: String,
    pub sku: Option<String>,
    pub model: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub cost_price: f64,
    pub selling_price: f64,
    pub margin_percentage: f64,
    pub stock: StockInfo,
    /// Image URLs in document order, duplicates removed.
    pub images: Vec<String>,
    pub specifications: BTreeMap<String, serde_json::Value>,
    pub supplier_id: i64,
    pub supplier_sku: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UnifiedProduct {
    /// Identity key for upsert within a supplier: the supplier's own SKU
    /// when present, otherwise the normalized catalog SKU.
    pub fn natural_key(&self) -> Option<String> {
        if let Some(sku) = self
            .supplier_sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Some(sku.to_string());
        }
        self.sku
            .as_deref()
            .map(normalize_sku)
            .filter(|s| !s.is_empty())
    }

    /// Content hash over everything except timestamps. Two records with the
    /// same fingerprint classify as `unchanged` during a sync run.
    pub fn fingerprint(&self) -> String {
        let mut canon = self.clone();
        canon.created_at = DateTime::<Utc>::UNIX_EPOCH;
        canon.updated_at = DateTime::<Utc>::UNIX_EPOCH;
        let bytes = serde_json::to_vec(&canon).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

/// Normalize a catalog SKU for cross-supplier identity: trimmed, uppercase.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UnifiedProduct {
        UnifiedProduct {
            name: "HDMI Converter".to_string(),
            sku: Some("hdmi-100".to_string()),
            model: None,
            brand: Some("Nology".to_string()),
            category: Some("Audio Visual".to_string()),
            description: None,
            cost_price: 100.0,
            selling_price: 132.25,
            margin_percentage: 15.0,
            stock: StockInfo::counted(BTreeMap::new(), 4),
            images: vec![],
            specifications: BTreeMap::new(),
            supplier_id: 1,
            supplier_sku: Some("NOL-HDMI-100".to_string()),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn natural_key_prefers_supplier_sku() {
        let product = sample();
        assert_eq!(product.natural_key().as_deref(), Some("NOL-HDMI-100"));
    }

    #[test]
    fn natural_key_falls_back_to_normalized_sku() {
        let mut product = sample();
        product.supplier_sku = None;
        assert_eq!(product.natural_key().as_deref(), Some("HDMI-100"));

        product.sku = Some("   ".to_string());
        assert_eq!(product.natural_key(), None);
    }

    #[test]
    fn fingerprint_ignores_timestamps() {
        let a = sample();
        let mut b = a.clone();
        b.created_at = DateTime::<Utc>::UNIX_EPOCH;
        b.updated_at = Utc::now();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = a.clone();
        c.selling_price = 140.0;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
