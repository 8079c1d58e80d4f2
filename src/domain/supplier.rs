//! Supplier metadata
//!
//! A `Supplier` describes one upstream source. Suppliers are created via
//! configuration/registration, mutated by the orchestrator after each run
//! (status, last_sync, error_message), and never deleted by the sync path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of connector talks to this supplier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    Api,
    Scraper,
    Feed,
    /// Fallback pseudo-supplier for manually uploaded catalog data.
    Manual,
}

impl ConnectorType {
    /// Any non-manual supplier outranks the manual-upload fallback.
    pub fn is_authoritative(self) -> bool {
        !matches!(self, Self::Manual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Scraper => "scraper",
            Self::Feed => "feed",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "scraper" => Ok(Self::Scraper),
            "feed" => Ok(Self::Feed),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown connector type: {other}")),
        }
    }
}

/// One upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub connector_type: ConnectorType,
    pub active: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub status: String,
    pub error_message: Option<String>,
}

impl Supplier {
    pub fn new(id: i64, name: impl Into<String>, connector_type: ConnectorType) -> Self {
        Self {
            id,
            name: name.into(),
            connector_type,
            active: true,
            last_sync: None,
            status: "idle".to_string(),
            error_message: None,
        }
    }
}

/// Point-in-time status report exposed through the orchestrator surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierStatus {
    pub supplier_name: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub total_products: i64,
    pub status: String,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_is_not_authoritative() {
        assert!(ConnectorType::Api.is_authoritative());
        assert!(ConnectorType::Scraper.is_authoritative());
        assert!(ConnectorType::Feed.is_authoritative());
        assert!(!ConnectorType::Manual.is_authoritative());
    }

    #[test]
    fn connector_type_round_trip() {
        for ty in [
            ConnectorType::Api,
            ConnectorType::Scraper,
            ConnectorType::Feed,
            ConnectorType::Manual,
        ] {
            assert_eq!(ty.as_str().parse::<ConnectorType>().unwrap(), ty);
        }
    }
}
