//! Supplier connectors
//!
//! A connector translates one upstream source's protocol into raw,
//! supplier-native records. Connectors are polymorphic over the capability
//! set {test_connection, fetch_page, supplier_info}; the concrete variant
//! is selected at configuration time, never by runtime type inspection.
//! Connectors own no persisted state - they are stateless per invocation.

pub mod api;
pub mod feed;
pub mod scrape;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::supplier::{ConnectorType, Supplier};
use crate::infrastructure::config::SupplierConfig;
use crate::infrastructure::pagination::PageRequest;

pub use api::ApiConnector;
pub use feed::FeedConnector;
pub use scrape::{BrowserEngine, HttpBrowserEngine, ScrapeConnector};

/// Connector-level failure taxonomy.
///
/// Configuration and engine errors are fatal at construction and are never
/// retried; transport and parse errors are classified by the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream rate limited: {0}")]
    RateLimited(String),

    #[error("failed to parse upstream payload: {0}")]
    Parse(String),

    #[error("automation engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl ConnectorError {
    /// Whether the page-level retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited(_) | Self::Parse(_)
        )
    }
}

/// One batch of raw records, plus the last upstream id observed on the
/// page (drives `since_id` pagination).
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub records: Vec<Value>,
    pub last_id: Option<String>,
}

impl RawPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Capability set every supplier connector implements.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The supplier this connector speaks for.
    fn supplier_info(&self) -> &Supplier;

    /// Cheapest possible round trip. Returns `Ok(false)` for ordinary
    /// network failures; errs only on configuration problems.
    async fn test_connection(&self) -> Result<bool, ConnectorError>;

    /// Fetch one batch of raw records for the given page request.
    async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, ConnectorError>;
}

/// Build the connector variant a supplier is configured for.
///
/// Manual suppliers have no upstream to connect to; asking for one is a
/// configuration error.
pub fn build_connector(
    supplier: &Supplier,
    config: &SupplierConfig,
) -> Result<Arc<dyn Connector>, ConnectorError> {
    match supplier.connector_type {
        ConnectorType::Api => Ok(Arc::new(ApiConnector::new(supplier.clone(), config)?)),
        ConnectorType::Feed => Ok(Arc::new(FeedConnector::new(supplier.clone(), config)?)),
        ConnectorType::Scraper => {
            let engine = Arc::new(HttpBrowserEngine::new(config)?);
            Ok(Arc::new(ScrapeConnector::new(
                supplier.clone(),
                config,
                engine,
            )?))
        }
        ConnectorType::Manual => Err(ConnectorError::Configuration(format!(
            "supplier '{}' is a manual source and has no connector",
            supplier.name
        ))),
    }
}

/// Pull the record array out of the payload shapes suppliers actually
/// return: a bare array, or an object keyed `products`/`data`/`items`.
pub(crate) fn records_from_payload(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(records) => Some(records),
        Value::Object(mut map) => {
            for key in ["products", "data", "items", "results"] {
                if let Some(Value::Array(records)) = map.remove(key) {
                    return Some(records);
                }
            }
            None
        }
        _ => None,
    }
}

/// Last upstream id on a page, for since-id pagination.
pub(crate) fn last_record_id(records: &[Value]) -> Option<String> {
    let last = records.last()?;
    match last.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_extraction_handles_common_shapes() {
        let bare = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(records_from_payload(bare).unwrap().len(), 2);

        let wrapped = json!({"products": [{"id": 1}]});
        assert_eq!(records_from_payload(wrapped).unwrap().len(), 1);

        let data = json!({"data": [{"id": 1}], "meta": {"page": 1}});
        assert_eq!(records_from_payload(data).unwrap().len(), 1);

        assert!(records_from_payload(json!({"meta": {}})).is_none());
        assert!(records_from_payload(json!("nope")).is_none());
    }

    #[test]
    fn last_id_handles_numbers_and_strings() {
        let records = vec![json!({"id": 10}), json!({"id": "abc"})];
        assert_eq!(last_record_id(&records).as_deref(), Some("abc"));

        let records = vec![json!({"id": 10}), json!({"id": 42})];
        assert_eq!(last_record_id(&records).as_deref(), Some("42"));

        let records = vec![json!({"sku": "no-id"})];
        assert_eq!(last_record_id(&records), None);
    }

    #[test]
    fn manual_suppliers_get_no_connector() {
        let supplier = Supplier::new(9, "Manual Upload", ConnectorType::Manual);
        let config = SupplierConfig::default();
        let result = build_connector(&supplier, &config);
        assert!(matches!(result, Err(ConnectorError::Configuration(_))));
    }
}
