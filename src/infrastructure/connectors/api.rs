//! Authenticated REST API connector
//!
//! Speaks to vendor product APIs that expose a JSON endpoint behind a
//! bearer token or basic credentials. HTTP and payload errors are mapped
//! into the connector failure taxonomy; missing credentials fail fast at
//! construction.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::domain::supplier::Supplier;
use crate::infrastructure::config::SupplierConfig;
use crate::infrastructure::connectors::{
    last_record_id, records_from_payload, Connector, ConnectorError, RawPage,
};
use crate::infrastructure::http_client::{HttpAuth, HttpClient};
use crate::infrastructure::pagination::PageRequest;

pub struct ApiConnector {
    supplier: Supplier,
    products_url: String,
    base_url: String,
    http: HttpClient,
}

impl ApiConnector {
    pub fn new(supplier: Supplier, config: &SupplierConfig) -> Result<Self, ConnectorError> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            ConnectorError::Configuration(format!(
                "supplier '{}' has no base URL configured",
                supplier.name
            ))
        })?;

        let auth = if let Some(token) = config.credentials.token.clone() {
            HttpAuth::Bearer(token)
        } else if let (Some(username), Some(password)) = (
            config.credentials.username.clone(),
            config.credentials.password.clone(),
        ) {
            HttpAuth::Basic { username, password }
        } else {
            return Err(ConnectorError::Configuration(format!(
                "supplier '{}' has no API credentials configured",
                supplier.name
            )));
        };

        let http = HttpClient::with_auth(config.http_config(), auth)
            .map_err(|e| ConnectorError::Configuration(e.to_string()))?;

        let products_url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            config.products_path.trim_start_matches('/')
        );

        Ok(Self {
            supplier,
            products_url,
            base_url,
            http,
        })
    }

    fn classify_status(&self, status: StatusCode) -> Option<ConnectorError> {
        if status.is_success() {
            return None;
        }
        Some(match status {
            StatusCode::TOO_MANY_REQUESTS => {
                ConnectorError::RateLimited(format!("{} returned 429", self.supplier.name))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::Configuration(
                format!("{} rejected the configured credentials", self.supplier.name),
            ),
            other => {
                ConnectorError::Transport(format!("HTTP request failed with status {other}"))
            }
        })
    }
}

#[async_trait]
impl Connector for ApiConnector {
    fn supplier_info(&self) -> &Supplier {
        &self.supplier
    }

    async fn test_connection(&self) -> Result<bool, ConnectorError> {
        match self.http.head(&self.base_url).await {
            // HEAD may be unimplemented upstream; any routed response counts.
            Ok(status) => Ok(status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN),
            Err(e) => {
                tracing::debug!("Connection test failed for {}: {}", self.supplier.name, e);
                Ok(false)
            }
        }
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, ConnectorError> {
        let response = self
            .http
            .get_raw(&self.products_url, &request.query_params())
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        if let Some(err) = self.classify_status(response.status()) {
            return Err(err);
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(format!("invalid JSON payload: {e}")))?;

        let records = records_from_payload(payload).ok_or_else(|| {
            ConnectorError::Parse(format!(
                "unrecognized payload shape from {}",
                self.supplier.name
            ))
        })?;
        let last_id = last_record_id(&records);

        Ok(RawPage { records, last_id })
    }
}
