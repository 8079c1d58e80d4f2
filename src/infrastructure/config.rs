//! Configuration infrastructure
//!
//! Per-supplier connector settings (base URL, credentials, pagination,
//! pricing rule, category map) plus engine-wide settings, loadable from a
//! config file with environment overrides. The sync algorithms never read
//! configuration themselves; everything is passed in explicitly.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::pricing::PricingRule;
use crate::domain::supplier::ConnectorType;
use crate::infrastructure::http_client::HttpClientConfig;
use crate::infrastructure::pagination::{PagerConfig, PaginationPreference};

/// Default values shared between config deserialization and the
/// component-level `Default` impls.
pub mod defaults {
    pub const PAGE_SIZE: u32 = 50;
    pub const MAX_PAGES: u32 = 100;
    pub const INTER_PAGE_DELAY_MS: u64 = 500;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 5;
    pub const PLACEHOLDER_STOCK: u32 = 10;
    pub const RECORD_CONCURRENCY: usize = 4;
    pub const MAX_PRODUCTS_PER_LISTING: usize = 50;
    pub const USER_AGENT: &str = "supplier-sync/0.3";
}

/// Credentials for authenticated API connectors. Either a bearer token or
/// a basic username/password pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiCredentials {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ApiCredentials {
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && (self.username.is_none() || self.password.is_none())
    }
}

/// Wire format of a feed connector's payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    #[default]
    Json,
    Xml,
}

/// One keyword → canonical category mapping entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub keyword: String,
    pub category: String,
}

/// CSS selectors for scraping listing and detail pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSelectors {
    pub product_link: String,
    pub name: String,
    pub price: String,
    pub stock: String,
    pub spec_rows: String,
    pub images: String,
    pub description: String,
}

impl Default for ScrapeSelectors {
    fn default() -> Self {
        Self {
            product_link: "a.product-item, .product-card a, a[href*='/product/']".to_string(),
            name: "h1.product-title, h1[itemprop='name'], .product-name".to_string(),
            price: ".price, .product-price, [itemprop='price']".to_string(),
            stock: ".stock, .availability, .stock-status".to_string(),
            spec_rows: ".specifications tr, table.specs tr".to_string(),
            images: ".product-gallery img, .product-images img".to_string(),
            description: ".product-description, [itemprop='description']".to_string(),
        }
    }
}

/// Everything one supplier's connector, transformer, and pager need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplierConfig {
    // Transport
    pub base_url: Option<String>,
    pub products_path: String,
    pub feed_url: Option<String>,
    pub feed_format: FeedFormat,
    /// Element name wrapping one record in an XML feed.
    pub feed_item_tag: String,
    pub feed_paginated: bool,
    pub credentials: ApiCredentials,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_requests_per_second: u32,

    // Pagination
    pub pagination: PaginationPreference,
    pub page_size: u32,
    pub max_pages: u32,
    pub inter_page_delay_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,

    // Transformation
    pub pricing: PricingRule,
    /// Feed prices are already retail; pass them through unchanged.
    pub retail_priced: bool,
    pub category_map: Vec<CategoryRule>,
    pub default_category: Option<String>,
    /// Stock assumed for "available but uncounted" records.
    pub placeholder_stock: u32,

    // Scraping
    pub listing_urls: Vec<String>,
    pub selectors: ScrapeSelectors,
    pub max_products_per_listing: usize,

    // Orchestration
    pub record_concurrency: usize,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            products_path: "/products".to_string(),
            feed_url: None,
            feed_format: FeedFormat::default(),
            feed_item_tag: "product".to_string(),
            feed_paginated: false,
            credentials: ApiCredentials::default(),
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            pagination: PaginationPreference::default(),
            page_size: defaults::PAGE_SIZE,
            max_pages: defaults::MAX_PAGES,
            inter_page_delay_ms: defaults::INTER_PAGE_DELAY_MS,
            max_retries: defaults::MAX_RETRIES,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            pricing: PricingRule::default(),
            retail_priced: false,
            category_map: Vec::new(),
            default_category: None,
            placeholder_stock: defaults::PLACEHOLDER_STOCK,
            listing_urls: Vec::new(),
            selectors: ScrapeSelectors::default(),
            max_products_per_listing: defaults::MAX_PRODUCTS_PER_LISTING,
            record_concurrency: defaults::RECORD_CONCURRENCY,
        }
    }
}

impl SupplierConfig {
    /// HTTP client settings derived from this supplier's limits.
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            user_agent: self.user_agent.clone(),
            timeout_seconds: self.request_timeout_secs,
            max_requests_per_second: self.max_requests_per_second,
            follow_redirects: true,
        }
    }

    /// Pager settings derived from this supplier's limits.
    pub fn pager_config(&self) -> PagerConfig {
        PagerConfig {
            page_size: self.page_size,
            max_pages: self.max_pages,
            inter_page_delay: std::time::Duration::from_millis(self.inter_page_delay_ms),
            max_retries: self.max_retries,
            retry_base_delay: std::time::Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

/// A supplier as registered in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierEntry {
    pub id: i64,
    pub name: String,
    pub connector_type: ConnectorType,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub config: SupplierConfig,
}

fn default_true() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. `info,sqlx=warn`.
    pub level: String,
    pub log_to_file: bool,
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,sqlx=warn".to_string(),
            log_to_file: false,
            log_dir: None,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub logging: LoggingConfig,
    pub suppliers: Vec<SupplierEntry>,
}

impl AppConfig {
    /// Load from a TOML/JSON/YAML file, with `SYNC_*` environment
    /// variables taking precedence (e.g. `SYNC_DATABASE_URL`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("SYNC").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Failed to deserialize engine configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplier_config_defaults_are_sane() {
        let config = SupplierConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.max_pages, 100);
        assert_eq!(config.placeholder_stock, 10);
        assert!(!config.retail_priced);
        assert_eq!(config.pagination, PaginationPreference::Auto);
    }

    #[test]
    fn credentials_empty_checks_both_schemes() {
        let mut creds = ApiCredentials::default();
        assert!(creds.is_empty());

        creds.username = Some("svc".to_string());
        assert!(creds.is_empty());

        creds.password = Some("secret".to_string());
        assert!(!creds.is_empty());

        let token_only = ApiCredentials {
            token: Some("tok".to_string()),
            ..Default::default()
        };
        assert!(!token_only.is_empty());
    }

    #[test]
    fn supplier_entry_deserializes_with_defaults() {
        let json = serde_json::json!({
            "id": 3,
            "name": "Nology",
            "connector_type": "api",
            "config": { "base_url": "https://api.nology.example", "page_size": 25 }
        });
        let entry: SupplierEntry = serde_json::from_value(json).unwrap();
        assert!(entry.active);
        assert_eq!(entry.config.page_size, 25);
        assert_eq!(entry.config.max_pages, 100);
    }
}
