//! Listing-page scraper connector
//!
//! For suppliers with no API or feed: renders category/listing pages,
//! collects candidate product links, and visits each to extract structured
//! fields from the rendered HTML. There is no native pagination - the
//! connector iterates the configured listing URLs instead, one per "page".

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use url::Url;

use crate::domain::supplier::Supplier;
use crate::infrastructure::config::SupplierConfig;
use crate::infrastructure::connectors::{Connector, ConnectorError, RawPage};
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};
use crate::infrastructure::pagination::PageRequest;
use crate::infrastructure::transform::parse_price;

/// Renders one URL to HTML.
///
/// The engine is the replaceable seam between the scrape connector and
/// whatever drives the pages; failures to construct one are fatal
/// (`ConnectorError::EngineUnavailable`) and bypass session bookkeeping.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, ConnectorError>;
}

/// HTTP-backed engine with a browser request profile.
///
/// Sends browser-typical Accept headers and keeps a cookie jar across
/// navigations, so consent/interstitial cookies set on the first page are
/// replayed on subsequent ones instead of re-triggering the dialog.
pub struct HttpBrowserEngine {
    http: HttpClient,
}

impl HttpBrowserEngine {
    pub fn new(config: &SupplierConfig) -> Result<Self, ConnectorError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let http_config = HttpClientConfig {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0 Safari/537.36"
                .to_string(),
            ..config.http_config()
        };

        let http = HttpClient::with_headers(http_config, headers)
            .map_err(|e| ConnectorError::EngineUnavailable(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl BrowserEngine for HttpBrowserEngine {
    async fn render(&self, url: &str) -> Result<String, ConnectorError> {
        self.http
            .get_text(url)
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))
    }
}

/// Compiled CSS selectors for the configured site.
struct CompiledSelectors {
    product_link: Selector,
    name: Selector,
    price: Selector,
    stock: Selector,
    spec_rows: Selector,
    images: Selector,
    description: Selector,
}

impl CompiledSelectors {
    fn compile(config: &SupplierConfig) -> Result<Self, ConnectorError> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| {
                ConnectorError::Configuration(format!("invalid CSS selector '{css}': {e}"))
            })
        };
        let s = &config.selectors;
        Ok(Self {
            product_link: parse(&s.product_link)?,
            name: parse(&s.name)?,
            price: parse(&s.price)?,
            stock: parse(&s.stock)?,
            spec_rows: parse(&s.spec_rows)?,
            images: parse(&s.images)?,
            description: parse(&s.description)?,
        })
    }
}

pub struct ScrapeConnector {
    supplier: Supplier,
    listing_urls: Vec<String>,
    selectors: CompiledSelectors,
    max_products_per_listing: usize,
    engine: Arc<dyn BrowserEngine>,
}

impl ScrapeConnector {
    pub fn new(
        supplier: Supplier,
        config: &SupplierConfig,
        engine: Arc<dyn BrowserEngine>,
    ) -> Result<Self, ConnectorError> {
        if config.listing_urls.is_empty() {
            return Err(ConnectorError::Configuration(format!(
                "supplier '{}' has no listing URLs configured",
                supplier.name
            )));
        }

        Ok(Self {
            supplier,
            listing_urls: config.listing_urls.clone(),
            selectors: CompiledSelectors::compile(config)?,
            max_products_per_listing: config.max_products_per_listing,
            engine,
        })
    }

    /// Candidate product links on a listing page, resolved against the
    /// listing URL, deduplicated in document order.
    fn collect_product_links(&self, html: &str, listing_url: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let base = Url::parse(listing_url).ok();

        let mut seen = std::collections::HashSet::new();
        let mut links = Vec::new();
        for element in document.select(&self.selectors.product_link) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let resolved = match &base {
                Some(base) => match base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                },
                None => href.to_string(),
            };
            if seen.insert(resolved.clone()) {
                links.push(resolved);
            }
        }
        links
    }

    /// Extract structured fields from a rendered product page.
    fn extract_product(&self, html: &str, url: &str) -> Option<Value> {
        let document = Html::parse_document(html);

        let name = document
            .select(&self.selectors.name)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|name| !name.is_empty())?;

        let mut record = Map::new();
        record.insert("name".to_string(), Value::String(name));
        record.insert("url".to_string(), Value::String(url.to_string()));

        if let Some(price_text) = document
            .select(&self.selectors.price)
            .next()
            .map(|el| el.text().collect::<String>())
        {
            if let Some(price) = parse_price(&price_text) {
                record.insert("price".to_string(), json!(price));
            }
        }

        if let Some(stock_text) = document
            .select(&self.selectors.stock)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        {
            match parse_stock_text(&stock_text) {
                StockSignal::Quantity(qty) => {
                    record.insert("stock_quantity".to_string(), json!(qty));
                }
                StockSignal::Available(available) => {
                    record.insert("available".to_string(), json!(available));
                }
                StockSignal::None => {}
            }
        }

        let mut specs = Map::new();
        for row in document.select(&self.selectors.spec_rows) {
            let cells: Vec<String> = row
                .text()
                .collect::<String>()
                .split('\n')
                .map(collapse_whitespace)
                .filter(|s| !s.is_empty())
                .collect();
            if cells.len() >= 2 {
                specs.insert(cells[0].clone(), Value::String(cells[1..].join(" ")));
            }
        }
        if !specs.is_empty() {
            record.insert("specifications".to_string(), Value::Object(specs));
        }

        let images: Vec<Value> = document
            .select(&self.selectors.images)
            .filter_map(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
            .map(|src| Value::String(src.to_string()))
            .collect();
        if !images.is_empty() {
            record.insert("images".to_string(), Value::Array(images));
        }

        if let Some(description) = document
            .select(&self.selectors.description)
            .next()
            .map(|el| el.html())
        {
            record.insert("description".to_string(), Value::String(description));
        }

        Some(Value::Object(record))
    }
}

#[async_trait]
impl Connector for ScrapeConnector {
    fn supplier_info(&self) -> &Supplier {
        &self.supplier
    }

    async fn test_connection(&self) -> Result<bool, ConnectorError> {
        match self.engine.render(&self.listing_urls[0]).await {
            Ok(html) => Ok(!html.is_empty()),
            Err(ConnectorError::Configuration(e)) => Err(ConnectorError::Configuration(e)),
            Err(e) => {
                tracing::debug!("Connection test failed for {}: {}", self.supplier.name, e);
                Ok(false)
            }
        }
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, ConnectorError> {
        let index = request.page_number.saturating_sub(1) as usize;
        let Some(listing_url) = self.listing_urls.get(index) else {
            return Ok(RawPage::empty());
        };

        let listing_html = self.engine.render(listing_url).await?;
        let links = self.collect_product_links(&listing_html, listing_url);
        tracing::debug!(
            "Found {} product links on listing {} for {}",
            links.len(),
            listing_url,
            self.supplier.name
        );

        let mut records = Vec::new();
        for link in links.iter().take(self.max_products_per_listing) {
            match self.engine.render(link).await {
                Ok(product_html) => match self.extract_product(&product_html, link) {
                    Some(record) => records.push(record),
                    None => {
                        tracing::warn!("No product name found at {}, skipping", link);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to render product page {}: {}", link, e);
                }
            }
        }

        Ok(RawPage {
            records,
            last_id: None,
        })
    }
}

enum StockSignal {
    Quantity(u32),
    Available(bool),
    None,
}

fn parse_stock_text(text: &str) -> StockSignal {
    let lower = text.to_lowercase();
    let digits: String = lower.chars().filter(char::is_ascii_digit).collect();
    if !digits.is_empty() {
        if let Ok(qty) = digits.parse::<u32>() {
            return StockSignal::Quantity(qty);
        }
    }
    if lower.contains("out of stock") || lower.contains("sold out") {
        return StockSignal::Available(false);
    }
    if lower.contains("in stock") || lower.contains("available") {
        return StockSignal::Available(true);
    }
    StockSignal::None
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::supplier::ConnectorType;

    struct StaticEngine {
        listing: String,
        product: String,
    }

    #[async_trait]
    impl BrowserEngine for StaticEngine {
        async fn render(&self, url: &str) -> Result<String, ConnectorError> {
            if url.contains("/product/") {
                Ok(self.product.clone())
            } else {
                Ok(self.listing.clone())
            }
        }
    }

    fn config() -> SupplierConfig {
        SupplierConfig {
            listing_urls: vec!["https://shop.example/category/av".to_string()],
            ..Default::default()
        }
    }

    fn connector(engine: StaticEngine) -> ScrapeConnector {
        ScrapeConnector::new(
            Supplier::new(5, "Scoop", ConnectorType::Scraper),
            &config(),
            Arc::new(engine),
        )
        .unwrap()
    }

    #[test]
    fn rejects_missing_listing_urls() {
        let result = ScrapeConnector::new(
            Supplier::new(5, "Scoop", ConnectorType::Scraper),
            &SupplierConfig::default(),
            Arc::new(StaticEngine {
                listing: String::new(),
                product: String::new(),
            }),
        );
        assert!(matches!(result, Err(ConnectorError::Configuration(_))));
    }

    #[tokio::test]
    async fn scrapes_listing_then_product_pages() {
        let listing = r#"<html><body>
            <a class="product-item" href="/product/hdmi-cable">HDMI Cable</a>
            <a class="product-item" href="/product/hdmi-cable">HDMI Cable (dup)</a>
        </body></html>"#;
        let product = r#"<html><body>
            <h1 class="product-title">HDMI Cable 2m</h1>
            <span class="price">R 199,00</span>
            <div class="stock">5 in stock</div>
            <div class="product-gallery"><img src="/img/a.jpg"/></div>
        </body></html>"#;

        let connector = connector(StaticEngine {
            listing: listing.to_string(),
            product: product.to_string(),
        });

        let request = PageRequest {
            mode: crate::infrastructure::pagination::PaginationMode::PageNumber,
            page_number: 1,
            page_size: 50,
            offset: 0,
            since_id: None,
        };
        let page = connector.fetch_page(&request).await.unwrap();
        assert_eq!(page.records.len(), 1); // duplicate link collapsed
        let record = &page.records[0];
        assert_eq!(record["name"], "HDMI Cable 2m");
        assert_eq!(record["stock_quantity"], 5);
        assert!((record["price"].as_f64().unwrap() - 199.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn listing_index_past_the_end_is_an_empty_page() {
        let connector = connector(StaticEngine {
            listing: String::new(),
            product: String::new(),
        });
        let request = PageRequest {
            mode: crate::infrastructure::pagination::PaginationMode::PageNumber,
            page_number: 2,
            page_size: 50,
            offset: 50,
            since_id: None,
        };
        let page = connector.fetch_page(&request).await.unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn stock_text_parsing() {
        assert!(matches!(parse_stock_text("12 in stock"), StockSignal::Quantity(12)));
        assert!(matches!(parse_stock_text("In Stock"), StockSignal::Available(true)));
        assert!(matches!(parse_stock_text("Out of stock"), StockSignal::Available(false)));
        assert!(matches!(parse_stock_text(""), StockSignal::None));
    }
}
