//! Product feed connector
//!
//! Performs unauthenticated GETs against a JSON or XML feed URL and parses
//! the body into raw records. Shopify-style JSON feeds paginate; most XML
//! feeds ship the whole catalog in one document, so pagination is opt-in
//! per supplier.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::domain::supplier::Supplier;
use crate::infrastructure::config::{FeedFormat, SupplierConfig};
use crate::infrastructure::connectors::{
    last_record_id, records_from_payload, Connector, ConnectorError, RawPage,
};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::pagination::PageRequest;

pub struct FeedConnector {
    supplier: Supplier,
    feed_url: String,
    format: FeedFormat,
    item_tag: String,
    paginated: bool,
    http: HttpClient,
}

impl FeedConnector {
    pub fn new(supplier: Supplier, config: &SupplierConfig) -> Result<Self, ConnectorError> {
        let feed_url = config.feed_url.clone().ok_or_else(|| {
            ConnectorError::Configuration(format!(
                "supplier '{}' has no feed URL configured",
                supplier.name
            ))
        })?;

        let http = HttpClient::new(config.http_config())
            .map_err(|e| ConnectorError::Configuration(e.to_string()))?;

        Ok(Self {
            supplier,
            feed_url,
            format: config.feed_format,
            item_tag: config.feed_item_tag.clone(),
            paginated: config.feed_paginated,
            http,
        })
    }

    fn parse_body(&self, body: &str) -> Result<Vec<Value>, ConnectorError> {
        match self.format {
            FeedFormat::Json => {
                let payload: Value = serde_json::from_str(body)
                    .map_err(|e| ConnectorError::Parse(format!("invalid JSON feed: {e}")))?;
                records_from_payload(payload).ok_or_else(|| {
                    ConnectorError::Parse(format!(
                        "unrecognized feed payload shape from {}",
                        self.supplier.name
                    ))
                })
            }
            FeedFormat::Xml => parse_xml_records(body, &self.item_tag),
        }
    }
}

#[async_trait]
impl Connector for FeedConnector {
    fn supplier_info(&self) -> &Supplier {
        &self.supplier
    }

    async fn test_connection(&self) -> Result<bool, ConnectorError> {
        match self.http.head(&self.feed_url).await {
            Ok(status) => Ok(status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED),
            Err(e) => {
                tracing::debug!("Connection test failed for {}: {}", self.supplier.name, e);
                Ok(false)
            }
        }
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, ConnectorError> {
        // Single-document feeds are exhausted after the first page.
        if !self.paginated && request.page_number > 1 {
            return Ok(RawPage::empty());
        }

        let query = if self.paginated {
            request.query_params()
        } else {
            Vec::new()
        };

        let response = self
            .http
            .get_raw(&self.feed_url, &query)
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ConnectorError::RateLimited(format!(
                "{} returned 429",
                self.supplier.name
            )));
        }
        if !status.is_success() {
            return Err(ConnectorError::Transport(format!(
                "HTTP request failed with status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ConnectorError::Transport(format!("failed to read feed body: {e}")))?;

        let records = self.parse_body(&body)?;
        let last_id = last_record_id(&records);

        Ok(RawPage { records, last_id })
    }
}

/// Flatten each `<item_tag>` element of an XML feed into a JSON object of
/// its direct child elements. Repeated child names (e.g. `<image>`)
/// collect into arrays; nested markup below a child is ignored beyond its
/// text content.
fn parse_xml_records(xml: &str, item_tag: &str) -> Result<Vec<Value>, ConnectorError> {
    let mut reader = Reader::from_str(xml);
    let mut records = Vec::new();

    let mut current: Option<Map<String, Value>> = None;
    let mut field: Option<String> = None;
    let mut nested_depth = 0u32;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if current.is_none() {
                    if name.eq_ignore_ascii_case(item_tag) {
                        current = Some(Map::new());
                    }
                } else if field.is_none() {
                    field = Some(name);
                    text.clear();
                } else {
                    nested_depth += 1;
                }
            }
            Ok(Event::Text(t)) => {
                if current.is_some() && field.is_some() {
                    text.push_str(t.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::CData(t)) => {
                if current.is_some() && field.is_some() {
                    text.push_str(String::from_utf8_lossy(t.into_inner().as_ref()).as_ref());
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if nested_depth > 0 {
                    nested_depth -= 1;
                } else if let Some(f) = field.take_if(|f| *f == name) {
                    if let Some(map) = current.as_mut() {
                        insert_field(map, f, text.trim().to_string());
                    }
                } else if field.is_none()
                    && current.is_some()
                    && name.eq_ignore_ascii_case(item_tag)
                {
                    if let Some(map) = current.take() {
                        records.push(Value::Object(map));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ConnectorError::Parse(format!(
                    "invalid XML feed at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    Ok(records)
}

fn insert_field(map: &mut Map<String, Value>, key: String, value: String) {
    match map.get_mut(&key) {
        Some(Value::Array(values)) => values.push(Value::String(value)),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, Value::String(value)]);
        }
        None => {
            map.insert(key, Value::String(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::supplier::ConnectorType;

    #[test]
    fn missing_feed_url_is_a_configuration_error() {
        let supplier = Supplier::new(4, "Syntech", ConnectorType::Feed);
        let result = FeedConnector::new(supplier, &SupplierConfig::default());
        assert!(matches!(result, Err(ConnectorError::Configuration(_))));
    }

    #[test]
    fn parses_xml_feed_items() {
        let xml = r#"<?xml version="1.0"?>
            <catalog>
              <product>
                <sku>SYN-001</sku>
                <name>USB-C Hub</name>
                <price>499.00</price>
                <image>https://cdn.example/a.jpg</image>
                <image>https://cdn.example/b.jpg</image>
              </product>
              <product>
                <sku>SYN-002</sku>
                <name><![CDATA[HDMI & DisplayPort Adapter]]></name>
                <price>259.50</price>
              </product>
            </catalog>"#;

        let records = parse_xml_records(xml, "product").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["sku"], "SYN-001");
        assert_eq!(records[0]["image"].as_array().unwrap().len(), 2);
        assert_eq!(records[1]["name"], "HDMI & DisplayPort Adapter");
    }

    #[test]
    fn ignores_markup_nested_below_a_field() {
        let xml = r#"<feed>
              <item>
                <title>Cable</title>
                <description><p>Braided <b>cable</b></p></description>
              </item>
            </feed>"#;

        let records = parse_xml_records(xml, "item").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "Cable");
        assert_eq!(records[0]["description"], "Braided cable");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let result = parse_xml_records("<catalog><product><sku>X</catalog>", "product");
        assert!(matches!(result, Err(ConnectorError::Parse(_))));
    }

    #[tokio::test]
    async fn unpaginated_feed_is_exhausted_after_page_one() {
        let supplier = Supplier::new(4, "Syntech", ConnectorType::Feed);
        let config = SupplierConfig {
            feed_url: Some("https://feeds.example/products.xml".to_string()),
            feed_format: FeedFormat::Xml,
            ..Default::default()
        };
        let connector = FeedConnector::new(supplier, &config).unwrap();

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
}
