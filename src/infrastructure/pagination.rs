//! Pagination strategies for upstream sources.
//!
//! Produces a lazy, finite sequence of raw-record pages from one upstream
//! source, abstracting over page-number, cursor/since-id, and offset
//! conventions. Termination is guaranteed by three guards: an empty page,
//! a hard page-count ceiling, and an all-duplicates page (a misbehaving
//! upstream that loops forever).

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::infrastructure::connectors::{last_record_id, Connector, ConnectorError, RawPage};

/// The pagination convention an upstream source speaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// `page=N`
    PageNumber,
    /// `since_id=<last-seen-id>`
    SinceId,
    /// `offset=N*page_size`
    Offset,
}

/// Configured preference; `Auto` probes the conventions in priority order
/// until one yields data on the first page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaginationPreference {
    #[default]
    Auto,
    PageNumber,
    SinceId,
    Offset,
}

impl PaginationPreference {
    fn candidate_modes(self) -> &'static [PaginationMode] {
        match self {
            Self::Auto => &[
                PaginationMode::PageNumber,
                PaginationMode::SinceId,
                PaginationMode::Offset,
            ],
            Self::PageNumber => &[PaginationMode::PageNumber],
            Self::SinceId => &[PaginationMode::SinceId],
            Self::Offset => &[PaginationMode::Offset],
        }
    }
}

/// One page fetch, as handed to a connector.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub mode: PaginationMode,
    /// 1-based page number.
    pub page_number: u32,
    pub page_size: u32,
    pub offset: u64,
    pub since_id: Option<String>,
}

impl PageRequest {
    /// Query parameters for the convention in use.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(3);
        match self.mode {
            PaginationMode::PageNumber => {
                params.push(("page".to_string(), self.page_number.to_string()));
            }
            PaginationMode::SinceId => {
                if let Some(id) = &self.since_id {
                    params.push(("since_id".to_string(), id.clone()));
                }
            }
            PaginationMode::Offset => {
                params.push(("offset".to_string(), self.offset.to_string()));
            }
        }
        params.push(("limit".to_string(), self.page_size.to_string()));
        params
    }
}

/// Paging limits and backoff policy for one supplier.
#[derive(Debug, Clone)]
pub struct PagerConfig {
    pub page_size: u32,
    /// Hard ceiling on fetched pages, whatever the upstream claims.
    pub max_pages: u32,
    /// Minimum delay between consecutive page fetches.
    pub inter_page_delay: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for PagerConfig {
    fn default() -> Self {
        use crate::infrastructure::config::defaults;
        Self {
            page_size: defaults::PAGE_SIZE,
            max_pages: defaults::MAX_PAGES,
            inter_page_delay: Duration::from_millis(defaults::INTER_PAGE_DELAY_MS),
            max_retries: defaults::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
        }
    }
}

/// A page fetch that exhausted its retry budget (or hit a non-retryable
/// connector failure).
#[derive(Debug, thiserror::Error)]
#[error("page {page} failed after {attempts} attempt(s): {source}")]
pub struct PageFetchError {
    pub page: u32,
    pub attempts: u32,
    #[source]
    pub source: ConnectorError,
}

/// Drives a connector through a finite sequence of pages.
///
/// Page fetches are sequential by design - the since-id convention makes
/// each page depend on the previous page's last-seen id.
pub struct PageWalker<'a> {
    connector: &'a dyn Connector,
    config: PagerConfig,
    modes: &'static [PaginationMode],
    mode: Option<PaginationMode>,
    next_page_number: u32,
    offset: u64,
    since_id: Option<String>,
    seen_hashes: HashSet<[u8; 32]>,
    pages_fetched: u32,
    done: bool,
}

impl<'a> PageWalker<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        config: PagerConfig,
        preference: PaginationPreference,
    ) -> Self {
        Self {
            connector,
            config,
            modes: preference.candidate_modes(),
            mode: None,
            next_page_number: 1,
            offset: 0,
            since_id: None,
            seen_hashes: HashSet::new(),
            pages_fetched: 0,
            done: false,
        }
    }

    /// Pages successfully fetched so far (including the terminating empty
    /// page, if any).
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Fetch the next batch of raw records, or `None` once the sequence
    /// has terminated.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, PageFetchError> {
        if self.done {
            return Ok(None);
        }
        if self.pages_fetched >= self.config.max_pages {
            warn!(
                "Page ceiling of {} reached; terminating pagination",
                self.config.max_pages
            );
            self.done = true;
            return Ok(None);
        }

        if self.pages_fetched > 0 && !self.config.inter_page_delay.is_zero() {
            sleep(self.config.inter_page_delay).await;
        }

        let page = match self.mode {
            Some(mode) => self.fetch_with_retry(self.request_for(mode)).await?,
            None => self.probe_first_page().await?,
        };
        self.pages_fetched += 1;

        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }

        // Loop guard: a page made entirely of already-seen records means
        // the upstream is cycling rather than advancing.
        let mut any_fresh = false;
        for record in &page.records {
            if self.seen_hashes.insert(record_hash(record)) {
                any_fresh = true;
            }
        }
        if !any_fresh {
            warn!(
                "Page {} contained only previously seen records; terminating pagination",
                self.next_page_number
            );
            self.done = true;
            return Ok(None);
        }

        self.since_id = page
            .last_id
            .clone()
            .or_else(|| last_record_id(&page.records))
            .or_else(|| self.since_id.take());
        self.next_page_number += 1;
        self.offset += u64::from(self.config.page_size);

        Ok(Some(page.records))
    }

    fn request_for(&self, mode: PaginationMode) -> PageRequest {
        PageRequest {
            mode,
            page_number: self.next_page_number,
            page_size: self.config.page_size,
            offset: self.offset,
            since_id: self.since_id.clone(),
        }
    }

    /// Try the candidate conventions in priority order until one yields
    /// data, then lock it in for the rest of the run.
    async fn probe_first_page(&mut self) -> Result<RawPage, PageFetchError> {
        let mut locked = self.modes[self.modes.len() - 1];
        let mut first = RawPage::empty();

        for mode in self.modes {
            let page = self.fetch_with_retry(self.request_for(*mode)).await?;
            if !page.is_empty() {
                locked = *mode;
                first = page;
                break;
            }
            debug!("Pagination mode {:?} yielded no records on probe", mode);
        }

        if self.modes.len() > 1 {
            info!("Locked pagination mode {:?} for this run", locked);
        }
        self.mode = Some(locked);
        Ok(first)
    }

    async fn fetch_with_retry(&self, request: PageRequest) -> Result<RawPage, PageFetchError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.connector.fetch_page(&request).await {
                Ok(page) => {
                    if attempt > 0 {
                        info!(
                            "Successfully fetched page {} on attempt {}",
                            request.page_number,
                            attempt + 1
                        );
                    }
                    return Ok(page);
                }
                Err(e) if !e.is_retryable() => {
                    return Err(PageFetchError {
                        page: request.page_number,
                        attempts: attempt + 1,
                        source: e,
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = self.config.retry_base_delay * 2_u32.pow(attempt);
                        warn!(
                            "Failed to fetch page {} (attempt {}), retrying in {:?}: {}",
                            request.page_number,
                            attempt + 1,
                            delay,
                            last_error.as_ref().map(ToString::to_string).unwrap_or_default()
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(PageFetchError {
            page: request.page_number,
            attempts: self.config.max_retries + 1,
            source: last_error
                .unwrap_or_else(|| ConnectorError::Transport("unknown error during fetch".into())),
        })
    }
}

fn record_hash(record: &Value) -> [u8; 32] {
    let bytes = serde_json::to_vec(record).unwrap_or_default();
    *blake3::hash(&bytes).as_bytes()
}
