//! Infrastructure module
//!
//! Transport, parsing, pagination, connectors, configuration, logging,
//! and the reference store implementations.

pub mod config;
pub mod connectors;
pub mod http_client;
pub mod logging;
pub mod pagination;
pub mod store;
pub mod transform;

pub use http_client::{HttpClient, HttpClientConfig};
pub use pagination::{PageWalker, PagerConfig, PaginationMode, PaginationPreference};
pub use transform::{TransformProfile, Transformer};
