pub mod client;
pub mod types;

use crate::errors::AnalysisResult;
use async_trait::async_trait;
pub use types::{Equity, ProductReference};

/// Source of product metadata (reference date, underlying equities).
/// Implementations classify every failure as `CatalogUnavailable`.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn fetch_product(&self, product_id: i64) -> AnalysisResult<ProductReference>;
}
