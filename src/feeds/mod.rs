pub mod yahoo;

use crate::errors::AnalysisResult;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Daily closing prices by market symbol.
/// `Ok(None)` means the provider answered but has no usable close.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Close of the daily bar dated `date` in the exchange's own calendar.
    async fn close_on(&self, symbol: &str, date: NaiveDate) -> AnalysisResult<Option<f64>>;

    /// Latest available close; reflects the live price while the market is open.
    async fn recent_close(&self, symbol: &str) -> AnalysisResult<Option<f64>>;
}
