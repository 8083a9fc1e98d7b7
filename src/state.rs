use crate::catalog::ProductCatalog;
use crate::config::AppConfig;
use crate::db::SharedDb;
use crate::feeds::MarketDataProvider;
use crate::ratio::calculator::PriceRatioCalculator;
use crate::risk::PropensityFilter;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub ratio_requests: AtomicU64,
    pub batch_requests: AtomicU64,
    pub batch_null_entries: AtomicU64,
    pub catalog_failures: AtomicU64,
    pub propensity_requests: AtomicU64,
    pub result_lookups: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            ratio_requests: AtomicU64::new(0),
            batch_requests: AtomicU64::new(0),
            batch_null_entries: AtomicU64::new(0),
            catalog_failures: AtomicU64::new(0),
            propensity_requests: AtomicU64::new(0),
            result_lookups: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            ratio_requests: self.ratio_requests.load(Ordering::Relaxed),
            batch_requests: self.batch_requests.load(Ordering::Relaxed),
            batch_null_entries: self.batch_null_entries.load(Ordering::Relaxed),
            catalog_failures: self.catalog_failures.load(Ordering::Relaxed),
            propensity_requests: self.propensity_requests.load(Ordering::Relaxed),
            result_lookups: self.result_lookups.load(Ordering::Relaxed),
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, utoipa::ToSchema)]
pub struct CountersSnapshot {
    pub ratio_requests: u64,
    pub batch_requests: u64,
    pub batch_null_entries: u64,
    pub catalog_failures: u64,
    pub propensity_requests: u64,
    pub result_lookups: u64,
}

// ── Shared Application State ──

/// Everything handlers need. Built once at startup and never mutated,
/// apart from the counters.
pub struct AppState {
    pub config: AppConfig,
    pub db: SharedDb,
    pub ratios: PriceRatioCalculator,
    pub propensity: PropensityFilter,
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: SharedDb,
        catalog: Arc<dyn ProductCatalog>,
        market: Arc<dyn MarketDataProvider>,
    ) -> Arc<Self> {
        let ratios = PriceRatioCalculator::new(catalog, market, config.batch_concurrency);
        let propensity = PropensityFilter::new(config.risk_bands, config.repayment_boundaries);

        Arc::new(Self {
            config,
            db,
            ratios,
            propensity,
            counters: PerfCounters::new(),
        })
    }
}
