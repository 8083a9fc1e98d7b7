use super::{price_ratio, worst_case_scalar, BatchRatioEntry, EquityPrices, PriceRatioReport};
use crate::catalog::{Equity, ProductCatalog, ProductReference};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::feeds::MarketDataProvider;
use chrono::NaiveDate;
use futures_util::future::try_join_all;
use futures_util::{StreamExt, TryStreamExt};
use std::sync::Arc;

/// Prices observed for one equity of a product.
#[derive(Debug, Clone, Copy)]
struct EquityObservation {
    initial: f64,
    recent: f64,
    ratio: f64,
}

/// How one product of a batch resolved.
#[derive(Debug)]
enum BatchOutcome {
    Ratio(f64),
    /// Post-catalog failure: the entry is kept with a null ratio.
    Null,
    /// Catalog failure: the whole batch fails.
    Abort(AnalysisError),
}

impl BatchOutcome {
    fn classify(product_id: i64, result: AnalysisResult<f64>) -> Self {
        match result {
            Ok(scalar) => BatchOutcome::Ratio(scalar),
            Err(e) if e.aborts_batch() => BatchOutcome::Abort(e),
            Err(e) => {
                tracing::warn!(product_id, error = %e, "price ratio unavailable, returning null");
                BatchOutcome::Null
            }
        }
    }

    fn into_entry(self, id: i64) -> AnalysisResult<BatchRatioEntry> {
        let recent_and_initial_price_ratio = match self {
            BatchOutcome::Ratio(scalar) => Some(scalar),
            BatchOutcome::Null => None,
            BatchOutcome::Abort(e) => return Err(e),
        };
        Ok(BatchRatioEntry { id, recent_and_initial_price_ratio })
    }
}

/// Computes how far each product's underlying equities have moved since the
/// product's reference evaluation date. The worst-performing equity sets the
/// product's scalar, mirroring how a knock-in barrier is triggered.
#[derive(Clone)]
pub struct PriceRatioCalculator {
    catalog: Arc<dyn ProductCatalog>,
    market: Arc<dyn MarketDataProvider>,
    batch_concurrency: usize,
}

impl PriceRatioCalculator {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        market: Arc<dyn MarketDataProvider>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            catalog,
            market,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Full report for one product. Any failure fails the whole report.
    pub async fn price_ratio(&self, product_id: i64) -> AnalysisResult<PriceRatioReport> {
        let product = self.catalog.fetch_product(product_id).await?;
        self.evaluate(&product, today()).await
    }

    /// Scalar ratio per product id, in input order (duplicates included).
    /// A catalog failure for any id fails the batch; other failures null
    /// out only that id's ratio.
    pub async fn batch_price_ratios(&self, product_ids: &[i64]) -> AnalysisResult<Vec<BatchRatioEntry>> {
        if product_ids.is_empty() {
            return Err(AnalysisError::InvalidRequest("productIdList must not be empty".into()));
        }
        let today = today();

        let entries: Vec<BatchRatioEntry> = futures_util::stream::iter(product_ids.iter().copied())
            .map(|id| async move {
                let outcome = match self.catalog.fetch_product(id).await {
                    Err(e) => BatchOutcome::Abort(e),
                    Ok(product) => {
                        let scalar = self
                            .evaluate(&product, today)
                            .await
                            .map(|report| report.recent_and_initial_price_ratio);
                        BatchOutcome::classify(id, scalar)
                    }
                };
                outcome.into_entry(id)
            })
            .buffered(self.batch_concurrency)
            .try_collect()
            .await?;

        let nulls = entries.iter().filter(|e| e.recent_and_initial_price_ratio.is_none()).count();
        tracing::info!(products = entries.len(), nulls, "batch price ratios computed");
        Ok(entries)
    }

    async fn evaluate(&self, product: &ProductReference, today: NaiveDate) -> AnalysisResult<PriceRatioReport> {
        if product.reference_date > today {
            return Err(AnalysisError::FutureReferenceDate {
                product_id: product.product_id,
                date: product.reference_date,
            });
        }

        let observations =
            try_join_all(product.equities.iter().map(|equity| self.observe(product, equity))).await?;

        let mut initial = Vec::with_capacity(observations.len());
        let mut recent = Vec::with_capacity(observations.len());
        let mut ratio = Vec::with_capacity(observations.len());
        for (equity, obs) in product.equities.iter().zip(observations.iter()) {
            initial.push((equity.name.clone(), obs.initial));
            recent.push((equity.name.clone(), obs.recent));
            ratio.push((equity.name.clone(), obs.ratio));
        }

        let scalar = worst_case_scalar(observations.iter().map(|o| o.ratio)).ok_or_else(|| {
            AnalysisError::close_unavailable(product.product_id, "", "product has no equities")
        })?;

        tracing::debug!(product_id = product.product_id, scalar, "price ratio computed");
        Ok(PriceRatioReport {
            initial: EquityPrices(initial),
            recent: EquityPrices(recent),
            ratio: EquityPrices(ratio),
            recent_and_initial_price_ratio: scalar,
        })
    }

    async fn observe(&self, product: &ProductReference, equity: &Equity) -> AnalysisResult<EquityObservation> {
        let product_id = product.product_id;
        let (initial, recent) = tokio::join!(
            self.market.close_on(&equity.symbol, product.reference_date),
            self.market.recent_close(&equity.symbol),
        );

        let initial = located(product_id, equity, initial, "no close on the reference date")?;
        let recent = located(product_id, equity, recent, "no recent close")?;
        let ratio = price_ratio(initial, recent).ok_or_else(|| {
            AnalysisError::close_unavailable(
                product_id,
                &equity.name,
                format!("unusable prices initial={initial} recent={recent}"),
            )
        })?;

        Ok(EquityObservation { initial, recent, ratio })
    }
}

/// Any provider failure or missing bar makes the equity unpriceable.
fn located(
    product_id: i64,
    equity: &Equity,
    fetched: AnalysisResult<Option<f64>>,
    missing: &str,
) -> AnalysisResult<f64> {
    match fetched {
        Ok(Some(price)) => Ok(price),
        Ok(None) => Err(AnalysisError::close_unavailable(product_id, &equity.name, missing)),
        Err(e) => {
            tracing::warn!(product_id, symbol = %equity.symbol, error = %e, "market data lookup failed");
            Err(AnalysisError::close_unavailable(product_id, &equity.name, e.to_string()))
        }
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
pub mod stubs {
    use super::*;
    use async_trait::async_trait;
    use chrono::Days;
    use portable_atomic::{AtomicU64, Ordering};
    use std::collections::HashMap;

    /// Catalog answering from a fixed map. Ids in `missing` get a 404 from
    /// the product service; other unknown ids behave like an unreachable one.
    #[derive(Default)]
    pub struct StubCatalog {
        pub products: HashMap<i64, ProductReference>,
        pub missing: Vec<i64>,
    }

    impl StubCatalog {
        pub fn with(mut self, product_id: i64, reference_date: NaiveDate, equities: &[(&str, &str)]) -> Self {
            self.products.insert(
                product_id,
                ProductReference {
                    product_id,
                    reference_date,
                    equities: equities
                        .iter()
                        .map(|(name, symbol)| Equity {
                            name: name.to_string(),
                            symbol: symbol.to_string(),
                        })
                        .collect(),
                },
            );
            self
        }

        pub fn without(mut self, product_id: i64) -> Self {
            self.missing.push(product_id);
            self
        }
    }

    #[async_trait]
    impl ProductCatalog for StubCatalog {
        async fn fetch_product(&self, product_id: i64) -> AnalysisResult<ProductReference> {
            if self.missing.contains(&product_id) {
                return Err(AnalysisError::CatalogRejected { product_id, status: 404 });
            }
            self.products
                .get(&product_id)
                .cloned()
                .ok_or_else(|| AnalysisError::catalog(product_id, "connection refused"))
        }
    }

    /// Market data keyed by symbol. Symbols missing from `initial` have no
    /// bar on the reference date; symbols in `failing` error out.
    #[derive(Default)]
    pub struct StubMarket {
        pub initial: HashMap<String, f64>,
        pub recent: HashMap<String, f64>,
        pub failing: Vec<String>,
        pub calls: AtomicU64,
    }

    impl StubMarket {
        pub fn price(mut self, symbol: &str, initial: f64, recent: f64) -> Self {
            self.initial.insert(symbol.to_string(), initial);
            self.recent.insert(symbol.to_string(), recent);
            self
        }

        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl MarketDataProvider for StubMarket {
        async fn close_on(&self, symbol: &str, _date: NaiveDate) -> AnalysisResult<Option<f64>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.failing.iter().any(|s| s == symbol) {
                return Err(AnalysisError::MarketData(format!("{symbol}: timed out")));
            }
            Ok(self.initial.get(symbol).copied())
        }

        async fn recent_close(&self, symbol: &str) -> AnalysisResult<Option<f64>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.failing.iter().any(|s| s == symbol) {
                return Err(AnalysisError::MarketData(format!("{symbol}: timed out")));
            }
            Ok(self.recent.get(symbol).copied())
        }
    }

    pub fn days_ago(n: u64) -> NaiveDate {
        today().checked_sub_days(Days::new(n)).unwrap()
    }

    pub fn days_ahead(n: u64) -> NaiveDate {
        today().checked_add_days(Days::new(n)).unwrap()
    }

    pub const INDICES: [(&str, &str); 3] = [
        ("KOSPI200 Index", "^KS200"),
        ("S&P500 Index", "^GSPC"),
        ("Euro Stoxx 50 Index", "^STOXX50E"),
    ];

    pub fn index_market() -> StubMarket {
        StubMarket::default()
            .price("^KS200", 150.0, 160.0)
            .price("^GSPC", 280.0, 300.0)
            .price("^STOXX50E", 300.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::stubs::*;
    use super::*;

    fn calculator(catalog: StubCatalog, market: Arc<StubMarket>) -> PriceRatioCalculator {
        PriceRatioCalculator::new(Arc::new(catalog), market, 4)
    }

    #[tokio::test]
    async fn test_single_product_report() {
        let catalog = StubCatalog::default().with(1, days_ago(7), &INDICES);
        let calc = calculator(catalog, Arc::new(index_market()));

        let report = calc.price_ratio(1).await.unwrap();
        assert_eq!(report.initial.get("KOSPI200 Index"), Some(150.0));
        assert_eq!(report.recent.get("KOSPI200 Index"), Some(160.0));
        assert_eq!(report.ratio.get("KOSPI200 Index"), Some(106.67));
        assert_eq!(report.ratio.get("S&P500 Index"), Some(107.14));
        assert_eq!(report.ratio.get("Euro Stoxx 50 Index"), Some(33.33));
        assert_eq!(report.recent_and_initial_price_ratio, -66.67);

        let names: Vec<&str> = report.ratio.0.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["KOSPI200 Index", "S&P500 Index", "Euro Stoxx 50 Index"]);
    }

    #[tokio::test]
    async fn test_repeated_requests_are_identical() {
        let catalog = StubCatalog::default().with(1, days_ago(7), &INDICES);
        let calc = calculator(catalog, Arc::new(index_market()));
        let first = serde_json::to_string(&calc.price_ratio(1).await.unwrap()).unwrap();
        let second = serde_json::to_string(&calc.price_ratio(1).await.unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_reference_date_today_is_allowed() {
        let catalog = StubCatalog::default().with(1, days_ago(0), &INDICES);
        let calc = calculator(catalog, Arc::new(index_market()));
        assert!(calc.price_ratio(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_future_reference_date_skips_market_data() {
        let market = Arc::new(index_market());
        let catalog = StubCatalog::default().with(1, days_ahead(7), &INDICES);
        let calc = calculator(catalog, market.clone());

        let err = calc.price_ratio(1).await.unwrap_err();
        assert!(matches!(err, AnalysisError::FutureReferenceDate { product_id: 1, .. }));
        assert_eq!(market.calls(), 0);
    }

    #[tokio::test]
    async fn test_catalog_failure() {
        let calc = calculator(StubCatalog::default(), Arc::new(index_market()));
        let err = calc.price_ratio(5).await.unwrap_err();
        assert_eq!(err.code(), "CatalogUnavailable");
    }

    #[tokio::test]
    async fn test_missing_reference_close() {
        let mut market = index_market();
        market.initial.remove("^GSPC");
        let catalog = StubCatalog::default().with(1, days_ago(7), &INDICES);
        let calc = calculator(catalog, Arc::new(market));

        let err = calc.price_ratio(1).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ReferenceDateCloseUnavailable { product_id: 1, ref equity, .. } if equity == "S&P500 Index"
        ));
    }

    #[tokio::test]
    async fn test_zero_price_and_provider_failure_are_lookup_failures() {
        let market = index_market().price("^GSPC", 0.0, 300.0);
        let catalog = StubCatalog::default().with(1, days_ago(7), &INDICES);
        let err = calculator(catalog, Arc::new(market)).price_ratio(1).await.unwrap_err();
        assert_eq!(err.code(), "ReferenceDateCloseUnavailable");

        let mut market = index_market();
        market.failing.push("^KS200".into());
        let catalog = StubCatalog::default().with(1, days_ago(7), &INDICES);
        let err = calculator(catalog, Arc::new(market)).price_ratio(1).await.unwrap_err();
        assert_eq!(err.code(), "ReferenceDateCloseUnavailable");

        let mut market = index_market();
        market.recent.remove("^STOXX50E");
        let catalog = StubCatalog::default().with(1, days_ago(7), &INDICES);
        let err = calculator(catalog, Arc::new(market)).price_ratio(1).await.unwrap_err();
        assert_eq!(err.code(), "ReferenceDateCloseUnavailable");
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_duplicates() {
        let catalog = StubCatalog::default()
            .with(1, days_ago(7), &INDICES)
            .with(2, days_ago(3), &INDICES[..2])
            .with(3, days_ago(1), &INDICES[1..]);
        let calc = calculator(catalog, Arc::new(index_market()));

        let entries = calc.batch_price_ratios(&[3, 1, 2, 1]).await.unwrap();
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 2, 1]);
        assert_eq!(entries[0].recent_and_initial_price_ratio, Some(-66.67));
        assert_eq!(entries[1].recent_and_initial_price_ratio, Some(-66.67));
        assert_eq!(entries[2].recent_and_initial_price_ratio, Some(6.67));
        assert_eq!(entries[3], entries[1]);
    }

    #[tokio::test]
    async fn test_batch_degrades_per_product() {
        let mut market = index_market().price("^N225", 40_000.0, 38_000.0);
        market.initial.remove("^STOXX50E");
        let catalog = StubCatalog::default()
            .with(1, days_ahead(7), &INDICES[..1])
            .with(2, days_ago(7), &[("Nikkei 225", "^N225")])
            .with(3, days_ago(7), &INDICES);
        let calc = calculator(catalog, Arc::new(market));

        let entries = calc.batch_price_ratios(&[1, 2, 3]).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], BatchRatioEntry { id: 1, recent_and_initial_price_ratio: None });
        assert_eq!(entries[1], BatchRatioEntry { id: 2, recent_and_initial_price_ratio: Some(-5.0) });
        assert_eq!(entries[2], BatchRatioEntry { id: 3, recent_and_initial_price_ratio: None });
    }

    #[tokio::test]
    async fn test_batch_aborts_on_catalog_failure() {
        let catalog = StubCatalog::default().with(1, days_ago(7), &INDICES);
        let calc = calculator(catalog, Arc::new(index_market()));
        let err = calc.batch_price_ratios(&[1, 99]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::CatalogUnavailable { ref product_ids, .. } if product_ids == &vec![99]));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let calc = calculator(StubCatalog::default(), Arc::new(index_market()));
        assert!(matches!(calc.batch_price_ratios(&[]).await, Err(AnalysisError::InvalidRequest(_))));
    }
}
