use crate::errors::{AnalysisError, AnalysisResult};
use smallvec::SmallVec;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

pub type SharedDb = Arc<DbPool>;

/// Result store over a bounded SQLite pool.
///
/// Every query runs in its own transaction on a connection checked out for
/// that query alone. The transaction is committed whether the query
/// succeeded or failed, and the connection goes back to the pool.
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    pub async fn open(database_url: &str, size: usize) -> AnalysisResult<SharedDb> {
        let url = connect_url(database_url);
        let in_memory = is_in_memory(&url);

        let mut options = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let size = u32::try_from(size.max(1)).unwrap_or(u32::MAX);
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(size)
            .acquire_timeout(Duration::from_secs(10));
        if in_memory {
            // An in-memory database disappears with its last connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&pool).await?;
            }
        }

        tracing::info!(database = %url, pool_size = size, "result store initialized");
        Ok(Arc::new(Self { pool }))
    }

    async fn begin(&self) -> AnalysisResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ── Queries ──

    pub async fn select_product_ids(&self, query: ProductIdQuery) -> AnalysisResult<Vec<i64>> {
        let mut builder = query.build()?;
        tracing::debug!(sql = %builder.sql(), "selecting product ids");

        let mut tx = self.begin().await?;
        let result = builder.build_query_scalar::<i64>().fetch_all(&mut *tx).await;
        settle(tx, result).await
    }

    pub async fn monte_carlo_by_product(&self, product_id: i64) -> AnalysisResult<Option<MonteCarloRow>> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            "SELECT monte_carlo_result_id, product_id, early_repayment_probability_first, early_repayment_probability_second, maturity_repayment_probability, loss_probability, under_knock_in_barrier_probability FROM monte_carlo_result WHERE product_id = ? ORDER BY monte_carlo_result_id LIMIT 1",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .and_then(|row| row.as_ref().map(monte_carlo_row).transpose());
        settle(tx, result).await
    }

    pub async fn ai_result_by_product(&self, product_id: i64) -> AnalysisResult<Option<AiResultRow>> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            "SELECT ai_result_id, product_id, repayment_prediction, safety_score FROM ai_result WHERE product_id = ? ORDER BY ai_result_id LIMIT 1",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .and_then(|row| row.as_ref().map(ai_result_row).transpose());
        settle(tx, result).await
    }

    /// Safety scores for every id in `product_ids` that has a row; ids
    /// without one are skipped.
    pub async fn ai_summaries(&self, product_ids: Vec<i64>) -> AnalysisResult<Vec<AiSummaryRow>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<'static, Sqlite> =
            QueryBuilder::new("SELECT product_id, safety_score FROM ai_result WHERE ");
        Predicate::ProductIdIn(product_ids).push_sql(&mut builder);
        builder.push(" ORDER BY ai_result_id");

        let mut tx = self.begin().await?;
        let result = builder.build().fetch_all(&mut *tx).await.and_then(|rows| {
            rows.iter()
                .map(|row| -> Result<AiSummaryRow, sqlx::Error> {
                    Ok(AiSummaryRow {
                        product_id: row.try_get("product_id")?,
                        safety_score: row.try_get("safety_score")?,
                    })
                })
                .collect()
        });
        settle(tx, result).await
    }
}

/// Commits `tx` on both the success and the failure path. A commit failure
/// only replaces a successful result.
async fn settle<T>(tx: Transaction<'static, Sqlite>, result: Result<T, sqlx::Error>) -> AnalysisResult<T> {
    if let Err(e) = tx.commit().await {
        tracing::warn!(error = %e, "session commit failed");
        if result.is_ok() {
            return Err(e.into());
        }
    }
    Ok(result?)
}

fn connect_url(database_url: &str) -> String {
    match database_url {
        ":memory:" => "sqlite::memory:".to_string(),
        url if url.starts_with("sqlite:") => url.to_string(),
        path => format!("sqlite://{path}"),
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn monte_carlo_row(row: &SqliteRow) -> Result<MonteCarloRow, sqlx::Error> {
    Ok(MonteCarloRow {
        monte_carlo_result_id: row.try_get("monte_carlo_result_id")?,
        product_id: row.try_get("product_id")?,
        early_repayment_probability: EarlyRepaymentProbability {
            first: row.try_get("early_repayment_probability_first")?,
            second: row.try_get("early_repayment_probability_second")?,
        },
        maturity_repayment_probability: row.try_get("maturity_repayment_probability")?,
        loss_probability: row.try_get("loss_probability")?,
        under_knock_in_barrier_probability: row.try_get("under_knock_in_barrier_probability")?,
    })
}

fn ai_result_row(row: &SqliteRow) -> Result<AiResultRow, sqlx::Error> {
    Ok(AiResultRow {
        ai_result_id: row.try_get("ai_result_id")?,
        product_id: row.try_get("product_id")?,
        repayment_prediction: row.try_get("repayment_prediction")?,
        safety_score: row.try_get("safety_score")?,
    })
}

// ── Query building ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTable {
    MonteCarlo,
    Ai,
}

impl ResultTable {
    fn name(self) -> &'static str {
        match self {
            Self::MonteCarlo => "monte_carlo_result",
            Self::Ai => "ai_result",
        }
    }

    fn key_column(self) -> &'static str {
        match self {
            Self::MonteCarlo => "monte_carlo_result_id",
            Self::Ai => "ai_result_id",
        }
    }
}

/// A single filter over one of the result tables. Predicates are ANDed
/// together by [`ProductIdQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    ProductIdIn(Vec<i64>),
    SafetyScoreAtLeast(f64),
    SafetyScoreBelow(f64),
    EarlyRepaymentSumAtLeast(f64),
    LossProbabilityAtMost(f64),
}

impl Predicate {
    /// Table the predicate's columns live on; `None` means any table.
    fn table(&self) -> Option<ResultTable> {
        match self {
            Self::ProductIdIn(_) => None,
            Self::SafetyScoreAtLeast(_) | Self::SafetyScoreBelow(_) => Some(ResultTable::Ai),
            Self::EarlyRepaymentSumAtLeast(_) | Self::LossProbabilityAtMost(_) => {
                Some(ResultTable::MonteCarlo)
            }
        }
    }

    fn push_sql(&self, builder: &mut QueryBuilder<'static, Sqlite>) {
        match self {
            // One JSON-array bind, however long the list: SQLite caps bound variables.
            Self::ProductIdIn(ids) => {
                builder
                    .push("product_id IN (SELECT value FROM json_each(")
                    .push_bind(serde_json::Value::from(ids.clone()).to_string())
                    .push("))");
            }
            Self::SafetyScoreAtLeast(v) => {
                builder.push("safety_score >= ").push_bind(*v);
            }
            Self::SafetyScoreBelow(v) => {
                builder.push("safety_score < ").push_bind(*v);
            }
            Self::EarlyRepaymentSumAtLeast(v) => {
                builder
                    .push("early_repayment_probability_first + early_repayment_probability_second >= ")
                    .push_bind(*v);
            }
            Self::LossProbabilityAtMost(v) => {
                builder.push("loss_probability <= ").push_bind(*v);
            }
        }
    }
}

/// `SELECT product_id FROM <table> WHERE <p1> AND <p2> ...` in row order.
#[derive(Debug, Clone)]
pub struct ProductIdQuery {
    table: ResultTable,
    predicates: SmallVec<[Predicate; 4]>,
}

impl ProductIdQuery {
    pub fn ai_results() -> Self {
        Self { table: ResultTable::Ai, predicates: SmallVec::new() }
    }

    pub fn monte_carlo_results() -> Self {
        Self { table: ResultTable::MonteCarlo, predicates: SmallVec::new() }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn build(&self) -> AnalysisResult<QueryBuilder<'static, Sqlite>> {
        let mut builder = QueryBuilder::new(format!("SELECT product_id FROM {}", self.table.name()));

        for (i, predicate) in self.predicates.iter().enumerate() {
            if predicate.table().is_some_and(|t| t != self.table) {
                return Err(AnalysisError::Database(format!(
                    "predicate {predicate:?} does not apply to {}",
                    self.table.name()
                )));
            }
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            predicate.push_sql(&mut builder);
        }

        builder.push(" ORDER BY ").push(self.table.key_column());
        Ok(builder)
    }
}

// ── Row types ──

/// The two early-repayment probabilities simulated for a product. Rendered
/// on the wire in the legacy `"first,second"` form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyRepaymentProbability {
    pub first: f64,
    pub second: f64,
}

#[cfg(test)]
impl EarlyRepaymentProbability {
    pub fn sum(&self) -> f64 {
        self.first + self.second
    }
}

impl std::fmt::Display for EarlyRepaymentProbability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.first, self.second)
    }
}

impl serde::Serialize for EarlyRepaymentProbability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloRow {
    pub monte_carlo_result_id: i64,
    pub product_id: i64,
    #[schema(value_type = String, example = "0.5,0.3")]
    pub early_repayment_probability: EarlyRepaymentProbability,
    pub maturity_repayment_probability: f64,
    pub loss_probability: f64,
    pub under_knock_in_barrier_probability: f64,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiResultRow {
    pub ai_result_id: i64,
    pub product_id: i64,
    pub repayment_prediction: bool,
    pub safety_score: f64,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiSummaryRow {
    pub product_id: i64,
    pub safety_score: f64,
}
