use crate::errors::{AnalysisError, AnalysisResult};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub application_name: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_pool_size: usize,
    pub product_service_url: String,
    pub market_data_base_url: String,
    pub external_call_timeout: Duration,
    pub batch_concurrency: usize,
    pub risk_bands: RiskBands,
    pub repayment_boundaries: RepaymentBoundaries,
}

/// Cuts on the safety-score axis separating the four risk bands.
/// Strictly increasing: `extreme_high < high_medium < medium_low`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskBands {
    pub extreme_high: f64,
    pub high_medium: f64,
    pub medium_low: f64,
}

impl RiskBands {
    pub fn new(extreme_high: f64, high_medium: f64, medium_low: f64) -> AnalysisResult<Self> {
        let cuts = [extreme_high, high_medium, medium_low];
        if cuts.iter().any(|c| !c.is_finite() || *c <= 0.0 || *c >= 1.0) {
            return Err(AnalysisError::Config(format!(
                "risk band boundaries must lie in (0, 1): {cuts:?}"
            )));
        }
        if !(extreme_high < high_medium && high_medium < medium_low) {
            return Err(AnalysisError::Config(format!(
                "risk band boundaries must be strictly increasing: {cuts:?}"
            )));
        }
        Ok(Self { extreme_high, high_medium, medium_low })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepaymentBoundaries {
    /// Minimum summed early-repayment probability pair.
    pub early: f64,
    /// Maximum loss probability.
    pub maturity: f64,
}

impl AppConfig {
    pub fn from_env() -> AnalysisResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("INSTANCE_PORT", "8000")
            .parse::<u16>()
            .map_err(|e| AnalysisError::Config(format!("INSTANCE_PORT: {e}")))?;

        let pool_size = env_var_or("DATABASE_POOL_SIZE", "5")
            .parse::<usize>()
            .map_err(|e| AnalysisError::Config(format!("DATABASE_POOL_SIZE: {e}")))?;

        let max_overflow = env_var_or("DATABASE_MAX_OVERFLOW", "0")
            .parse::<usize>()
            .map_err(|e| AnalysisError::Config(format!("DATABASE_MAX_OVERFLOW: {e}")))?;

        let timeout_secs = env_var_or("EXTERNAL_CALL_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| AnalysisError::Config(format!("EXTERNAL_CALL_TIMEOUT_SECS: {e}")))?;

        let batch_concurrency = env_var_or("BATCH_CONCURRENCY", "8")
            .parse::<usize>()
            .map_err(|e| AnalysisError::Config(format!("BATCH_CONCURRENCY: {e}")))?;

        if pool_size + max_overflow == 0 {
            return Err(AnalysisError::Config("database pool capacity must be at least 1".into()));
        }
        if batch_concurrency == 0 {
            return Err(AnalysisError::Config("BATCH_CONCURRENCY must be at least 1".into()));
        }

        let risk_bands = RiskBands::new(
            env_f64("EXTREME_AND_HIGH_RISK_BOUNDARY")?,
            env_f64("HIGH_AND_MEDIUM_RISK_BOUNDARY")?,
            env_f64("MEDIUM_AND_LOW_RISK_BOUNDARY")?,
        )?;

        let repayment_boundaries = RepaymentBoundaries {
            early: env_f64("EARLY_REPAYMENT_BOUNDARY")?,
            maturity: env_f64("MATURITY_REPAYMENT_BOUNDARY")?,
        };

        Ok(Self {
            application_name: env_var_or("APPLICATION_NAME", "analysis-service"),
            server_port,
            database_url: env_var_or("DATABASE_URL", "analysis.db"),
            database_pool_size: pool_size + max_overflow,
            product_service_url: env_var_or("PRODUCT_SERVICE_URL", "http://localhost:8080"),
            market_data_base_url: env_var_or(
                "MARKET_DATA_BASE_URL",
                "https://query1.finance.yahoo.com",
            ),
            external_call_timeout: Duration::from_secs(timeout_secs),
            batch_concurrency,
            risk_bands,
            repayment_boundaries,
        })
    }
}

fn env_var(key: &str) -> AnalysisResult<String> {
    std::env::var(key).map_err(|_| AnalysisError::Config(format!("missing env var: {key}")))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f64(key: &str) -> AnalysisResult<f64> {
    let value = env_var(key)?
        .trim()
        .parse::<f64>()
        .map_err(|e| AnalysisError::Config(format!("{key}: {e}")))?;
    if !value.is_finite() {
        return Err(AnalysisError::Config(format!("{key}: not a finite number")));
    }
    Ok(value)
}


#[cfg(test)]
impl AppConfig {
    /// Bands at 0.3 / 0.5 / 0.7, early boundary 1.0, loss ceiling 0.1.
    pub fn for_tests() -> Self {
        Self {
            application_name: "analysis-service".into(),
            server_port: 0,
            database_url: ":memory:".into(),
            database_pool_size: 2,
            product_service_url: "http://127.0.0.1:9".into(),
            market_data_base_url: "http://127.0.0.1:9".into(),
            external_call_timeout: Duration::from_secs(1),
            batch_concurrency: 4,
            risk_bands: RiskBands { extreme_high: 0.3, high_medium: 0.5, medium_low: 0.7 },
            repayment_boundaries: RepaymentBoundaries { early: 1.0, maturity: 0.1 },
        }
    }
}
