use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// Domain-specific error types for the analysis service.
/// Collaborator failures are classified here and carry the product id
/// they were raised for. The service must:
/// - Abort a request (or a whole batch) on catalog failures
/// - Degrade a single batch entry on price lookup failures
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("product catalog unavailable for {product_ids:?}: {reason}")]
    CatalogUnavailable { product_ids: Vec<i64>, reason: String },

    #[error("product service rejected product {product_id} with HTTP {status}")]
    CatalogRejected { product_id: i64, status: u16 },

    #[error("product {product_id}: reference date {date} is in the future")]
    FutureReferenceDate { product_id: i64, date: chrono::NaiveDate },

    #[error("product {product_id}: no usable close for {equity}: {reason}")]
    ReferenceDateCloseUnavailable {
        product_id: i64,
        equity: String,
        reason: String,
    },

    #[error("no {kind} result for product {product_id}")]
    ResultNotFound { kind: ResultKind, product_id: i64 },

    #[error("invalid {field} value: {value}")]
    InvalidPreferenceValue { field: &'static str, value: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    MonteCarlo,
    Ai,
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MonteCarlo => write!(f, "monte carlo"),
            Self::Ai => write!(f, "AI"),
        }
    }
}

impl AnalysisError {
    pub fn catalog(product_id: i64, reason: impl Into<String>) -> Self {
        AnalysisError::CatalogUnavailable {
            product_ids: vec![product_id],
            reason: reason.into(),
        }
    }

    pub fn close_unavailable(product_id: i64, equity: &str, reason: impl Into<String>) -> Self {
        AnalysisError::ReferenceDateCloseUnavailable {
            product_id,
            equity: equity.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error takes down a whole ratio batch rather than
    /// nulling out the entry it was raised for.
    pub fn aborts_batch(&self) -> bool {
        !matches!(
            self,
            AnalysisError::FutureReferenceDate { .. }
                | AnalysisError::ReferenceDateCloseUnavailable { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::FutureReferenceDate { .. }
            | AnalysisError::ReferenceDateCloseUnavailable { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AnalysisError::ResultNotFound { .. } => StatusCode::NOT_FOUND,
            // The product service's own 4xx is passed through.
            AnalysisError::CatalogRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            AnalysisError::InvalidPreferenceValue { .. } | AnalysisError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AnalysisError::CatalogUnavailable { .. }
            | AnalysisError::MarketData(_)
            | AnalysisError::Network(_)
            | AnalysisError::Parse(_)
            | AnalysisError::Database(_)
            | AnalysisError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code carried in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::CatalogUnavailable { .. } => "CatalogUnavailable",
            AnalysisError::CatalogRejected { status: 404, .. } => "ProductNotFound",
            AnalysisError::CatalogRejected { .. } => "CatalogRejected",
            AnalysisError::FutureReferenceDate { .. } => "FutureReferenceDateError",
            AnalysisError::ReferenceDateCloseUnavailable { .. } => "ReferenceDateCloseUnavailable",
            AnalysisError::ResultNotFound { .. } => "ResultNotFound",
            AnalysisError::InvalidPreferenceValue { .. } => "InvalidPreferenceValue",
            AnalysisError::InvalidRequest(_) => "InvalidRequest",
            AnalysisError::MarketData(_) => "MarketDataError",
            AnalysisError::Network(_) => "NetworkError",
            AnalysisError::Parse(_) => "ParseError",
            AnalysisError::Database(_) => "DatabaseError",
            AnalysisError::Config(_) => "ConfigError",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AnalysisError::CatalogUnavailable { .. } => {
                "A problem occurred while communicating with the product service.".into()
            }
            AnalysisError::CatalogRejected { product_id, status: 404 } => {
                format!("Product {product_id} does not exist in the product service.")
            }
            AnalysisError::CatalogRejected { product_id, status } => {
                format!("The product service rejected product {product_id} (HTTP {status}).")
            }
            AnalysisError::FutureReferenceDate { .. } => {
                "The initial base price evaluation date is later than today, so no closing price is available.".into()
            }
            AnalysisError::ReferenceDateCloseUnavailable { product_id, equity, .. } => {
                format!("Could not locate a usable closing price of {equity} for product {product_id}.")
            }
            AnalysisError::ResultNotFound { kind, product_id } => {
                format!("No {kind} analysis result was found for product {product_id}.")
            }
            AnalysisError::InvalidPreferenceValue { .. } | AnalysisError::InvalidRequest(_) => {
                self.to_string()
            }
            // Internal details stay in the logs.
            _ => "An internal error occurred.".into(),
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        AnalysisError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        AnalysisError::Parse(e.to_string())
    }
}

impl From<sqlx::Error> for AnalysisError {
    fn from(e: sqlx::Error) -> Self {
        AnalysisError::Database(e.to_string())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

// ── Error envelope ──

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub timestamp: String,
    #[serde(rename = "trackingId")]
    pub tracking_id: String,
    pub status_code: u16,
    #[schema(example = "UNPROCESSABLE_ENTITY")]
    pub status: String,
    #[schema(value_type = String, example = "FutureReferenceDateError")]
    pub code: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn from_error(err: &AnalysisError) -> Self {
        let status = err.status_code();
        Self {
            timestamp: chrono::Local::now().naive_local().to_string(),
            tracking_id: uuid::Uuid::new_v4().to_string(),
            status_code: status.as_u16(),
            status: status_label(status),
            code: err.code(),
            message: err.public_message(),
        }
    }
}

/// `Unprocessable Entity` -> `UNPROCESSABLE_ENTITY`
fn status_label(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("UNKNOWN")
        .to_ascii_uppercase()
        .replace([' ', '-'], "_")
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from_error(&self);
        if body.status_code >= 500 {
            tracing::error!(code = body.code, tracking_id = %body.tracking_id, error = %self, "request failed");
        } else {
            tracing::warn!(code = body.code, tracking_id = %body.tracking_id, error = %self, "request rejected");
        }
        (self.status_code(), Json(body)).into_response()
    }
}
