use crate::db::{AiResultRow, AiSummaryRow, MonteCarloRow};
use crate::errors::{AnalysisError, AnalysisResult, ErrorBody, ResultKind};
use crate::ratio::{BatchRatioEntry, PriceRatioReport};
use crate::risk::{RepaymentOption, RiskPropensity};
use crate::state::{AppState, CountersSnapshot, PerfCounters};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Json;
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductIdListRequest {
    pub product_id_list: Vec<i64>,
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropensityRequest {
    pub product_id_list: Vec<i64>,
    /// EXTREME_RISK | HIGH_RISK | MEDIUM_RISK | LOW_RISK
    #[serde(default = "default_risk_propensity")]
    #[schema(example = "LOW_RISK")]
    pub risk_propensity: String,
    /// EARLY_REPAYMENT | MATURITY_REPAYMENT | NO_PREFERENCE
    #[serde(default = "default_repayment_option")]
    #[schema(example = "NO_PREFERENCE")]
    pub repayment_option: String,
}

fn default_risk_propensity() -> String {
    RiskPropensity::Extreme.as_str().to_string()
}

fn default_repayment_option() -> String {
    RepaymentOption::Early.as_str().to_string()
}

fn product_id(path: Result<Path<i64>, PathRejection>) -> AnalysisResult<i64> {
    let Path(id) = path.map_err(|e| AnalysisError::InvalidRequest(e.body_text()))?;
    positive(id)
}

fn positive(id: i64) -> AnalysisResult<i64> {
    if id <= 0 {
        return Err(AnalysisError::InvalidRequest(format!("productId must be positive: {id}")));
    }
    Ok(id)
}

fn body<T>(json: Result<Json<T>, JsonRejection>) -> AnalysisResult<T> {
    json.map(|Json(v)| v)
        .map_err(|e| AnalysisError::InvalidRequest(e.body_text()))
}

fn count_catalog_failure<T>(state: &AppState, result: &AnalysisResult<T>) {
    if let Err(AnalysisError::CatalogUnavailable { .. }) = result {
        PerfCounters::bump(&state.counters.catalog_failures, 1);
    }
}

/// GET /health_check
#[utoipa::path(get, path = "/health_check", tag = "health", responses((status = 200, description = "Service is up")))]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": format!("It's Working in {}", state.config.application_name)
    }))
}

/// GET /v1/counters -- request counters (lock-free reads)
#[utoipa::path(get, path = "/v1/counters", tag = "health", responses((status = 200, body = CountersSnapshot)))]
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<CountersSnapshot> {
    Json(state.counters.snapshot())
}

/// GET /v1/product/price/ratio/{productId}
#[utoipa::path(
    get,
    path = "/v1/product/price/ratio/{product_id}",
    tag = "product",
    params(("product_id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, body = PriceRatioReport),
        (status = 404, description = "Unknown to the product service", body = ErrorBody),
        (status = 422, description = "Future reference date or no usable close", body = ErrorBody),
        (status = 500, description = "Product service unavailable", body = ErrorBody)
    )
)]
pub async fn get_price_ratio(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> AnalysisResult<Json<PriceRatioReport>> {
    let id = product_id(path)?;
    PerfCounters::bump(&state.counters.ratio_requests, 1);

    let result = state.ratios.price_ratio(id).await;
    count_catalog_failure(&state, &result);
    Ok(Json(result?))
}

/// POST /v1/product/price/ratio/list
#[utoipa::path(
    post,
    path = "/v1/product/price/ratio/list",
    tag = "product",
    request_body = ProductIdListRequest,
    responses(
        (status = 200, description = "One entry per input id, in input order", body = [BatchRatioEntry]),
        (status = 400, body = ErrorBody),
        (status = 500, description = "Product service unavailable", body = ErrorBody)
    )
)]
pub async fn post_price_ratio_list(
    State(state): State<Arc<AppState>>,
    json: Result<Json<ProductIdListRequest>, JsonRejection>,
) -> AnalysisResult<Json<Vec<BatchRatioEntry>>> {
    let request = body(json)?;
    for &id in &request.product_id_list {
        positive(id)?;
    }
    PerfCounters::bump(&state.counters.batch_requests, 1);

    let result = state.ratios.batch_price_ratios(&request.product_id_list).await;
    count_catalog_failure(&state, &result);
    let entries = result?;

    let nulls = entries.iter().filter(|e| e.recent_and_initial_price_ratio.is_none()).count();
    PerfCounters::bump(&state.counters.batch_null_entries, nulls as u64);
    Ok(Json(entries))
}

/// GET /v1/monte-carlo/{productId}
#[utoipa::path(
    get,
    path = "/v1/monte-carlo/{product_id}",
    tag = "monte-carlo",
    params(("product_id" = i64, Path, description = "Product id")),
    responses((status = 200, body = MonteCarloRow), (status = 404, body = ErrorBody))
)]
pub async fn get_monte_carlo(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> AnalysisResult<Json<MonteCarloRow>> {
    let id = product_id(path)?;
    PerfCounters::bump(&state.counters.result_lookups, 1);

    state
        .db
        .monte_carlo_by_product(id)
        .await?
        .map(Json)
        .ok_or(AnalysisError::ResultNotFound { kind: ResultKind::MonteCarlo, product_id: id })
}

/// GET /v1/ai/{productId}
#[utoipa::path(
    get,
    path = "/v1/ai/{product_id}",
    tag = "ai",
    params(("product_id" = i64, Path, description = "Product id")),
    responses((status = 200, body = AiResultRow), (status = 404, body = ErrorBody))
)]
pub async fn get_ai(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> AnalysisResult<Json<AiResultRow>> {
    let id = product_id(path)?;
    PerfCounters::bump(&state.counters.result_lookups, 1);

    state
        .db
        .ai_result_by_product(id)
        .await?
        .map(Json)
        .ok_or(AnalysisError::ResultNotFound { kind: ResultKind::Ai, product_id: id })
}

/// POST /v1/ai/list -- ids without a row are left out
#[utoipa::path(
    post,
    path = "/v1/ai/list",
    tag = "ai",
    request_body = ProductIdListRequest,
    responses((status = 200, body = [AiSummaryRow]), (status = 400, body = ErrorBody))
)]
pub async fn post_ai_list(
    State(state): State<Arc<AppState>>,
    json: Result<Json<ProductIdListRequest>, JsonRejection>,
) -> AnalysisResult<Json<Vec<AiSummaryRow>>> {
    let request = body(json)?;
    PerfCounters::bump(&state.counters.result_lookups, 1);
    Ok(Json(state.db.ai_summaries(request.product_id_list).await?))
}

/// POST /v1/investment-propensity/list
#[utoipa::path(
    post,
    path = "/v1/investment-propensity/list",
    tag = "investment-propensity",
    request_body = PropensityRequest,
    responses((status = 200, body = [i64]), (status = 400, body = ErrorBody))
)]
pub async fn post_investment_propensity_list(
    State(state): State<Arc<AppState>>,
    json: Result<Json<PropensityRequest>, JsonRejection>,
) -> AnalysisResult<Json<Vec<i64>>> {
    let request = body(json)?;
    let risk: RiskPropensity = request.risk_propensity.parse()?;
    let repayment: RepaymentOption = request.repayment_option.parse()?;
    PerfCounters::bump(&state.counters.propensity_requests, 1);

    let ids = state
        .propensity
        .filter(&state.db, &request.product_id_list, risk, repayment)
        .await?;
    Ok(Json(ids))
}

/// GET /v3/api-docs
pub async fn api_docs() -> Json<utoipa::openapi::OpenApi> {
    Json(super::openapi::ApiDoc::openapi())
}
