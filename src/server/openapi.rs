use super::routes;
use crate::db::{AiResultRow, AiSummaryRow, MonteCarloRow};
use crate::errors::ErrorBody;
use crate::ratio::{BatchRatioEntry, PriceRatioReport};
use crate::state::CountersSnapshot;
use utoipa::OpenApi;

/// OpenAPI document served at `/v3/api-docs`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "analysis-service",
        description = "Price ratios against the reference date, Monte Carlo and AI results, and investment-propensity filtering for structured products."
    ),
    tags(
        (name = "product", description = "Live price ratios"),
        (name = "monte-carlo", description = "Simulation results"),
        (name = "ai", description = "AI repayment predictions"),
        (name = "investment-propensity", description = "Preference filtering"),
        (name = "health", description = "Liveness and counters")
    ),
    paths(
        routes::health_check,
        routes::get_counters,
        routes::get_price_ratio,
        routes::post_price_ratio_list,
        routes::get_monte_carlo,
        routes::get_ai,
        routes::post_ai_list,
        routes::post_investment_propensity_list,
    ),
    components(schemas(
        routes::ProductIdListRequest,
        routes::PropensityRequest,
        PriceRatioReport,
        BatchRatioEntry,
        MonteCarloRow,
        AiResultRow,
        AiSummaryRow,
        CountersSnapshot,
        ErrorBody,
    ))
)]
pub struct ApiDoc;
