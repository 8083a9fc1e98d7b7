pub mod openapi;
pub mod routes;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health_check", get(routes::health_check))
        .route("/v3/api-docs", get(routes::api_docs))
        .route("/v1/counters", get(routes::get_counters))
        .route("/v1/product/price/ratio/list", post(routes::post_price_ratio_list))
        .route("/v1/product/price/ratio/{product_id}", get(routes::get_price_ratio))
        .route("/v1/monte-carlo/{product_id}", get(routes::get_monte_carlo))
        .route("/v1/ai/list", post(routes::post_ai_list))
        .route("/v1/ai/{product_id}", get(routes::get_ai))
        .route(
            "/v1/investment-propensity/list",
            post(routes::post_investment_propensity_list),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
