mod catalog;
mod config;
mod db;
mod errors;
mod feeds;
mod ratio;
mod risk;
mod server;
mod state;

use crate::catalog::client::HttpProductCatalog;
use crate::feeds::yahoo::YahooChartClient;
use crate::state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        application = %cfg.application_name,
        bands = ?cfg.risk_bands,
        repayment = ?cfg.repayment_boundaries,
        "analysis service starting"
    );

    // Init result store
    let db = match db::DbPool::open(&cfg.database_url, cfg.database_pool_size).await {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("database init error: {e}");
            std::process::exit(1);
        }
    };

    // External collaborators
    let catalog = Arc::new(HttpProductCatalog::new(
        &cfg.product_service_url,
        cfg.external_call_timeout,
    ));
    let market = Arc::new(YahooChartClient::new(
        &cfg.market_data_base_url,
        cfg.external_call_timeout,
    ));

    let port = cfg.server_port;
    let app_state = AppState::new(cfg, db, catalog, market);
    let app = server::router(app_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown signal received");
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!("server error: {e}");
    }
}
