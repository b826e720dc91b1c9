pub mod routes;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::database::Database;
use crate::ingest::IngestionService;

pub struct AppState {
    pub db: Arc<Database>,
    pub ingestion: Arc<IngestionService>,
    pub api_token: String,
}

pub type SharedState = Arc<AppState>;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/start-task", get(routes::start_task))
        .route("/coins/price-logs", get(routes::get_all_price_logs))
        .route("/coin/:coin_id/price-logs", get(routes::get_coin_price_logs))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(state: SharedState, host: &str, port: u16) -> anyhow::Result<()> {
    let ingestion = state.ingestion.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

    tracing::info!("Server running on http://{}:{}", host, port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ingestion.stop().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
