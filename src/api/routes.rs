//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent;
use crate::config::Config;

use super::auth;
use super::types::{ErrorResponse, ProcessRequest, ProcessResponse};

/// Shared application state.
pub struct AppState {
    pub config: Config,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState { config });

    let protected = Router::new()
        .route("/api/process", post(process_batch))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer,
        ));

    let app = Router::new()
        .route("/api/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Validate the envelope and fan each ticker out to its own task.
async fn process_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.tickers.is_empty() {
        return Err(bad_request("no tickers provided".to_string()));
    }

    // Every entry must validate before anything is spawned; a malformed
    // payload is refused whole.
    let mut jobs = Vec::with_capacity(request.tickers.len());
    for entry in request.tickers {
        let job = entry
            .into_job(request.callback_url.clone())
            .map_err(bad_request)?;
        jobs.push(job);
    }

    let config = Arc::new(state.config.clone());
    let tickers: Vec<String> = jobs.iter().map(|j| j.ticker.clone()).collect();
    tracing::info!(count = jobs.len(), "spawning ticker runs");

    for job in jobs {
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            agent::process_ticker(config, job).await;
        });
    }

    Ok(Json(ProcessResponse {
        success: true,
        message: format!("Spawned processing for {} tickers", tickers.len()),
        tickers,
    }))
}

fn bad_request(error: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}
