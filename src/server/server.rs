use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::export_routes::make_export_routes;
use super::metrics::{metrics_handler, set_queue_depth};
use super::provider_routes::make_provider_routes;
use super::state::ServerState;
use super::log_requests;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
    pub queues: BTreeMap<String, usize>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let mut queues = BTreeMap::new();
    for queue in &state.queues {
        let category = queue.category();
        match queue.depth() {
            Ok(depth) => {
                set_queue_depth(category.as_str(), depth);
                queues.insert(category.to_string(), depth);
            }
            Err(e) => warn!("Failed to read {} queue depth: {:#}", category, e),
        }
    }

    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
        queues,
    };
    Json(stats)
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/export", make_export_routes(state.clone()))
        .merge(make_provider_routes(state.clone()))
        .layer(middleware::from_fn_with_state(state, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .fallback(|| async { StatusCode::NOT_FOUND })
}

/// Serve the API and the metrics endpoint until `shutdown` is cancelled or
/// either listener fails.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    let api_shutdown = shutdown.clone();
    let api = axum::serve(listener, app)
        .with_graceful_shutdown(async move { api_shutdown.cancelled().await });
    let metrics = axum::serve(metrics_listener, make_metrics_app())
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    tokio::try_join!(
        async { api.await.context("HTTP server failed") },
        async { metrics.await.context("Metrics server failed") },
    )?;
    Ok(())
}
