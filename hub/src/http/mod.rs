//! External HTTP surface: liveness, node/alert listings, the simulate
//! endpoints used by demos and the test harness, and the live event
//! stream. The core does not define a UI; this is the interface a
//! UI would be built against.

mod handlers;

use crate::classifier::dispatcher::Dispatcher;
use crate::config::Config;
use crate::event_bus::EventBus;
use crate::store::Store;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub event_bus: EventBus,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/nodes", get(handlers::list_nodes))
        .route("/api/alerts", get(handlers::list_alerts))
        .route("/api/alerts/:id/respond", post(handlers::respond_to_alert))
        .route("/api/ai/status", get(handlers::ai_status))
        .route("/api/simulate/alert", post(handlers::simulate_alert))
        .route("/api/simulate/heartbeat", post(handlers::simulate_heartbeat))
        .route("/api/events", get(handlers::live_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(state: AppState, bind: &str, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind, "hub HTTP surface listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
