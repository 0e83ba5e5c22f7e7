use super::AppState;
use crate::config::AiMode;
use crate::error::{HttpError, StoreError};
use crate::event_bus::HubEvent;
use crate::store::models::AlertRecord;
use crate::store::repositories::alert::AlertRepository;
use crate::store::repositories::node::NodeRepository;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

pub async fn status() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "time": chrono::Utc::now() }))
}

pub async fn list_nodes(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let nodes = NodeRepository::list(&state.store.pool).await.map_err(StoreError::from)?;
    Ok(Json(nodes))
}

pub async fn list_alerts(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let alerts = AlertRepository::list_recent(&state.store.pool, 100).await.map_err(StoreError::from)?;
    Ok(Json(alerts))
}

#[derive(Deserialize)]
pub struct RespondBody {
    responded_by: String,
}

pub async fn respond_to_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RespondBody>,
) -> Result<impl IntoResponse, HttpError> {
    let rows = AlertRepository::mark_responded(&state.store.pool, &id, &body.responded_by)
        .await
        .map_err(StoreError::from)?;
    if rows == 0 {
        return Err(HttpError::Store(StoreError::NotFound));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn ai_status(State(state): State<AppState>) -> impl IntoResponse {
    let now = Instant::now();
    let quota_remaining = state.dispatcher.deep_quota_remaining(now).await;
    let mode = match state.config.ai_mode {
        AiMode::Deep => "deep",
        AiMode::Fast => "fast",
        AiMode::Local => "local",
        AiMode::Auto => "auto",
    };
    Json(serde_json::json!({
        "mode": mode,
        "services": ["local", "fast_cloud", "deep_cloud"],
        "quota_remaining": quota_remaining,
        "quota_reset_at": chrono::Utc::now() + chrono::Duration::from_std(state.config.deep_rate_window).unwrap_or_default(),
    }))
}

#[derive(Deserialize)]
pub struct SimulateAlertBody {
    node_id: String,
    confidence: u8,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

pub async fn simulate_alert(
    State(state): State<AppState>,
    Json(body): Json<SimulateAlertBody>,
) -> Result<impl IntoResponse, HttpError> {
    let alert = AlertRecord {
        id: uuid::Uuid::new_v4().to_string(),
        node_id: body.node_id,
        confidence: body.confidence,
        lat: body.lat,
        lon: body.lon,
        timestamp: chrono::Utc::now(),
        analysis_text: Some("simulated alert".into()),
        responded: false,
        responded_by: None,
        responded_at: None,
        rssi: None,
        spectrogram_id: None,
    };
    AlertRepository::insert(&state.store.pool, &alert).await.map_err(StoreError::from)?;
    state.event_bus.publish(HubEvent::NewAlert(alert));
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct SimulateHeartbeatBody {
    node_id: String,
    #[serde(default = "default_battery")]
    battery: u8,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

fn default_battery() -> u8 {
    100
}

pub async fn simulate_heartbeat(
    State(state): State<AppState>,
    Json(body): Json<SimulateHeartbeatBody>,
) -> Result<impl IntoResponse, HttpError> {
    NodeRepository::upsert(&state.store.pool, &body.node_id, body.battery, body.lat, body.lon, "online", None)
        .await
        .map_err(StoreError::from)?;
    let node = NodeRepository::get(&state.store.pool, &body.node_id).await.map_err(StoreError::from)?;
    if let Some(node) = node {
        state.event_bus.publish(HubEvent::NodeUpdate(node));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn live_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.event_bus.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => Event::default().json_data(&event).ok().map(Ok),
        Err(_lagged) => Event::default().json_data(&HubEvent::SubscriberLag { skipped: 1 }).ok().map(Ok),
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
