//! Drains the Radio RX channel into the Reassembler, owning the session
//! table exclusively. Combines channel draining with a coarse timeout
//! tick via `select!`, the same interval-plus-command-channel shape used
//! elsewhere in this dependency stack for long-lived loops.

use crate::classify_worker::ClassifyJob;
use crate::event_bus::{EventBus, HubEvent};
use crate::radio_rx::RxFrame;
use crate::reassembler::{Reassembler, ReassemblyOutcome};
use crate::render;
use crate::store::models::{AlertRecord, SpectrogramRecord};
use crate::store::repositories::alert::AlertRepository;
use crate::store::repositories::node::NodeRepository;
use crate::store::repositories::spectrogram::SpectrogramRepository;
use crate::store::Store;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wire::{JsonMessage, JsonMessageType};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct ReassemblerTaskDeps {
    pub store: Store,
    pub event_bus: EventBus,
    pub spectrograms_dir: std::path::PathBuf,
    pub classify_tx: mpsc::Sender<ClassifyJob>,
}

pub async fn run(
    mut rx: mpsc::Receiver<RxFrame>,
    deps: ReassemblerTaskDeps,
    session_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut reassembler = Reassembler::new(session_timeout);
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                for outcome in reassembler.evict_timeouts(Instant::now()) {
                    handle_outcome(outcome, &deps).await;
                }
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { return };
                if let Some(outcome) = reassembler.on_frame(&frame.bytes, frame.rssi, Instant::now()) {
                    handle_outcome(outcome, &deps).await;
                }
            }
        }
    }
}

async fn handle_outcome(outcome: ReassemblyOutcome, deps: &ReassemblerTaskDeps) {
    match outcome {
        ReassemblyOutcome::Completed { node_id, grid, metadata, rssi_max, session_key, truncated } => {
            let id = uuid::Uuid::new_v4().to_string();
            let image_bytes = render::encode_grid_png_bytes(&grid);
            let _ = render::render_grid_png(&grid, &deps.spectrograms_dir, &id);

            if truncated {
                tracing::warn!(node_id = %node_id, session_id = session_key.1, "spectrogram payload truncated");
            }

            let record = SpectrogramRecord {
                id: id.clone(),
                node_id: node_id.clone(),
                image_bytes: image_bytes.clone(),
                lat: metadata.lat as f64,
                lon: metadata.lon as f64,
                anomaly_score: metadata.confidence as f32 / 100.0,
                received_at: chrono::Utc::now(),
                session_id: session_key.1,
                rssi: Some(rssi_max),
                classification: None,
                confidence: None,
                threat_level: None,
                reasoning: None,
                features: vec![],
                classifier_used: None,
                classified_at: None,
                truncated,
            };

            if let Err(error) = SpectrogramRepository::insert(&deps.store.pool, &record).await {
                tracing::warn!(error = %error, "failed to persist spectrogram");
                return;
            }
            upsert_and_publish_node(
                deps,
                &node_id,
                metadata.battery,
                metadata.lat as f64,
                metadata.lon as f64,
                "online",
                Some(rssi_max),
            )
            .await;

            deps.event_bus.publish(HubEvent::NewSpectrogram(record));

            if deps.classify_tx.send(ClassifyJob { spectrogram_id: id, image_bytes }).await.is_err() {
                tracing::warn!("classifier work queue closed, spectrogram will not be classified");
            }
        }
        ReassemblyOutcome::DecodeFailed { session_key, raw, error } => {
            tracing::warn!(node_hash = session_key.0, session_id = session_key.1, %error, "spectrogram decode failed");
            deps.event_bus.publish(HubEvent::DecodeFailed {
                node_hash: session_key.0,
                session_id: session_key.1,
                error: error.to_string(),
                raw,
            });
        }
        ReassemblyOutcome::JsonMessage { message, rssi } => handle_json_message(message, rssi, deps).await,
        ReassemblyOutcome::SessionAbandoned { session_key, received, expected } => {
            deps.event_bus.publish(HubEvent::SessionAbandoned {
                node_hash: session_key.0,
                session_id: session_key.1,
                received,
                expected,
            });
        }
    }
}

/// Upserts a node record and publishes `NewNode`/`NodeUpdate` to match,
/// logging rather than silently discarding a storage failure.
async fn upsert_and_publish_node(
    deps: &ReassemblerTaskDeps,
    node_id: &str,
    battery_percent: u8,
    lat: f64,
    lon: f64,
    status: &str,
    rssi: Option<i32>,
) {
    let existed = matches!(NodeRepository::get(&deps.store.pool, node_id).await, Ok(Some(_)));

    if let Err(error) = NodeRepository::upsert(&deps.store.pool, node_id, battery_percent, lat, lon, status, rssi).await
    {
        tracing::warn!(error = %error, node_id, "failed to upsert node record");
        return;
    }

    match NodeRepository::get(&deps.store.pool, node_id).await {
        Ok(Some(record)) => {
            let event = if existed { HubEvent::NodeUpdate(record) } else { HubEvent::NewNode(record) };
            deps.event_bus.publish(event);
        }
        Ok(None) => {}
        Err(error) => tracing::warn!(error = %error, node_id, "failed to reload node record after upsert"),
    }
}

async fn handle_json_message(message: JsonMessage, rssi: i32, deps: &ReassemblerTaskDeps) {
    let lat = message.lat.unwrap_or(0.0);
    let lon = message.lon.unwrap_or(0.0);
    let battery = message.battery.unwrap_or(100);

    let status = match message.message_type {
        JsonMessageType::Boot => "online",
        JsonMessageType::Heartbeat => "online",
        JsonMessageType::Alert => "online",
        JsonMessageType::LowBattery => "low_battery",
    };

    upsert_and_publish_node(deps, &message.node_id, battery, lat, lon, status, Some(rssi)).await;

    if message.message_type == JsonMessageType::Alert {
        let alert = AlertRecord {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: message.node_id.clone(),
            confidence: message.confidence.unwrap_or(0),
            lat,
            lon,
            timestamp: chrono::Utc::now(),
            analysis_text: Some("node-reported alert (no spectrogram attached)".to_string()),
            responded: false,
            responded_by: None,
            responded_at: None,
            rssi: Some(rssi),
            spectrogram_id: None,
        };
        if AlertRepository::insert(&deps.store.pool, &alert).await.is_ok() {
            deps.event_bus.publish(HubEvent::NewAlert(alert));
        }
    }
}
