//! Classifier worker pool: drains completed spectrograms and writes
//! results back through the Store. Workers are independent of each other
//! and of the Reassembler; completion order need not match receive order.

use crate::classifier::dispatcher::Dispatcher;
use crate::classifier::ThreatLevel;
use crate::config::AiMode;
use crate::event_bus::{EventBus, HubEvent};
use crate::store::models::AlertRecord;
use crate::store::repositories::alert::AlertRepository;
use crate::store::repositories::spectrogram::SpectrogramRepository;
use crate::store::repositories::sync_queue::SyncQueueRepository;
use crate::store::Store;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct ClassifyJob {
    pub spectrogram_id: String,
    pub image_bytes: Vec<u8>,
}

/// Shared receiving end for a worker pool: each worker locks just long
/// enough to pull the next job, so jobs drain to whichever worker is free.
pub type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<ClassifyJob>>>;

pub async fn run(
    rx: SharedReceiver,
    dispatcher: Arc<Dispatcher>,
    store: Store,
    event_bus: EventBus,
    ai_mode: AiMode,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => return,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else { return };

        let outcome = dispatcher.dispatch(&job.image_bytes, &ai_mode, Instant::now()).await;

        if let Err(error) = SpectrogramRepository::update_classification(
            &store.pool,
            &job.spectrogram_id,
            outcome.result.label.as_str(),
            outcome.result.confidence,
            outcome.result.threat_level.as_str(),
            outcome.result.reasoning.as_deref(),
            &outcome.result.features,
            outcome.result.tier,
        )
        .await
        {
            tracing::warn!(error = %error, spectrogram_id = %job.spectrogram_id, "failed to persist classification");
            continue;
        }

        if outcome.offline {
            if let Err(error) = SyncQueueRepository::enqueue(&store.pool, &job.spectrogram_id).await {
                tracing::warn!(error = %error, "failed to enqueue offline spectrogram for re-classification");
            }
        }

        if let Ok(Some(record)) = SpectrogramRepository::get(&store.pool, &job.spectrogram_id).await {
            if matches!(outcome.result.threat_level, ThreatLevel::Critical | ThreatLevel::High) {
                let alert = AlertRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    node_id: record.node_id.clone(),
                    confidence: outcome.result.confidence,
                    lat: record.lat,
                    lon: record.lon,
                    timestamp: chrono::Utc::now(),
                    analysis_text: outcome.result.reasoning.clone(),
                    responded: false,
                    responded_by: None,
                    responded_at: None,
                    rssi: record.rssi,
                    spectrogram_id: Some(record.id.clone()),
                };
                if AlertRepository::insert(&store.pool, &alert).await.is_ok() {
                    event_bus.publish(HubEvent::NewAlert(alert));
                }
            }
            event_bus.publish(HubEvent::SpectrogramAnalyzed(record));
        }
    }
}
