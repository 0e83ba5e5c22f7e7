//! Drains the offline sync queue whenever connectivity returns. A single
//! task; re-classification is always FIFO by `rank` so older evidence is
//! never starved behind newer.

use crate::classifier::dispatcher::Dispatcher;
use crate::classifier::ThreatLevel;
use crate::config::AiMode;
use crate::event_bus::{EventBus, HubEvent};
use crate::store::models::AlertRecord;
use crate::store::repositories::alert::AlertRepository;
use crate::store::repositories::spectrogram::SpectrogramRepository;
use crate::store::repositories::sync_queue::SyncQueueRepository;
use crate::store::Store;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(store: Store, event_bus: EventBus, dispatcher: std::sync::Arc<Dispatcher>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => drain_once(&store, &event_bus, &dispatcher).await,
        }
    }
}

async fn drain_once(store: &Store, event_bus: &EventBus, dispatcher: &Dispatcher) {
    let pending = match SyncQueueRepository::list_pending(&store.pool).await {
        Ok(entries) if !entries.is_empty() => entries,
        Ok(_) => return,
        Err(error) => {
            tracing::warn!(%error, "failed to read sync queue");
            return;
        }
    };

    let (mut synced, mut failed) = (0u32, 0u32);

    for entry in pending {
        let Ok(Some(record)) = SpectrogramRepository::get(&store.pool, &entry.spectrogram_id).await else {
            let _ = SyncQueueRepository::remove(&store.pool, entry.rank).await;
            continue;
        };

        let outcome = dispatcher.dispatch(&record.image_bytes, &AiMode::Fast, Instant::now()).await;
        if outcome.offline {
            failed += 1;
            let _ = SyncQueueRepository::bump_attempts(&store.pool, entry.rank).await;
            continue;
        }

        let update = SpectrogramRepository::update_classification(
            &store.pool,
            &record.id,
            outcome.result.label.as_str(),
            outcome.result.confidence,
            outcome.result.threat_level.as_str(),
            outcome.result.reasoning.as_deref(),
            &outcome.result.features,
            outcome.result.tier,
        )
        .await;

        if update.is_err() {
            failed += 1;
            let _ = SyncQueueRepository::bump_attempts(&store.pool, entry.rank).await;
            continue;
        }

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

        let _ = SyncQueueRepository::remove(&store.pool, entry.rank).await;
        synced += 1;
    }

    event_bus.publish(HubEvent::SyncCompleted { synced, failed });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationResult, Classifier, Label, ThreatLevel};
    use crate::error::ClassifierError;
    use crate::store::models::SpectrogramRecord;
    use crate::store::repositories::spectrogram::SpectrogramRepository;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubFastClassifier;

    #[async_trait]
    impl Classifier for StubFastClassifier {
        fn tier_name(&self) -> &'static str {
            "fast_cloud"
        }

        async fn classify(&self, _image_bytes: &[u8]) -> Result<ClassificationResult, ClassifierError> {
            Ok(ClassificationResult {
                label: Label::Natural,
                confidence: 70,
                threat_level: ThreatLevel::None,
                reasoning: Some("stub".into()),
                features: vec![],
                tier: "fast_cloud",
            })
        }
    }

    fn sample_record(id: &str) -> SpectrogramRecord {
        SpectrogramRecord {
            id: id.to_string(),
            node_id: "GUARDIAN_001".into(),
            image_bytes: vec![],
            lat: 27.7172,
            lon: 85.3240,
            anomaly_score: 0.5,
            received_at: chrono::Utc::now(),
            session_id: 1,
            rssi: Some(-60),
            classification: None,
            confidence: None,
            threat_level: None,
            reasoning: None,
            features: vec![],
            classifier_used: None,
            classified_at: None,
            truncated: false,
        }
    }

    /// Reproduces the offline-sync scenario: three spectrograms queued while
    /// the hub was offline, all three re-classify cleanly once connectivity
    /// returns, and `sync_completed{synced: 3, failed: 0}` is reported.
    #[tokio::test]
    async fn drain_once_reclassifies_fifo_and_reports_synced_count() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("hub.db");
        let store = Store::connect(db_path.to_str().unwrap()).await.unwrap();
        let event_bus = EventBus::new();
        let dispatcher = Dispatcher::new(
            Arc::new(StubFastClassifier),
            Arc::new(StubFastClassifier),
            Arc::new(StubFastClassifier),
            5,
            Duration::from_secs(900),
        );

        for i in 0..3 {
            let id = format!("spec-{i}");
            SpectrogramRepository::insert(&store.pool, &sample_record(&id)).await.unwrap();
            SyncQueueRepository::enqueue(&store.pool, &id).await.unwrap();
        }

        let mut events = event_bus.subscribe();
        drain_once(&store, &event_bus, &dispatcher).await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, HubEvent::SyncCompleted { synced: 3, failed: 0 }));
        assert!(SyncQueueRepository::list_pending(&store.pool).await.unwrap().is_empty());
    }
}
