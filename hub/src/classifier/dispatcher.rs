//! Mode-driven composition of the three tiers, with the deep tier's
//! sliding-window rate limit and the local/offline fallback chain.

use super::{Classifier, ClassificationResult};
use crate::config::AiMode;
use crate::error::ClassifierError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct DispatchResult {
    pub result: ClassificationResult,
    /// Set only when a networked tier was tried and failed, and the result
    /// came from the local heuristic purely as a fallback — the caller
    /// should enqueue for later re-classification. Never set for a
    /// deliberate `AiMode::Local` deployment, which never touches the
    /// network in the first place.
    pub offline: bool,
}

pub struct Dispatcher {
    local: Arc<dyn Classifier>,
    fast: Arc<dyn Classifier>,
    deep: Arc<dyn Classifier>,
    deep_calls: Mutex<VecDeque<Instant>>,
    deep_rate_limit: u32,
    deep_rate_window: Duration,
}

impl Dispatcher {
    pub fn new(
        local: Arc<dyn Classifier>,
        fast: Arc<dyn Classifier>,
        deep: Arc<dyn Classifier>,
        deep_rate_limit: u32,
        deep_rate_window: Duration,
    ) -> Self {
        Self {
            local,
            fast,
            deep,
            deep_calls: Mutex::new(VecDeque::new()),
            deep_rate_limit,
            deep_rate_window,
        }
    }

    pub async fn dispatch(&self, image_bytes: &[u8], mode: &AiMode, now: Instant) -> DispatchResult {
        match mode {
            AiMode::Local => self.via_local(image_bytes, false).await,
            AiMode::Fast => self.via_fast_then_local(image_bytes).await,
            AiMode::Deep => self.via_deep_then_fallback(image_bytes, now).await,
            AiMode::Auto => self.via_auto(image_bytes, now).await,
        }
    }

    async fn via_auto(&self, image_bytes: &[u8], now: Instant) -> DispatchResult {
        match self.fast.classify(image_bytes).await {
            Ok(fast_result) => {
                let weak = fast_result.label == super::Label::Unknown || fast_result.confidence < 60;
                if !weak {
                    return DispatchResult { result: fast_result, offline: false };
                }
                match self.try_deep(image_bytes, now).await {
                    Ok(deep_result) => {
                        let merged_reasoning = match (&fast_result.reasoning, &deep_result.reasoning) {
                            (Some(f), Some(d)) => Some(format!("fast: {f} | deep: {d}")),
                            (None, Some(d)) => Some(d.clone()),
                            (Some(f), None) => Some(f.clone()),
                            (None, None) => None,
                        };
                        DispatchResult {
                            result: ClassificationResult { reasoning: merged_reasoning, ..deep_result },
                            offline: false,
                        }
                    }
                    Err(_) => DispatchResult { result: fast_result, offline: false },
                }
            }
            Err(_) => match self.try_deep(image_bytes, now).await {
                Ok(result) => DispatchResult { result, offline: false },
                Err(_) => self.via_local(image_bytes, true).await,
            },
        }
    }

    async fn via_fast_then_local(&self, image_bytes: &[u8]) -> DispatchResult {
        match self.fast.classify(image_bytes).await {
            Ok(result) => DispatchResult { result, offline: false },
            Err(_) => self.via_local(image_bytes, true).await,
        }
    }

    async fn via_deep_then_fallback(&self, image_bytes: &[u8], now: Instant) -> DispatchResult {
        match self.try_deep(image_bytes, now).await {
            Ok(result) => DispatchResult { result, offline: false },
            Err(_) => self.via_fast_then_local(image_bytes).await,
        }
    }

    /// `is_fallback` distinguishes a deliberate `AiMode::Local` deployment
    /// (never offline — there is no networked tier to have failed) from a
    /// local classification used only because every networked tier failed.
    async fn via_local(&self, image_bytes: &[u8], is_fallback: bool) -> DispatchResult {
        match self.local.classify(image_bytes).await {
            Ok(result) => DispatchResult { result, offline: is_fallback },
            Err(_) => DispatchResult {
                result: ClassificationResult {
                    label: super::Label::Unknown,
                    confidence: 0,
                    threat_level: super::ThreatLevel::Low,
                    reasoning: Some("all classifier tiers failed".into()),
                    features: vec![],
                    tier: "none",
                },
                offline: is_fallback,
            },
        }
    }

    async fn try_deep(&self, image_bytes: &[u8], now: Instant) -> Result<ClassificationResult, ClassifierError> {
        {
            let mut calls = self.deep_calls.lock().await;
            while let Some(oldest) = calls.front() {
                if now.duration_since(*oldest) > self.deep_rate_window {
                    calls.pop_front();
                } else {
                    break;
                }
            }
            if calls.len() as u32 >= self.deep_rate_limit {
                return Err(ClassifierError::RateLimited);
            }
            calls.push_back(now);
        }
        self.deep.classify(image_bytes).await
    }

    pub async fn deep_quota_remaining(&self, now: Instant) -> u32 {
        let mut calls = self.deep_calls.lock().await;
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) > self.deep_rate_window {
                calls.pop_front();
            } else {
                break;
            }
        }
        self.deep_rate_limit.saturating_sub(calls.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Label, ThreatLevel};
    use async_trait::async_trait;

    struct StubClassifier {
        tier: &'static str,
        outcome: Result<(Label, u8), ClassifierError>,
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        fn tier_name(&self) -> &'static str {
            self.tier
        }
        async fn classify(&self, _image_bytes: &[u8]) -> Result<ClassificationResult, ClassifierError> {
            match &self.outcome {
                Ok((label, confidence)) => Ok(ClassificationResult {
                    label: *label,
                    confidence: *confidence,
                    threat_level: ThreatLevel::None,
                    reasoning: Some(format!("{} says so", self.tier)),
                    features: vec![],
                    tier: self.tier,
                }),
                Err(e) => Err(e.clone()),
            }
        }
    }

    #[tokio::test]
    async fn auto_mode_does_not_escalate_on_confident_fast_result() {
        let dispatcher = Dispatcher::new(
            Arc::new(StubClassifier { tier: "local", outcome: Ok((Label::Natural, 50)) }),
            Arc::new(StubClassifier { tier: "fast_cloud", outcome: Ok((Label::Chainsaw, 90)) }),
            Arc::new(StubClassifier { tier: "deep_cloud", outcome: Ok((Label::Chainsaw, 95)) }),
            5,
            Duration::from_secs(900),
        );
        let result = dispatcher.dispatch(&[], &AiMode::Auto, Instant::now()).await;
        assert_eq!(result.result.tier, "fast_cloud");
    }

    #[tokio::test]
    async fn auto_mode_escalates_on_weak_fast_result() {
        let dispatcher = Dispatcher::new(
            Arc::new(StubClassifier { tier: "local", outcome: Ok((Label::Natural, 50)) }),
            Arc::new(StubClassifier { tier: "fast_cloud", outcome: Ok((Label::Unknown, 30)) }),
            Arc::new(StubClassifier { tier: "deep_cloud", outcome: Ok((Label::Chainsaw, 95)) }),
            5,
            Duration::from_secs(900),
        );
        let result = dispatcher.dispatch(&[], &AiMode::Auto, Instant::now()).await;
        assert_eq!(result.result.tier, "deep_cloud");
    }

    #[tokio::test]
    async fn deep_rate_limit_falls_through_to_fast() {
        let dispatcher = Dispatcher::new(
            Arc::new(StubClassifier { tier: "local", outcome: Ok((Label::Natural, 50)) }),
            Arc::new(StubClassifier { tier: "fast_cloud", outcome: Ok((Label::Vehicle, 80)) }),
            Arc::new(StubClassifier { tier: "deep_cloud", outcome: Ok((Label::Chainsaw, 95)) }),
            1,
            Duration::from_secs(900),
        );
        let now = Instant::now();
        let first = dispatcher.dispatch(&[], &AiMode::Deep, now).await;
        assert_eq!(first.result.tier, "deep_cloud");
        let second = dispatcher.dispatch(&[], &AiMode::Deep, now).await;
        assert_eq!(second.result.tier, "fast_cloud");
    }

    #[tokio::test]
    async fn local_mode_never_marks_offline() {
        let dispatcher = Dispatcher::new(
            Arc::new(StubClassifier { tier: "local", outcome: Ok((Label::Natural, 50)) }),
            Arc::new(StubClassifier { tier: "fast_cloud", outcome: Ok((Label::Chainsaw, 90)) }),
            Arc::new(StubClassifier { tier: "deep_cloud", outcome: Ok((Label::Chainsaw, 95)) }),
            5,
            Duration::from_secs(900),
        );
        let result = dispatcher.dispatch(&[], &AiMode::Local, Instant::now()).await;
        assert_eq!(result.result.tier, "local");
        assert!(!result.offline, "a deliberate local-only deployment must not be treated as a sync-queue candidate");
    }

    #[tokio::test]
    async fn all_tiers_unreachable_falls_back_to_local_and_marks_offline() {
        let dispatcher = Dispatcher::new(
            Arc::new(StubClassifier { tier: "local", outcome: Ok((Label::Unknown, 40)) }),
            Arc::new(StubClassifier { tier: "fast_cloud", outcome: Err(ClassifierError::Unreachable) }),
            Arc::new(StubClassifier { tier: "deep_cloud", outcome: Err(ClassifierError::Unreachable) }),
            5,
            Duration::from_secs(900),
        );
        let result = dispatcher.dispatch(&[], &AiMode::Auto, Instant::now()).await;
        assert_eq!(result.result.tier, "local");
        assert!(result.offline);
    }
}
