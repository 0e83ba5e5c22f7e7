//! HTTP-backed cloud tiers. Both share the same request/response shape and
//! differ only in endpoint and which `AI_MODE` selects them; connectivity
//! failures and timeouts map to `Unreachable` so the dispatcher's fallback
//! chain can take over without inspecting `reqwest`'s error internals.

use super::{derive_threat_level, ClassificationResult, Label};
use crate::error::ClassifierError;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CloudResponse {
    label: Label,
    confidence: u8,
    reasoning: Option<String>,
    #[serde(default)]
    features: Vec<String>,
}

pub struct CloudClassifier {
    client: reqwest::Client,
    endpoint: String,
    tier: &'static str,
}

impl CloudClassifier {
    pub fn fast(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, "fast_cloud")
    }

    pub fn deep(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, "deep_cloud")
    }

    fn new(endpoint: impl Into<String>, tier: &'static str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { client, endpoint: endpoint.into(), tier }
    }
}

#[async_trait]
impl super::Classifier for CloudClassifier {
    fn tier_name(&self) -> &'static str {
        self.tier
    }

    async fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationResult, ClassifierError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "image_base64": encoded }))
            .send()
            .await
            .map_err(|_| ClassifierError::Unreachable)?;

        if !response.status().is_success() {
            return Err(ClassifierError::BadResponse);
        }

        let body: CloudResponse = response.json().await.map_err(|_| ClassifierError::BadResponse)?;
        let confidence = body.confidence.min(100);

        Ok(ClassificationResult {
            label: body.label,
            confidence,
            threat_level: derive_threat_level(body.label, confidence),
            reasoning: body.reasoning,
            features: body.features,
            tier: self.tier,
        })
    }
}
