//! Tiered classification: a capability interface with three concrete
//! tiers (`Local`, `FastCloud`, `DeepCloud`) composed by the dispatcher
//! per the mode and fallback rules.

pub mod cloud;
pub mod dispatcher;
pub mod local;

use crate::error::ClassifierError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Chainsaw,
    Vehicle,
    Natural,
    Unknown,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Chainsaw => "chainsaw",
            Label::Vehicle => "vehicle",
            Label::Natural => "natural",
            Label::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    Critical,
    High,
    Medium,
    Low,
    None,
}

impl ThreatLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreatLevel::Critical => "CRITICAL",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::Low => "LOW",
            ThreatLevel::None => "NONE",
        }
    }
}

/// The one threat-mapping table every tier's output passes through.
pub fn derive_threat_level(label: Label, confidence: u8) -> ThreatLevel {
    match label {
        Label::Chainsaw if confidence >= 85 => ThreatLevel::Critical,
        Label::Chainsaw if confidence >= 60 => ThreatLevel::High,
        Label::Vehicle if confidence >= 70 => ThreatLevel::Medium,
        Label::Vehicle => ThreatLevel::Low,
        Label::Natural => ThreatLevel::None,
        Label::Unknown => ThreatLevel::Low,
        Label::Chainsaw => ThreatLevel::Low,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: Label,
    pub confidence: u8,
    pub threat_level: ThreatLevel,
    pub reasoning: Option<String>,
    pub features: Vec<String>,
    pub tier: &'static str,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    fn tier_name(&self) -> &'static str;
    async fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationResult, ClassifierError>;
}
