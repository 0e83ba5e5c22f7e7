//! Record types for the three entities the Store persists, plus the
//! offline sync queue entry. These are the shapes handed to the Event
//! Bus and serialized straight to HTTP responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub node_id: String,
    pub last_seen: DateTime<Utc>,
    pub battery_percent: u8,
    pub lat: f64,
    pub lon: f64,
    pub status: String,
    pub last_rssi: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectrogramRecord {
    pub id: String,
    pub node_id: String,
    pub image_bytes: Vec<u8>,
    pub lat: f64,
    pub lon: f64,
    pub anomaly_score: f32,
    pub received_at: DateTime<Utc>,
    pub session_id: u16,
    pub rssi: Option<i32>,
    pub classification: Option<String>,
    pub confidence: Option<u8>,
    pub threat_level: Option<String>,
    pub reasoning: Option<String>,
    pub features: Vec<String>,
    pub classifier_used: Option<String>,
    pub classified_at: Option<DateTime<Utc>>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    pub id: String,
    pub node_id: String,
    pub confidence: u8,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub analysis_text: Option<String>,
    pub responded: bool,
    pub responded_by: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub rssi: Option<i32>,
    pub spectrogram_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncQueueEntry {
    pub rank: i64,
    pub spectrogram_id: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}
