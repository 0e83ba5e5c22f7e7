//! Environment-style configuration, read once at startup. Mirrors the
//! core-relevant keys table: each constructor falls back to the spec's
//! defaults when a variable is unset or unparsable.

use crate::gate::{GateConfig, Profile};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: String,
    pub radio_freq_mhz: f32,
    pub radio_sf: u8,
    pub radio_sync_word: u8,
    pub anomaly_profile: Profile,
    pub consecutive_hits: u32,
    pub tx_cooldown_ms: u64,
    pub heartbeat_ms: u64,
    pub lat: f32,
    pub lon: f32,
}

impl Config {
    pub fn from_env(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            radio_freq_mhz: env_f32("RADIO_FREQ_MHZ", 915.0),
            radio_sf: env_u8("RADIO_SF", 10),
            radio_sync_word: env_u8("RADIO_SYNC_WORD", 0x12),
            anomaly_profile: match std::env::var("ANOMALY_PROFILE").as_deref() {
                Ok("demo") => Profile::Demo,
                _ => Profile::Production,
            },
            consecutive_hits: env_u32("CONSECUTIVE_HITS", 4),
            tx_cooldown_ms: env_u64("TX_COOLDOWN_MS", 30_000),
            heartbeat_ms: env_u64("HEARTBEAT_MS", 30_000),
            lat: env_f32("NODE_LAT", 0.0),
            lon: env_f32("NODE_LON", 0.0),
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        let mut base = match self.anomaly_profile {
            Profile::Demo => GateConfig::demo(),
            Profile::Production => GateConfig::production(),
        };
        base.consecutive_hits = self.consecutive_hits;
        base.cooldown = Duration::from_millis(self.tx_cooldown_ms);
        base
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_when_env_unset() {
        std::env::remove_var("RADIO_FREQ_MHZ");
        let config = Config::from_env("GUARDIAN_001");
        assert_eq!(config.radio_freq_mhz, 915.0);
        assert_eq!(config.radio_sf, 10);
        assert_eq!(config.tx_cooldown_ms, 30_000);
    }
}
