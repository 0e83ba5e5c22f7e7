//! Environment-style configuration for the hub, matching the core-relevant
//! keys table: every variable falls back to a documented default.

use std::time::Duration;

#[derive(Debug, Clone)]
pub enum AiMode {
    Deep,
    Fast,
    Local,
    Auto,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub http_bind: String,
    pub deep_rate_limit: u32,
    pub deep_rate_window: Duration,
    pub session_timeout: Duration,
    pub ai_mode: AiMode,
    pub spectrograms_dir: std::path::PathBuf,
    pub data_dir: std::path::PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("guardian-hub");

        Self {
            db_path: std::env::var("HUB_DB_PATH")
                .unwrap_or_else(|_| data_dir.join("forest_guardian.db").to_string_lossy().into_owned()),
            http_bind: std::env::var("HUB_HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            deep_rate_limit: env_u32("DEEP_RATE_LIMIT", 5),
            deep_rate_window: Duration::from_secs(env_u64("DEEP_RATE_WINDOW_S", 15 * 60)),
            session_timeout: Duration::from_secs(env_u64("SESSION_TIMEOUT_S", 30)),
            ai_mode: match std::env::var("AI_MODE").as_deref() {
                Ok("deep") => AiMode::Deep,
                Ok("fast") => AiMode::Fast,
                Ok("local") => AiMode::Local,
                _ => AiMode::Auto,
            },
            spectrograms_dir: data_dir.join("spectrograms"),
            data_dir,
        }
    }
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
        std::env::remove_var("DEEP_RATE_LIMIT");
        std::env::remove_var("SESSION_TIMEOUT_S");
        let config = Config::from_env();
        assert_eq!(config.deep_rate_limit, 5);
        assert_eq!(config.session_timeout, Duration::from_secs(30));
    }
}
