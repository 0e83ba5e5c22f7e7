//! Store: the sole writer of persisted state. Wraps a single-writer
//! `SqlitePool` and exposes repository-per-entity access, matching the
//! repository pattern used for the desktop app's settings table.

pub mod models;
pub mod repositories;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
}

impl Store {
    pub async fn connect(db_path: &str) -> Result<Self, sqlx::Error> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))?
            .create_if_missing(true);

        // SQLite allows exactly one writer; a pool of 1 makes that explicit
        // instead of serializing writes behind a hand-rolled mutex.
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                node_id TEXT PRIMARY KEY,
                last_seen TEXT NOT NULL,
                battery_percent INTEGER NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                status TEXT NOT NULL,
                last_rssi INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS spectrograms (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL,
                image_bytes BLOB NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                anomaly_score REAL NOT NULL,
                received_at TEXT NOT NULL,
                session_id INTEGER NOT NULL,
                rssi INTEGER,
                classification TEXT,
                confidence INTEGER,
                threat_level TEXT,
                reasoning TEXT,
                features TEXT,
                classifier_used TEXT,
                classified_at TEXT,
                truncated INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL,
                confidence INTEGER NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                timestamp TEXT NOT NULL,
                analysis_text TEXT,
                responded INTEGER NOT NULL DEFAULT 0,
                responded_by TEXT,
                responded_at TEXT,
                rssi INTEGER,
                spectrogram_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_queue (
                rank INTEGER PRIMARY KEY AUTOINCREMENT,
                spectrogram_id TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
