use crate::store::models::SyncQueueEntry;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SyncQueueRepository;

impl SyncQueueRepository {
    pub async fn enqueue(pool: &SqlitePool, spectrogram_id: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO sync_queue (spectrogram_id, enqueued_at, attempts) VALUES ($1, $2, 0)")
            .bind(spectrogram_id)
            .bind(Utc::now().to_rfc3339())
            .execute(pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Oldest-first; callers drain the whole batch on reconnection.
    pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<SyncQueueEntry>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM sync_queue ORDER BY rank ASC").fetch_all(pool).await?;
        rows.iter().map(row_to_entry).collect()
    }

    pub async fn remove(pool: &SqlitePool, rank: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sync_queue WHERE rank = $1").bind(rank).execute(pool).await?;
        Ok(())
    }

    pub async fn bump_attempts(pool: &SqlitePool, rank: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sync_queue SET attempts = attempts + 1 WHERE rank = $1")
            .bind(rank)
            .execute(pool)
            .await?;
        Ok(())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<SyncQueueEntry, sqlx::Error> {
    let enqueued_at: String = row.get("enqueued_at");
    Ok(SyncQueueEntry {
        rank: row.get("rank"),
        spectrogram_id: row.get("spectrogram_id"),
        enqueued_at: DateTime::parse_from_rfc3339(&enqueued_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        attempts: row.get::<i64, _>("attempts") as u32,
    })
}
