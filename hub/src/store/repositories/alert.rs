use crate::store::models::AlertRecord;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct AlertRepository;

impl AlertRepository {
    pub async fn insert(pool: &SqlitePool, record: &AlertRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO alerts
                (id, node_id, confidence, lat, lon, timestamp, analysis_text, responded,
                 responded_by, responded_at, rssi, spectrogram_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&record.id)
        .bind(&record.node_id)
        .bind(record.confidence as i64)
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.analysis_text)
        .bind(record.responded as i64)
        .bind(&record.responded_by)
        .bind(record.responded_at.map(|t| t.to_rfc3339()))
        .bind(record.rssi)
        .bind(&record.spectrogram_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn mark_responded(pool: &SqlitePool, id: &str, responded_by: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET responded = 1, responded_by = $1, responded_at = $2
            WHERE id = $3
            "#,
        )
        .bind(responded_by)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<AlertRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM alerts ORDER BY timestamp DESC LIMIT $1")
            .bind(limit)
            .fetch_all(pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<AlertRecord, sqlx::Error> {
    let timestamp: String = row.get("timestamp");
    let responded_at: Option<String> = row.get("responded_at");

    Ok(AlertRecord {
        id: row.get("id"),
        node_id: row.get("node_id"),
        confidence: row.get::<i64, _>("confidence") as u8,
        lat: row.get("lat"),
        lon: row.get("lon"),
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        analysis_text: row.get("analysis_text"),
        responded: row.get::<i64, _>("responded") != 0,
        responded_by: row.get("responded_by"),
        responded_at: responded_at
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        rssi: row.get("rssi"),
        spectrogram_id: row.get("spectrogram_id"),
    })
}
