use crate::store::models::SpectrogramRecord;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SpectrogramRepository;

impl SpectrogramRepository {
    pub async fn insert(pool: &SqlitePool, record: &SpectrogramRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO spectrograms
                (id, node_id, image_bytes, lat, lon, anomaly_score, received_at, session_id, rssi,
                 classification, confidence, threat_level, reasoning, features, classifier_used, classified_at, truncated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&record.id)
        .bind(&record.node_id)
        .bind(&record.image_bytes)
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.anomaly_score)
        .bind(record.received_at.to_rfc3339())
        .bind(record.session_id as i64)
        .bind(record.rssi)
        .bind(&record.classification)
        .bind(record.confidence.map(|c| c as i64))
        .bind(&record.threat_level)
        .bind(&record.reasoning)
        .bind(serde_json::to_string(&record.features).unwrap_or_default())
        .bind(&record.classifier_used)
        .bind(record.classified_at.map(|t| t.to_rfc3339()))
        .bind(record.truncated as i64)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update_classification(
        pool: &SqlitePool,
        id: &str,
        classification: &str,
        confidence: u8,
        threat_level: &str,
        reasoning: Option<&str>,
        features: &[String],
        classifier_used: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE spectrograms SET
                classification = $1,
                confidence = $2,
                threat_level = $3,
                reasoning = $4,
                features = $5,
                classifier_used = $6,
                classified_at = $7
            WHERE id = $8
            "#,
        )
        .bind(classification)
        .bind(confidence as i64)
        .bind(threat_level)
        .bind(reasoning)
        .bind(serde_json::to_string(features).unwrap_or_default())
        .bind(classifier_used)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<SpectrogramRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM spectrograms WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<SpectrogramRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM spectrograms ORDER BY received_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<SpectrogramRecord, sqlx::Error> {
    let received_at: String = row.get("received_at");
    let classified_at: Option<String> = row.get("classified_at");
    let features: Option<String> = row.get("features");

    Ok(SpectrogramRecord {
        id: row.get("id"),
        node_id: row.get("node_id"),
        image_bytes: row.get("image_bytes"),
        lat: row.get("lat"),
        lon: row.get("lon"),
        anomaly_score: row.get("anomaly_score"),
        received_at: DateTime::parse_from_rfc3339(&received_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        session_id: row.get::<i64, _>("session_id") as u16,
        rssi: row.get("rssi"),
        classification: row.get("classification"),
        confidence: row.get::<Option<i64>, _>("confidence").map(|v| v as u8),
        threat_level: row.get("threat_level"),
        reasoning: row.get("reasoning"),
        features: features.and_then(|f| serde_json::from_str(&f).ok()).unwrap_or_default(),
        classifier_used: row.get("classifier_used"),
        classified_at: classified_at
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        truncated: row.get::<i64, _>("truncated") != 0,
    })
}
