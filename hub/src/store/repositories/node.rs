use crate::store::models::NodeRecord;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct NodeRepository;

impl NodeRepository {
    /// Upsert a node record. A node id seen for the first time is an
    /// insert; any later message updates in place rather than failing on
    /// the primary key conflict.
    pub async fn upsert(
        pool: &SqlitePool,
        node_id: &str,
        battery_percent: u8,
        lat: f64,
        lon: f64,
        status: &str,
        last_rssi: Option<i32>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO nodes (node_id, last_seen, battery_percent, lat, lon, status, last_rssi)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT(node_id) DO UPDATE SET
                last_seen = excluded.last_seen,
                battery_percent = excluded.battery_percent,
                lat = excluded.lat,
                lon = excluded.lon,
                status = excluded.status,
                last_rssi = excluded.last_rssi
            "#,
        )
        .bind(node_id)
        .bind(Utc::now().to_rfc3339())
        .bind(battery_percent as i64)
        .bind(lat)
        .bind(lon)
        .bind(status)
        .bind(last_rssi)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<NodeRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM nodes ORDER BY last_seen DESC").fetch_all(pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn get(pool: &SqlitePool, node_id: &str) -> Result<Option<NodeRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM nodes WHERE node_id = $1")
            .bind(node_id)
            .fetch_optional(pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<NodeRecord, sqlx::Error> {
    let last_seen: String = row.get("last_seen");
    Ok(NodeRecord {
        node_id: row.get("node_id"),
        last_seen: DateTime::parse_from_rfc3339(&last_seen)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        battery_percent: row.get::<i64, _>("battery_percent") as u8,
        lat: row.get("lat"),
        lon: row.get("lon"),
        status: row.get("status"),
        last_rssi: row.get::<Option<i64>, _>("last_rssi").map(|v| v as i32),
    })
}
