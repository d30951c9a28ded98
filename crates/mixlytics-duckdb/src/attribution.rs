use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use mixlytics_core::results::AttributionResult;
use mixlytics_core::store::{AttributionStore, StoredAttribution};

use crate::backend::parse_timestamp;
use crate::DuckDbBackend;

#[async_trait]
impl AttributionStore for DuckDbBackend {
    async fn save_attribution(
        &self,
        account_id: &str,
        result: &AttributionResult,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let computed_at = Utc::now();
        let expires_at = computed_at + ttl;
        let payload = serde_json::to_string(result)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO attribution_results (id, account_id, result_json, computed_at, expires_at) \
             VALUES (?1, ?2, ?3, CAST(?4 AS TIMESTAMP), CAST(?5 AS TIMESTAMP))",
            duckdb::params![
                id,
                account_id,
                payload,
                computed_at.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                expires_at.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            ],
        )?;
        tracing::info!(account_id, attribution_id = %id, "attribution result stored");
        Ok(id)
    }

    async fn load_latest_attribution(
        &self,
        account_id: &str,
    ) -> anyhow::Result<Option<StoredAttribution>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, account_id, result_json, \
                    CAST(computed_at AS VARCHAR), CAST(expires_at AS VARCHAR) \
             FROM attribution_results \
             WHERE account_id = ?1 AND expires_at > CAST(?2 AS TIMESTAMP) \
             ORDER BY computed_at DESC \
             LIMIT 1",
        )?;
        let row = stmt.query_row(
            duckdb::params![
                account_id,
                Utc::now().format("%Y-%m-%d %H:%M:%S%.f").to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );
        let (id, account_id, result_json, computed_at, expires_at) = match row {
            Ok(raw) => raw,
            Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(StoredAttribution {
            id,
            account_id,
            result: serde_json::from_str(&result_json)?,
            computed_at: parse_timestamp(&computed_at)?,
            expires_at: parse_timestamp(&expires_at)?,
        }))
    }
}
