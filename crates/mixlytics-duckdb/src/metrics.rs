use async_trait::async_trait;
use chrono::NaiveDate;

use mixlytics_core::metrics::{MetricPoint, MetricSeries};
use mixlytics_core::store::MetricsStore;

use crate::DuckDbBackend;

/// Row shape read back from `channel_metrics`; the DATE column arrives as
/// its VARCHAR cast and is parsed outside the row closure.
struct MetricRowRaw {
    channel: String,
    date: String,
    spend: f64,
    revenue: f64,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    new_customers: i64,
    returning_customers: i64,
}

#[async_trait]
impl MetricsStore for DuckDbBackend {
    async fn create_account(&self, account_id: &str, name: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO accounts (id, name, created_at) \
             VALUES (?1, ?2, CURRENT_TIMESTAMP) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
            duckdb::params![account_id, name],
        )?;
        Ok(())
    }

    async fn account_exists(&self, account_id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare("SELECT COUNT(*) FROM accounts WHERE id = ?1")?
            .query_row(duckdb::params![account_id], |row| row.get(0))?;
        Ok(count > 0)
    }

    async fn upsert_points(
        &self,
        account_id: &str,
        points: &[MetricPoint],
    ) -> anyhow::Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().await;

        // One transaction for the whole batch: one fsync instead of N, and
        // a failed row leaves nothing half-written.
        let tx = conn.transaction()?;
        for point in points {
            tx.execute(
                r#"INSERT INTO channel_metrics (
                    account_id, channel, date, spend, revenue,
                    impressions, clicks, conversions, new_customers, returning_customers
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT (account_id, channel, date) DO UPDATE SET
                    spend = EXCLUDED.spend,
                    revenue = EXCLUDED.revenue,
                    impressions = EXCLUDED.impressions,
                    clicks = EXCLUDED.clicks,
                    conversions = EXCLUDED.conversions,
                    new_customers = EXCLUDED.new_customers,
                    returning_customers = EXCLUDED.returning_customers"#,
                duckdb::params![
                    account_id,
                    point.channel,
                    point.date.to_string(),
                    point.spend,
                    point.revenue,
                    point.impressions,
                    point.clicks,
                    point.conversions,
                    point.new_customers,
                    point.returning_customers,
                ],
            )?;
        }
        tx.commit()?;

        tracing::debug!(
            account_id,
            rows = points.len(),
            "metric points written to DuckDB"
        );
        Ok(points.len())
    }

    async fn fetch_metrics(
        &self,
        account_id: &str,
        since: NaiveDate,
    ) -> anyhow::Result<MetricSeries> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT channel, CAST(date AS VARCHAR), spend, revenue, \
                    impressions, clicks, conversions, new_customers, returning_customers \
             FROM channel_metrics \
             WHERE account_id = ?1 AND date >= ?2 \
             ORDER BY channel, date",
        )?;
        let rows = stmt.query_map(
            duckdb::params![account_id, since.to_string()],
            |row| {
                Ok(MetricRowRaw {
                    channel: row.get(0)?,
                    date: row.get(1)?,
                    spend: row.get(2)?,
                    revenue: row.get(3)?,
                    impressions: row.get(4)?,
                    clicks: row.get(5)?,
                    conversions: row.get(6)?,
                    new_customers: row.get(7)?,
                    returning_customers: row.get(8)?,
                })
            },
        )?;

        let mut points = Vec::new();
        for row in rows {
            let raw = row?;
            let date = NaiveDate::parse_from_str(&raw.date, "%Y-%m-%d")?;
            points.push(MetricPoint {
                date,
                channel: raw.channel,
                spend: raw.spend,
                revenue: raw.revenue,
                impressions: raw.impressions,
                clicks: raw.clicks,
                conversions: raw.conversions,
                new_customers: raw.new_customers,
                returning_customers: raw.returning_customers,
            });
        }
        Ok(MetricSeries::new(account_id, points))
    }
}
