use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::schema::init_sql;

/// A DuckDB backend for Mixlytics.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. We wrap the connection in `Arc<Mutex<_>>` so the async
/// runtime serialises all access, which also makes the queue's claim step
/// atomic without row locks. The struct is cheaply shareable across Axum
/// handlers and the worker tasks via `Arc`.
///
/// Memory and thread limits are enforced by [`init_sql`] at open time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`,
    /// read from `Config.duckdb_memory_limit` at the call site. Runs the
    /// schema init SQL so all tables and indexes exist afterwards.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests only; data is discarded when the struct is
    /// dropped. Uses a 1GB memory limit (tests are not memory-constrained).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    ///
    /// Called at startup so a locked or unusable database file fails the
    /// boot instead of the first request.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    /// Production code should use the store traits.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Parse DuckDB's canonical `CAST(ts AS VARCHAR)` rendering back into a
/// UTC timestamp. All timestamps are written as UTC, so the stored wall
/// time is the UTC instant.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("unparseable timestamp '{raw}'"))?;
    Ok(naive.and_utc())
}

/// Render a UTC timestamp in the form DuckDB parses back losslessly.
/// Bind sites pair this with an explicit `CAST(?n AS TIMESTAMP)`.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_initialises_the_schema() {
        let db = DuckDbBackend::open_in_memory().expect("db");
        db.ping().await.expect("ping");
        let conn = db.conn_for_test().await;
        let tables: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_name IN ('accounts', 'channel_metrics', 'attribution_results', 'jobs')",
            )
            .expect("prepare")
            .query_row([], |row| row.get(0))
            .expect("query");
        assert_eq!(tables, 4);
    }

    #[test]
    fn timestamps_parse_with_and_without_fractional_seconds() {
        let plain = parse_timestamp("2026-03-01 08:30:00").expect("plain");
        assert_eq!(plain.timestamp() % 60, 0);
        parse_timestamp("2026-03-01 08:30:00.123456").expect("fractional");
        assert!(parse_timestamp("not a timestamp").is_err());
    }

    #[test]
    fn timestamps_round_trip_through_the_bind_format() {
        let original = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(original)).expect("round trip");
        assert_eq!(parsed, original);
    }
}
