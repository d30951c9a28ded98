/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup (idempotent).
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `MIXLYTICS_DUCKDB_MEMORY`, default `"1GB"`). DuckDB accepts any
/// size string it supports, e.g. `"512MB"`, `"1GB"`, `"4GB"`. Always set
/// an explicit limit: the DuckDB default (80% of system RAM) is not
/// acceptable for a server process. `SET threads = 2` caps the background
/// thread pool, which is plenty for single-writer embedded use.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- ACCOUNTS
-- ===========================================
CREATE TABLE IF NOT EXISTS accounts (
    id              VARCHAR PRIMARY KEY,           -- 'acct_' + 10 random alphanumeric chars
    name            VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- CHANNEL METRICS (daily marketing observations)
-- ===========================================
-- One row per (account, channel, day). Ingestion replaces on conflict, so
-- re-sent exports correct earlier rows instead of duplicating them.
CREATE TABLE IF NOT EXISTS channel_metrics (
    account_id          VARCHAR NOT NULL,
    channel             VARCHAR NOT NULL,
    date                DATE NOT NULL,
    spend               DOUBLE NOT NULL,
    revenue             DOUBLE NOT NULL,
    impressions         BIGINT NOT NULL DEFAULT 0,
    clicks              BIGINT NOT NULL DEFAULT 0,
    conversions         BIGINT NOT NULL DEFAULT 0,
    new_customers       BIGINT NOT NULL DEFAULT 0,
    returning_customers BIGINT NOT NULL DEFAULT 0,
    UNIQUE (account_id, channel, date)
);

-- Primary query pattern: account + lookback window
CREATE INDEX IF NOT EXISTS idx_channel_metrics_account_date
    ON channel_metrics(account_id, date);

-- ===========================================
-- ATTRIBUTION RESULTS (cached model output)
-- ===========================================
-- Full result payload as JSON; `expires_at` bounds how long a stored run
-- may satisfy later requests.
CREATE TABLE IF NOT EXISTS attribution_results (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    account_id      VARCHAR NOT NULL,
    result_json     VARCHAR NOT NULL,
    computed_at     TIMESTAMP NOT NULL,
    expires_at      TIMESTAMP NOT NULL
);

-- Accelerates `latest result for account` lookups
CREATE INDEX IF NOT EXISTS idx_attribution_account_computed
    ON attribution_results(account_id, computed_at DESC);

-- ===========================================
-- JOBS (async pipeline queue)
-- ===========================================
CREATE TABLE IF NOT EXISTS jobs (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    account_id      VARCHAR NOT NULL,
    job_type        VARCHAR NOT NULL,              -- 'attribution' | 'forecast' | 'optimizer'
    status          VARCHAR NOT NULL,              -- 'pending' | 'processing' | 'completed' | 'failed'
    params_json     VARCHAR NOT NULL,
    result_json     VARCHAR,                       -- NULL until completed
    error_json      VARCHAR,                       -- NULL unless failed
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL
);

-- Claim scan: oldest pending first
CREATE INDEX IF NOT EXISTS idx_jobs_status_created
    ON jobs(status, created_at);

-- At-most-one-in-flight lookup per (account, type)
CREATE INDEX IF NOT EXISTS idx_jobs_account_type_status
    ON jobs(account_id, job_type, status);
"#
    )
}
