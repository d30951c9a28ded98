use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub cors_origins: Vec<String>,
    /// Number of background worker tasks draining the job queue.
    pub worker_count: usize,
    pub worker_poll_interval_ms: u64,
    /// Job records expire this many hours after creation; expired
    /// non-terminal jobs resolve to failed with a timeout error.
    pub job_ttl_hours: i64,
    /// Stored attribution results stay eligible for cache lookups this long.
    pub attribution_ttl_days: i64,
    pub forecast_cache_ttl_secs: u64,
    /// Historical window the models read, counted back from today.
    pub lookback_days: i64,
    pub ridge_alpha: f64,
    pub bootstrap_iterations: usize,
    pub store_retry_attempts: u32,
    pub store_retry_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("MIXLYTICS_PORT")
                .unwrap_or_else(|_| "8001".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("MIXLYTICS_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("MIXLYTICS_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            cors_origins: std::env::var("MIXLYTICS_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            worker_count: std::env::var("MIXLYTICS_WORKERS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            worker_poll_interval_ms: std::env::var("MIXLYTICS_WORKER_POLL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            job_ttl_hours: std::env::var("MIXLYTICS_JOB_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            attribution_ttl_days: std::env::var("MIXLYTICS_ATTRIBUTION_TTL_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap_or(7),
            forecast_cache_ttl_secs: std::env::var("MIXLYTICS_FORECAST_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap_or(600),
            lookback_days: std::env::var("MIXLYTICS_LOOKBACK_DAYS")
                .unwrap_or_else(|_| "180".to_string())
                .parse()
                .unwrap_or(180),
            ridge_alpha: std::env::var("MIXLYTICS_RIDGE_ALPHA")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()
                .unwrap_or(1.0),
            bootstrap_iterations: std::env::var("MIXLYTICS_BOOTSTRAP_ITERATIONS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            store_retry_attempts: std::env::var("MIXLYTICS_STORE_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            store_retry_delay_ms: std::env::var("MIXLYTICS_STORE_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .unwrap_or(200),
        })
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn job_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.job_ttl_hours)
    }

    pub fn attribution_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.attribution_ttl_days)
    }

    pub fn forecast_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.forecast_cache_ttl_secs)
    }

    pub fn store_retry_delay(&self) -> Duration {
        Duration::from_millis(self.store_retry_delay_ms)
    }
}

impl Default for Config {
    /// Defaults used by tests and the in-memory dev path; identical to the
    /// values `from_env` falls back to with no environment set.
    fn default() -> Self {
        Self {
            port: 8001,
            data_dir: "./data".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            cors_origins: Vec::new(),
            worker_count: 2,
            worker_poll_interval_ms: 500,
            job_ttl_hours: 24,
            attribution_ttl_days: 7,
            forecast_cache_ttl_secs: 600,
            lookback_days: 180,
            ridge_alpha: 1.0,
            bootstrap_iterations: 100,
            store_retry_attempts: 3,
            store_retry_delay_ms: 200,
        }
    }
}
