use std::sync::Arc;

use mixlytics_core::config::Config;
use mixlytics_core::store::{AttributionStore, JobStore, MetricsStore};
use mixlytics_duckdb::DuckDbBackend;

use crate::cache::ForecastCache;
use crate::orchestrator::queue::JobQueue;

/// Shared application state handed to every handler and background task.
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: Arc<dyn MetricsStore>,
    pub attributions: Arc<dyn AttributionStore>,
    pub jobs: Arc<dyn JobStore>,
    pub queue: JobQueue,
    pub forecast_cache: ForecastCache,
}

impl AppState {
    /// All three store roles backed by the same DuckDB handle.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let db = Arc::new(db);
        Self::from_parts(db.clone(), db.clone(), db, config)
    }

    /// Assemble from individual store implementations; tests swap in the
    /// in-memory stores here.
    pub fn from_parts(
        metrics: Arc<dyn MetricsStore>,
        attributions: Arc<dyn AttributionStore>,
        jobs: Arc<dyn JobStore>,
        config: Config,
    ) -> Self {
        let config = Arc::new(config);
        let queue = JobQueue::new(Arc::clone(&jobs), Arc::clone(&config));
        let forecast_cache = ForecastCache::new(config.forecast_cache_ttl());
        Self {
            config,
            metrics,
            attributions,
            jobs,
            queue,
            forecast_cache,
        }
    }
}
