use std::collections::HashMap;
use std::time::{Duration, Instant};

use mixlytics_core::job::ForecastJobParams;
use mixlytics_core::results::ForecastResult;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Entries kept before the oldest is evicted.
const MAX_ENTRIES: usize = 256;

struct CacheEntry {
    stored_at: Instant,
    result: ForecastResult,
}

/// Short-TTL cache for forecast responses, keyed by request signature.
///
/// Population is best effort; a miss only costs a recompute.
pub struct ForecastCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ForecastCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Stable digest over everything that affects the forecast response.
    /// Scenario maps are key-ordered, so equal requests digest equally.
    pub fn signature(account_id: &str, params: &ForecastJobParams) -> String {
        let mut hasher = Sha256::new();
        hasher.update(account_id.as_bytes());
        hasher.update(params.horizon_days.to_le_bytes());
        if let Some(scenario) = &params.future_spend {
            hasher.update(serde_json::to_vec(scenario).unwrap_or_default());
        }
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<ForecastResult> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.result.clone())
    }

    pub async fn insert(&self, key: String, result: ForecastResult) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.stored_at.elapsed() <= self.ttl);
        if entries.len() >= MAX_ENTRIES {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                result,
            },
        );
    }
}
