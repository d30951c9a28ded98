//! Coordination between the HTTP layer, the stores and the models: job
//! submission and lookup, background workers, and the synchronous model
//! pipeline.

pub mod pipeline;
pub mod queue;
pub mod worker;

use std::future::Future;

use mixlytics_core::config::Config;
use mixlytics_core::error::{PipelineError, PipelineResult};
use tracing::warn;

/// Run a store call, retrying transient failures a bounded number of times
/// before surfacing `Unavailable`.
pub(crate) async fn with_retries<T, F, Fut>(
    config: &Config,
    what: &'static str,
    mut op: F,
) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = config.store_retry_attempts.max(1);
    let mut last: Option<anyhow::Error> = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(what, attempt, error = %err, "store call failed");
                last = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(config.store_retry_delay()).await;
                }
            }
        }
    }
    let detail = last
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no error recorded".to_string());
    Err(PipelineError::Unavailable(format!(
        "{what} still failing after {attempts} attempts: {detail}"
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use mixlytics_core::error::ErrorKind;

    use super::*;

    fn fast_config() -> Config {
        Config {
            store_retry_attempts: 3,
            store_retry_delay_ms: 1,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let value = with_retries(&fast_config(), "probe", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(7) }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = with_retries(&fast_config(), "probe", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    anyhow::bail!("flaky")
                }
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_unavailable() {
        let err = with_retries::<(), _, _>(&fast_config(), "probe", || async {
            anyhow::bail!("store offline")
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("store offline"));
    }
}
