//! Retry loop shared by every generative call.
//!
//! Two failure classes get different treatment: quota exhaustion backs off
//! for a full cooldown, anything else retries after a short delay. The
//! final attempt never sleeps; its failure surfaces as `GenerationFailed`.

use std::future::Future;

use tokio::time::sleep;
use tracing::warn;

use crate::core::config::RetryConfig;
use crate::core::PipelineError;

/// One failed backend call, carrying what the retry policy needs.
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl CallFailure {
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        CallFailure {
            status: None,
            message: err.to_string(),
        }
    }
}

/// Whether a failure means the per-minute quota is spent. Matches the
/// HTTP 429 status and the wording Google puts in error bodies.
pub fn is_quota_exhausted(failure: &CallFailure) -> bool {
    failure.status == Some(429)
        || failure.message.contains("Resource has been exhausted")
        || failure.message.contains("RESOURCE_EXHAUSTED")
}

pub async fn with_retries<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut call: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallFailure>>,
{
    let mut last = String::new();
    for attempt in 1..=config.max_attempts {
        match call().await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                last = failure.message.clone();
                if attempt == config.max_attempts {
                    break;
                }
                if is_quota_exhausted(&failure) {
                    warn!(attempt, label, "quota exhausted, cooling off");
                    sleep(config.quota_cooldown()).await;
                } else {
                    warn!(attempt, label, error = %failure.message, "call failed, retrying");
                    sleep(config.short_delay()).await;
                }
            }
        }
    }
    Err(PipelineError::generation(config.max_attempts, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn config() -> RetryConfig {
        RetryConfig::default()
    }

    #[test]
    fn test_quota_predicate() {
        assert!(is_quota_exhausted(&CallFailure {
            status: Some(429),
            message: "too many requests".into()
        }));
        assert!(is_quota_exhausted(&CallFailure {
            status: Some(500),
            message: "Resource has been exhausted (e.g. check quota).".into()
        }));
        assert!(is_quota_exhausted(&CallFailure {
            status: None,
            message: "status: RESOURCE_EXHAUSTED".into()
        }));
        assert!(!is_quota_exhausted(&CallFailure {
            status: Some(500),
            message: "internal".into()
        }));
    }

    #[tokio::test]
    async fn test_first_attempt_success_no_delay() {
        let result = with_retries(&config(), "test", || async { Ok::<_, CallFailure>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_failures_cool_off_a_minute_each() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = Instant::now();
        let result = with_retries(&config(), "test", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(CallFailure {
                        status: Some(429),
                        message: "quota".into(),
                    })
                } else {
                    Ok("answer".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed().as_secs(), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_failures_retry_after_short_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = Instant::now();
        let result: Result<String, _> = with_retries(&config(), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CallFailure {
                    status: Some(500),
                    message: "boom".into(),
                })
            }
        })
        .await;

        // Three attempts, but only two sleeps: the last failure returns
        // immediately.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed().as_millis(), 2000);
        match result {
            Err(PipelineError::GenerationFailed { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
