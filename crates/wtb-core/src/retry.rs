//! Retry policy shared by the Telegram and Webling clients.
//!
//! - 429 with a retry-after: sleep exactly that long, retry (no attempt cap).
//! - 429 without retry-after, 5xx, transport failure: sleep
//!   `attempt * base + jitter`, at most `max_retries` times.
//! - anything else non-2xx: fail immediately.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use crate::{errors::Error, http::ApiOutcome, Result};

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

/// Real sleeps on the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Inclusive jitter range in milliseconds added to every backoff sleep.
    pub jitter_ms: (u64, u64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            jitter_ms: (100, 300),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let (lo, hi) = self.jitter_ms;
        let jitter = if hi > lo {
            rand::thread_rng().gen_range(lo..=hi)
        } else {
            lo
        };
        self.base_delay * attempt + Duration::from_millis(jitter)
    }
}

/// A retry policy bound to a sleeper. Cheap to clone.
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Arc::new(TokioSleeper))
    }
}

impl Retrier {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `service` and `what` only label log lines and the resulting error.
    pub async fn run<F, Fut>(&self, service: &'static str, what: &str, mut op: F) -> Result<Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiOutcome>,
    {
        let mut retries: u32 = 0;
        loop {
            let (status, reason) = match op().await {
                ApiOutcome::Success(v) => return Ok(v),
                ApiOutcome::PermanentFailure { status, body } => {
                    tracing::error!(service, what, status, body = %body, "upstream rejected request");
                    return Err(Error::Upstream {
                        service,
                        status: Some(status),
                        detail: body,
                    });
                }
                // A zero wait counts as no hint.
                ApiOutcome::RateLimited {
                    retry_after: Some(secs),
                } if secs > 0 => {
                    tracing::warn!(service, what, secs, "rate limited, honoring retry-after");
                    self.sleeper.sleep(Duration::from_secs(secs)).await;
                    continue;
                }
                ApiOutcome::RateLimited { .. } => (Some(429), "rate limited without retry-after"),
                ApiOutcome::TransientFailure { status } => (status, "transient failure"),
            };

            if retries >= self.policy.max_retries {
                tracing::error!(service, what, ?status, retries, "giving up after retries");
                return Err(Error::Upstream {
                    service,
                    status,
                    detail: format!("{reason}, gave up after {retries} retries"),
                });
            }

            retries += 1;
            let delay = self.policy.backoff(retries);
            tracing::warn!(service, what, ?status, retries, delay_ms = delay.as_millis() as u64, "{reason}, backing off");
            self.sleeper.sleep(delay).await;
        }
    }
}

/// Sleeper doubles for tests in this and the adapter crates.
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records requested sleeps instead of sleeping.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn recorded(&self) -> Vec<Duration> {
            match self.sleeps.lock() {
                Ok(g) => g.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, d: Duration) {
            match self.sleeps.lock() {
                Ok(mut g) => g.push(d),
                Err(poisoned) => poisoned.into_inner().push(d),
            }
        }
    }
}
