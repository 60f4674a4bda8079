//! Fixed-delay retry around single remote calls.
//!
//! Only [`StoreError::is_transient`] failures are retried. Every retry writes one
//! line to the status sink so a stalled run is visible to the user.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::contract::{StatusSink, StoreError};

/// How long to wait between attempts and how many retries to allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    /// `None` retries transient failures until the call succeeds.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_delay_secs() -> u64 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            max_retries: None,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Wraps remote operations with the retry policy and reports retries to a sink.
pub struct RetryingTransport<'a> {
    policy: RetryPolicy,
    sink: &'a dyn StatusSink,
}

impl<'a> RetryingTransport<'a> {
    pub fn new(policy: RetryPolicy, sink: &'a dyn StatusSink) -> Self {
        Self { policy, sink }
    }

    /// Run `operation`, re-invoking it after the configured delay for as long as it
    /// fails transiently and the retry budget allows. Permanent errors return at once.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retries: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(label, retries, "[RETRY] Operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    if let Some(max) = self.policy.max_retries {
                        if retries >= max {
                            warn!(label, retries, error = %e, "[RETRY] Giving up after exhausting retries");
                            return Err(e);
                        }
                    }
                    retries += 1;
                    warn!(label, attempt = retries, error = %e, "[RETRY] Transient failure, retrying");
                    self.sink.line(&format!(
                        "Exception occurred during {label}: {e}. Retrying in {} seconds...",
                        self.policy.delay_secs
                    ));
                    tokio::time::sleep(self.policy.delay()).await;
                }
                Err(e) => {
                    debug!(label, error = %e, "[RETRY] Permanent failure, not retrying");
                    return Err(e);
                }
            }
        }
    }
}
