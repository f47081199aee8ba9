// src/resilience/retry.rs
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// `retries` extra attempts after the first; wait `delay_ms * n` after the n-th failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Linear backoff: the wait after failed attempt `n` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts: {last}")]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last: E,
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    label: String,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(label: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            label: label.into(),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Attempt `op` up to `retries + 1` times. Every failed attempt is logged with its
    /// index before the next wait.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::warn!(
                        target: "fetch",
                        label = %self.label,
                        attempt,
                        max_attempts,
                        error = %e,
                        "attempt failed"
                    );
                    counter!("retry_attempt_failures_total", "label" => self.label.clone())
                        .increment(1);

                    if attempt >= max_attempts {
                        return Err(RetryError { attempts: attempt, last: e });
                    }
                    tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like `run`, but hands the last error to `fallback` instead of returning it.
    pub async fn run_or_else<T, E, F, Fut, FB>(&self, op: F, fallback: FB) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(E) -> T,
    {
        match self.run(op).await {
            Ok(v) => v,
            Err(e) => fallback(e.last),
        }
    }
}
