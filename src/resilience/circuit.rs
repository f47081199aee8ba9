//! Consecutive-failure circuit breaker.
//!
//! Closed → (failure_threshold consecutive failures) → Open → (reset_timeout elapsed) →
//! one probe call. A successful probe closes the circuit; a failed probe re-opens it.
//! While the probe is in flight every other caller is treated as if the circuit were open.

use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The guarded operation was not attempted.
    #[error("circuit `{name}` is open")]
    Open { name: String },
    #[error("{0}")]
    Failed(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }
}

/// Snapshot of the breaker's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub is_open: bool,
    pub last_failure: Option<Instant>,
    pub probe_in_flight: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub name: String,
    /// "closed" | "open" | "half_open"
    pub state: &'static str,
    pub consecutive_failures: u32,
    pub is_open: bool,
    pub last_failure_age_ms: Option<u64>,
}

enum Admission {
    Closed,
    Probe,
    Rejected,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: cfg.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(cfg.reset_timeout_ms),
            state: Mutex::new(CircuitState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` through the breaker.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let probe = match self.admit() {
            Admission::Rejected => {
                counter!("circuit_rejections_total", "circuit" => self.name.clone()).increment(1);
                tracing::debug!(target: "fetch", circuit = %self.name, "circuit open, call not attempted");
                return Err(CircuitError::Open {
                    name: self.name.clone(),
                });
            }
            Admission::Closed => false,
            Admission::Probe => {
                tracing::info!(target: "fetch", circuit = %self.name, "cooldown elapsed, probing upstream");
                true
            }
        };

        let mut guard = ProbeGuard {
            breaker: self,
            armed: probe,
        };
        let result = op().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.record_success(probe),
            Err(e) => self.record_failure(probe, e),
        }
        result.map_err(CircuitError::Failed)
    }

    /// Like `execute`, but returns `fallback(..)` on circuit-open and on operation failure.
    pub async fn execute_with_fallback<T, E, F, Fut, FB>(&self, op: F, fallback: FB) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(&CircuitError<E>) -> T,
    {
        match self.execute(op).await {
            Ok(v) => v,
            Err(e) => fallback(&e),
        }
    }

    pub fn snapshot(&self) -> CircuitState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> CircuitStatus {
        let st = self.state.lock();
        let state = if st.probe_in_flight {
            "half_open"
        } else if st.is_open {
            "open"
        } else {
            "closed"
        };
        CircuitStatus {
            name: self.name.clone(),
            state,
            consecutive_failures: st.consecutive_failures,
            is_open: st.is_open,
            last_failure_age_ms: st.last_failure.map(|t| t.elapsed().as_millis() as u64),
        }
    }

    fn admit(&self) -> Admission {
        let mut st = self.state.lock();
        if st.probe_in_flight {
            return Admission::Rejected;
        }
        if !st.is_open {
            return Admission::Closed;
        }
        let cooled_down = st
            .last_failure
            .map_or(true, |t| t.elapsed() > self.reset_timeout);
        if !cooled_down {
            return Admission::Rejected;
        }
        st.is_open = false;
        st.consecutive_failures = 0;
        st.probe_in_flight = true;
        Admission::Probe
    }

    fn record_success(&self, probe: bool) {
        let mut st = self.state.lock();
        if st.is_open || probe {
            tracing::info!(target: "fetch", circuit = %self.name, "circuit closed");
        }
        st.consecutive_failures = 0;
        st.is_open = false;
        if probe {
            st.probe_in_flight = false;
        }
    }

    fn record_failure<E: fmt::Display>(&self, probe: bool, err: &E) {
        let mut st = self.state.lock();
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        st.last_failure = Some(Instant::now());
        if probe {
            st.probe_in_flight = false;
        }

        let should_open = probe || st.consecutive_failures >= self.failure_threshold;
        if should_open && !st.is_open {
            st.is_open = true;
            counter!("circuit_open_total", "circuit" => self.name.clone()).increment(1);
            tracing::warn!(
                target: "fetch",
                circuit = %self.name,
                failures = st.consecutive_failures,
                error = %err,
                "circuit opened"
            );
        }
    }
}

/// Releases the probe slot if the probing future is dropped before completion.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut st = self.breaker.state.lock();
            st.probe_in_flight = false;
            // Outcome unknown: stay open so the next caller probes again.
            st.is_open = true;
        }
    }
}
