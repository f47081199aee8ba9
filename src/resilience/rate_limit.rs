//! Sliding-window rate limiter.
//!
//! Each limiter keeps the timestamps of admitted calls inside the trailing window.
//! `acquire()` never rejects: it waits until the oldest timestamp leaves the window and
//! then re-checks, so concurrent callers that wake up together cannot overshoot.
//!
//! Timestamps are only written on admission, which makes `acquire()` cancel-safe:
//! dropping the future (e.g. under an outer deadline) leaves the window untouched.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Window configuration, as it appears in `[defaults.rate_limit]` / `[upstreams.*.rate_limit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStatus {
    pub name: String,
    pub in_window: usize,
    pub max_requests: usize,
    pub window_ms: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, cfg: RateLimitConfig) -> Self {
        // A zero limit would never admit anything.
        let max_requests = cfg.max_requests.max(1);
        let window = Duration::from_millis(cfg.window_ms.max(1));
        Self {
            name: name.into(),
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for a free slot in the window, then record the call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut ts = self.timestamps.lock();
                let now = Instant::now();
                evict_expired(&mut ts, now, self.window);

                if ts.len() < self.max_requests {
                    ts.push_back(now);
                    return;
                }

                match ts.front() {
                    Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            tracing::debug!(
                target: "fetch",
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "rate window full, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Whether `acquire()` would admit right now. Does NOT mutate the window.
    pub fn can_acquire(&self) -> bool {
        self.in_window() < self.max_requests
    }

    fn in_window(&self) -> usize {
        let now = Instant::now();
        self.timestamps
            .lock()
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .count()
    }

    pub fn status(&self) -> RateLimiterStatus {
        RateLimiterStatus {
            name: self.name.clone(),
            in_window: self.in_window(),
            max_requests: self.max_requests,
            window_ms: self.window.as_millis() as u64,
        }
    }
}

/// Drop timestamps that are a full window old or older.
fn evict_expired(ts: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = ts.front() {
        if now.saturating_duration_since(front) >= window {
            ts.pop_front();
        } else {
            break;
        }
    }
}

/// One limiter per upstream name, created on demand from a default config.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    defaults: RateLimitConfig,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl LimiterRegistry {
    pub fn new(defaults: RateLimitConfig) -> Self {
        Self {
            defaults,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter for `name`, created with `cfg` if none exists yet. An existing limiter is
    /// returned as is, so every caller of one upstream shares one window.
    pub fn register(&self, name: &str, cfg: RateLimitConfig) -> Arc<RateLimiter> {
        let mut map = self.limiters.lock();
        Arc::clone(
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(name, cfg))),
        )
    }

    pub fn get_or_create(&self, name: &str) -> Arc<RateLimiter> {
        let mut map = self.limiters.lock();
        Arc::clone(
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(name, self.defaults))),
        )
    }

    pub async fn acquire(&self, name: &str) {
        let limiter = self.get_or_create(name);
        limiter.acquire().await;
    }

    pub fn statuses(&self) -> Vec<RateLimiterStatus> {
        let mut out: Vec<_> = self.limiters.lock().values().map(|l| l.status()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
