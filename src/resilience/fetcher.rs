//! Cache → rate limit → circuit breaker → retry around one upstream read.
//!
//! A failing upstream never surfaces as an error here: circuit-open, retry exhaustion and
//! deadline expiry all degrade to an empty page, tagged with a `FetchOutcome` so the
//! poll loop can log "known bad" differently from "slow".

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::cache::TtlCache;
use super::circuit::{CircuitBreaker, CircuitError};
use super::rate_limit::RateLimiter;
use super::retry::RetryExecutor;
use super::ResilienceConfig;
use crate::ingest::source::Source;
use crate::model::UpstreamItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Fresh,
    Cached,
    CircuitOpen,
    Exhausted,
    DeadlineExceeded,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Fresh => "fresh",
            FetchOutcome::Cached => "cached",
            FetchOutcome::CircuitOpen => "circuit_open",
            FetchOutcome::Exhausted => "exhausted",
            FetchOutcome::DeadlineExceeded => "deadline_exceeded",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, FetchOutcome::Fresh | FetchOutcome::Cached)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub upstream: String,
    pub outcome: FetchOutcome,
    pub items: Vec<UpstreamItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    pub upstream: String,
    pub rate_limit: super::rate_limit::RateLimiterStatus,
    pub circuit: super::circuit::CircuitStatus,
    pub cache: super::cache::CacheStatus,
}

/// Cached pages keyed by `Source::cache_key`.
pub type PageCache = TtlCache<String, Vec<UpstreamItem>>;

pub struct ResilientFetcher {
    source: Arc<dyn Source>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    cache: Arc<PageCache>,
    deadline: Option<Duration>,
}

impl ResilientFetcher {
    pub fn new(source: Arc<dyn Source>, cfg: &ResilienceConfig) -> Self {
        let name = source.name().to_string();
        Self {
            limiter: Arc::new(RateLimiter::new(name.clone(), cfg.rate_limit)),
            breaker: Arc::new(CircuitBreaker::new(name.clone(), cfg.breaker)),
            retry: RetryExecutor::new(name, cfg.retry),
            cache: Arc::new(TtlCache::new(cfg.cache)),
            deadline: cfg.deadline_ms.map(Duration::from_millis),
            source,
        }
    }

    /// Share a limiter with other callers targeting the same upstream.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Share a breaker: a failure seen by any fetcher of the upstream counts for all.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// Share a page cache. Sources behind one cache must produce distinct cache keys for
    /// distinct pages.
    pub fn with_cache(mut self, cache: Arc<PageCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn upstream(&self) -> &str {
        self.source.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn fetch(&self, since: Option<DateTime<Utc>>) -> FetchReport {
        crate::metrics::ensure_described();
        let upstream = self.upstream().to_string();
        let key = self.source.cache_key(since);

        if let Some(items) = self.cache.get(&key) {
            counter!("fetch_total", "upstream" => upstream.clone(), "outcome" => "cached")
                .increment(1);
            return FetchReport {
                upstream,
                outcome: FetchOutcome::Cached,
                items,
            };
        }

        let started = Instant::now();
        let result = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, self.fetch_uncached(since)).await {
                Ok(r) => r,
                Err(_) => {
                    tracing::warn!(
                        target: "fetch",
                        upstream = %upstream,
                        deadline_ms = limit.as_millis() as u64,
                        "fetch deadline exceeded, serving fallback"
                    );
                    Err(FetchOutcome::DeadlineExceeded)
                }
            },
            None => self.fetch_uncached(since).await,
        };
        histogram!("fetch_duration_ms", "upstream" => upstream.clone())
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        let (outcome, items) = match result {
            Ok(items) => {
                self.cache.put(key, items.clone());
                (FetchOutcome::Fresh, items)
            }
            Err(outcome) => (outcome, Vec::new()),
        };
        counter!("fetch_total", "upstream" => upstream.clone(), "outcome" => outcome.as_str())
            .increment(1);

        FetchReport {
            upstream,
            outcome,
            items,
        }
    }

    /// Convenience form for callers that only want the page.
    pub async fn fetch_items(&self, since: Option<DateTime<Utc>>) -> Vec<UpstreamItem> {
        self.fetch(since).await.items
    }

    async fn fetch_uncached(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UpstreamItem>, FetchOutcome> {
        self.limiter.acquire().await;

        let source: &dyn Source = self.source.as_ref();
        let result = self
            .breaker
            .execute(|| self.retry.run(move || source.fetch(since)))
            .await;

        match result {
            Ok(items) => Ok(items),
            Err(CircuitError::Open { .. }) => {
                tracing::info!(
                    target: "fetch",
                    upstream = %source.name(),
                    "upstream known bad (circuit open), serving fallback"
                );
                Err(FetchOutcome::CircuitOpen)
            }
            Err(CircuitError::Failed(e)) => {
                tracing::warn!(
                    target: "fetch",
                    upstream = %source.name(),
                    attempts = e.attempts,
                    error = %e.last,
                    "upstream retries exhausted, serving fallback"
                );
                Err(FetchOutcome::Exhausted)
            }
        }
    }

    pub fn status(&self) -> UpstreamStatus {
        UpstreamStatus {
            upstream: self.upstream().to_string(),
            rate_limit: self.limiter.status(),
            circuit: self.breaker.status(),
            cache: self.cache.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{BreakerConfig, CacheConfig, RateLimitConfig, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Source for Flaky {
        async fn fetch(&self, _since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<UpstreamItem>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                anyhow::bail!("upstream 503");
            }
            Ok(Vec::new())
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn cfg() -> ResilienceConfig {
        ResilienceConfig {
            rate_limit: RateLimitConfig {
                max_requests: 10,
                window_ms: 1_000,
            },
            breaker: BreakerConfig {
                failure_threshold: 2,
                reset_timeout_ms: 5_000,
            },
            retry: RetryPolicy {
                retries: 1,
                delay_ms: 10,
            },
            cache: CacheConfig {
                ttl_ms: 1_000,
                max_entries: 4,
            },
            deadline_ms: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_within_one_fetch() {
        let src = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_first: 1,
        });
        let f = ResilientFetcher::new(src.clone(), &cfg());
        let r = f.fetch(None).await;
        assert_eq!(r.outcome, FetchOutcome::Fresh);
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.breaker().snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_counts_as_one_circuit_failure() {
        let src = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let f = ResilientFetcher::new(src.clone(), &cfg());

        let r1 = f.fetch(None).await;
        assert_eq!(r1.outcome, FetchOutcome::Exhausted);
        assert!(r1.items.is_empty());
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.breaker().snapshot().consecutive_failures, 1);

        let r2 = f.fetch(None).await;
        assert_eq!(r2.outcome, FetchOutcome::Exhausted);
        assert!(f.breaker().snapshot().is_open);

        let r3 = f.fetch(None).await;
        assert_eq!(r3.outcome, FetchOutcome::CircuitOpen);
        assert_eq!(src.calls.load(Ordering::SeqCst), 4);
    }
}
