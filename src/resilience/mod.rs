// src/resilience/mod.rs
// Per-upstream call protection: rate window, circuit breaker, retry, TTL cache, and the
// fetcher that stacks them.

pub mod cache;
pub mod circuit;
pub mod fetcher;
pub mod rate_limit;
pub mod retry;

use serde::{Deserialize, Serialize};

pub use cache::{CacheConfig, CacheStatus, TtlCache};
pub use circuit::{BreakerConfig, CircuitBreaker, CircuitError, CircuitState, CircuitStatus};
pub use fetcher::{FetchOutcome, FetchReport, PageCache, ResilientFetcher, UpstreamStatus};
pub use rate_limit::{LimiterRegistry, RateLimitConfig, RateLimiter, RateLimiterStatus};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};

/// Everything a `ResilientFetcher` needs, as read from `[defaults]` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    /// Bounds rate-wait + retries for one logical fetch. `None` = unbounded.
    pub deadline_ms: Option<u64>,
}
