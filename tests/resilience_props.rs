// tests/resilience_props.rs
//
// Behavioral properties of the resilience primitives, on a paused tokio clock:
// - rate bound holds for any trailing window, even with concurrent callers
// - circuit opens after exactly `failure_threshold` failures and stops calling
// - circuit self-heals after the reset timeout
// - retry count is bounded by `retries + 1`

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use signal_relay::resilience::{
    BreakerConfig, CircuitBreaker, CircuitError, RateLimitConfig, RateLimiter, RetryExecutor,
    RetryPolicy,
};

#[tokio::test(start_paused = true)]
async fn rate_bound_holds_for_every_trailing_window() {
    let limiter = Arc::new(RateLimiter::new(
        "github",
        RateLimitConfig {
            max_requests: 5,
            window_ms: 1_000,
        },
    ));
    let admitted = Arc::new(Mutex::new(Vec::<Instant>::new()));

    let mut tasks = Vec::new();
    for _ in 0..23 {
        let l = Arc::clone(&limiter);
        let log = Arc::clone(&admitted);
        tasks.push(tokio::spawn(async move {
            l.acquire().await;
            log.lock().push(Instant::now());
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    let mut times = admitted.lock().clone();
    times.sort();
    assert_eq!(times.len(), 23);
    for (i, start) in times.iter().enumerate() {
        let in_window = times[i..]
            .iter()
            .take_while(|t| t.duration_since(*start) < Duration::from_millis(1_000))
            .count();
        assert!(in_window <= 5, "window starting at #{i} admitted {in_window}");
    }
    // 23 calls at 5/s: the last batch starts at 4s.
    assert_eq!(
        times.last().unwrap().duration_since(times[0]),
        Duration::from_millis(4_000)
    );
}

#[tokio::test(start_paused = true)]
async fn circuit_opens_after_threshold_and_stops_calling() {
    let breaker = CircuitBreaker::new(
        "x",
        BreakerConfig {
            failure_threshold: 3,
            reset_timeout_ms: 10_000,
        },
    );
    let calls = AtomicU32::new(0);

    for _ in 0..10 {
        let _ = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("503")
            })
            .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(breaker.snapshot().is_open);
    assert_eq!(breaker.status().state, "open");
}

#[tokio::test(start_paused = true)]
async fn circuit_self_heals_after_reset_timeout() {
    let breaker = CircuitBreaker::new(
        "x",
        BreakerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 5_000,
        },
    );
    for _ in 0..2 {
        let _ = breaker.execute(|| async { Err::<(), _>("down") }).await;
    }

    tokio::time::advance(Duration::from_millis(4_000)).await;
    let early: Result<u32, CircuitError<&str>> = breaker.execute(|| async { Ok(1) }).await;
    assert!(early.unwrap_err().is_open());

    tokio::time::advance(Duration::from_millis(1_001)).await;
    let healed: Result<u32, CircuitError<&str>> = breaker.execute(|| async { Ok(2) }).await;
    assert_eq!(healed.unwrap(), 2);
    let st = breaker.snapshot();
    assert!(!st.is_open);
    assert_eq!(st.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_at_cooldown_get_a_single_probe() {
    let breaker = Arc::new(CircuitBreaker::new(
        "x",
        BreakerConfig {
            failure_threshold: 1,
            reset_timeout_ms: 100,
        },
    ));
    let _ = breaker.execute(|| async { Err::<(), _>("down") }).await;
    tokio::time::advance(Duration::from_millis(150)).await;

    let calls = Arc::new(AtomicU32::new(0));
    let mut tasks = Vec::new();
    for _ in 0..5 {
        let b = Arc::clone(&breaker);
        let c = Arc::clone(&calls);
        tasks.push(tokio::spawn(async move {
            b.execute(|| async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, String>(())
            })
            .await
            .is_ok()
        }));
    }
    let mut ok = 0;
    for t in tasks {
        if t.await.unwrap() {
            ok += 1;
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ok, 1);
    assert!(!breaker.snapshot().is_open);
}

#[tokio::test(start_paused = true)]
async fn retry_two_means_three_calls_then_fallback() {
    let calls = AtomicU32::new(0);
    let exec = RetryExecutor::new(
        "figma",
        RetryPolicy {
            retries: 2,
            delay_ms: 50,
        },
    );
    let v = exec
        .run_or_else(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Vec<u8>, _>("timeout")
            },
            |_| Vec::new(),
        )
        .await;
    assert!(v.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let err = exec
        .run(|| async { Err::<(), _>("timeout") })
        .await
        .unwrap_err();
    assert_eq!(err.attempts, 3);
}
