// tests/orchestrator_batches.rs
//
// Batch isolation and ordering, plus a `fetch` plan over real fetchers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use signal_relay::ingest::Source;
use signal_relay::model::{SourceType, UpstreamItem};
use signal_relay::orchestrator::{
    from_fn, BatchOrchestrator, FetchOperation, OperationOutcome, OperationPlan, OperationRegistry,
    OperationSpec,
};
use signal_relay::resilience::{BreakerConfig, ResilienceConfig, ResilientFetcher, RetryPolicy};

#[tokio::test]
async fn failing_sibling_does_not_block_batch_or_later_batches() {
    let order = Arc::new(Mutex::new(Vec::<String>::new()));

    let mut reg = OperationRegistry::new();
    let o = Arc::clone(&order);
    reg.register(
        "ok",
        from_fn(move |p: Value| {
            let o = Arc::clone(&o);
            async move {
                let tag = p["tag"].as_str().unwrap_or_default().to_string();
                o.lock().push(tag.clone());
                Ok(json!({ "tag": tag }))
            }
        }),
    );
    reg.register(
        "boom",
        from_fn(|_| async { Err(anyhow!("mailchimp 500")) }),
    );
    reg.register(
        "panic",
        from_fn(|_| async {
            if true {
                panic!("handler bug");
            }
            Ok(Value::Null)
        }),
    );

    let plan = OperationPlan::new()
        .parallel(vec![
            OperationSpec::new("mailchimp", "boom", Value::Null),
            OperationSpec::new("figma", "ok", json!({ "tag": "b1" })),
            OperationSpec::new("runway", "panic", Value::Null),
        ])
        .parallel(vec![OperationSpec::new("digest", "ok", json!({ "tag": "b2" }))]);

    let report = BatchOrchestrator::new(Arc::new(reg))
        .run(&plan, None)
        .await
        .expect("valid plan");

    assert_eq!(report.results.len(), 4);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 2);
    assert!(!report.is_success());
    assert!(matches!(
        report.get("mailchimp"),
        Some(OperationOutcome::Failed { error }) if error.contains("mailchimp 500")
    ));
    assert!(matches!(
        report.get("runway"),
        Some(OperationOutcome::Failed { error }) if error.contains("panicked")
    ));
    assert_eq!(
        report.get("figma"),
        Some(&OperationOutcome::Succeeded {
            value: json!({ "tag": "b1" })
        })
    );
    assert_eq!(*order.lock(), vec!["b1".to_string(), "b2".to_string()]);
}

#[tokio::test]
async fn report_serializes_by_name() {
    let mut reg = OperationRegistry::new();
    reg.register("echo", from_fn(|p| async move { Ok(p) }));
    let plan: OperationPlan = serde_json::from_value(json!({
        "batches": [ { "operations": [ { "name": "a", "kind": "echo", "params": 7 } ] } ]
    }))
    .unwrap();
    let report = BatchOrchestrator::new(Arc::new(reg))
        .run(&plan, None)
        .await
        .unwrap();
    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["results"]["a"]["status"], "succeeded");
    assert_eq!(v["results"]["a"]["value"], 7);
    assert_eq!(v["succeeded"], 1);
}

struct CountingSource {
    name: &'static str,
    fail: bool,
    calls: AtomicU32,
}

#[async_trait]
impl Source for CountingSource {
    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<UpstreamItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("{} unreachable", self.name);
        }
        Ok(vec![UpstreamItem {
            id: "c0ffee".into(),
            source: String::new(),
            source_type: SourceType::Commit,
            title: None,
            text: "refactor webhook integration".into(),
            timestamp: Utc::now(),
            url: String::new(),
            author: None,
            engagement: None,
        }])
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[tokio::test(start_paused = true)]
async fn fetch_plan_reports_per_upstream() {
    let cfg = ResilienceConfig {
        retry: RetryPolicy {
            retries: 0,
            delay_ms: 0,
        },
        breaker: BreakerConfig {
            failure_threshold: 1,
            reset_timeout_ms: 60_000,
        },
        ..ResilienceConfig::default()
    };
    let good = Arc::new(ResilientFetcher::new(
        Arc::new(CountingSource {
            name: "github",
            fail: false,
            calls: AtomicU32::new(0),
        }),
        &cfg,
    ));
    let bad = Arc::new(ResilientFetcher::new(
        Arc::new(CountingSource {
            name: "figma",
            fail: true,
            calls: AtomicU32::new(0),
        }),
        &cfg,
    ));

    let mut reg = OperationRegistry::new();
    reg.register("fetch", Arc::new(FetchOperation::new([good, bad])));

    let plan = OperationPlan::new().parallel(vec![
        OperationSpec::new("gh", "fetch", json!({ "upstream": "github" })),
        OperationSpec::new("fg", "fetch", json!({ "upstream": "figma" })),
        OperationSpec::new("nope", "fetch", json!({ "upstream": "runway" })),
        OperationSpec::new("bad-since", "fetch", json!({ "upstream": "github", "since": "yesterday" })),
    ]);
    let report = BatchOrchestrator::new(Arc::new(reg))
        .run(&plan, None)
        .await
        .unwrap();

    assert_eq!(
        report.get("gh"),
        Some(&OperationOutcome::Succeeded {
            value: json!({ "upstream": "github", "outcome": "fresh", "items": 1 })
        })
    );
    for (name, needle) in [("fg", "exhausted"), ("nope", "unknown upstream"), ("bad-since", "since")] {
        match report.get(name) {
            Some(OperationOutcome::Failed { error }) => {
                assert!(error.contains(needle), "{name}: {error}")
            }
            other => panic!("{name}: unexpected {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn relay_fetch_plan_feeds_the_pipeline() {
    let cfg = signal_relay::AppConfig::from_toml_str(
        r#"
        [upstreams.github]
        url = "http://127.0.0.1:1/unused"
        [upstreams.github.rate_limit]
        max_requests = 7
        window_ms = 1000
        "#,
    )
    .unwrap();
    let src: Arc<dyn Source> = Arc::new(CountingSource {
        name: "github",
        fail: false,
        calls: AtomicU32::new(0),
    });
    let relay = signal_relay::Relay::with_parts(
        cfg,
        vec![src],
        Arc::new(signal_relay::notify::LogDispatcher::new()),
    )
    .unwrap();
    assert_eq!(relay.limiters.get_or_create("github").status().max_requests, 7);

    let plan = OperationPlan::new().sequential(vec![
        OperationSpec::new("first", "fetch", json!({ "upstream": "github", "since": "2025-09-01T00:00:00Z" })),
        OperationSpec::new("again", "fetch", json!({ "upstream": "github" })),
    ]);
    let report = relay.orchestrator.run(&plan, relay.plan_deadline()).await.unwrap();
    assert!(report.is_success());
    // commit base 5 + technical 10 x3 = 35 clears the default min score.
    assert_eq!(
        report.get("first"),
        Some(&OperationOutcome::Succeeded {
            value: json!({
                "upstream": "github", "outcome": "fresh", "items": 1,
                "dispatched": 1, "duplicates": 0, "dropped": 0
            })
        })
    );
    match report.get("again") {
        Some(OperationOutcome::Succeeded { value }) => assert_eq!(value["duplicates"], 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn sources_sharing_an_upstream_share_its_budget() {
    let cfg = signal_relay::AppConfig::from_toml_str(
        r#"
        [upstreams.github]
        url = "http://127.0.0.1:1/unused"
        [upstreams.github.rate_limit]
        max_requests = 1
        window_ms = 60000
        "#,
    )
    .unwrap();
    let sources: Vec<Arc<dyn Source>> = vec![
        Arc::new(CountingSource {
            name: "github",
            fail: false,
            calls: AtomicU32::new(0),
        }),
        Arc::new(CountingSource {
            name: "github",
            fail: false,
            calls: AtomicU32::new(0),
        }),
    ];
    let relay = signal_relay::Relay::with_parts(
        cfg,
        sources,
        Arc::new(signal_relay::notify::LogDispatcher::new()),
    )
    .unwrap();
    assert_eq!(relay.fetchers.len(), 2);
    assert!(std::ptr::eq(
        relay.fetchers[0].breaker(),
        relay.fetchers[1].breaker()
    ));

    assert!(relay.fetchers[1].limiter().can_acquire());
    relay.fetchers[0].fetch(None).await;
    assert!(!relay.fetchers[1].limiter().can_acquire());
    assert_eq!(relay.limiters.get_or_create("github").status().max_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_step_covers_every_source_behind_a_name() {
    let cfg = ResilienceConfig::default();
    let fetchers = ["github", "github", "figma"].map(|name| {
        Arc::new(ResilientFetcher::new(
            Arc::new(CountingSource {
                name,
                fail: false,
                calls: AtomicU32::new(0),
            }),
            &cfg,
        ))
    });

    let mut reg = OperationRegistry::new();
    reg.register("fetch", Arc::new(FetchOperation::new(fetchers)));
    let plan = OperationPlan::new().parallel(vec![OperationSpec::new(
        "gh",
        "fetch",
        json!({ "upstream": "github" }),
    )]);
    let report = BatchOrchestrator::new(Arc::new(reg))
        .run(&plan, None)
        .await
        .unwrap();
    assert_eq!(
        report.get("gh"),
        Some(&OperationOutcome::Succeeded {
            value: json!({ "upstream": "github", "outcome": "fresh", "items": 2 })
        })
    );
}
