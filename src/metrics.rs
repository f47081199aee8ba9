use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics before the first event).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "fetch_total",
            "Upstream fetches by upstream and outcome (fresh/cached/circuit_open/exhausted/deadline_exceeded)."
        );
        describe_histogram!(
            "fetch_duration_ms",
            "Uncached fetch time in milliseconds, rate-limit wait included."
        );
        describe_counter!(
            "retry_attempt_failures_total",
            "Individual failed attempts seen by a retry executor."
        );
        describe_counter!("circuit_open_total", "Closed -> open transitions.");
        describe_counter!(
            "circuit_rejections_total",
            "Calls short-circuited by an open breaker."
        );
        describe_counter!(
            "pipeline_events_total",
            "Events through the pipeline by outcome (duplicate/dropped/dispatched)."
        );
        describe_counter!("dispatch_failures_total", "Dispatch actions that failed.");
        describe_counter!(
            "orchestrator_operations_total",
            "Plan operations by outcome (succeeded/failed)."
        );
        describe_counter!("ingest_runs_total", "Collection passes completed.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the collection pass last ran."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if another recorder is already set.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }
}
