//! Runs an `OperationPlan`: batches in order, operations in a batch concurrently
//! (or one by one for `sequential` batches).
//!
//! Every operation runs in its own task, so an error or a panic in one never touches its
//! siblings or later batches. The orchestrator itself only fails on an invalid plan.

pub mod ops;
pub mod plan;

use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub use ops::{from_fn, FetchOperation, Operation, OperationRegistry};
pub use plan::{Batch, ExecutionMode, OperationPlan, OperationSpec, PlanError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    Succeeded { value: Value },
    Failed { error: String },
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Succeeded { .. })
    }

    fn failed(error: impl Into<String>) -> Self {
        OperationOutcome::Failed {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Outcome per operation name.
    pub results: BTreeMap<String, OperationOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// True when every operation succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn get(&self, name: &str) -> Option<&OperationOutcome> {
        self.results.get(name)
    }

    fn record(&mut self, name: String, outcome: OperationOutcome) {
        let label = if outcome.is_success() {
            self.succeeded += 1;
            "succeeded"
        } else {
            self.failed += 1;
            "failed"
        };
        counter!("orchestrator_operations_total", "outcome" => label).increment(1);
        self.results.insert(name, outcome);
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    registry: Arc<OperationRegistry>,
}

impl BatchOrchestrator {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Execute `plan`. With a `deadline`, operations still running when it passes, and
    /// operations of batches that would start after it, are recorded as failures.
    pub async fn run(
        &self,
        plan: &OperationPlan,
        deadline: Option<Duration>,
    ) -> Result<RunReport, PlanError> {
        plan.validate()?;
        crate::metrics::ensure_described();

        let started = Instant::now();
        let deadline_at = deadline.map(|d| started + d);
        let mut report = RunReport::default();

        for (bi, batch) in plan.batches.iter().enumerate() {
            if deadline_at.is_some_and(|at| Instant::now() >= at) {
                for op in &batch.operations {
                    report.record(
                        op.name.clone(),
                        OperationOutcome::failed("deadline exceeded before start"),
                    );
                }
                continue;
            }

            let outcomes = match batch.mode {
                ExecutionMode::Parallel => {
                    join_all(
                        batch
                            .operations
                            .iter()
                            .map(|op| self.run_one(op, deadline_at)),
                    )
                    .await
                }
                ExecutionMode::Sequential => {
                    let mut out = Vec::with_capacity(batch.operations.len());
                    for op in &batch.operations {
                        out.push(self.run_one(op, deadline_at).await);
                    }
                    out
                }
            };

            let failed = outcomes.iter().filter(|o| !o.is_success()).count();
            tracing::info!(
                target: "pipeline",
                batch = bi,
                mode = ?batch.mode,
                operations = outcomes.len(),
                failed,
                "batch settled"
            );
            for (op, outcome) in batch.operations.iter().zip(outcomes) {
                report.record(op.name.clone(), outcome);
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn run_one(&self, spec: &OperationSpec, deadline_at: Option<Instant>) -> OperationOutcome {
        let Some(op) = self.registry.get(&spec.kind) else {
            return OperationOutcome::failed(format!("unknown operation kind `{}`", spec.kind));
        };
        let params = spec.params.clone();
        let mut handle = tokio::spawn(async move { op.run(&params).await });

        let joined = match deadline_at {
            Some(at) => match tokio::time::timeout_at(at, &mut handle).await {
                Ok(j) => j,
                Err(_) => {
                    handle.abort();
                    tracing::warn!(
                        target: "pipeline",
                        operation = %spec.name,
                        "operation timed out"
                    );
                    return OperationOutcome::failed("deadline exceeded");
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(value)) => OperationOutcome::Succeeded { value },
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "pipeline",
                    operation = %spec.name,
                    kind = %spec.kind,
                    error = %e,
                    "operation failed"
                );
                OperationOutcome::failed(format!("{e:#}"))
            }
            Err(join_err) => {
                tracing::error!(
                    target: "pipeline",
                    operation = %spec.name,
                    error = %join_err,
                    "operation task aborted"
                );
                OperationOutcome::failed(format!("operation panicked: {join_err}"))
            }
        }
    }
}
