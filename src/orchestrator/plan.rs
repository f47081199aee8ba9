//! Declarative plans: ordered batches of named operations.
//!
//! JSON:
//! ```json
//! { "batches": [
//!     { "mode": "parallel", "operations": [
//!         { "name": "gh", "kind": "fetch", "params": { "upstream": "github" } },
//!         { "name": "x",  "kind": "fetch", "params": { "upstream": "x" } } ] },
//!     { "mode": "sequential", "operations": [
//!         { "name": "report", "kind": "summary" } ] } ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// All operations start together; the batch ends when every one has settled.
    #[default]
    Parallel,
    /// One after another, in listed order. A failure still does not stop the next one.
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Unique within the plan; results are keyed by it.
    pub name: String,
    /// Handler key in the `OperationRegistry`.
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationPlan {
    #[serde(default)]
    pub batches: Vec<Batch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("batch {batch}: operation #{index} has an empty name")]
    EmptyName { batch: usize, index: usize },
    #[error("operation `{0}` has an empty kind")]
    EmptyKind(String),
    #[error("operation name `{0}` is used more than once")]
    DuplicateName(String),
}

impl OperationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parallel(mut self, operations: Vec<OperationSpec>) -> Self {
        self.batches.push(Batch {
            mode: ExecutionMode::Parallel,
            operations,
        });
        self
    }

    pub fn sequential(mut self, operations: Vec<OperationSpec>) -> Self {
        self.batches.push(Batch {
            mode: ExecutionMode::Sequential,
            operations,
        });
        self
    }

    pub fn operation_count(&self) -> usize {
        self.batches.iter().map(|b| b.operations.len()).sum()
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let mut names = HashSet::new();
        for (bi, batch) in self.batches.iter().enumerate() {
            for (oi, op) in batch.operations.iter().enumerate() {
                if op.name.trim().is_empty() {
                    return Err(PlanError::EmptyName {
                        batch: bi,
                        index: oi,
                    });
                }
                if op.kind.trim().is_empty() {
                    return Err(PlanError::EmptyKind(op.name.clone()));
                }
                if !names.insert(op.name.as_str()) {
                    return Err(PlanError::DuplicateName(op.name.clone()));
                }
            }
        }
        Ok(())
    }
}
