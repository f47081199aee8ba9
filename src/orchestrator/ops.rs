// src/orchestrator/ops.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::ingest::normalize_item;
use crate::pipeline::{EventOutcome, EventPipeline};
use crate::resilience::{FetchOutcome, ResilientFetcher};

/// A plan step. `params` is the opaque JSON from the plan; the returned value is recorded
/// as the step's success value.
#[async_trait]
pub trait Operation: Send + Sync {
    async fn run(&self, params: &Value) -> Result<Value>;
}

struct FnOperation<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn run(&self, params: &Value) -> Result<Value> {
        (self.f)(params.clone()).await
    }
}

/// Wrap an async closure as an `Operation`.
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Operation>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnOperation { f })
}

/// Handlers by `kind`.
#[derive(Default, Clone)]
pub struct OperationRegistry {
    ops: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, op: Arc<dyn Operation>) -> &mut Self {
        self.ops.insert(kind.into(), op);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Operation>> {
        self.ops.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut k: Vec<_> = self.ops.keys().cloned().collect();
        k.sort();
        k
    }
}

/// `kind = "fetch"`. Params: `{ "upstream": "<name>", "since": "<RFC 3339>"? }`.
///
/// Runs one upstream through its resilience stack. With a pipeline attached, the page is
/// also pushed through dedup/score/route. A degraded upstream (circuit open, retries
/// exhausted, deadline) is reported as a failure of this operation.
pub struct FetchOperation {
    /// Every fetcher behind an upstream name; one `fetch` step runs them all.
    fetchers: HashMap<String, Vec<Arc<ResilientFetcher>>>,
    pipeline: Option<Arc<EventPipeline>>,
}

impl FetchOperation {
    pub fn new(fetchers: impl IntoIterator<Item = Arc<ResilientFetcher>>) -> Self {
        let mut by_name: HashMap<String, Vec<Arc<ResilientFetcher>>> = HashMap::new();
        for f in fetchers {
            by_name.entry(f.upstream().to_string()).or_default().push(f);
        }
        Self {
            fetchers: by_name,
            pipeline: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline: Arc<EventPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

#[async_trait]
impl Operation for FetchOperation {
    async fn run(&self, params: &Value) -> Result<Value> {
        let upstream = params
            .get("upstream")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("fetch: missing string param `upstream`"))?;
        let fetchers = self
            .fetchers
            .get(upstream)
            .ok_or_else(|| anyhow!("fetch: unknown upstream `{upstream}`"))?;
        let since = match params.get("since").and_then(Value::as_str) {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(s)
                    .with_context(|| format!("fetch: bad `since` {s:?}"))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let reports = join_all(fetchers.iter().map(|f| f.fetch(since))).await;
        if let Some(bad) = reports.iter().find(|r| r.outcome.is_failure()) {
            return Err(anyhow!(
                "upstream `{}` degraded: {}",
                bad.upstream,
                bad.outcome.as_str()
            ));
        }
        let outcome = if reports.iter().all(|r| r.outcome == FetchOutcome::Cached) {
            FetchOutcome::Cached
        } else {
            FetchOutcome::Fresh
        };
        let items: Vec<_> = reports.into_iter().flat_map(|r| r.items).collect();

        let mut out = json!({
            "upstream": upstream,
            "outcome": outcome,
            "items": items.len(),
        });

        if let Some(pipeline) = &self.pipeline {
            let (mut dispatched, mut duplicates, mut dropped) = (0u64, 0u64, 0u64);
            for mut raw in items {
                if raw.source.is_empty() {
                    raw.source = upstream.to_string();
                }
                let Some(item) = normalize_item(raw) else {
                    continue;
                };
                match pipeline.process(item).await {
                    EventOutcome::Dispatched { .. } => dispatched += 1,
                    EventOutcome::Duplicate { .. } => duplicates += 1,
                    EventOutcome::Dropped { .. } => dropped += 1,
                }
            }
            out["dispatched"] = json!(dispatched);
            out["duplicates"] = json!(duplicates);
            out["dropped"] = json!(dropped);
        }
        Ok(out)
    }
}
