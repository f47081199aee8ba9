//! Per-event decision path: dedup → score → route → dispatch.
//!
//! The identity is admitted *before* scoring and dispatch, so a second delivery of the same
//! item is rejected even if the first one's actions failed. That is the at-most-once
//! guarantee; downstream delivery itself is best-effort.

use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::analyze::ContentScorer;
use crate::dedup::Deduplicator;
use crate::model::{Priority, UpstreamItem};
use crate::notify::{dispatch_action, Dispatcher};
use crate::routing::{Action, PriorityRouter, RouteDecision};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub action: Action,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Duplicate {
        identity: String,
    },
    Dropped {
        identity: String,
        score: u8,
        priority: Priority,
    },
    Dispatched {
        identity: String,
        score: u8,
        priority: Priority,
        actions: Vec<ActionResult>,
    },
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Duplicate { .. } => "duplicate",
            EventOutcome::Dropped { .. } => "dropped",
            EventOutcome::Dispatched { .. } => "dispatched",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub processed: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub dispatched: u64,
    pub dispatch_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    duplicates: AtomicU64,
    dropped: AtomicU64,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
}

pub struct EventPipeline {
    dedup: Arc<Deduplicator>,
    scorer: Arc<ContentScorer>,
    router: PriorityRouter,
    dispatcher: Arc<dyn Dispatcher>,
    counters: Counters,
}

impl EventPipeline {
    pub fn new(
        dedup: Arc<Deduplicator>,
        scorer: Arc<ContentScorer>,
        router: PriorityRouter,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            dedup,
            scorer,
            router,
            dispatcher,
            counters: Counters::default(),
        }
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Process one normalized item. Never fails: dispatch errors are reported per action.
    pub async fn process(&self, item: UpstreamItem) -> EventOutcome {
        crate::metrics::ensure_described();
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        let identity = item.identity();

        if !self.dedup.check_and_admit(&identity) {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            counter!("pipeline_events_total", "outcome" => "duplicate").increment(1);
            tracing::debug!(target: "pipeline", identity = %identity, "duplicate, skipped");
            return EventOutcome::Duplicate { identity };
        }

        let scored = self.scorer.score(&item);
        let score = scored.relevance_score;
        let priority = scored.priority;

        let actions = match self.router.route(&scored) {
            RouteDecision::Drop => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                counter!("pipeline_events_total", "outcome" => "dropped").increment(1);
                tracing::debug!(
                    target: "pipeline",
                    identity = %identity,
                    score,
                    spam = scored.is_spam,
                    "below min score, dropped"
                );
                return EventOutcome::Dropped {
                    identity,
                    score,
                    priority,
                };
            }
            RouteDecision::Dispatch(actions) => actions,
        };

        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            let res = dispatch_action(self.dispatcher.as_ref(), action, &scored).await;
            match res {
                Ok(()) => results.push(ActionResult {
                    action,
                    ok: true,
                    error: None,
                }),
                Err(e) => {
                    self.counters
                        .dispatch_failures
                        .fetch_add(1, Ordering::Relaxed);
                    counter!("dispatch_failures_total", "action" => action.as_str()).increment(1);
                    tracing::warn!(
                        target: "pipeline",
                        identity = %identity,
                        action = action.as_str(),
                        dispatcher = self.dispatcher.name(),
                        error = %e,
                        "dispatch action failed"
                    );
                    results.push(ActionResult {
                        action,
                        ok: false,
                        error: Some(format!("{e:#}")),
                    });
                }
            }
        }

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        counter!("pipeline_events_total", "outcome" => "dispatched").increment(1);
        tracing::info!(
            target: "pipeline",
            identity = %identity,
            text_hash = %crate::anon_hash(&item.text),
            score,
            priority = %priority,
            breaking = scored.is_breaking,
            actions = results.len(),
            "event dispatched"
        );

        EventOutcome::Dispatched {
            identity,
            score,
            priority,
            actions: results,
        }
    }

    /// Sequential, in input order.
    pub async fn process_all(&self, items: Vec<UpstreamItem>) -> Vec<EventOutcome> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.process(item).await);
        }
        out
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            processed: c.processed.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            dispatch_failures: c.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}
