// src/routing.rs
use serde::{Deserialize, Serialize};

use crate::model::{Priority, ScoredItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Items scoring below this are dropped without any action.
    pub min_score: u8,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { min_score: 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    QueueForReview,
    SendAlert,
    OpenTrackingRecord,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::QueueForReview => "queue_for_review",
            Action::SendAlert => "send_alert",
            Action::OpenTrackingRecord => "open_tracking_record",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "actions", rename_all = "snake_case")]
pub enum RouteDecision {
    Drop,
    Dispatch(Vec<Action>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityRouter {
    cfg: RoutingConfig,
}

impl PriorityRouter {
    pub fn new(cfg: RoutingConfig) -> Self {
        Self { cfg }
    }

    pub fn min_score(&self) -> u8 {
        self.cfg.min_score
    }

    /// Every scored item maps to exactly one decision. Action order:
    /// review queue, then alert, then tracking record.
    pub fn route(&self, scored: &ScoredItem) -> RouteDecision {
        if scored.relevance_score < self.cfg.min_score {
            return RouteDecision::Drop;
        }
        let mut actions = Vec::with_capacity(3);
        if scored.priority >= Priority::Medium {
            actions.push(Action::QueueForReview);
        }
        if matches!(scored.priority, Priority::High | Priority::Breaking) {
            actions.push(Action::SendAlert);
        }
        actions.push(Action::OpenTrackingRecord);
        RouteDecision::Dispatch(actions)
    }
}
