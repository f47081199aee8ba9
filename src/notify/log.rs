use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

use super::Dispatcher;
use crate::model::{Priority, ScoredItem, UpstreamItem};

/// Emits one structured log line per action. Item text is never logged.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

impl LogDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn queue_for_review(&self, item: &UpstreamItem, tags: &BTreeSet<String>) -> Result<()> {
        tracing::info!(
            target: "pipeline",
            action = "queue_for_review",
            identity = %item.identity(),
            tags = ?tags,
            url = %item.url,
            "dispatch"
        );
        Ok(())
    }

    async fn send_alert(&self, item: &UpstreamItem, priority: Priority) -> Result<()> {
        tracing::warn!(
            target: "pipeline",
            action = "send_alert",
            identity = %item.identity(),
            priority = %priority,
            url = %item.url,
            "dispatch"
        );
        Ok(())
    }

    async fn open_tracking_record(&self, item: &UpstreamItem, analysis: &ScoredItem) -> Result<()> {
        tracing::info!(
            target: "pipeline",
            action = "open_tracking_record",
            identity = %item.identity(),
            text_hash = %crate::anon_hash(&item.text),
            score = analysis.relevance_score,
            priority = %analysis.priority,
            spam = analysis.is_spam,
            "dispatch"
        );
        Ok(())
    }
}
