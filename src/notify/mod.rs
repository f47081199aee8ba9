//! Outbound dispatch channels.
//!
//! A `Dispatcher` receives the router's actions for one item. Delivery is best-effort:
//! a failed action is reported to the caller and never retried by the pipeline.

pub mod log;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::{Priority, ScoredItem, UpstreamItem};
use crate::resilience::RetryPolicy;
use crate::routing::Action;

pub use self::log::LogDispatcher;
pub use self::webhook::WebhookDispatcher;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &str;

    async fn queue_for_review(&self, item: &UpstreamItem, tags: &BTreeSet<String>) -> Result<()>;

    async fn send_alert(&self, item: &UpstreamItem, priority: Priority) -> Result<()>;

    async fn open_tracking_record(&self, item: &UpstreamItem, analysis: &ScoredItem) -> Result<()>;
}

/// Route one action to the matching dispatcher method.
pub async fn dispatch_action(
    dispatcher: &dyn Dispatcher,
    action: Action,
    scored: &ScoredItem,
) -> Result<()> {
    match action {
        Action::QueueForReview => {
            dispatcher
                .queue_for_review(&scored.item, &scored.categories)
                .await
        }
        Action::SendAlert => dispatcher.send_alert(&scored.item, scored.priority).await,
        Action::OpenTrackingRecord => dispatcher.open_tracking_record(&scored.item, scored).await,
    }
}

/// `[dispatch]` section. Without a webhook URL, actions are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub webhook_url: Option<String>,
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: 5_000,
            retry: RetryPolicy {
                retries: 2,
                delay_ms: 500,
            },
        }
    }
}

/// Pick the configured channel.
pub fn from_config(cfg: &DispatchConfig) -> Result<Box<dyn Dispatcher>> {
    match cfg.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Box::new(WebhookDispatcher::new(
            url.to_string(),
            std::time::Duration::from_millis(cfg.timeout_ms),
            cfg.retry,
        )?)),
        _ => Ok(Box::new(LogDispatcher::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_webhook_means_log_dispatcher() {
        let d = from_config(&DispatchConfig::default()).unwrap();
        assert_eq!(d.name(), "log");

        let d = from_config(&DispatchConfig {
            webhook_url: Some("  ".into()),
            ..DispatchConfig::default()
        })
        .unwrap();
        assert_eq!(d.name(), "log");

        let d = from_config(&DispatchConfig {
            webhook_url: Some("http://127.0.0.1:9/hook".into()),
            ..DispatchConfig::default()
        })
        .unwrap();
        assert_eq!(d.name(), "webhook");
    }
}
