use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

use super::Dispatcher;
use crate::model::{Priority, ScoredItem, UpstreamItem};
use crate::resilience::{RetryExecutor, RetryPolicy};

/// POSTs one JSON envelope per action to a single URL.
#[derive(Clone)]
pub struct WebhookDispatcher {
    url: String,
    client: Client,
    retry: RetryExecutor,
}

#[derive(Serialize)]
struct Envelope<'a> {
    action: &'static str,
    identity: String,
    item: &'a UpstreamItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<Analysis<'a>>,
    sent_at: String,
}

#[derive(Serialize)]
struct Analysis<'a> {
    relevance_score: u8,
    priority: Priority,
    categories: &'a BTreeSet<String>,
    is_spam: bool,
    is_breaking: bool,
    reasons: &'a [String],
}

impl<'a> Envelope<'a> {
    fn new(action: &'static str, item: &'a UpstreamItem) -> Self {
        Self {
            action,
            identity: item.identity(),
            item,
            tags: None,
            priority: None,
            analysis: None,
            sent_at: Utc::now().to_rfc3339(),
        }
    }
}

impl WebhookDispatcher {
    pub fn new(url: String, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook http client")?;
        Ok(Self {
            url,
            client,
            retry: RetryExecutor::new("webhook", retry),
        })
    }

    async fn post(&self, envelope: &Envelope<'_>) -> Result<()> {
        let client = &self.client;
        let url = self.url.as_str();
        self.retry
            .run(move || async move {
                let rsp = client
                    .post(url)
                    .json(envelope)
                    .send()
                    .await
                    .map_err(|e| anyhow!("webhook request failed: {e}"))?;
                rsp.error_for_status()
                    .map_err(|e| anyhow!("webhook HTTP error: {e}"))?;
                Ok::<_, anyhow::Error>(())
            })
            .await
            .map_err(|e| e.last.context(format!("{} after {} attempts", envelope.action, e.attempts)))
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn queue_for_review(&self, item: &UpstreamItem, tags: &BTreeSet<String>) -> Result<()> {
        let mut env = Envelope::new("queue_for_review", item);
        env.tags = Some(tags);
        self.post(&env).await
    }

    async fn send_alert(&self, item: &UpstreamItem, priority: Priority) -> Result<()> {
        let mut env = Envelope::new("send_alert", item);
        env.priority = Some(priority);
        self.post(&env).await
    }

    async fn open_tracking_record(&self, item: &UpstreamItem, analysis: &ScoredItem) -> Result<()> {
        let mut env = Envelope::new("open_tracking_record", item);
        env.analysis = Some(Analysis {
            relevance_score: analysis.relevance_score,
            priority: analysis.priority,
            categories: &analysis.categories,
            is_spam: analysis.is_spam,
            is_breaking: analysis.is_breaking,
            reasons: &analysis.reasons,
        });
        self.post(&env).await
    }
}
