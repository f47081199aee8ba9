// src/ingest/source.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

use crate::model::UpstreamItem;

/// "Fetch a page of upstream items since T". Implementations are opaque to the
/// resilience layer and must be safe to retry.
#[async_trait]
pub trait Source: Send + Sync {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<UpstreamItem>>;

    fn name(&self) -> &str;

    /// Identity of one read, used as the TTL cache key.
    fn cache_key(&self, since: Option<DateTime<Utc>>) -> String {
        match since {
            Some(ts) => format!("{}?since={}", self.name(), ts.timestamp()),
            None => format!("{}?since=", self.name()),
        }
    }
}

/// Feed that already serves normalized `UpstreamItem` JSON arrays, e.g. a collector
/// sidecar in front of the GitHub API. `since` is passed as an RFC 3339 query parameter.
pub struct HttpJsonSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpJsonSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("signal-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Source for HttpJsonSource {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<UpstreamItem>> {
        let mut req = self.client.get(&self.url);
        if let Some(ts) = since {
            req = req.query(&[("since", ts.to_rfc3339_opts(SecondsFormat::Secs, true))]);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?
            .error_for_status()
            .with_context(|| format!("feed `{}` non-2xx", self.name))?;

        let mut items: Vec<UpstreamItem> = resp
            .json()
            .await
            .with_context(|| format!("decoding feed `{}`", self.name))?;

        for it in &mut items {
            if it.source.is_empty() {
                it.source = self.name.clone();
            }
        }
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
