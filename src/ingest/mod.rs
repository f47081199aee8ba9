// src/ingest/mod.rs
pub mod scheduler;
pub mod source;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::model::UpstreamItem;
use crate::pipeline::{EventOutcome, EventPipeline};
use crate::resilience::{FetchOutcome, ResilientFetcher};

pub use source::{HttpJsonSource, Source};

const MAX_TEXT_CHARS: usize = 1500;
const MAX_TITLE_CHARS: usize = 300;

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"))
}

/// Normalize text: decode entities, strip tags, ASCII quotes, collapse whitespace, cap length.
/// Emphasis punctuation is kept: the spam detector looks at it.
pub fn normalize_text(s: &str) -> String {
    normalize_capped(s, MAX_TEXT_CHARS)
}

fn normalize_capped(s: &str, cap: usize) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let out = re_tags()
        .replace_all(&decoded, "")
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    if out.chars().count() > cap {
        out.chars().take(cap).collect()
    } else {
        out
    }
}

/// Normalize the free-text fields of an item in place. Returns `None` for items that
/// cannot be deduplicated (blank id).
pub fn normalize_item(mut item: UpstreamItem) -> Option<UpstreamItem> {
    item.id = item.id.trim().to_string();
    if item.id.is_empty() {
        return None;
    }
    item.source = item.source.trim().to_ascii_lowercase();
    item.text = normalize_text(&item.text);
    item.title = item
        .title
        .as_deref()
        .map(|t| normalize_capped(t, MAX_TITLE_CHARS))
        .filter(|t| !t.is_empty());
    item.url = item.url.trim().to_string();
    Some(item)
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamPass {
    pub upstream: String,
    pub outcome: FetchOutcome,
    pub items: usize,
    /// Newest item timestamp this upstream served in the pass.
    pub newest: Option<DateTime<Utc>>,
}

/// Result of one collection pass over all upstreams.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectSummary {
    pub upstreams: Vec<UpstreamPass>,
    pub filtered: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub dispatched: usize,
    /// Newest item timestamp seen in this pass.
    pub newest: Option<DateTime<Utc>>,
}

/// Fetch every upstream concurrently (each through its own resilience stack), then feed
/// the normalized items through the pipeline in upstream order.
///
/// `since[i]` is the watermark for `fetchers[i]`; a missing entry fetches the latest page.
/// `summary.upstreams` keeps the order of `fetchers`.
pub async fn collect_once(
    fetchers: &[Arc<ResilientFetcher>],
    since: &[Option<DateTime<Utc>>],
    pipeline: &EventPipeline,
) -> CollectSummary {
    crate::metrics::ensure_described();

    let reports = join_all(
        fetchers
            .iter()
            .enumerate()
            .map(|(i, f)| f.fetch(since.get(i).copied().flatten())),
    )
    .await;

    let mut summary = CollectSummary::default();
    for report in reports {
        if report.outcome.is_failure() {
            tracing::warn!(
                target: "ingest",
                upstream = %report.upstream,
                outcome = report.outcome.as_str(),
                "upstream degraded, nothing collected"
            );
        }
        let newest = report.items.iter().map(|it| it.timestamp).max();
        summary.newest = summary.newest.max(newest);
        summary.upstreams.push(UpstreamPass {
            upstream: report.upstream.clone(),
            outcome: report.outcome,
            items: report.items.len(),
            newest,
        });

        for mut raw in report.items {
            if raw.source.is_empty() {
                raw.source = report.upstream.clone();
            }
            let Some(item) = normalize_item(raw) else {
                summary.filtered += 1;
                continue;
            };
            match pipeline.process(item).await {
                EventOutcome::Duplicate { .. } => summary.duplicates += 1,
                EventOutcome::Dropped { .. } => summary.dropped += 1,
                EventOutcome::Dispatched { .. } => summary.dispatched += 1,
            }
        }
    }

    counter!("ingest_runs_total").increment(1);
    gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

    tracing::info!(
        target: "ingest",
        upstreams = summary.upstreams.len(),
        filtered = summary.filtered,
        duplicates = summary.duplicates,
        dropped = summary.dropped,
        dispatched = summary.dispatched,
        "collection pass done"
    );
    summary
}
