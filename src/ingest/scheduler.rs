// src/ingest/scheduler.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::pipeline::EventPipeline;
use crate::resilience::ResilientFetcher;

#[derive(Clone, Copy, Debug)]
pub struct CollectorCfg {
    pub interval: Duration,
    /// Initial `since` for the first pass. `None` asks upstreams for their latest page.
    pub start_since: Option<DateTime<Utc>>,
}

/// Spawn the periodic collection loop. Each fetcher keeps its own `since` watermark, which
/// advances to the newest item it served. A degraded pass leaves that fetcher's watermark
/// untouched, so whatever it missed is asked for again on the next tick.
pub fn spawn_collector(
    cfg: CollectorCfg,
    fetchers: Vec<Arc<ResilientFetcher>>,
    pipeline: Arc<EventPipeline>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut since = vec![cfg.start_since; fetchers.len()];

        loop {
            ticker.tick().await;
            let summary = super::collect_once(&fetchers, &since, &pipeline).await;
            for (mark, pass) in since.iter_mut().zip(&summary.upstreams) {
                if !pass.outcome.is_failure() && pass.newest > *mark {
                    *mark = pass.newest;
                }
            }
            tracing::debug!(
                target: "ingest",
                since = ?since,
                "collector tick"
            );
        }
    })
}
