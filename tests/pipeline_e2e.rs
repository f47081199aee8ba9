// tests/pipeline_e2e.rs
//
// Dedup → score → route → dispatch, end to end, with a recording dispatcher.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use signal_relay::analyze::{ContentScorer, ScoringConfig};
use signal_relay::dedup::{DedupConfig, Deduplicator};
use signal_relay::model::{
    AuthorMeta, EngagementMeta, Priority, ScoredItem, SourceType, UpstreamItem,
};
use signal_relay::notify::Dispatcher;
use signal_relay::pipeline::{EventOutcome, EventPipeline};
use signal_relay::routing::{Action, PriorityRouter, RoutingConfig};

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(String, Action)>>,
}

impl Recorder {
    fn calls(&self) -> Vec<(String, Action)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Dispatcher for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn queue_for_review(&self, item: &UpstreamItem, _tags: &BTreeSet<String>) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push((item.identity(), Action::QueueForReview));
        Ok(())
    }

    async fn send_alert(&self, item: &UpstreamItem, _priority: Priority) -> anyhow::Result<()> {
        self.calls.lock().push((item.identity(), Action::SendAlert));
        Ok(())
    }

    async fn open_tracking_record(&self, item: &UpstreamItem, _analysis: &ScoredItem) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push((item.identity(), Action::OpenTrackingRecord));
        Ok(())
    }
}

fn pipeline(recorder: Arc<Recorder>) -> EventPipeline {
    EventPipeline::new(
        Arc::new(Deduplicator::new(DedupConfig::default())),
        Arc::new(ContentScorer::new(ScoringConfig::default()).unwrap()),
        PriorityRouter::new(RoutingConfig::default()),
        recorder,
    )
}

/// One domain keyword, verified author, engagement above the top tier, no urgency/spam.
fn scenario_post(id: &str) -> UpstreamItem {
    UpstreamItem {
        id: id.into(),
        source: "x".into(),
        source_type: SourceType::SocialPost,
        title: None,
        text: "Our spring campaign goes live next week".into(),
        timestamp: Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap(),
        url: format!("https://x.com/acme/status/{id}"),
        author: Some(AuthorMeta {
            verified: true,
            followers: 300,
        }),
        engagement: Some(EngagementMeta {
            likes: 1_200,
            retweets: 80,
            replies: 25,
        }),
    }
}

#[tokio::test]
async fn end_to_end_scenario_scores_and_routes() {
    let rec = Arc::new(Recorder::default());
    let p = pipeline(rec.clone());

    let out = p.process(scenario_post("1001")).await;
    // social_post base 0 + domain 15 + verified 15 + engagement 20
    match out {
        EventOutcome::Dispatched {
            score,
            priority,
            ref actions,
            ..
        } => {
            assert_eq!(score, 50);
            assert_eq!(priority, Priority::Medium);
            assert!(actions.iter().all(|a| a.ok));
        }
        other => panic!("expected dispatch, got {other:?}"),
    }
    assert_eq!(
        rec.calls(),
        vec![
            ("x:1001".to_string(), Action::QueueForReview),
            ("x:1001".to_string(), Action::OpenTrackingRecord),
        ]
    );
}

#[tokio::test]
async fn same_identity_is_dispatched_at_most_once() {
    let rec = Arc::new(Recorder::default());
    let p = pipeline(rec.clone());

    let first = p.process(scenario_post("2002")).await;
    let second = p.process(scenario_post("2002")).await;
    assert!(matches!(first, EventOutcome::Dispatched { .. }));
    assert_eq!(
        second,
        EventOutcome::Duplicate {
            identity: "x:2002".into()
        }
    );
    assert_eq!(rec.calls().len(), 2);

    let stats = p.stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.dispatched, 1);
}

#[tokio::test]
async fn same_id_from_another_source_is_not_a_duplicate() {
    let rec = Arc::new(Recorder::default());
    let p = pipeline(rec.clone());

    let mut gh = scenario_post("3003");
    gh.source = "github".into();
    let outs = p.process_all(vec![scenario_post("3003"), gh]).await;
    assert!(outs
        .iter()
        .all(|o| matches!(o, EventOutcome::Dispatched { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_of_one_item_dispatch_once() {
    let rec = Arc::new(Recorder::default());
    let p = Arc::new(pipeline(rec.clone()));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let p = Arc::clone(&p);
        tasks.push(tokio::spawn(async move { p.process(scenario_post("4004")).await }));
    }
    let mut dispatched = 0;
    for t in tasks {
        if matches!(t.await.unwrap(), EventOutcome::Dispatched { .. }) {
            dispatched += 1;
        }
    }
    assert_eq!(dispatched, 1);
    assert_eq!(rec.calls().len(), 2);
}
