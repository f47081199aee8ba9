//! Wiring: config → sources → fetchers → pipeline → orchestrator.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::analyze::ContentScorer;
use crate::config::AppConfig;
use crate::dedup::Deduplicator;
use crate::ingest::{HttpJsonSource, Source};
use crate::notify::{self, Dispatcher};
use crate::orchestrator::{BatchOrchestrator, FetchOperation, OperationRegistry};
use crate::pipeline::EventPipeline;
use crate::resilience::{
    CircuitBreaker, LimiterRegistry, PageCache, ResilientFetcher, TtlCache,
};
use crate::routing::PriorityRouter;

pub struct Relay {
    pub config: AppConfig,
    pub fetchers: Vec<Arc<ResilientFetcher>>,
    /// One rate limiter per upstream name; fetchers for the same name share it.
    pub limiters: Arc<LimiterRegistry>,
    pub pipeline: Arc<EventPipeline>,
    pub orchestrator: BatchOrchestrator,
}

impl Relay {
    /// Build from config alone: one `HttpJsonSource` per `[upstreams.<name>]`, dispatcher
    /// from `[dispatch]`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let mut sources: Vec<Arc<dyn Source>> = Vec::with_capacity(config.upstreams.len());
        for (name, up) in &config.upstreams {
            let src = HttpJsonSource::new(
                name.clone(),
                up.url.clone(),
                Duration::from_millis(up.request_timeout_ms),
            )
            .with_context(|| format!("upstream `{name}`"))?;
            sources.push(Arc::new(src));
        }
        let dispatcher: Arc<dyn Dispatcher> = notify::from_config(&config.dispatch)?.into();
        Self::with_parts(config, sources, dispatcher)
    }

    /// Build around caller-supplied sources and dispatcher. Each source picks up its
    /// `[upstreams.<name>]` overrides when present, `[defaults]` otherwise.
    pub fn with_parts(
        config: AppConfig,
        sources: Vec<Arc<dyn Source>>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        let scorer = ContentScorer::new(config.scoring.clone()).context("compiling scoring table")?;
        let pipeline = Arc::new(EventPipeline::new(
            Arc::new(Deduplicator::new(config.dedup)),
            Arc::new(scorer),
            PriorityRouter::new(config.routing),
            dispatcher,
        ));

        // One limiter, breaker and page cache per upstream name, whatever the number of
        // sources behind it.
        let limiters = Arc::new(LimiterRegistry::new(config.defaults.rate_limit));
        let mut shared: HashMap<String, (Arc<CircuitBreaker>, Arc<PageCache>)> = HashMap::new();
        let fetchers: Vec<Arc<ResilientFetcher>> = sources
            .into_iter()
            .map(|src| {
                let name = src.name().to_string();
                let res = match config.upstreams.get(&name) {
                    Some(up) => up.resilience(&config.defaults),
                    None => config.defaults,
                };
                let limiter = limiters.register(&name, res.rate_limit);
                let (breaker, cache) = shared
                    .entry(name.clone())
                    .or_insert_with(|| {
                        (
                            Arc::new(CircuitBreaker::new(name.clone(), res.breaker)),
                            Arc::new(TtlCache::new(res.cache)),
                        )
                    })
                    .clone();
                Arc::new(
                    ResilientFetcher::new(src, &res)
                        .with_limiter(limiter)
                        .with_breaker(breaker)
                        .with_cache(cache),
                )
            })
            .collect();

        let mut registry = OperationRegistry::new();
        registry.register(
            "fetch",
            Arc::new(
                FetchOperation::new(fetchers.iter().cloned()).with_pipeline(Arc::clone(&pipeline)),
            ),
        );

        Ok(Self {
            config,
            fetchers,
            limiters,
            pipeline,
            orchestrator: BatchOrchestrator::new(Arc::new(registry)),
        })
    }

    pub fn plan_deadline(&self) -> Option<Duration> {
        self.config.server.plan_deadline_ms.map(Duration::from_millis)
    }
}
