//! The crawl loop for one source.
//!
//! A [`Crawler`] wires one run together: it opens the run file, probes the
//! remote store, builds the stage chain and the fetch controller, then drives
//! the extractor's requests to completion.
//!
//! Fetches run concurrently under the controller's caps. Each completed page
//! is parsed and its records pushed through the pipeline one at a time on
//! the loop itself, so stage order per record is strict and the run file
//! sees whole lines only.

use crate::config::Settings;
use crate::error::RunError;
use crate::fetch::{Callback, FetchController, FetchOutcome, FetchRequest, Transport};
use crate::pipeline::{Pipeline, RunState, Verdict};
use crate::scrapers::Extractor;
use crate::sinks::{LocalFileSink, RemoteSink, RemoteStore};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Counters for one run, logged once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub pages_fetched: usize,
    pub cache_hits: usize,
    pub skipped: usize,
    pub failed: usize,
    pub offsite: usize,
    pub duplicate_requests: usize,
    pub records_emitted: usize,
    pub records_rejected: usize,
    /// Records dropped by a stage, keyed by `stage: reason`.
    pub dropped: BTreeMap<String, usize>,
    pub persisted: usize,
    pub remote_upserts: usize,
    pub remote_failures: usize,
    pub cancelled: bool,
}

impl CrawlStats {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    fn log(&self, source: &str) {
        info!(
            source,
            pages_fetched = self.pages_fetched,
            cache_hits = self.cache_hits,
            skipped = self.skipped,
            failed = self.failed,
            offsite = self.offsite,
            duplicate_requests = self.duplicate_requests,
            records_emitted = self.records_emitted,
            records_rejected = self.records_rejected,
            dropped = ?self.dropped,
            persisted = self.persisted,
            remote_upserts = self.remote_upserts,
            remote_failures = self.remote_failures,
            cancelled = self.cancelled,
            "Crawl finished"
        );
    }
}

pub struct Crawler {
    settings: Settings,
    transport: Arc<dyn Transport>,
    remote: Option<Arc<dyn RemoteStore>>,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            remote: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Remote store to probe at run start. `None` keeps the run local.
    pub fn with_remote(mut self, store: Option<Arc<dyn RemoteStore>>) -> Self {
        self.remote = store;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Crawl `extractor`'s sources, writing every surviving record to
    /// `output`. Only a local file failure returns an error.
    #[instrument(level = "info", skip_all, fields(source = extractor.name(), output = %output.display()))]
    pub async fn run(&self, extractor: Arc<dyn Extractor>, output: &Path) -> Result<CrawlStats, RunError> {
        let state = RunState::new(self.settings.dedup_scope);
        let local = Arc::new(LocalFileSink::open(output).await.map_err(RunError::LocalSink)?);
        let remote = Arc::new(RemoteSink::connect(self.remote.clone()).await);
        let pipeline = Pipeline::from_kinds(&self.settings.pipeline, Arc::clone(&local), Arc::clone(&remote));
        let controller = Arc::new(FetchController::new(Arc::clone(&self.transport), &self.settings));

        info!(
            stages = ?pipeline.stage_names(),
            remote = remote.is_enabled(),
            "Starting crawl"
        );

        let mut stats = self
            .drive(extractor.as_ref(), &controller, &pipeline, &state)
            .await?;

        local.finish().await.map_err(RunError::LocalSink)?;
        stats.remote_upserts = remote.upserts();
        stats.remote_failures = remote.failures();
        stats.log(extractor.name());
        Ok(stats)
    }

    async fn drive(
        &self,
        extractor: &dyn Extractor,
        controller: &Arc<FetchController>,
        pipeline: &Pipeline,
        state: &RunState,
    ) -> Result<CrawlStats, RunError> {
        let mut stats = CrawlStats::default();
        let mut scheduled: HashSet<(Url, Callback)> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();
        let fetch = |request: FetchRequest| {
            let controller = Arc::clone(controller);
            async move { controller.fetch(request).await }
        };

        for seed in extractor.seeds() {
            scheduled.insert((seed.url.clone(), seed.callback));
            in_flight.push(fetch(seed));
        }

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(abandoned = in_flight.len(), "Crawl cancelled");
                    stats.cancelled = true;
                    break;
                }
                next = in_flight.next() => match next {
                    Some(outcome) => outcome,
                    None => break,
                },
            };

            let page = match outcome {
                FetchOutcome::Fetched(page) => page,
                FetchOutcome::Skipped { request, reason } => {
                    info!(url = %request.url, %reason, "Request skipped");
                    stats.skipped += 1;
                    continue;
                }
                FetchOutcome::Failed(failure) => {
                    extractor.on_failure(&failure);
                    stats.failed += 1;
                    continue;
                }
            };

            if page.from_cache {
                stats.cache_hits += 1;
            } else {
                stats.pages_fetched += 1;
            }

            let extraction = extractor.parse(&page);
            stats.records_rejected += extraction.rejected();
            let (records, requests) = extraction.into_parts();

            for request in requests {
                if !extractor.is_allowed(&request) {
                    debug!(url = %request.url, "Dropping offsite request");
                    stats.offsite += 1;
                    continue;
                }
                if !scheduled.insert((request.url.clone(), request.callback)) {
                    stats.duplicate_requests += 1;
                    continue;
                }
                in_flight.push(fetch(request));
            }

            for record in records {
                stats.records_emitted += 1;
                match pipeline.process(record, state).await? {
                    Verdict::Pass(_) => stats.persisted += 1,
                    Verdict::Drop { stage, reason } => {
                        *stats.dropped.entry(format!("{stage}: {reason}")).or_default() += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}
