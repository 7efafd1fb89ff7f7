use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::db::{FestivalStore, ReplaceReport};
use crate::error::{PipelineError, StoreError};
use crate::models::{Festival, Source};
use crate::normalize::{Clock, RecordNormalizer};
use crate::scraping::fetch::PageFetcher;
use crate::scraping::{adapter_for, run_adapter, AdapterRun};

/// Runs every configured adapter as its own task and collects the results.
pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    sources: Vec<Source>,
    clock: Clock,
    upcoming_only: bool,
    page_delay: Duration,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn PageFetcher>, sources: &[Source]) -> Result<Self, PipelineError> {
        let mut unique: Vec<Source> = Vec::with_capacity(sources.len());
        for source in sources {
            if !unique.contains(source) {
                unique.push(*source);
            }
        }
        if unique.is_empty() {
            return Err(PipelineError::NoAdapters);
        }
        Ok(Self {
            fetcher,
            sources: unique,
            clock: Clock::system(),
            upcoming_only: true,
            page_delay: Duration::ZERO,
        })
    }

    pub fn from_config(
        fetcher: Arc<dyn PageFetcher>,
        config: &AppConfig,
    ) -> Result<Self, PipelineError> {
        Ok(Self::new(fetcher, &config.sources)?
            .upcoming_only(config.upcoming_only)
            .page_delay(Duration::from_millis(config.page_delay_ms)))
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn upcoming_only(mut self, upcoming_only: bool) -> Self {
        self.upcoming_only = upcoming_only;
        self
    }

    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Scrape all sources concurrently. Every source yields a run, failed or
    /// not, in configuration order.
    pub async fn scrape(&self) -> Vec<AdapterRun> {
        let mut handles = Vec::with_capacity(self.sources.len());
        for &source in &self.sources {
            let adapter = adapter_for(source);
            let fetcher = Arc::clone(&self.fetcher);
            let normalizer =
                RecordNormalizer::new(source, adapter.base_url(), self.clock, self.upcoming_only);
            let delay = self.page_delay;
            let handle = tokio::spawn(async move {
                run_adapter(adapter, fetcher.as_ref(), &normalizer, delay).await
            });
            handles.push((source, handle));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let run = match handle.await {
                Ok(run) => run,
                Err(err) => {
                    error!(%source, error = %err, "adapter task aborted");
                    AdapterRun::failed(source, adapter_for(source).base_url(), err.to_string())
                }
            };
            log_run(&run);
            runs.push(run);
        }
        runs
    }

    /// Scrape, then hand the combined batch to `store`.
    pub async fn run(
        &self,
        store: &mut dyn FestivalStore,
        clear: bool,
    ) -> Result<RunSummary, PipelineError> {
        let runs = self.scrape().await;
        let persisted = persist(store, &runs, clear)?;
        Ok(RunSummary { runs, persisted })
    }
}

fn log_run(run: &AdapterRun) {
    if run.is_failed() {
        warn!(source = %run.source, pages = run.pages, "no records from failed adapter");
    } else {
        info!(
            source = %run.source,
            pages = run.pages,
            candidates = run.candidates,
            structured = run.structured,
            rejected = run.rejected,
            duplicates = run.duplicates,
            records = run.records.len(),
            "adapter summary"
        );
    }
}

/// Combined record batch of every successful run, in run order.
pub fn batch(runs: &[AdapterRun]) -> Vec<Festival> {
    runs.iter()
        .filter(|run| !run.is_failed())
        .flat_map(|run| run.records.iter().cloned())
        .collect()
}

/// Write a run's records as one store operation. With `clear`, each
/// successfully scraped source's stored records are replaced in the same
/// operation; failed sources keep what they had.
pub fn persist(
    store: &mut dyn FestivalStore,
    runs: &[AdapterRun],
    clear: bool,
) -> Result<ReplaceReport, StoreError> {
    let cleared: Vec<Source> = if clear {
        runs.iter()
            .filter(|run| !run.is_failed())
            .map(|run| run.source)
            .collect()
    } else {
        Vec::new()
    };

    let records = batch(runs);
    let report = store.replace(&cleared, &records)?;
    if clear {
        info!(sources = ?cleared, removed = report.cleared, "cleared stored records");
    }
    for (id, reason) in &report.upsert.failed {
        warn!(%id, %reason, "record not stored");
    }
    info!(
        inserted = report.upsert.inserted,
        updated = report.upsert.updated,
        failed = report.upsert.failed.len(),
        "stored festival batch"
    );
    Ok(report)
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub runs: Vec<AdapterRun>,
    pub persisted: ReplaceReport,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.runs.iter().map(|run| run.records.len()).sum()
    }

    pub fn failed_sources(&self) -> Vec<Source> {
        self.runs
            .iter()
            .filter(|run| run.is_failed())
            .map(|run| run.source)
            .collect()
    }
}
