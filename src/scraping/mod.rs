pub mod base;
pub mod dates;
pub mod eblive;
pub mod festileaks;
pub mod festivalinfo;
pub mod fetch;
pub mod followthebeat;
pub mod partyflock;
pub mod structured;

use std::collections::HashSet;
use std::time::Duration;

use scraper::Html;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dedup::Deduplicator;
use crate::error::{FetchError, Rejection};
use crate::models::{CandidateOrigin, Festival, RawCandidate, Source};
use crate::normalize::RecordNormalizer;
use fetch::{PageFetcher, PageRequest};

/// Per-site extraction unit: where to start, how to find the next page and
/// how to pull candidates out of one parsed page.
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;
    fn base_url(&self) -> &'static str;
    /// Hard ceiling on pages fetched in one run.
    fn max_pages(&self) -> usize;

    fn relaxed_tls(&self) -> bool {
        false
    }

    fn first_page(&self) -> PageRequest {
        PageRequest::new(self.base_url()).relaxed_tls(self.relaxed_tls())
    }

    /// Follows the page's "next" link by default.
    fn next_page(
        &self,
        current: &PageRequest,
        document: &Html,
        _found: usize,
    ) -> Option<PageRequest> {
        base::next_link(document, &current.page_key())
            .map(|url| PageRequest::new(url).relaxed_tls(self.relaxed_tls()))
    }

    /// Ranked selector fallback over visible markup.
    fn extract_markup(&self, document: &Html) -> Vec<RawCandidate>;

    /// Structured data when the page carries any, markup otherwise.
    fn extract(&self, document: &Html) -> Vec<RawCandidate> {
        let found = structured::candidates(document);
        if found.is_empty() {
            self.extract_markup(document)
        } else {
            found
        }
    }
}

static FESTILEAKS: festileaks::Festileaks = festileaks::Festileaks;
static FESTIVALINFO: festivalinfo::FestivalInfo = festivalinfo::FestivalInfo;
static EBLIVE: eblive::EbLive = eblive::EbLive;
static FOLLOWTHEBEAT: followthebeat::FollowTheBeat = followthebeat::FollowTheBeat;
static PARTYFLOCK: partyflock::Partyflock = partyflock::Partyflock;

pub fn adapter_for(source: Source) -> &'static dyn SourceAdapter {
    match source {
        Source::Festileaks => &FESTILEAKS,
        Source::Festivalinfo => &FESTIVALINFO,
        Source::Eblive => &EBLIVE,
        Source::Followthebeat => &FOLLOWTHEBEAT,
        Source::Partyflock => &PARTYFLOCK,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AdapterInfo {
    pub id: String,
    pub url: String,
    pub max_pages: usize,
    pub relaxed_tls: bool,
}

pub fn list_adapters() -> Vec<AdapterInfo> {
    Source::ALL
        .into_iter()
        .map(adapter_for)
        .map(|adapter| AdapterInfo {
            id: adapter.source().to_string(),
            url: adapter.base_url().to_string(),
            max_pages: adapter.max_pages(),
            relaxed_tls: adapter.relaxed_tls(),
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdapterOutcome {
    Done,
    Failed { url: String, reason: String },
}

/// Result of one adapter run. A failed run carries no records.
#[derive(Clone, Debug)]
pub struct AdapterRun {
    pub source: Source,
    pub outcome: AdapterOutcome,
    pub pages: usize,
    pub candidates: usize,
    pub structured: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub records: Vec<Festival>,
}

impl AdapterRun {
    fn new(source: Source) -> Self {
        Self {
            source,
            outcome: AdapterOutcome::Done,
            pages: 0,
            candidates: 0,
            structured: 0,
            rejected: 0,
            duplicates: 0,
            records: Vec::new(),
        }
    }

    pub fn failed(source: Source, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            outcome: AdapterOutcome::Failed {
                url: url.into(),
                reason: reason.into(),
            },
            ..Self::new(source)
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, AdapterOutcome::Failed { .. })
    }
}

enum RunState {
    Fetching { page: usize, request: PageRequest },
    Extracting { page: usize, request: PageRequest, body: String },
    Done,
    Failed { url: String, error: FetchError },
}

/// Walk an adapter's listing pages in order, normalizing and deduplicating
/// candidates as they come in.
pub async fn run_adapter(
    adapter: &dyn SourceAdapter,
    fetcher: &dyn PageFetcher,
    normalizer: &RecordNormalizer,
    page_delay: Duration,
) -> AdapterRun {
    let source = adapter.source();
    let mut run = AdapterRun::new(source);
    let mut accumulator = Deduplicator::new();
    let mut visited = HashSet::new();
    let mut state = RunState::Fetching {
        page: 1,
        request: adapter.first_page(),
    };

    loop {
        state = match state {
            RunState::Fetching { page, request } => {
                if page > 1 && !page_delay.is_zero() {
                    tokio::time::sleep(page_delay).await;
                }
                let url = request.page_key();
                debug!(%source, %url, page, "fetching listing page");
                visited.insert(url.clone());
                match fetcher.fetch(&request).await {
                    Ok(body) => RunState::Extracting { page, request, body },
                    Err(error) => RunState::Failed { url, error },
                }
            }
            RunState::Extracting { page, request, body } => {
                run.pages += 1;
                let (candidates, next) = extract_page(adapter, &request, &body);
                debug!(%source, page, found = candidates.len(), "extracted candidates");

                for candidate in candidates {
                    run.candidates += 1;
                    if candidate.origin == CandidateOrigin::Structured {
                        run.structured += 1;
                    }
                    match normalizer.normalize(candidate) {
                        Ok(festival) => {
                            if !accumulator.push(festival) {
                                run.duplicates += 1;
                            }
                        }
                        Err(rejection) => {
                            run.rejected += 1;
                            log_rejection(source, &rejection);
                        }
                    }
                }

                match next {
                    Some(_) if page >= adapter.max_pages() => {
                        warn!(%source, page, "page ceiling reached, stopping pagination");
                        RunState::Done
                    }
                    Some(next) if visited.contains(&next.page_key()) => {
                        debug!(%source, url = %next.page_key(), "next page already visited");
                        RunState::Done
                    }
                    Some(next) => RunState::Fetching {
                        page: page + 1,
                        request: next,
                    },
                    None => RunState::Done,
                }
            }
            RunState::Done => {
                run.records = accumulator.into_records();
                info!(
                    %source,
                    pages = run.pages,
                    candidates = run.candidates,
                    records = run.records.len(),
                    "adapter finished"
                );
                return run;
            }
            RunState::Failed { url, error } => {
                error!(%source, %url, error = %error, "adapter failed");
                let mut failed = AdapterRun::failed(source, url, error.to_string());
                failed.pages = run.pages;
                return failed;
            }
        };
    }
}

/// Parse one page and read its candidates plus the next request. Kept
/// synchronous so the parsed document never lives across an await.
fn extract_page(
    adapter: &dyn SourceAdapter,
    request: &PageRequest,
    body: &str,
) -> (Vec<RawCandidate>, Option<PageRequest>) {
    let document = Html::parse_document(body);
    let candidates = adapter.extract(&document);
    let next = adapter.next_page(request, &document, candidates.len());
    (candidates, next)
}

fn log_rejection(source: Source, rejection: &Rejection) {
    match rejection {
        Rejection::Date(_) | Rejection::MissingDate => {
            warn!(%source, reason = %rejection, "dropping candidate")
        }
        _ => debug!(%source, reason = %rejection, "dropping candidate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Clock;
    use chrono::{NaiveDate, TimeZone, Utc};
    use fetch::StaticFetcher;

    fn normalizer(source: Source, base_url: &str) -> RecordNormalizer {
        let now = Utc
            .with_ymd_and_hms(2025, 1, 10, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        RecordNormalizer::new(source, base_url, Clock::fixed(now), true)
    }

    struct Looping;

    impl SourceAdapter for Looping {
        fn source(&self) -> Source {
            Source::Festileaks
        }
        fn base_url(&self) -> &'static str {
            "https://loop.test/agenda/"
        }
        fn max_pages(&self) -> usize {
            5
        }
        fn extract_markup(&self, _document: &Html) -> Vec<RawCandidate> {
            vec![RawCandidate::markup("Zomerfeest").with_date(Some("21 juni 2025".into()))]
        }
    }

    #[test]
    fn registry_covers_every_source() {
        for source in Source::ALL {
            assert_eq!(adapter_for(source).source(), source);
        }
        let listed = list_adapters();
        assert_eq!(listed.len(), 5);
        assert!(listed.iter().all(|info| info.max_pages > 0));
    }

    #[tokio::test]
    async fn next_link_pointing_back_ends_the_run() {
        let first = Looping.first_page();
        let second = PageRequest::new("https://loop.test/agenda/?page=2");
        let fetcher = StaticFetcher::new()
            .with_page(&first, r#"<a rel="next" href="?page=2">volgende</a>"#)
            .with_page(&second, r#"<a rel="next" href="/agenda/">terug</a>"#);

        let run = run_adapter(
            &Looping,
            &fetcher,
            &normalizer(Source::Festileaks, Looping.base_url()),
            Duration::ZERO,
        )
        .await;

        assert_eq!(run.outcome, AdapterOutcome::Done);
        assert_eq!(run.pages, 2);
        assert_eq!(run.candidates, 2);
        assert_eq!(run.duplicates, 1);
        assert_eq!(run.records.len(), 1);
        assert_eq!(
            run.records[0].date,
            NaiveDate::from_ymd_opt(2025, 6, 21).expect("valid date")
        );
    }

    #[tokio::test]
    async fn missing_page_marks_the_run_failed_without_records() {
        let first = Looping.first_page();
        let fetcher = StaticFetcher::new()
            .with_page(&first, r#"<a rel="next" href="?page=2">volgende</a>"#);

        let run = run_adapter(
            &Looping,
            &fetcher,
            &normalizer(Source::Festileaks, Looping.base_url()),
            Duration::ZERO,
        )
        .await;

        assert!(run.is_failed());
        assert_eq!(run.pages, 1);
        assert!(run.records.is_empty());
    }
}
