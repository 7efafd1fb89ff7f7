use chrono::NaiveDate;
use thiserror::Error;

/// Network-level failure for a single page request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("no page available for {url}")]
    Missing { url: String },
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
    #[error("unable to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Http { .. } => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateParseError {
    #[error("empty date text")]
    Empty,
    #[error("no date pattern matched {0:?}")]
    NoMatch(String),
    #[error("{day}-{month}-{year} is not a calendar date")]
    InvalidDate { day: u32, month: u32, year: i32 },
}

/// Why a candidate did not become a festival record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("candidate has no name")]
    MissingName,
    #[error("name {0:?} is too short or navigation chrome")]
    InvalidName(String),
    #[error("candidate has no date")]
    MissingDate,
    #[error("unparseable date: {0}")]
    Date(#[from] DateParseError),
    #[error("date {0} is in the past")]
    PastDate(NaiveDate),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no source adapters are configured")]
    NoAdapters,
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}
