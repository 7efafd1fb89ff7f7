pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod scraping;
pub mod utils;

pub use db::{FestivalFilter, FestivalStore, MemoryStore, SqliteStore};
pub use error::{FetchError, PipelineError, StoreError};
pub use models::{Festival, Source, Status};
pub use pipeline::{Pipeline, RunSummary};
