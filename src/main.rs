use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use festival_scrape::config::AppConfig;
use festival_scrape::db::{FestivalFilter, FestivalStore, SqliteStore};
use festival_scrape::logging;
use festival_scrape::models::Source;
use festival_scrape::pipeline::{persist, Pipeline, RunSummary};
use festival_scrape::scraping::fetch::{HttpFetcher, PageFetcher};
use festival_scrape::scraping::{list_adapters, AdapterOutcome};

#[derive(Parser)]
#[command(name = "festival-scrape")]
#[command(about = "Scrape Dutch festival agendas into the festival store")]
#[command(version)]
struct Cli {
    /// Config file (defaults to config.json in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database to write to
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Only scrape these sources (repeatable)
    #[arg(long = "source", value_name = "SOURCE")]
    sources: Vec<Source>,
    /// Delete each successfully scraped source's stored records first
    #[arg(long)]
    clear: bool,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List registered source adapters
    Sources,
    /// Print stored festivals as JSON lines
    List {
        #[arg(long)]
        source: Option<Source>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database.clone() {
        config.database_path = Some(database);
    }

    match cli.command {
        Some(Command::Sources) => {
            for adapter in list_adapters() {
                println!(
                    "{:<14} {:<48} max {} pages{}",
                    adapter.id,
                    adapter.url,
                    adapter.max_pages,
                    if adapter.relaxed_tls { ", relaxed tls" } else { "" }
                );
            }
            Ok(())
        }
        Some(Command::List { source }) => list(&config, source).await,
        None => {
            if !cli.sources.is_empty() {
                config.sources = cli.sources.clone();
            }
            scrape(&config, cli.clear).await
        }
    }
}

async fn scrape(config: &AppConfig, clear: bool) -> Result<()> {
    let fetcher: Arc<dyn PageFetcher> =
        Arc::new(HttpFetcher::from_config(config).context("failed to build http client")?);
    let pipeline = Pipeline::from_config(fetcher, config)?;
    info!(sources = ?pipeline.sources(), clear, "starting scrape");

    let runs = pipeline.scrape().await;

    let path = config.database_path();
    let summary = tokio::task::spawn_blocking(move || {
        let mut store = SqliteStore::open(&path)?;
        let persisted = persist(&mut store, &runs, clear)?;
        Ok::<_, anyhow::Error>(RunSummary { runs, persisted })
    })
    .await
    .context("store task panicked")??;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    for run in &summary.runs {
        match &run.outcome {
            AdapterOutcome::Done => println!(
                "{:<14} {:>4} festivals  ({} pages, {} candidates, {} structured, {} rejected, {} duplicates)",
                run.source,
                run.records.len(),
                run.pages,
                run.candidates,
                run.structured,
                run.rejected,
                run.duplicates
            ),
            AdapterOutcome::Failed { url, reason } => {
                println!("{:<14} FAILED at {url}: {reason}", run.source)
            }
        }
    }

    let upsert = &summary.persisted.upsert;
    println!(
        "\nTotal: {} festivals, {} new, {} updated, {} rejected by store",
        summary.total_records(),
        upsert.inserted,
        upsert.updated,
        upsert.failed.len()
    );
    if summary.persisted.cleared > 0 {
        println!("Cleared {} previously stored records", summary.persisted.cleared);
    }
    let failed = summary.failed_sources();
    if !failed.is_empty() {
        let names: Vec<_> = failed.iter().map(Source::as_str).collect();
        println!("Failed sources: {}", names.join(", "));
    }
}

async fn list(config: &AppConfig, source: Option<Source>) -> Result<()> {
    let path = config.database_path();
    let festivals = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::open(&path)?;
        store.list(&FestivalFilter { source })
    })
    .await
    .context("store task panicked")??;

    for festival in festivals {
        println!("{}", serde_json::to_string(&festival)?);
    }
    Ok(())
}
