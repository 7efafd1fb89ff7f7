use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils;

const DEFAULT_DIRECTIVE: &str = "festival_scrape=info";

/// Console output plus a daily-rolling JSON file under the data directory.
/// `RUST_LOG` overrides the default filter; `verbose` lowers it to debug.
/// The returned guard flushes the file writer on drop, so hold it until exit.
pub fn init(verbose: bool) -> WorkerGuard {
    let dir = utils::log_dir();
    if let Err(err) = fs::create_dir_all(&dir) {
        eprintln!("failed to create log directory {:?}: {err}", dir);
    }

    let file_appender = tracing_appender::rolling::daily(&dir, "festival-scrape.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let directive = if verbose {
        "festival_scrape=debug"
    } else {
        DEFAULT_DIRECTIVE
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(writer))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    guard
}
