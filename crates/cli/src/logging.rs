use std::path::Path;

use anyhow::Context;
use edirelay_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Extra directives that surface every protocol step.
const TRANSFER_DEBUG: &str = "edirelay_transport=debug,suppaftp=debug";

/// Filter directive for a run: `--verbose` wins over the configured level,
/// and `ftp_debug_level > 0` adds the transfer traces.
fn directive(config: &LoggingConfig, verbose: bool) -> anyhow::Result<String> {
    let level = if verbose {
        "debug"
    } else {
        config.filter_directive()?
    };
    Ok(if config.ftp_debug_level > 0 {
        format!("{level},{TRANSFER_DEBUG}")
    } else {
        level.to_string()
    })
}

/// `<direction>_<YYYY-MM-DD>.log`, dated by the local start of the run.
fn log_file_name(direction: &str) -> String {
    format!("{direction}_{}.log", chrono::Local::now().format("%Y-%m-%d"))
}

/// Log to stderr and to a daily file in the configured log folder.
///
/// Uses the `RUST_LOG` env var if set. The returned guard flushes the file
/// writer when dropped and must be held for the whole run.
pub fn init(config: &LoggingConfig, direction: &str, verbose: bool) -> anyhow::Result<WorkerGuard> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(directive(config, verbose)?),
    };

    let folder = Path::new(&config.log_folder);
    std::fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create log folder {}", folder.display()))?;

    let appender = tracing_appender::rolling::never(folder, log_file_name(direction));
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("Failed to install the log subscriber")?;

    Ok(guard)
}

/// Console-only logging for commands that do not touch documents.
pub fn init_console(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
