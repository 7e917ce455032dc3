//! Global subscriber setup
//!
//! Composes the console layer, the local log file and, when a pipeline is
//! given, the chat layer into one registry.

use std::io::Write;

use anyhow::{Context, Result};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use super::file_writer::{LogFileInfo, LogFileWriter};
use crate::config::Config;
use crate::delivery::LogPipeline;

/// HTTP stack targets that never reach the chat
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls", "tokio_util"];

/// Keeps the log file open; flushes it when dropped
pub struct LoggingGuard {
    file: LogFileWriter,
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}

/// Filter for the chat layer
///
/// Everything from DEBUG up goes to the sink so its buffer has full context;
/// the sink applies its own threshold before anything is sent.
pub fn chat_filter() -> Targets {
    QUIET_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::DEBUG), |targets, target| {
            targets.with_target(*target, LevelFilter::OFF)
        })
}

/// Install the global subscriber
///
/// Must be called once, before any tracing calls whose output matters.
/// Returns the log file info and a guard that must be kept alive for the
/// duration of logging.
pub fn init_logging(
    config: &Config,
    pipeline: Option<&LogPipeline>,
) -> Result<(LogFileInfo, LoggingGuard)> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.console_filter)
            .with_context(|| format!("Invalid console filter '{}'", config.console_filter))?,
    };
    let console_layer = fmt::layer().with_target(true).with_filter(console_filter);

    let (writer, info) = LogFileWriter::open(&config.logs_dir())?;
    let file_layer = fmt::layer()
        .with_writer(writer.clone())
        .with_ansi(false)
        .with_target(true)
        .with_filter(LevelFilter::DEBUG);

    let chat_layer = pipeline.map(|p| p.layer().with_filter(chat_filter()));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(chat_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok((info, LoggingGuard { file: writer }))
}
