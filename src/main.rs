use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;

use schedule_bot::config::Config;
use schedule_bot::delivery::LogPipeline;
use schedule_bot::logging::{self, DefaultFormatter};
use schedule_bot::relay;
use schedule_bot::transport::TelegramTransport;

/// Upper bound for flushing queued messages on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let pipeline = if config.chat_delivery_enabled() {
        let transport = TelegramTransport::with_api_url(
            config.bot_token.clone(),
            config.delivery.api_url.clone(),
            config.delivery.request_timeout(),
        )
        .context("Failed to create Telegram client")?;
        Some(LogPipeline::new(
            config.delivery.clone(),
            Arc::new(transport),
            Arc::new(DefaultFormatter),
        ))
    } else {
        None
    };

    // Initialize logging BEFORE any tracing calls
    let (log_file_info, _guard) = logging::init_logging(&config, pipeline.as_ref())?;

    match logging::cleanup_old_logs(&config.logs_dir(), config.log_retention_days) {
        Ok(count) if count > 0 => tracing::info!("Cleaned up {} old log files", count),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to clean up old log files: {:#}", e),
    }

    tracing::info!("Logging to: {}", log_file_info.path.display());

    let Some(pipeline) = pipeline else {
        tracing::warn!("Chat delivery disabled: set BOT_TOKEN and TELEGRAM_LOG_CHAT_ID");
        let count = relay::relay_lines(BufReader::new(tokio::io::stdin()), None).await?;
        tracing::info!("Relayed {} log records locally", count);
        return Ok(());
    };

    pipeline.start();
    pipeline.notifier().notify("Bot started").await;

    let sink = pipeline.sink();
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = relay::relay_lines(stdin, Some(sink.as_ref())) => {
            let count = result?;
            tracing::info!("Input closed after {} log records", count);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    if !pipeline.drain(DRAIN_TIMEOUT).await {
        tracing::warn!(
            pending = pipeline.queue().pending(),
            "Shutdown with undelivered log messages"
        );
    }

    Ok(())
}
