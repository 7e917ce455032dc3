//! Log intake for the operator chat
//!
//! [`LogSink::emit`] is called synchronously for every log record. It formats
//! the record, remembers it in the ring buffer and turns it into delivery
//! items:
//!
//! - WARNING and above become a single text file holding the recent log lines
//!   followed by the record itself
//! - lower severities become one or more text messages of bounded length
//!
//! `emit` never blocks, never panics and never returns an error to the caller.
//! Failures are reported on the local diagnostics target only.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::buffer::LogBuffer;
use super::format::Formatter;
use super::record::{LogRecord, Severity};
use crate::config::DeliveryConfig;
use crate::delivery::{DeliveryItem, DeliveryQueue, QueueClosed, LOCAL_TARGET};

thread_local! {
    static IN_EMIT: Cell<bool> = const { Cell::new(false) };
}

/// Failure while turning a record into delivery items
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),
    #[error("panicked while handling record: {0}")]
    Panicked(String),
}

/// Presentation of an alert file per severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertStyle {
    pub label: &'static str,
    pub filename_prefix: &'static str,
    pub emoji: &'static str,
}

impl AlertStyle {
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => AlertStyle {
                label: "CRITICAL ERROR",
                filename_prefix: "critical",
                emoji: "💥",
            },
            Severity::Error => AlertStyle {
                label: "ERROR",
                filename_prefix: "error",
                emoji: "❌",
            },
            _ => AlertStyle {
                label: "WARNING",
                filename_prefix: "warning",
                emoji: "⚠️",
            },
        }
    }
}

/// Formats, buffers and routes log records to the delivery queue
pub struct LogSink {
    buffer: Arc<LogBuffer>,
    queue: DeliveryQueue,
    formatter: Arc<dyn Formatter>,
    min_severity: Severity,
    max_message_length: usize,
}

impl LogSink {
    pub fn new(
        buffer: Arc<LogBuffer>,
        queue: DeliveryQueue,
        formatter: Arc<dyn Formatter>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            buffer,
            queue,
            formatter,
            min_severity: config.min_severity,
            max_message_length: config.max_message_length.max(1),
        }
    }

    /// Handle one record; never fails from the caller's point of view
    pub fn emit(&self, record: &LogRecord) {
        // Anything logged while handling a record must not come back here
        let entered = IN_EMIT.with(|flag| !flag.replace(true));
        if !entered {
            return;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.try_emit(record)))
            .unwrap_or_else(|payload| Err(SinkError::Panicked(panic_message(payload.as_ref()))));

        IN_EMIT.with(|flag| flag.set(false));

        if let Err(e) = result {
            error!(
                target: LOCAL_TARGET,
                error = %e,
                severity = %record.severity,
                "Failed to queue log record for chat delivery"
            );
        }
    }

    fn try_emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let formatted = self.formatter.format(record);
        let forward = record.severity >= self.min_severity;

        // Alert context describes what happened before this record
        let context = (forward && record.severity.is_alert()).then(|| self.buffer.snapshot());
        self.buffer.append(formatted.as_str());

        if !forward {
            return Ok(());
        }

        match context {
            Some(context) => self.queue.push(alert_file(record, &context, &formatted))?,
            None => {
                for chunk in numbered_chunks(&formatted, self.max_message_length) {
                    self.queue.push(DeliveryItem::text(chunk))?;
                }
            }
        }
        Ok(())
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }
}

/// Build the file payload sent for WARNING and above
fn alert_file(record: &LogRecord, context: &[String], formatted: &str) -> DeliveryItem {
    let style = AlertStyle::for_severity(record.severity);

    let mut body = format!("=== RECENT LOGS ({} entries) ===\n", context.len());
    body.push_str(&context.join("\n"));
    body.push_str(&format!("\n\n=== {} ===\n", style.label));
    body.push_str(formatted);

    let filename = format!(
        "{}_{}.txt",
        style.filename_prefix,
        record.timestamp.format("%Y-%m-%d_%H-%M-%S")
    );
    let caption = format!("{} {}", style.emoji, style.label);

    DeliveryItem::file(body.into_bytes(), filename, caption)
}

/// Split text into slices of at most `max_len` characters
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_len {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split text and prefix each part with `[i/total] ` when there is more than one
fn numbered_chunks(text: &str, max_len: usize) -> Vec<String> {
    let chunks = split_message(text, max_len);
    let total = chunks.len();
    if total <= 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}/{}] {}", i + 1, total, chunk))
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
