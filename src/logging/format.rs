//! Record formatting shared by the ring buffer and the chat sink

use std::fmt::Write;

use super::record::LogRecord;

/// Turns a record into the single string that is buffered and delivered
pub trait Formatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> String;
}

/// `2026-03-02 14:30:45,123 [ERROR] [u_id=42 u_n=@alice] bot::handlers: message`
#[derive(Debug, Clone, Default)]
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let mut out = String::with_capacity(record.message.len() + 96);

        let _ = write!(
            out,
            "{} [{}] [u_id={} u_n=@{}] {}: {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
            record.severity,
            record.user_id.as_deref().unwrap_or("-"),
            record.username.as_deref().unwrap_or("-"),
            record.target,
            record.message,
        );

        for (name, value) in &record.fields {
            let _ = write!(out, " {}={}", name, value);
        }

        if let Some(exception) = &record.exception {
            out.push('\n');
            out.push_str(exception);
        }

        out
    }
}
