//! `tracing` integration for the chat sink
//!
//! [`ChatLogLayer`] converts every event into a [`LogRecord`] and hands it to
//! the [`LogSink`]. Recognised fields:
//!
//! - `message`: the event message
//! - `error` / `exception`: rendered below the message in full
//! - `critical = true`: raises an ERROR event to CRITICAL
//! - `user_id`, `username`: chat user context
//!
//! All other fields are kept as `key=value` pairs.

use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::record::{LogRecord, Severity};
use super::sink::LogSink;
use crate::delivery::LOCAL_TARGET;

/// Layer feeding `tracing` events into a [`LogSink`]
#[derive(Clone)]
pub struct ChatLogLayer {
    sink: Arc<LogSink>,
}

impl ChatLogLayer {
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for ChatLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Delivery diagnostics stay local, otherwise a dead chat would feed itself
        if metadata.target().starts_with(LOCAL_TARGET) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut severity = Severity::from(*metadata.level());
        if visitor.critical && severity == Severity::Error {
            severity = Severity::Critical;
        }

        let mut record = LogRecord::new(severity, metadata.target(), visitor.message);
        record.file = metadata.file().map(str::to_string);
        record.line = metadata.line();
        record.exception = visitor.exception;
        record.user_id = visitor.user_id;
        record.username = visitor.username;
        record.fields = visitor.fields;

        self.sink.emit(&record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    exception: Option<String>,
    critical: bool,
    user_id: Option<String>,
    username: Option<String>,
    fields: Vec<(String, String)>,
}

impl RecordVisitor {
    fn store(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "error" | "exception" => self.exception = Some(value),
            "user_id" => self.user_id = Some(value),
            "username" => self.username = Some(value),
            name => self.fields.push((name.to_string(), value)),
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "critical" {
            self.critical = value;
        } else {
            self.store(field, value.to_string());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.store(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.store(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut text = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            text.push_str(&format!("\nCaused by: {}", cause));
            source = cause.source();
        }
        self.store(field, text);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.store(field, format!("{:?}", value));
    }
}
