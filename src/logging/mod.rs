//! Logging system for the schedule bot
//!
//! Records flow from `tracing` through [`ChatLogLayer`] into the [`LogSink`],
//! which keeps recent history in a [`LogBuffer`] and queues chat deliveries.
//! Everything is also written to a local log file with retention.

mod buffer;
pub mod context;
mod file_writer;
mod format;
mod layer;
mod record;
mod retention;
mod setup;
mod sink;

pub use buffer::LogBuffer;
pub use context::{log_error_with_context, UserInfo};
pub use file_writer::{LogFileInfo, LogFileWriter};
pub use format::{DefaultFormatter, Formatter};
pub use layer::ChatLogLayer;
pub use record::{LogRecord, ParseSeverityError, Severity};
pub use retention::cleanup_old_logs;
pub use setup::{chat_filter, init_logging, LoggingGuard};
pub use sink::{split_message, AlertStyle, LogSink, SinkError};
