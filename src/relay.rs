//! Relay of plain-text log lines into the sink
//!
//! Lets the pipeline run next to a process that only writes logs to stdout:
//! each line is parsed into a [`LogRecord`] and emitted. Indented lines
//! (tracebacks, `Caused by:` chains) are attached to the preceding record as
//! its exception text, up to the next line that carries a level.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::logging::{LogRecord, LogSink, Severity};

/// Target used when a line carries no recognisable one
const DEFAULT_TARGET: &str = "relay";

/// Parse a single log line
///
/// Understands both `2026-03-02 14:30:45,123 [ERROR] target: message` and
/// the `tracing` fmt layout `2026-03-02T14:30:45.123456Z ERROR target: message`.
/// Lines without a level are treated as INFO.
pub fn parse_log_line(line: &str) -> Option<LogRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (severity, rest) = find_level(line).unwrap_or((Severity::Info, line));

    // Skip the "[u_id=... u_n=...]" context block if present
    let rest = match rest.strip_prefix("[u_id=") {
        Some(after) => after.split_once("] ").map(|(_, tail)| tail).unwrap_or(after),
        None => rest,
    };

    let (target, message) = match rest.split_once(": ") {
        Some((candidate, message)) if candidate.contains("::") || !candidate.contains(' ') => {
            (candidate, message)
        }
        _ => (DEFAULT_TARGET, rest),
    };

    Some(LogRecord::new(severity, target, message.trim()))
}

fn find_level(line: &str) -> Option<(Severity, &str)> {
    for (start, token) in line.split(' ').scan(0, |pos, token| {
        let start = *pos;
        *pos += token.len() + 1;
        Some((start, token))
    }) {
        let name = token
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(token);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_uppercase()) {
            continue;
        }
        if let Ok(severity) = name.parse::<Severity>() {
            let rest = line.get(start + token.len()..).unwrap_or("").trim_start();
            return Some((severity, rest));
        }
    }
    None
}

fn is_continuation(line: &str) -> bool {
    line.starts_with(char::is_whitespace)
        || line.starts_with("Caused by:")
        || line.starts_with("Traceback")
}

/// Read lines until EOF, emitting one record per log entry
///
/// Returns the number of records emitted. Without a sink the records are
/// only counted, which keeps the relay usable when chat delivery is off.
pub async fn relay_lines<R>(reader: R, sink: Option<&LogSink>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut pending: Option<LogRecord> = None;
    let mut emitted = 0;

    let mut flush = |record: LogRecord| {
        if let Some(sink) = sink {
            sink.emit(&record);
        }
        emitted += 1;
    };

    while let Some(line) = lines.next_line().await.context("Failed to read log input")? {
        let in_traceback = pending.as_ref().is_some_and(|r| r.exception.is_some());
        let unlevelled = !line.is_empty() && find_level(&line).is_none();
        if is_continuation(&line) || (in_traceback && unlevelled) {
            if let Some(record) = pending.as_mut() {
                let exception = record.exception.get_or_insert_with(String::new);
                if !exception.is_empty() {
                    exception.push('\n');
                }
                exception.push_str(line.trim_end());
                continue;
            }
        }

        if let Some(record) = parse_log_line(&line) {
            if let Some(previous) = pending.replace(record) {
                flush(previous);
            }
        }
    }

    if let Some(record) = pending.take() {
        flush(record);
    }

    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::DeliveryConfig;
    use crate::delivery::queue;
    use crate::logging::{DefaultFormatter, LogBuffer};

    #[test]
    fn test_parse_bracketed_line() {
        let record =
            parse_log_line("2026-03-02 14:30:45,123 [ERROR] [u_id=7 u_n=@ann] bot.handlers: Failed")
                .unwrap();
        assert_eq!(record.severity, Severity::Error);
        assert_eq!(record.target, "bot.handlers");
        assert_eq!(record.message, "Failed");
    }

    #[test]
    fn test_parse_tracing_line() {
        let line = "2026-01-21T14:30:45.123456Z  WARN schedule_bot::config: Config not found";
        let record = parse_log_line(line).unwrap();
        assert_eq!(record.severity, Severity::Warning);
        assert_eq!(record.target, "schedule_bot::config");
        assert_eq!(record.message, "Config not found");
    }

    #[test]
    fn test_parse_critical_and_plain_lines() {
        let critical = parse_log_line("[CRITICAL] db: pool exhausted").unwrap();
        assert_eq!(critical.severity, Severity::Critical);

        let plain = parse_log_line("just some output from a child process").unwrap();
        assert_eq!(plain.severity, Severity::Info);
        assert_eq!(plain.target, DEFAULT_TARGET);
        assert_eq!(plain.message, "just some output from a child process");

        assert!(parse_log_line("   ").is_none());
    }

    #[test]
    fn test_lowercase_words_are_not_levels() {
        let record = parse_log_line("bot: retry after error count reset").unwrap();
        assert_eq!(record.severity, Severity::Info);
        assert_eq!(record.target, "bot");
    }

    #[tokio::test]
    async fn test_relay_attaches_tracebacks() {
        let input = "\
2026-03-02 14:30:45,001 [INFO] bot: polling started
2026-03-02 14:30:46,002 [ERROR] bot: handler crashed
Traceback (most recent call last):
  File \"handlers.py\", line 10, in show
ValueError: bad week
2026-03-02 14:30:47,003 [INFO] bot: still alive
";
        let config = DeliveryConfig {
            chat_id: -1,
            min_severity: Severity::Critical,
            ..DeliveryConfig::default()
        };
        let buffer = Arc::new(LogBuffer::new(10));
        let (queue, _rx) = queue::channel();
        let sink = LogSink::new(Arc::clone(&buffer), queue, Arc::new(DefaultFormatter), &config);

        let emitted = relay_lines(input.as_bytes(), Some(&sink)).await.unwrap();

        assert_eq!(emitted, 3);
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("[ERROR]"));
        assert!(lines[1].contains("handler crashed"));
        assert!(lines[1].contains("\nTraceback (most recent call last):"));
        assert!(lines[1].contains("ValueError: bad week"));
        assert!(lines[2].contains("still alive"));
    }

    #[tokio::test]
    async fn test_relay_without_sink_counts_records() {
        let emitted = relay_lines("a\n\nb\n".as_bytes(), None).await.unwrap();
        assert_eq!(emitted, 2);
    }
}
