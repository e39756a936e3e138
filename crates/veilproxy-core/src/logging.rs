//! In-memory log collector.
//!
//! [`LogCollector`] is a `tracing` layer that keeps the most recent events,
//! including their structured fields, in a bounded ring buffer. The daemon
//! serves the buffer on `GET /logs`; the TUI shows it in its Logs panel.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// A single captured log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Seconds since the collector was created.
    pub elapsed_secs: f64,
    pub level: Level,
    /// Target module path.
    pub target: String,
    pub message: String,
    /// Structured fields other than `message`, in name order.
    pub fields: BTreeMap<String, String>,
}

impl LogEntry {
    /// `message key=value key=value`, as shown by the CLI and TUI.
    pub fn render(&self) -> String {
        let mut line = self.message.clone();
        for (key, value) in &self.fields {
            let _ = write!(line, " {key}={value}");
        }
        line
    }
}

#[derive(Debug)]
struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    start_time: Instant,
}

impl LogBuffer {
    fn push(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

/// A `tracing` layer that captures log events into a shared ring buffer.
#[derive(Debug, Clone)]
pub struct LogCollector {
    buffer: Arc<Mutex<LogBuffer>>,
}

impl LogCollector {
    /// Create a collector keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(LogBuffer {
                entries: VecDeque::with_capacity(capacity.min(4096)),
                capacity,
                start_time: Instant::now(),
            })),
        }
    }

    /// Get a reader handle for the captured log entries.
    pub fn reader(&self) -> LogReader {
        LogReader {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCollector {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        if let Ok(mut buf) = self.buffer.lock() {
            let elapsed_secs = buf.start_time.elapsed().as_secs_f64();
            buf.push(LogEntry {
                elapsed_secs,
                level: *metadata.level(),
                target: metadata.target().to_string(),
                message: visitor.message,
                fields: visitor.fields,
            });
        }
    }
}

/// A read handle for the log buffer.
#[derive(Debug, Clone)]
pub struct LogReader {
    buffer: Arc<Mutex<LogBuffer>>,
}

impl LogReader {
    /// Snapshot of all captured entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.tail(usize::MAX)
    }

    /// The newest `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<LogEntry> {
        self.buffer
            .lock()
            .map(|buf| {
                let skip = buf.entries.len().saturating_sub(limit);
                buf.entries.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .insert(field.name().to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    #[test]
    fn test_log_collector_captures_events() {
        let collector = LogCollector::new(100);
        let reader = collector.reader();

        let _guard = tracing_subscriber::registry().with(collector).set_default();

        tracing::info!("hello from test");
        tracing::warn!("a warning");

        let entries = reader.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::INFO);
        assert_eq!(entries[1].level, Level::WARN);
        assert_eq!(entries[0].message, "hello from test");
    }

    #[test]
    fn test_structured_fields_are_kept() {
        let collector = LogCollector::new(10);
        let reader = collector.reader();
        let _guard = tracing_subscriber::registry().with(collector).set_default();

        tracing::info!(identity = "alice", id = 7u64, "Command queued");

        let entry = &reader.entries()[0];
        assert_eq!(entry.fields["identity"], "alice");
        assert_eq!(entry.fields["id"], "7");
        assert_eq!(entry.render(), "Command queued id=7 identity=alice");
    }

    #[test]
    fn test_log_collector_ring_buffer() {
        let collector = LogCollector::new(3);
        let reader = collector.reader();

        let _guard = tracing_subscriber::registry().with(collector).set_default();

        tracing::info!("one");
        tracing::info!("two");
        tracing::info!("three");
        tracing::info!("four");

        let entries = reader.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "two");
        assert_eq!(
            reader.tail(2).iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
            vec!["three", "four"]
        );
    }

    #[test]
    fn test_log_reader_is_empty() {
        let collector = LogCollector::new(10);
        let reader = collector.reader();
        assert!(reader.is_empty());
        assert_eq!(reader.len(), 0);
    }
}
