//! Integration test for the logging pipeline: events emitted through
//! `tracing` should be mirrored into a configured `LoggerSink`.

use async_trait::async_trait;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> bridge_traits::error::Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sink_receives_structured_events() {
    let sink = Arc::new(CapturingSink::default());

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    // A parallel test may already have installed the global subscriber; the
    // assertion below only runs when this call wins the race.
    if init_logging(config).is_err() {
        return;
    }

    tracing::info!(target: "upload", session_id = "s-1", "Scan started");

    // Sink delivery hops through a spawned task.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let entries = sink.entries.lock().unwrap();
    let entry = entries
        .iter()
        .find(|e| e.target == "upload")
        .expect("sink should have captured the upload event");
    assert_eq!(entry.level, LogLevel::Info);
    assert_eq!(entry.message, "Scan started");
    assert_eq!(entry.fields.get("session_id"), Some(&"s-1".to_string()));
}
