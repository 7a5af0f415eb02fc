//! Run telemetry events and sinks.
//!
//! Each run ends with one [`TelemetryEvent::RunCompleted`] event. Scheduled
//! deployments can collect the JSONL stream from stderr to track how many
//! items each run found and whether the fetch finished.

use std::io;

use serde::{Deserialize, Serialize};

/// A structured telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A run finished, with or without results.
    RunCompleted {
        /// `recent` or `all`.
        mode: String,
        /// Repositories watched.
        repositories: usize,
        /// Items fetched, viewed or not.
        fetched_items: usize,
        /// Items never notified before.
        new_items: usize,
        /// Whether pagination read every stream.
        complete: bool,
        /// Whether a digest was delivered.
        notified: bool,
    },
}

/// A sink that can record telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records a telemetry event.
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Writes telemetry events to stderr as JSON lines.
#[derive(Debug, Default)]
pub struct StderrJsonlTelemetrySink;

impl TelemetrySink for StderrJsonlTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}
