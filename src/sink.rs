//! Report/diagnostic line sinks
//!
//! The reporter and the engine's failure paths emit formatted lines
//! through a `ReportSink` rather than writing anywhere themselves, so an
//! embedder can route output to its own logging transport.

use std::sync::Mutex;
use tracing::error;

/// Accepts formatted diagnostic lines
pub trait ReportSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Forwards every line to a `tracing` error event
///
/// Error level on purpose: a leak dump is produced when the process was
/// about to exhaust its descriptor limit, and must survive filtering.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl ReportSink for TracingSink {
    fn line(&self, line: &str) {
        error!(target: "fdgrip", "{line}");
    }
}

/// Collects lines in memory; used by tests and by embedders that want to
/// post-process the dump
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl ReportSink for BufferSink {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
