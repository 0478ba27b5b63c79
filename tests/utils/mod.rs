// Integration test utilities
//
// Mock collaborators shared by the engine-level integration tests: an
// in-memory descriptor limit with a set-call journal, scripted stack
// capture providers, and a shareable buffer sink.

#![allow(dead_code)] // each test binary uses a subset

use fdgrip::capture::{CapturedStacks, StackCapture};
use fdgrip::config::TrackerConfig;
use fdgrip::engine::FdTracker;
use fdgrip::error::TrackError;
use fdgrip::limits::LimitAccessor;
use fdgrip::sink::{BufferSink, ReportSink};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route engine diagnostics through the test harness's captured output
///
/// `RUST_LOG` overrides the default `fdgrip=debug` filter. One-time per
/// test binary; later calls are no-ops.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("fdgrip=debug")),
            )
            .with_test_writer()
            .init();
    });
}

/// In-memory descriptor limit; journals every set call
pub struct MemoryLimit {
    current: AtomicU64,
    pub set_calls: Mutex<Vec<u64>>,
    fail_queries: AtomicBool,
}

impl MemoryLimit {
    pub fn new(limit: u64) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicU64::new(limit),
            set_calls: Mutex::new(Vec::new()),
            fail_queries: AtomicBool::new(false),
        })
    }

    pub fn value(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Make every later query fail, to exercise the trigger fail-safe
    pub fn break_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn take_set_calls(&self) -> Vec<u64> {
        self.set_calls
            .lock()
            .map(|mut calls| std::mem::take(&mut *calls))
            .unwrap_or_default()
    }
}

impl LimitAccessor for MemoryLimit {
    fn current(&self) -> Result<u64, TrackError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(TrackError::LimitQueryFailed {
                source: nix::errno::Errno::EINVAL,
            });
        }
        Ok(self.current.load(Ordering::SeqCst))
    }

    fn set_current(&self, limit: u64) -> Result<(), TrackError> {
        self.current.store(limit, Ordering::SeqCst);
        if let Ok(mut calls) = self.set_calls.lock() {
            calls.push(limit);
        }
        Ok(())
    }
}

/// Trait-object adapter around a shared [`MemoryLimit`]
pub struct LimitHandle(pub Arc<MemoryLimit>);

impl LimitAccessor for LimitHandle {
    fn current(&self) -> Result<u64, TrackError> {
        self.0.current()
    }

    fn set_current(&self, limit: u64) -> Result<(), TrackError> {
        self.0.set_current(limit)
    }
}

/// Capture provider returning a fixed (native, managed) pair
pub struct ScriptedCapture {
    pub native: String,
    pub managed: String,
}

impl ScriptedCapture {
    pub fn new(native: &str, managed: &str) -> Self {
        Self {
            native: native.to_string(),
            managed: managed.to_string(),
        }
    }
}

impl StackCapture for ScriptedCapture {
    fn capture(&self) -> CapturedStacks {
        CapturedStacks {
            native: self.native.clone(),
            managed: self.managed.clone(),
        }
    }
}

/// Capture provider that records the limit it observes mid-capture, for
/// checking the +1 headroom bracket from inside
pub struct LimitProbingCapture {
    limit: Arc<MemoryLimit>,
    pub observed: Mutex<Vec<u64>>,
}

impl LimitProbingCapture {
    pub fn new(limit: Arc<MemoryLimit>) -> Self {
        Self {
            limit,
            observed: Mutex::new(Vec::new()),
        }
    }
}

impl StackCapture for LimitProbingCapture {
    fn capture(&self) -> CapturedStacks {
        if let Ok(mut observed) = self.observed.lock() {
            observed.push(self.limit.value());
        }
        CapturedStacks {
            native: "probe".to_string(),
            managed: String::new(),
        }
    }
}

/// Sink adapter over a shared buffer
pub struct SinkHandle(pub Arc<BufferSink>);

impl ReportSink for SinkHandle {
    fn line(&self, line: &str) {
        self.0.line(line);
    }
}

/// Engine wired to a shared in-memory limit, a scripted capture, and a
/// shared buffer sink
pub fn mock_engine(
    limit: Arc<MemoryLimit>,
    capture: Box<dyn StackCapture>,
    sink: Arc<BufferSink>,
) -> FdTracker {
    init_tracing();
    FdTracker::new(
        TrackerConfig::new(),
        Box::new(LimitHandle(limit)),
        capture,
        Box::new(SinkHandle(sink)),
    )
}
