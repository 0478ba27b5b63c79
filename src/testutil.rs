//! Shared mock collaborators for unit tests

use crate::capture::{CapturedStacks, StackCapture};
use crate::error::TrackError;
use crate::limits::LimitAccessor;
use crate::sink::ReportSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory limit; every set call is journalled so tests can check the
/// headroom bracket
pub(crate) struct FakeLimit {
    current: AtomicU64,
    pub(crate) set_calls: Mutex<Vec<u64>>,
}

impl FakeLimit {
    pub(crate) fn new(limit: u64) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicU64::new(limit),
            set_calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn value(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl LimitAccessor for FakeLimit {
    fn current(&self) -> Result<u64, TrackError> {
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

/// Adapter so a test can keep a handle on the limit it hands to the engine
pub(crate) struct SharedLimit(pub(crate) Arc<FakeLimit>);

impl LimitAccessor for SharedLimit {
    fn current(&self) -> Result<u64, TrackError> {
        self.0.current()
    }

    fn set_current(&self, limit: u64) -> Result<(), TrackError> {
        self.0.set_current(limit)
    }
}

/// Accessor that always fails its queries
pub(crate) struct BrokenLimit;

impl LimitAccessor for BrokenLimit {
    fn current(&self) -> Result<u64, TrackError> {
        Err(TrackError::LimitQueryFailed {
            source: nix::errno::Errno::EINVAL,
        })
    }

    fn set_current(&self, limit: u64) -> Result<(), TrackError> {
        Err(TrackError::LimitAdjustFailed {
            target: limit,
            source: nix::errno::Errno::EPERM,
        })
    }
}

/// Capture provider returning a fixed stack pair
pub(crate) struct FixedCapture {
    pub(crate) native: String,
}

impl FixedCapture {
    pub(crate) fn new(native: &str) -> Self {
        Self {
            native: native.to_string(),
        }
    }
}

impl StackCapture for FixedCapture {
    fn capture(&self) -> CapturedStacks {
        CapturedStacks {
            native: self.native.clone(),
            managed: "managed".to_string(),
        }
    }
}

/// Sink adapter over a shared buffer
pub(crate) struct SharedSink(pub(crate) Arc<crate::sink::BufferSink>);

impl ReportSink for SharedSink {
    fn line(&self, line: &str) {
        self.0.line(line);
    }
}
