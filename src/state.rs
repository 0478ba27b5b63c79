//! Tracking state machine for the attribution engine
//!
//! The engine moves through exactly three states:
//!
//! - `Disabled`: pass-through; nothing is recorded
//! - `Armed`: the descriptor limit has been lowered to the watch
//!   threshold; allocations are not yet attributed
//! - `Triggered`: the true limit has been restored and every
//!   allocation/release is attributed until a report disarms the engine
//!
//! The state value is stored in an atomic so the hot record/release paths
//! can skip early with a relaxed read. That read is only a pre-check: any
//! caller that proceeds past it must re-validate the state after taking
//! the engine lock, because a trigger or report can land in between.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackingState {
    /// Pass-through; attribution is off and cannot come back on
    Disabled = 0,
    /// Watching the lowered limit, not yet attributing
    Armed = 1,
    /// Attributing every allocation and release
    Triggered = 2,
}

impl TrackingState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => TrackingState::Armed,
            2 => TrackingState::Triggered,
            _ => TrackingState::Disabled,
        }
    }
}

/// Shared state cell with a relaxed fast-path read
///
/// All writes happen while the engine lock is held; the unguarded read
/// exists only so the common not-triggered case stays cheap.
#[derive(Debug)]
pub struct StateCell {
    raw: AtomicU8,
}

impl StateCell {
    pub fn new(initial: TrackingState) -> Self {
        Self {
            raw: AtomicU8::new(initial as u8),
        }
    }

    /// Unguarded pre-check read. Callers must re-validate under the
    /// engine lock before mutating any table.
    pub fn load_relaxed(&self) -> TrackingState {
        TrackingState::from_raw(self.raw.load(Ordering::Relaxed))
    }

    /// Authoritative read, used after the engine lock is acquired
    pub fn load(&self) -> TrackingState {
        TrackingState::from_raw(self.raw.load(Ordering::Acquire))
    }

    /// State transition; caller must hold the engine lock
    pub fn store(&self, state: TrackingState) {
        self.raw.store(state as u8, Ordering::Release);
    }
}
