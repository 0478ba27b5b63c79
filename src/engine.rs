//! The attribution engine
//!
//! `FdTracker` ties the pieces together: the state machine, the
//! per-descriptor slot table, the deduplicated fingerprint table, and the
//! limit/capture/sink collaborators. Construction attempts to arm the
//! engine by installing a lowered descriptor ceiling; the external
//! interception layer then reports every descriptor allocation and
//! release, calls [`FdTracker::trigger`] when an allocation fails at the
//! lowered ceiling, and calls [`FdTracker::report`] to dump and disarm.
//!
//! Concurrency discipline: the slot table, the fingerprint table, and the
//! authoritative tracking state form one logical unit guarded by a single
//! mutex. The hot paths pre-check the state with an unguarded relaxed
//! read and re-validate after acquiring the lock; a trigger or report can
//! land between the two.
//!
//! The engine never surfaces an error to the intercepted caller. Limit
//! failures degrade it to pass-through, table anomalies are logged and
//! skipped, and the real operation's result is always returned unchanged
//! by the wrappers in [`crate::intercept`].

use crate::capture::{BacktraceCapture, StackCapture};
use crate::config::TrackerConfig;
use crate::error::TrackError;
use crate::fingerprint::{Fingerprint, FingerprintTable, Released};
use crate::limits::{LimitAccessor, RlimitAccessor};
use crate::report::LeakReport;
use crate::sink::{ReportSink, TracingSink};
use crate::slots::SlotTable;
use crate::state::{StateCell, TrackingState};
use std::os::fd::RawFd;
use std::sync::Mutex;
use tracing::{debug, error, warn};

/// Tables guarded by the engine lock
struct Inner {
    slots: SlotTable,
    fingerprints: FingerprintTable,
}

/// Transient +1 descriptor headroom around a stack capture
///
/// The capture provider may itself need to open a descriptor; raising the
/// current ceiling by one unit guarantees it cannot be blocked by the
/// limit the engine is enforcing. Restore runs on drop, so the bracket
/// closes even when the capture comes back empty. Held under the engine
/// lock, which keeps the +1 state invisible as a steady state.
struct HeadroomGuard<'a> {
    limits: &'a dyn LimitAccessor,
    prior: Option<u64>,
}

impl<'a> HeadroomGuard<'a> {
    fn raise(limits: &'a dyn LimitAccessor) -> Self {
        let prior = match limits.current() {
            Ok(current) => match limits.set_current(current + 1) {
                Ok(()) => Some(current),
                Err(err) => {
                    warn!(%err, "could not raise capture headroom");
                    None
                }
            },
            // Unbounded needs no headroom; query failure means we
            // capture without it and hope the provider stays under limit
            Err(err) => {
                debug!(%err, "capture headroom unavailable");
                None
            }
        };
        Self { limits, prior }
    }
}

impl Drop for HeadroomGuard<'_> {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            if let Err(err) = self.limits.set_current(prior) {
                warn!(%err, "failed to restore descriptor limit after capture");
            }
        }
    }
}

/// File-descriptor leak attribution engine
///
/// One instance per process; all methods take `&self` and are safe to
/// call from any thread.
pub struct FdTracker {
    config: TrackerConfig,
    state: StateCell,
    inner: Mutex<Inner>,
    limits: Box<dyn LimitAccessor>,
    capture: Box<dyn StackCapture>,
    sink: Box<dyn ReportSink>,
    /// Measured once at arm time; immutable afterwards
    true_limit: Option<u64>,
}

impl FdTracker {
    /// Build an engine from explicit collaborators and try to arm it
    ///
    /// Arming queries the true descriptor limit and installs
    /// `true_limit * threshold` as the current ceiling. If the limit is
    /// unreadable, unbounded, or cannot be lowered, the engine stays
    /// `Disabled` and every later call is a pass-through.
    pub fn new(
        config: TrackerConfig,
        limits: Box<dyn LimitAccessor>,
        capture: Box<dyn StackCapture>,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        let mut tracker = Self {
            config,
            state: StateCell::new(TrackingState::Disabled),
            inner: Mutex::new(Inner {
                slots: SlotTable::new(0),
                fingerprints: FingerprintTable::new(),
            }),
            limits,
            capture,
            sink,
            true_limit: None,
        };
        tracker.arm();
        tracker
    }

    /// Production engine: soft `RLIMIT_NOFILE`, `backtrace` capture,
    /// `tracing` sink
    pub fn with_defaults(config: TrackerConfig) -> Self {
        let capture_skip = config.capture_skip;
        Self::new(
            config,
            Box::new(RlimitAccessor::new()),
            Box::new(BacktraceCapture::new(capture_skip)),
            Box::new(TracingSink::new()),
        )
    }

    fn arm(&mut self) {
        if !self.config.threshold_is_valid() {
            error!(
                threshold = self.config.threshold,
                "watch threshold must be in (0, 1); tracking disabled"
            );
            return;
        }
        let true_limit = match self.limits.current() {
            Ok(limit) => limit,
            Err(err) => {
                error!(%err, "tracking disabled");
                return;
            }
        };
        let lowered = (true_limit as f64 * self.config.threshold) as u64;
        if let Err(err) = self.limits.set_current(lowered) {
            error!(%err, "tracking disabled");
            return;
        }
        if let Ok(mut inner) = self.inner.lock() {
            inner.slots = SlotTable::new(true_limit as usize);
        }
        self.true_limit = Some(true_limit);
        self.state.store(TrackingState::Armed);
        debug!(true_limit, lowered, "armed descriptor tracking");
    }

    /// Current lifecycle state
    pub fn state(&self) -> TrackingState {
        self.state.load()
    }

    /// True descriptor limit measured at arm time, if arming succeeded
    pub fn true_limit(&self) -> Option<u64> {
        self.true_limit
    }

    /// Attribute a freshly allocated descriptor to its call site
    ///
    /// Called by the interception layer immediately after the real
    /// allocation succeeded. No-op unless the engine is `Triggered`.
    pub fn record_allocation(&self, fd: RawFd) {
        if self.state.load_relaxed() != TrackingState::Triggered {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if self.state.load() != TrackingState::Triggered {
            return;
        }
        if !inner.slots.in_range(fd) {
            warn!(
                fd,
                capacity = inner.slots.capacity(),
                "descriptor out of attribution range"
            );
            return;
        }

        let stacks = {
            let _headroom = HeadroomGuard::raise(self.limits.as_ref());
            self.capture.capture()
        };
        let fingerprint = Fingerprint::of(&stacks.native, &stacks.managed);
        match inner.slots.occupy(fd, fingerprint) {
            Ok(()) => {
                let count =
                    inner
                        .fingerprints
                        .record(fingerprint, &stacks.native, &stacks.managed);
                debug!(fd, count, "attributed descriptor");
            }
            Err(err @ TrackError::SlotAlreadyOccupied { .. }) => {
                // Interception-layer ordering bug: a close went unseen.
                // Loud diagnostic, skip; the earlier attribution stands.
                error!(fd, %err, "skipping attribution");
            }
            Err(err) => {
                warn!(fd, %err, "skipping attribution");
            }
        }
    }

    /// Release the attribution for a closed descriptor
    ///
    /// Called by the interception layer after the real close completed;
    /// the close's result is never affected. No-op unless `Triggered`.
    pub fn record_release(&self, fd: RawFd) {
        if self.state.load_relaxed() != TrackingState::Triggered {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if self.state.load() != TrackingState::Triggered {
            return;
        }
        let Some(fingerprint) = inner.slots.vacate(fd) else {
            return;
        };
        match inner.fingerprints.release(&fingerprint) {
            Released::Remaining(count) => debug!(fd, count, "released attributed descriptor"),
            Released::Removed => debug!(fd, "released last descriptor for its site"),
            Released::Missing => error!(
                fd,
                fingerprint = %fingerprint.to_hex(),
                "attributed descriptor had no fingerprint record"
            ),
        }
    }

    /// Flip from `Armed` to `Triggered`: restore the true descriptor
    /// ceiling and start attributing
    ///
    /// Called when an allocation attempt is observed failing at the
    /// lowered ceiling. Only meaningful from `Armed`. If the limit can no
    /// longer be read or restored, the engine disables itself rather than
    /// leave the process running at a fraction of its real ceiling.
    pub fn trigger(&self) {
        let Ok(_inner) = self.inner.lock() else {
            return;
        };
        if self.state.load() != TrackingState::Armed {
            return;
        }
        let Some(true_limit) = self.true_limit else {
            return;
        };
        if let Err(err) = self.limits.current() {
            error!(%err, "limit re-query failed at trigger; tracking disabled");
            self.state.store(TrackingState::Disabled);
            return;
        }
        if let Err(err) = self.limits.set_current(true_limit) {
            error!(%err, "could not restore true descriptor limit; tracking disabled");
            self.state.store(TrackingState::Disabled);
            return;
        }
        warn!(
            true_limit,
            "descriptor watch threshold crossed; attributing all further allocations"
        );
        self.state.store(TrackingState::Triggered);
    }

    /// Dump the ranked leak report and disarm
    ///
    /// One-shot: transitions `Triggered` to `Disabled` and there is no
    /// path back to `Armed`. A second call is a no-op. The tables are not
    /// cleared, so [`FdTracker::snapshot`] still sees them afterwards.
    pub fn report(&self) {
        let snapshot = {
            let Ok(inner) = self.inner.lock() else {
                return;
            };
            if self.state.load() != TrackingState::Triggered {
                return;
            }
            let snapshot = inner.fingerprints.snapshot();
            self.state.store(TrackingState::Disabled);
            snapshot
        };
        // Sorting and emission happen outside the lock; no I/O while
        // record/release calls are blocked
        LeakReport::from_snapshot(snapshot).emit(self.sink.as_ref());
    }

    /// Ranked snapshot of the current tables without changing state
    pub fn snapshot(&self) -> LeakReport {
        let Ok(inner) = self.inner.lock() else {
            return LeakReport::default();
        };
        LeakReport::from_snapshot(inner.fingerprints.snapshot())
    }

    /// Number of descriptors currently attributed
    pub fn tracked_descriptors(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.slots.occupied())
            .unwrap_or(0)
    }
}

impl Drop for FdTracker {
    fn drop(&mut self) {
        // An armed engine still holds the lowered ceiling; give the true
        // limit back on teardown
        if self.state.load() == TrackingState::Armed {
            if let Some(true_limit) = self.true_limit {
                if let Err(err) = self.limits.set_current(true_limit) {
                    warn!(%err, "could not restore descriptor limit on teardown");
                }
            }
        }
    }
}
