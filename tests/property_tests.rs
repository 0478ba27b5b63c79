//! Property-based tests for reference-count exactness
//!
//! Drives the engine with arbitrary record/release sequences and checks
//! the aggregate table against a naive model: at every point the count
//! stored for a site equals the number of live descriptors attributed to
//! it.

mod utils;

use fdgrip::capture::{CapturedStacks, StackCapture};
use fdgrip::sink::BufferSink;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use utils::{mock_engine, MemoryLimit, ScriptedCapture};

const FD_RANGE: i32 = 16;
const SITE_COUNT: usize = 3;

/// Capture provider cycling through a small set of site names, so
/// different allocations can land on different fingerprints
struct RotatingCapture {
    tick: AtomicUsize,
}

impl RotatingCapture {
    fn new() -> Self {
        Self {
            tick: AtomicUsize::new(0),
        }
    }
}

impl StackCapture for RotatingCapture {
    fn capture(&self) -> CapturedStacks {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);
        CapturedStacks {
            native: format!("site_{}", tick % SITE_COUNT),
            managed: String::new(),
        }
    }
}

/// Reference model mirroring the engine's attribution rules
#[derive(Default)]
struct Model {
    tick: usize,
    slots: HashMap<i32, String>,
    counts: HashMap<String, u64>,
}

impl Model {
    fn record(&mut self, fd: i32) {
        // A record on an in-range descriptor always consumes one capture,
        // even when the slot turns out to be occupied
        let site = format!("site_{}", self.tick % SITE_COUNT);
        self.tick += 1;
        if self.slots.contains_key(&fd) {
            return;
        }
        self.slots.insert(fd, site.clone());
        *self.counts.entry(site).or_insert(0) += 1;
    }

    fn release(&mut self, fd: i32) {
        let Some(site) = self.slots.remove(&fd) else {
            return;
        };
        if let Some(count) = self.counts.get_mut(&site) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&site);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_counts_match_model(ops in prop::collection::vec((0..FD_RANGE, prop::bool::ANY), 0..200)) {
        let limit = MemoryLimit::new(FD_RANGE as u64);
        let sink = Arc::new(BufferSink::new());
        let tracker = mock_engine(limit, Box::new(RotatingCapture::new()), sink);
        tracker.trigger();

        let mut model = Model::default();
        for (fd, is_record) in ops {
            if is_record {
                tracker.record_allocation(fd);
                model.record(fd);
            } else {
                tracker.record_release(fd);
                model.release(fd);
            }
        }

        let engine_counts: HashMap<String, u64> = tracker
            .snapshot()
            .sites
            .into_iter()
            .map(|site| (site.native_stack, site.count))
            .collect();
        prop_assert_eq!(engine_counts, model.counts);
        prop_assert_eq!(tracker.tracked_descriptors(), model.slots.len());
    }

    #[test]
    fn prop_untriggered_engine_ignores_everything(ops in prop::collection::vec((0..FD_RANGE, prop::bool::ANY), 0..100)) {
        let limit = MemoryLimit::new(FD_RANGE as u64);
        let sink = Arc::new(BufferSink::new());
        let tracker = mock_engine(
            limit,
            Box::new(ScriptedCapture::new("never_used", "")),
            sink,
        );

        for (fd, is_record) in ops {
            if is_record {
                tracker.record_allocation(fd);
            } else {
                tracker.record_release(fd);
            }
        }
        prop_assert!(tracker.snapshot().is_empty());
        prop_assert_eq!(tracker.tracked_descriptors(), 0);
    }
}
