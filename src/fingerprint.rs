//! Deduplicated call-site fingerprints
//!
//! A fingerprint is the SHA-256 of a combined native + managed stack text
//! pair. Every live descriptor created from the same call site shares one
//! `FingerprintRecord`; the record's count is the number of live
//! descriptors currently attributed to it, and the record dies when the
//! last of them is released.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Content-derived key for a (native, managed) stack text pair
///
/// Identical pairs always map to the same key; distinct pairs practically
/// never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a stack text pair
    pub fn of(native_stack: &str, managed_stack: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(native_stack.as_bytes());
        // Separator keeps ("ab","c") distinct from ("a","bc")
        hasher.update([0u8]);
        hasher.update(managed_stack.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Hex rendering, used in log lines and the JSON report
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Aggregate record for one allocation site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Number of live descriptors attributed to this site
    pub count: u64,
    /// Native call-stack text captured at first observation
    pub native_stack: String,
    /// Managed call-stack text captured at first observation
    pub managed_stack: String,
}

/// Outcome of releasing one reference to a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// References remain; the record survives
    Remaining(u64),
    /// Count reached zero; the record and its stack texts were dropped
    Removed,
    /// No record for this fingerprint (table/slot inconsistency)
    Missing,
}

/// Deduplicated map from fingerprint to aggregate record
#[derive(Debug, Default)]
pub struct FingerprintTable {
    records: HashMap<Fingerprint, FingerprintRecord>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one allocation for `fingerprint`, creating the record on
    /// first observation. Returns the count after the increment.
    pub fn record(&mut self, fingerprint: Fingerprint, native_stack: &str, managed_stack: &str) -> u64 {
        let entry = self
            .records
            .entry(fingerprint)
            .or_insert_with(|| FingerprintRecord {
                count: 0,
                native_stack: native_stack.to_string(),
                managed_stack: managed_stack.to_string(),
            });
        entry.count += 1;
        entry.count
    }

    /// Release one reference; removes the record when the count hits zero
    pub fn release(&mut self, fingerprint: &Fingerprint) -> Released {
        let Some(record) = self.records.get_mut(fingerprint) else {
            return Released::Missing;
        };
        record.count -= 1;
        let remaining = record.count;
        if remaining == 0 {
            self.records.remove(fingerprint);
            Released::Removed
        } else {
            Released::Remaining(remaining)
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&FingerprintRecord> {
        self.records.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clone out every (fingerprint, record) pair for reporting
    pub fn snapshot(&self) -> Vec<(Fingerprint, FingerprintRecord)> {
        self.records
            .iter()
            .map(|(fp, record)| (*fp, record.clone()))
            .collect()
    }
}
