//! Per-descriptor attribution slots
//!
//! A fixed-capacity table indexed by descriptor number, sized to the true
//! descriptor limit at arm time. A slot holds the fingerprint of the call
//! site that created the descriptor, or nothing. Slots are owned
//! exclusively by the engine; a slot is non-empty only while its
//! descriptor is live and tracking was active when it was created.

use crate::error::{Result, TrackError};
use crate::fingerprint::Fingerprint;
use std::os::fd::RawFd;

/// Fixed-size descriptor-to-fingerprint table
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Option<Fingerprint>>,
}

impl SlotTable {
    /// Allocate a table with one slot per possible descriptor number in
    /// `[0, capacity)`
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether `fd` indexes a valid slot
    pub fn in_range(&self, fd: RawFd) -> bool {
        fd >= 0 && (fd as usize) < self.slots.len()
    }

    /// Attribute `fd` to `fingerprint`
    ///
    /// Fails with `DescriptorOutOfRange` on a bad index and with
    /// `SlotAlreadyOccupied` when the slot was never vacated, which means
    /// the interception layer missed the descriptor's close.
    pub fn occupy(&mut self, fd: RawFd, fingerprint: Fingerprint) -> Result<()> {
        if !self.in_range(fd) {
            return Err(TrackError::DescriptorOutOfRange {
                fd,
                capacity: self.slots.len(),
            });
        }
        let slot = &mut self.slots[fd as usize];
        if slot.is_some() {
            return Err(TrackError::SlotAlreadyOccupied { fd });
        }
        *slot = Some(fingerprint);
        Ok(())
    }

    /// Clear the slot for `fd`, returning the fingerprint it held.
    /// Out-of-range or already-empty slots yield `None`.
    pub fn vacate(&mut self, fd: RawFd) -> Option<Fingerprint> {
        if !self.in_range(fd) {
            return None;
        }
        self.slots[fd as usize].take()
    }

    /// Fingerprint currently attributed to `fd`, if any
    pub fn get(&self, fd: RawFd) -> Option<&Fingerprint> {
        if !self.in_range(fd) {
            return None;
        }
        self.slots[fd as usize].as_ref()
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
