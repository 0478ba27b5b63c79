//! Error types for the attribution engine
//!
//! Every error here is handled locally by the engine: limit failures
//! degrade the engine to a permanent pass-through, table anomalies are
//! logged and skipped. Nothing propagates to the intercepted caller,
//! because tracking must be invisible to the process being diagnosed.

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised by the attribution engine and its collaborators
#[derive(Error, Debug)]
pub enum TrackError {
    /// The descriptor limit could not be read
    #[error("failed to query descriptor limit: {source}")]
    LimitQueryFailed { source: Errno },

    /// The descriptor limit is reported as unbounded, so there is no
    /// ceiling to watch and nothing to arm against
    #[error("descriptor limit is unbounded; tracking disabled")]
    LimitUnbounded,

    /// The descriptor limit could not be changed
    #[error("failed to adjust descriptor limit to {target}: {source}")]
    LimitAdjustFailed { target: u64, source: Errno },

    /// A descriptor number fell outside the attribution table
    #[error("descriptor {fd} out of range (table capacity {capacity})")]
    DescriptorOutOfRange { fd: i32, capacity: usize },

    /// A second allocation was recorded for a descriptor whose slot is
    /// still occupied, which means the interception layer missed a close
    #[error("descriptor {fd} already attributed; missed release?")]
    SlotAlreadyOccupied { fd: i32 },
}

pub type Result<T> = std::result::Result<T, TrackError>;
