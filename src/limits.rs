//! Descriptor limit access
//!
//! The engine perturbs the process's descriptor ceiling twice: the
//! long-lived arm/trigger headroom adjustment and the per-capture +1/-1
//! bracket. Both go through the `LimitAccessor` trait so tests can swap
//! in an in-memory limit, while production uses the soft `RLIMIT_NOFILE`
//! via nix.

use crate::error::{Result, TrackError};
use nix::sys::resource::{getrlimit, setrlimit, Resource, RLIM_INFINITY};
use tracing::debug;

/// Get/set access to the process's current descriptor-count ceiling
pub trait LimitAccessor: Send + Sync {
    /// Current ceiling. Fails with `LimitQueryFailed` when the limit
    /// cannot be read and `LimitUnbounded` when there is no ceiling.
    fn current(&self) -> Result<u64>;

    /// Install a new current ceiling
    fn set_current(&self, limit: u64) -> Result<()>;
}

/// Production accessor over the soft `RLIMIT_NOFILE`
///
/// The hard limit is left untouched: the engine only ever moves the soft
/// limit between the lowered watch ceiling, the true ceiling, and the
/// transient +1 capture headroom, all of which sit at or barely above the
/// value measured at arm time.
#[derive(Debug, Default, Clone, Copy)]
pub struct RlimitAccessor;

impl RlimitAccessor {
    pub fn new() -> Self {
        Self
    }
}

impl LimitAccessor for RlimitAccessor {
    fn current(&self) -> Result<u64> {
        let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE)
            .map_err(|source| TrackError::LimitQueryFailed { source })?;
        debug!(soft, hard, "queried RLIMIT_NOFILE");
        if soft == RLIM_INFINITY {
            return Err(TrackError::LimitUnbounded);
        }
        Ok(soft)
    }

    fn set_current(&self, limit: u64) -> Result<()> {
        let (_, hard) = getrlimit(Resource::RLIMIT_NOFILE)
            .map_err(|source| TrackError::LimitQueryFailed { source })?;
        setrlimit(Resource::RLIMIT_NOFILE, limit, hard)
            .map_err(|source| TrackError::LimitAdjustFailed { target: limit, source })?;
        debug!(limit, "set RLIMIT_NOFILE soft limit");
        Ok(())
    }
}
