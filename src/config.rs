//! Tracker configuration with builder pattern
//!
//! Two knobs only: the watch threshold (what fraction of the true
//! descriptor limit arms as the lowered ceiling) and how many leading
//! frames the native stack capture skips so traces start at the
//! intercepted call rather than inside the engine.

/// Configuration for the attribution engine
///
/// # Example
/// ```
/// use fdgrip::config::TrackerConfig;
///
/// let config = TrackerConfig::new()
///     .with_threshold(0.9)
///     .with_capture_skip(6)
///     .build();
/// assert!((config.threshold - 0.9).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Fraction of the true limit installed as the armed ceiling.
    /// Must be strictly between 0 and 1; arming fails otherwise.
    pub threshold: f64,

    /// Leading stack frames to drop from native captures
    pub capture_skip: usize,
}

/// Default watch threshold: trigger once 80% of the true limit is in use
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Default frame skip: engine internals between the intercepted call and
/// the capture call site
pub const DEFAULT_CAPTURE_SKIP: usize = 4;

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            capture_skip: DEFAULT_CAPTURE_SKIP,
        }
    }
}

impl TrackerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the watch threshold fraction
    pub fn with_threshold(mut self, fraction: f64) -> Self {
        self.threshold = fraction;
        self
    }

    /// Set the number of leading native frames to skip
    pub fn with_capture_skip(mut self, frames: usize) -> Self {
        self.capture_skip = frames;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Self {
        self
    }

    /// A threshold outside (0, 1) leaves nothing to watch or no headroom
    /// to restore, so arming refuses it
    pub fn threshold_is_valid(&self) -> bool {
        self.threshold > 0.0 && self.threshold < 1.0
    }
}
