//! fdgrip - file descriptor leak attribution engine
//!
//! This library instruments a process's descriptor churn to diagnose
//! leaks. It arms by installing a lowered `RLIMIT_NOFILE` ceiling; when
//! an allocation first fails at that lowered ceiling it restores the true
//! limit and starts attributing every live and future descriptor to a
//! deduplicated allocation site (a native + managed call-stack
//! fingerprint). A report ranks the sites by live-descriptor count so the
//! heaviest leak sources surface first, then disarms the engine.
//!
//! Best-effort, one-shot diagnostic capture: the engine never prevents a
//! leak, never frees anything, and never changes the outcome of the
//! operations it observes.

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod intercept;
pub mod limits;
pub mod report;
pub mod sink;
pub mod slots;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use capture::{BacktraceCapture, CapturedStacks, StackCapture};
pub use config::TrackerConfig;
pub use engine::FdTracker;
pub use error::TrackError;
pub use intercept::{Interceptor, OriginalOps};
pub use limits::{LimitAccessor, RlimitAccessor};
pub use report::{LeakReport, LeakSite};
pub use sink::{BufferSink, ReportSink, TracingSink};
pub use state::TrackingState;
