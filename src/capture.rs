//! Call-stack capture
//!
//! The engine treats captured stacks as two opaque strings: a native
//! stack and a managed (interpreter/VM) stack. The pair is what gets
//! fingerprinted, so the provider's formatting only has to be stable
//! within one process run.
//!
//! `BacktraceCapture` is the production native-side provider. Processes
//! embedding a managed runtime supply their own `StackCapture` that fills
//! in the managed text; the engine itself never interprets either string.

use backtrace::Backtrace;
use std::fmt::Write as _;

/// A captured (native, managed) stack text pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStacks {
    pub native: String,
    pub managed: String,
}

/// Provider of stack text pairs
///
/// Invoked only inside the engine's +1 headroom bracket, so an
/// implementation may open a transient descriptor without being blocked
/// by the lowered limit. Implementations must be bounded-latency and must
/// not panic; an empty string is the correct way to report "nothing
/// captured".
pub trait StackCapture: Send + Sync {
    fn capture(&self) -> CapturedStacks;
}

/// Native stack capture via the `backtrace` crate
///
/// The managed side is left empty; pair this with a runtime-specific
/// provider when diagnosing a process with an interpreter in it.
#[derive(Debug, Clone, Copy)]
pub struct BacktraceCapture {
    /// Leading frames to drop so traces start at the intercepted call
    skip: usize,
}

impl BacktraceCapture {
    pub fn new(skip: usize) -> Self {
        Self { skip }
    }
}

impl StackCapture for BacktraceCapture {
    fn capture(&self) -> CapturedStacks {
        let backtrace = Backtrace::new();
        let mut native = String::new();
        for (index, frame) in backtrace.frames().iter().enumerate().skip(self.skip) {
            let ip = frame.ip() as usize;
            let symbols = frame.symbols();
            if symbols.is_empty() {
                let _ = writeln!(native, "#{index:02} {ip:#018x} <unresolved>");
                continue;
            }
            for symbol in symbols {
                match symbol.name() {
                    Some(name) => {
                        let _ = writeln!(native, "#{index:02} {ip:#018x} {name}");
                    }
                    None => {
                        let _ = writeln!(native, "#{index:02} {ip:#018x} <unknown>");
                    }
                }
            }
        }
        CapturedStacks {
            native,
            managed: String::new(),
        }
    }
}
