//! Leak report snapshot, ranking, and emission
//!
//! A report is a flat snapshot of the fingerprint table taken under the
//! engine lock, sorted outside the lock so no I/O happens while record
//! and release calls are blocked. Ranking is by descending live-descriptor
//! count; ties break on the fingerprint hex so ordering is deterministic
//! within a run.

use crate::fingerprint::{Fingerprint, FingerprintRecord};
use crate::sink::ReportSink;
use serde::{Deserialize, Serialize};

/// One ranked allocation site in a leak report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeakSite {
    /// Hex fingerprint of the (native, managed) stack pair
    pub fingerprint: String,
    /// Live descriptors attributed to this site at snapshot time
    pub count: u64,
    /// Managed call-stack text
    pub managed_stack: String,
    /// Native call-stack text
    pub native_stack: String,
}

/// Snapshot of every tracked allocation site, ranked worst-first
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeakReport {
    pub sites: Vec<LeakSite>,
}

impl LeakReport {
    /// Build a ranked report from a fingerprint table snapshot
    pub fn from_snapshot(snapshot: Vec<(Fingerprint, FingerprintRecord)>) -> Self {
        let mut sites: Vec<LeakSite> = snapshot
            .into_iter()
            .map(|(fingerprint, record)| LeakSite {
                fingerprint: fingerprint.to_hex(),
                count: record.count,
                managed_stack: record.managed_stack,
                native_stack: record.native_stack,
            })
            .collect();
        sites.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        Self { sites }
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Total live descriptors covered by the report
    pub fn total_descriptors(&self) -> u64 {
        self.sites.iter().map(|site| site.count).sum()
    }

    /// Emit the dump through a sink, one banner-framed block per site
    pub fn emit(&self, sink: &dyn ReportSink) {
        sink.line("****** descriptor leak dump begin ******");
        for site in &self.sites {
            sink.line("------ leak site ------");
            sink.line(&format!("repetition: {}", site.count));
            sink.line(&format!("managed stack:\n{}", site.managed_stack));
            sink.line(&format!("native stack:\n{}", site.native_stack));
        }
        sink.line("****** descriptor leak dump end ******");
    }

    /// JSON rendering for machine consumption
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
