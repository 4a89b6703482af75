//! Orphan reconciliation state
//!
//! ```text
//! check_orphan(known₁) ──► open cycle, staging = {}
//!        node reports ──► staging += report − known₁
//! double_check(known₂) ──► final = staging − known₂, close cycle
//! ```
//!
//! Reports that arrive while no cycle is open are dropped.

use codec::{NodeHandlesReport, OrphanReport};
use types::{KnownHandles, OrphanSet, ProvisionedServiceHandle};

#[derive(Debug, Default)]
pub struct OrphanTracker {
    open: bool,
    baseline: KnownHandles,
    staging: OrphanSet,
    final_set: OrphanSet,
}

impl OrphanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a cycle against the first handle snapshot
    pub fn open_cycle(&mut self, known: &[ProvisionedServiceHandle]) {
        self.open = true;
        self.baseline = KnownHandles::new(known);
        self.staging.clear();
        self.final_set.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Merge one report; returns false when no cycle is open
    pub fn stage(&mut self, report: &NodeHandlesReport) -> bool {
        if !self.open {
            return false;
        }
        self.staging
            .stage_report(&report.node_id, &report.instances, &report.bindings, &self.baseline);
        true
    }

    /// Re-check staging against the second snapshot and close the cycle
    pub fn finish(&mut self, known: &[ProvisionedServiceHandle]) -> OrphanSet {
        self.final_set = self.staging.refilter(&KnownHandles::new(known));
        self.open = false;
        self.final_set.clone()
    }

    pub fn report(&self) -> OrphanReport {
        OrphanReport {
            staging: self.staging.clone(),
            final_set: self.final_set.clone(),
        }
    }
}
