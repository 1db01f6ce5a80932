//! Run results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::Status;
use crate::types::ResourceRef;

/// Counts over all statuses of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub changed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub out_of_sync: usize,
    pub corrective: usize,
    pub restarted: usize,
    pub failed_to_restart: usize,
    /// Resources that were evaluated and needed nothing
    pub unchanged: usize,
    /// Number of property changes applied
    pub events: usize,
}

impl ReportSummary {
    /// Add a status to the summary
    pub fn add_status(&mut self, status: &Status) {
        self.total += 1;
        if status.changed {
            self.changed += 1;
        }
        if status.failed || status.failed_to_restart {
            self.failed += 1;
        }
        if status.skipped {
            self.skipped += 1;
        }
        if status.out_of_sync {
            self.out_of_sync += 1;
        }
        if status.corrective_change {
            self.corrective += 1;
        }
        if status.restarted {
            self.restarted += 1;
        }
        if status.failed_to_restart {
            self.failed_to_restart += 1;
        }
        if !status.skipped && !status.out_of_sync && !status.failed {
            self.unchanged += 1;
        }
        self.events += status.change_count;
    }

    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Statuses of one run, in the order the resources were visited
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub catalog: String,
    pub noop: bool,
    pub time: DateTime<Utc>,
    pub statuses: Vec<Status>,
    pub summary: ReportSummary,
}

impl Report {
    pub fn new(catalog: &str, noop: bool) -> Self {
        Self {
            catalog: catalog.to_string(),
            noop,
            time: Utc::now(),
            statuses: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    pub fn add_status(&mut self, status: Status) {
        self.summary.add_status(&status);
        self.statuses.push(status);
    }

    /// Status of one resource, if it was visited
    pub fn status(&self, resource: &ResourceRef) -> Option<&Status> {
        self.statuses.iter().find(|s| &s.resource == resource)
    }

    /// Visited resources in order
    pub fn order(&self) -> Vec<ResourceRef> {
        self.statuses.iter().map(|s| s.resource.clone()).collect()
    }
}
