//! Run result reporting

use super::failure::FailureCounts;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Counters and metadata for a completed (or cancelled) run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub units_processed: usize,
    pub events_processed: usize,
    /// Events left untouched because no row carried a parseable date
    pub events_skipped_no_date: usize,
    /// Distinct (subject, event, form) triples accepted by a submit call
    pub forms_submitted: usize,
    pub item_posts: usize,
    pub item_groups_created: usize,
    pub failures: FailureCounts,
    /// Stopped at a unit boundary before all units ran
    pub cancelled: bool,
    pub failure_log: PathBuf,
    pub item_group_log: PathBuf,
}

impl RunSummary {
    pub fn new(failure_log: PathBuf, item_group_log: PathBuf) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: edcm_common::time::now(),
            ended_at: None,
            units_processed: 0,
            events_processed: 0,
            events_skipped_no_date: 0,
            forms_submitted: 0,
            item_posts: 0,
            item_groups_created: 0,
            failures: FailureCounts::default(),
            cancelled: false,
            failure_log,
            item_group_log,
        }
    }

    pub fn finish(&mut self, failures: FailureCounts) {
        self.failures = failures;
        self.ended_at = Some(edcm_common::time::now());
    }
}

/// Result of a migration request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// Nothing was attempted: incomplete configuration or no subjects
    Skipped { reason: String },
    Completed(RunSummary),
}

impl MigrationOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, MigrationOutcome::Skipped { .. })
    }
}
