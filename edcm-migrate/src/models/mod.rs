//! Data models for edcm-migrate

pub mod failure;
pub mod records;
pub mod run_summary;
pub mod schedule;
pub mod subject_map;
pub mod unit;

pub use failure::{FailureCounts, FailureKind, FailureRecord};
pub use records::{ItemValue, RecordTable, TransformedRecord};
pub use run_summary::{MigrationOutcome, RunSummary};
pub use schedule::{ItemGroupDef, ScheduleRow, TargetSchedule};
pub use subject_map::{SubjectFallback, SubjectMap, SubjectMapping};
pub use unit::{EventGroupUnit, UnitState};
