//! drill-cron: cron schedules for goal check-ins.
//!
//! Provides the restricted 5-field schedule grammar used by goals, the
//! canonical schedule string that groups goals into one prompt round, and a
//! tokio-backed scheduler that fires callbacks on schedule boundaries.

pub mod schedule;
pub mod scheduler;

pub use schedule::{Cadence, CronField, CronSchedule};
pub use scheduler::{CronScheduler, JobCallback, SchedulerBackend};

/// Errors produced while parsing or evaluating a schedule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} step must be greater than zero")]
    ZeroStep { field: &'static str },
    #[error("schedule '{expr}' rejected: {reason}")]
    Rejected { expr: String, reason: String },
}
