use drill_cron::CronError;
use drill_types::UserId;

/// Errors raised by model operations. None of them are fatal; callers
/// neutralize them at the boundary of one interaction or one scheduled fire.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid schedule: {0}")]
    InvalidScheduleFormat(#[from] CronError),

    #[error("a goal titled '{0}' already exists")]
    DuplicateGoalTitle(String),

    #[error("goal '{0}' not found")]
    GoalNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("goal draft is missing its {0}")]
    IncompleteDraft(&'static str),

    #[error("score range must be between 1 and {max}, got {value}")]
    InvalidScoreRange { value: i64, max: u32 },

    #[error("score range must be a whole number between 1 and {max}, got {text:?}")]
    ScoreRangeNotANumber { text: String, max: u32 },
}
