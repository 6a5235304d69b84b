//! Goal drafts collected step by step before a goal exists.

use drill_cron::CronSchedule;

use crate::error::ModelError;
use crate::goal::Goal;
use crate::score::ScoreType;

/// Weekday names, indexed by crontab day-of-week number (0 = Sunday).
pub const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// How the user chose to describe a goal's schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleKind {
    /// Every day at the configured check hour.
    Daily,
    /// Once a week at the configured check hour, 0 = Sunday.
    Weekly { weekday: u32 },
    /// A cron expression entered directly.
    Cron(CronSchedule),
}

impl ScheduleKind {
    /// Answers offered for the schedule-type question.
    pub const LABELS: [&'static str; 3] = ["daily", "weekly", "cron syntax"];

    pub fn weekday_from_name(name: &str) -> Option<u32> {
        let name = name.trim();
        WEEKDAYS
            .iter()
            .position(|d| d.eq_ignore_ascii_case(name) || d[..3].eq_ignore_ascii_case(name))
            .map(|i| i as u32)
    }

    /// The concrete schedule, with `daily_hour` filling in the check time.
    pub fn resolve(&self, daily_hour: u32) -> Result<CronSchedule, ModelError> {
        let schedule = match self {
            Self::Daily => CronSchedule::parse(&format!("0 {daily_hour} * * *"))?,
            Self::Weekly { weekday } => {
                CronSchedule::parse(&format!("0 {daily_hour} * * {weekday}"))?
            }
            Self::Cron(schedule) => schedule.clone(),
        };
        Ok(schedule)
    }
}

/// A goal under construction. Every field is optional until [`GoalDraft::build`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalDraft {
    pub title: Option<String>,
    pub schedule: Option<ScheduleKind>,
    pub score_type: Option<ScoreType>,
    pub score_range: Option<u32>,
}

impl GoalDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn schedule(mut self, schedule: ScheduleKind) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn score_type(mut self, score_type: ScoreType) -> Self {
        self.score_type = Some(score_type);
        self
    }

    pub fn score_range(mut self, score_range: u32) -> Self {
        self.score_range = Some(score_range);
        self
    }

    /// Validate and construct the goal.
    pub fn build(&self, daily_hour: u32, max_range: u32) -> Result<Goal, ModelError> {
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ModelError::IncompleteDraft("title"))?;
        let cron = self
            .schedule
            .as_ref()
            .ok_or(ModelError::IncompleteDraft("schedule"))?
            .resolve(daily_hour)?;
        let score_type = self
            .score_type
            .ok_or(ModelError::IncompleteDraft("score type"))?;

        let score_range = if score_type.uses_range() {
            let range = self
                .score_range
                .ok_or(ModelError::IncompleteDraft("score range"))?;
            Some(check_score_range(i64::from(range), max_range)?)
        } else {
            None
        };

        Ok(Goal::new(title, cron, score_type, score_range))
    }
}

/// Parse a score range answer, which must fall in `1..=max`.
pub fn parse_score_range(text: &str, max: u32) -> Result<u32, ModelError> {
    let text = text.trim();
    let value: i64 = text.parse().map_err(|_| ModelError::ScoreRangeNotANumber {
        text: text.to_string(),
        max,
    })?;
    check_score_range(value, max)
}

fn check_score_range(value: i64, max: u32) -> Result<u32, ModelError> {
    if (1..=i64::from(max)).contains(&value) {
        Ok(value as u32)
    } else {
        Err(ModelError::InvalidScoreRange { value, max })
    }
}
