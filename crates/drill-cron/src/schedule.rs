//! Restricted 5-field cron schedules.
//!
//! Grammar per field: `N`, `*`, `*/N` or `M/N`, fields separated by any
//! amount of whitespace. No seconds field, no lists, no ranges.
//! Evaluation is delegated to the `cron` crate, which wants a leading seconds
//! field and numbers days of the week 1-7 starting on Sunday.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::CronError;

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day-of-month", "month", "day-of-week"];
const DAY_OF_WEEK: usize = 4;

/// One field of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CronField {
    /// `*`
    Any,
    /// `N`
    Value(u32),
    /// `*/N` (start `None`) or `M/N`.
    Step { start: Option<u32>, every: u32 },
}

impl CronField {
    fn parse(text: &str, field: &'static str) -> Result<Self, CronError> {
        let invalid = || CronError::InvalidField {
            field,
            value: text.to_string(),
        };

        if text == "*" {
            return Ok(Self::Any);
        }

        if let Some((start, every)) = text.split_once('/') {
            let every = parse_number(every).ok_or_else(invalid)?;
            if every == 0 {
                return Err(CronError::ZeroStep { field });
            }
            let start = match start {
                "*" => None,
                s => Some(parse_number(s).ok_or_else(invalid)?),
            };
            return Ok(Self::Step { start, every });
        }

        parse_number(text).map(Self::Value).ok_or_else(invalid)
    }

    /// `*` or `*/1`.
    fn is_every(&self) -> bool {
        matches!(
            self,
            Self::Any
                | Self::Step {
                    start: None,
                    every: 1
                }
        )
    }

    /// A fixed value, `*`, or a step of one.
    fn is_fixed_or_every(&self) -> bool {
        matches!(self, Self::Value(_) | Self::Step { every: 1, .. }) || self.is_every()
    }

    /// Render for the evaluator, remapping day-of-week numbers
    /// (0 or 7 = Sunday) onto its 1 = Sunday numbering.
    fn evaluator_form(&self, index: usize) -> String {
        if index != DAY_OF_WEEK {
            return self.to_string();
        }
        let remap = |n: u32| n % 7 + 1;
        match *self {
            Self::Any => "*".to_string(),
            Self::Value(n) => remap(n).to_string(),
            Self::Step { start: None, every } => format!("*/{every}"),
            Self::Step {
                start: Some(n),
                every,
            } => format!("{}/{every}", remap(n)),
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Value(n) => write!(f, "{n}"),
            Self::Step { start: None, every } => write!(f, "*/{every}"),
            Self::Step {
                start: Some(start),
                every,
            } => write!(f, "{start}/{every}"),
        }
    }
}

fn parse_number(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// The natural unit of a schedule, used to describe scores ("streak of 4 days").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Intervals,
}

impl Cadence {
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Intervals => "intervals",
        }
    }
}

/// A validated schedule. Equality, ordering and hashing use the canonical
/// string, so textually different but equivalent schedules stay distinct.
#[derive(Clone)]
pub struct CronSchedule {
    fields: [CronField; 5],
    canonical: String,
    compiled: cron::Schedule,
}

impl CronSchedule {
    /// Parse and validate schedule text.
    pub fn parse(text: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::FieldCount(parts.len()));
        }

        let mut fields = [CronField::Any; 5];
        for (i, part) in parts.iter().enumerate() {
            fields[i] = CronField::parse(part, FIELD_NAMES[i])?;
        }

        // Values above 7 would wrap silently after remapping, so check here.
        let dow_out_of_range = match fields[DAY_OF_WEEK] {
            CronField::Value(n) => n > 7,
            CronField::Step { start: Some(n), .. } => n > 7,
            _ => false,
        };
        if dow_out_of_range {
            return Err(CronError::InvalidField {
                field: FIELD_NAMES[DAY_OF_WEEK],
                value: parts[DAY_OF_WEEK].to_string(),
            });
        }

        let canonical = fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        let evaluator_expr = std::iter::once("0".to_string())
            .chain(fields.iter().enumerate().map(|(i, f)| f.evaluator_form(i)))
            .collect::<Vec<_>>()
            .join(" ");
        let compiled =
            cron::Schedule::from_str(&evaluator_expr).map_err(|e| CronError::Rejected {
                expr: canonical.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            fields,
            canonical,
            compiled,
        })
    }

    /// The canonical form: fields joined by single spaces, numbers without
    /// leading zeros. This is the grouping key for batched check-ins.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn fields(&self) -> &[CronField; 5] {
        &self.fields
    }

    /// The first occurrence strictly after `after`.
    pub fn next_occurrence<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.compiled.after(after).next()
    }

    /// The last occurrence strictly before `before`.
    pub fn previous_occurrence<Tz: TimeZone>(
        &self,
        before: &DateTime<Tz>,
    ) -> Option<DateTime<Tz>> {
        // The evaluator treats sub-second instants as "at or before"; round up
        // so the result is strictly earlier in every case.
        let before = if before.nanosecond() > 0 {
            before.with_nanosecond(0)? + Duration::seconds(1)
        } else {
            before.clone()
        };
        self.compiled.after(&before).next_back()
    }

    /// Classify the schedule by its natural unit.
    pub fn cadence(&self) -> Cadence {
        let [minute, hour, dom, month, dow] = &self.fields;
        let any = |f: &CronField| *f == CronField::Any;

        if minute.is_every() && any(hour) && any(dom) && any(month) && any(dow) {
            Cadence::Minutes
        } else if minute.is_fixed_or_every()
            && hour.is_every()
            && any(dom)
            && any(month)
            && any(dow)
        {
            Cadence::Hours
        } else if minute.is_fixed_or_every()
            && hour.is_fixed_or_every()
            && dom.is_every()
            && any(month)
            && any(dow)
        {
            Cadence::Days
        } else if minute.is_fixed_or_every()
            && hour.is_fixed_or_every()
            && dom.is_fixed_or_every()
            && month.is_every()
            && any(dow)
        {
            Cadence::Months
        } else if minute.is_fixed_or_every()
            && hour.is_fixed_or_every()
            && dom.is_fixed_or_every()
            && any(month)
            && matches!(dow, CronField::Value(_))
        {
            Cadence::Weeks
        } else {
            Cadence::Intervals
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.canonical).finish()
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for CronSchedule {}

impl Hash for CronSchedule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for CronSchedule {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CronSchedule {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CronSchedule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> Deserialize<'de> for CronSchedule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
