//! Score formulas over a goal's history.
//!
//! `window` is the goal's score range; `None` means all available history.

use serde::{Deserialize, Serialize};

use crate::goal::HistoryEntry;

/// How a goal's progress is summarized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Streak,
    FloatingAverage,
    FloatingAmount,
}

impl ScoreType {
    pub const ALL: [ScoreType; 3] = [Self::Streak, Self::FloatingAverage, Self::FloatingAmount];

    /// User-facing label, also the answer expected by the add-goal dialog.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Streak => "streak",
            Self::FloatingAverage => "floating average",
            Self::FloatingAmount => "floating amount",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(label))
    }

    /// Whether the score depends on a window size.
    pub fn uses_range(&self) -> bool {
        !matches!(self, Self::Streak)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streak => "streak",
            Self::FloatingAverage => "floating_average",
            Self::FloatingAmount => "floating_amount",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

fn eligible(history: &[HistoryEntry], window: Option<u32>) -> &[HistoryEntry] {
    let len = window.map_or(history.len(), |n| history.len().min(n as usize));
    &history[history.len() - len..]
}

/// Consecutive successes counted back from the newest entry.
pub fn streak(history: &[HistoryEntry], window: Option<u32>) -> u32 {
    eligible(history, window)
        .iter()
        .rev()
        .take_while(|e| e.met())
        .count() as u32
}

/// Number of successes among the last `min(window, len)` entries.
pub fn floating_amount(history: &[HistoryEntry], window: Option<u32>) -> u32 {
    eligible(history, window)
        .iter()
        .map(|e| u32::from(e.value))
        .sum()
}

/// Fraction of successes among the last `min(window, len)` entries, in `[0, 1]`.
/// An empty window scores 0.
pub fn floating_average(history: &[HistoryEntry], window: Option<u32>) -> f64 {
    let entries = eligible(history, window);
    if entries.is_empty() {
        return 0.0;
    }
    f64::from(floating_amount(entries, None)) / entries.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::ScoreSnapshot;
    use chrono::{Duration, TimeZone, Utc};

    fn history(values: &[u8]) -> Vec<HistoryEntry> {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| HistoryEntry {
                value,
                time: start + Duration::days(i as i64),
                scores: ScoreSnapshot::default(),
            })
            .collect()
    }

    #[test]
    fn test_streak_stops_at_first_miss() {
        assert_eq!(streak(&history(&[1, 0, 1, 1]), None), 2);
        assert_eq!(streak(&history(&[1, 1, 0]), None), 0);
        assert_eq!(streak(&history(&[]), None), 0);
    }

    #[test]
    fn test_streak_bounded_by_window() {
        assert_eq!(streak(&history(&[1, 1, 1, 1, 1]), Some(3)), 3);
        assert_eq!(streak(&history(&[1, 1, 1, 1, 1]), None), 5);
    }

    #[test]
    fn test_floating_amount_uses_most_recent_entries() {
        let h = history(&[1, 1, 0, 0, 1]);
        assert_eq!(floating_amount(&h, Some(2)), 1);
        assert_eq!(floating_amount(&h, Some(10)), 3);
        assert_eq!(floating_amount(&h, None), 3);
    }

    #[test]
    fn test_floating_amount_monotonic_in_window() {
        let h = history(&[1, 0, 1, 1, 0, 1, 0, 0, 1]);
        let mut previous = 0;
        for n in 1..=12 {
            let amount = floating_amount(&h, Some(n));
            assert!(amount >= previous, "window {n}");
            previous = amount;
        }
    }

    #[test]
    fn test_floating_average() {
        assert_eq!(floating_average(&history(&[1, 1, 0, 1]), Some(4)), 0.75);
        assert_eq!(floating_average(&history(&[1, 0]), Some(10)), 0.5);
        assert_eq!(floating_average(&history(&[]), Some(4)), 0.0);
    }

    #[test]
    fn test_score_type_labels() {
        assert_eq!(
            ScoreType::from_label("Floating Average"),
            Some(ScoreType::FloatingAverage)
        );
        assert_eq!(ScoreType::from_label("number of days"), None);
        assert_eq!(ScoreType::parse("floating_amount"), Some(ScoreType::FloatingAmount));
        assert!(!ScoreType::Streak.uses_range());
    }
}
