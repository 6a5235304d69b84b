//! Goals and their check-in history.

use chrono::{DateTime, Utc};
use drill_cron::CronSchedule;
use serde::{Deserialize, Serialize};

use crate::score::{self, ScoreType};

/// Retention cap for goals without a score range.
pub const DEFAULT_RETENTION: usize = 100;

/// All three scores, evaluated when an entry was appended.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreSnapshot {
    pub streak: u32,
    pub floating_average: f64,
    pub floating_amount: u32,
}

impl ScoreSnapshot {
    pub fn get(&self, score_type: ScoreType) -> f64 {
        match score_type {
            ScoreType::Streak => f64::from(self.streak),
            ScoreType::FloatingAverage => self.floating_average,
            ScoreType::FloatingAmount => f64::from(self.floating_amount),
        }
    }
}

/// One resolved check-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// 1 if the goal was met during the window, 0 otherwise.
    pub value: u8,
    /// End of the window the check-in covers.
    pub time: DateTime<Utc>,
    pub scores: ScoreSnapshot,
}

impl HistoryEntry {
    pub fn met(&self) -> bool {
        self.value == 1
    }
}

/// A recurring commitment owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub title: String,
    pub cron: CronSchedule,
    pub score_type: ScoreType,
    /// Window size for the floating scores. `None` for streak goals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_range: Option<u32>,
    history: Vec<HistoryEntry>,
}

impl Goal {
    pub fn new(
        title: impl Into<String>,
        cron: CronSchedule,
        score_type: ScoreType,
        score_range: Option<u32>,
    ) -> Self {
        Self {
            title: title.into(),
            cron,
            score_type,
            score_range,
            history: Vec::new(),
        }
    }

    /// Rebuild a goal from stored parts. History is re-sorted and trimmed so
    /// a hand-edited database cannot break ordering or retention.
    pub fn restore(
        title: String,
        cron: CronSchedule,
        score_type: ScoreType,
        score_range: Option<u32>,
        mut history: Vec<HistoryEntry>,
    ) -> Self {
        history.sort_by_key(|e| e.time);
        let mut goal = Self {
            title,
            cron,
            score_type,
            score_range,
            history,
        };
        goal.evict();
        goal
    }

    /// History, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Most entries kept after an append.
    pub fn retention(&self) -> usize {
        self.score_range
            .map_or(DEFAULT_RETENTION, |n| (n as usize).max(1))
    }

    /// Record a check-in for the window ending at `window_end`.
    ///
    /// The entry lands in time order. Its snapshot holds every score type,
    /// computed over the history up to and including the new entry. A late
    /// answer for an older window also refreshes the snapshots of every
    /// newer entry. Eviction runs afterwards.
    pub fn add_data(&mut self, met: bool, window_end: DateTime<Utc>) {
        let idx = self.history.partition_point(|e| e.time <= window_end);

        self.history.insert(
            idx,
            HistoryEntry {
                value: u8::from(met),
                time: window_end,
                scores: ScoreSnapshot::default(),
            },
        );

        for i in idx..self.history.len() {
            self.history[i].scores = self.snapshot_at(i);
        }

        self.evict();
    }

    /// Scores over `history[..=i]`, given correct snapshots before `i`.
    fn snapshot_at(&self, i: usize) -> ScoreSnapshot {
        let window = self.score_range;
        let considered = &self.history[..=i];

        // Streaks are carried forward from the previous snapshot so that
        // eviction never shortens them.
        let streak = if considered[i].met() {
            let carried = i
                .checked_sub(1)
                .map_or(0, |prev| self.history[prev].scores.streak)
                + 1;
            window.map_or(carried, |n| carried.min(n))
        } else {
            0
        };

        ScoreSnapshot {
            streak,
            floating_average: score::floating_average(considered, window),
            floating_amount: score::floating_amount(considered, window),
        }
    }

    fn evict(&mut self) {
        let keep = self.retention();
        if self.history.len() > keep {
            let excess = self.history.len() - keep;
            self.history.drain(..excess);
        }
    }

    /// The newest snapshot's value for this goal's score type, or `None`
    /// before the first check-in.
    pub fn current_score(&self) -> Option<f64> {
        self.history
            .last()
            .map(|e| e.scores.get(self.score_type))
    }

    /// Snapshot of the newest entry.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn daily() -> CronSchedule {
        CronSchedule::parse("0 11 * * *").unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap() + Duration::days(n)
    }

    #[test]
    fn test_floating_average_with_eviction() {
        let mut goal = Goal::new("Run", daily(), ScoreType::FloatingAverage, Some(4));
        for (i, met) in [true, true, false, true].into_iter().enumerate() {
            goal.add_data(met, day(i as i64));
        }
        assert_eq!(goal.current_score(), Some(0.75));

        goal.add_data(false, day(4));
        let values: Vec<u8> = goal.history().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 0, 1, 0]);
        assert_eq!(goal.current_score(), Some(0.5));
    }

    #[test]
    fn test_streak_resets_and_counts() {
        let mut goal = Goal::new("Read", daily(), ScoreType::Streak, None);
        goal.add_data(true, day(0));
        goal.add_data(true, day(1));
        assert_eq!(goal.current_score(), Some(2.0));

        goal.add_data(false, day(2));
        assert_eq!(goal.current_score(), Some(0.0));

        for i in 3..6 {
            goal.add_data(true, day(i));
            assert_eq!(goal.current_score(), Some((i - 2) as f64));
        }
    }

    #[test]
    fn test_streak_survives_eviction() {
        let mut goal = Goal::new("Meditate", daily(), ScoreType::Streak, None);
        for i in 0..150 {
            goal.add_data(true, day(i));
        }
        assert_eq!(goal.history().len(), DEFAULT_RETENTION);
        assert_eq!(goal.current_score(), Some(150.0));
    }

    #[test]
    fn test_retention_bound() {
        let mut bounded = Goal::new("A", daily(), ScoreType::FloatingAmount, Some(7));
        let mut unbounded = Goal::new("B", daily(), ScoreType::FloatingAverage, None);
        for i in 0..250 {
            bounded.add_data(i % 3 == 0, day(i));
            unbounded.add_data(i % 3 == 0, day(i));
            assert!(bounded.history().len() <= 7);
            assert!(unbounded.history().len() <= DEFAULT_RETENTION);
        }
    }

    #[test]
    fn test_snapshot_holds_every_score_type() {
        let mut goal = Goal::new("Swim", daily(), ScoreType::Streak, None);
        goal.add_data(true, day(0));
        goal.add_data(false, day(1));
        goal.add_data(true, day(2));

        let latest = goal.latest().unwrap();
        assert_eq!(latest.scores.streak, 1);
        assert_eq!(latest.scores.floating_amount, 2);
        assert!((latest.scores.floating_average - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_answer_keeps_history_sorted() {
        let mut goal = Goal::new("Stretch", daily(), ScoreType::FloatingAmount, Some(10));
        goal.add_data(true, day(0));
        goal.add_data(true, day(2));
        goal.add_data(false, day(1));

        let times: Vec<_> = goal.history().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![day(0), day(1), day(2)]);
        assert_eq!(goal.history()[1].scores.floating_amount, 1);
        assert_eq!(goal.current_score(), Some(2.0));
    }

    #[test]
    fn test_late_answer_refreshes_newer_snapshots() {
        let mut goal = Goal::new("Run", daily(), ScoreType::Streak, None);
        goal.add_data(true, day(0));
        goal.add_data(true, day(2));
        assert_eq!(goal.current_score(), Some(2.0));

        goal.add_data(false, day(1));
        let values: Vec<u8> = goal.history().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 0, 1]);
        assert_eq!(
            goal.current_score(),
            Some(f64::from(score::streak(goal.history(), None)))
        );
        assert_eq!(goal.current_score(), Some(1.0));

        let mut average = Goal::new("Read", daily(), ScoreType::FloatingAverage, Some(2));
        average.add_data(true, day(0));
        average.add_data(true, day(2));
        average.add_data(false, day(1));
        assert_eq!(average.current_score(), Some(0.5));
    }

    #[test]
    fn test_no_data_sentinel() {
        let goal = Goal::new("Empty", daily(), ScoreType::FloatingAverage, Some(5));
        assert_eq!(goal.current_score(), None);
    }

    #[test]
    fn test_restore_sorts_and_trims() {
        let entries = (0..5)
            .rev()
            .map(|i| HistoryEntry {
                value: 1,
                time: day(i),
                scores: ScoreSnapshot::default(),
            })
            .collect();
        let goal = Goal::restore(
            "Walk".into(),
            daily(),
            ScoreType::FloatingAmount,
            Some(3),
            entries,
        );
        let times: Vec<_> = goal.history().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![day(2), day(3), day(4)]);
    }

    #[test]
    fn test_goal_serde() {
        let mut goal = Goal::new("Run", daily(), ScoreType::FloatingAverage, Some(4));
        goal.add_data(true, day(0));
        let json = serde_json::to_string(&goal).unwrap();
        assert!(json.contains("\"cron\":\"0 11 * * *\""));
        assert!(json.contains("\"score_type\":\"floating_average\""));
        let parsed: Goal = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, goal);
    }
}
