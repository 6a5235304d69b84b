//! Users and their open check-in tokens.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use drill_types::{ChatId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::goal::Goal;

/// Binds one pending yes/no answer to a goal and the window it covers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseToken {
    pub token: String,
    pub goal_title: String,
    pub window_end: DateTime<Utc>,
    /// When the prompt was sent; used for optional expiry.
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub display_name: String,
    /// Where prompts go. Unknown until the user first talks to the bot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub authorized: bool,
    /// Creation order.
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub tokens: BTreeMap<String, ResponseToken>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            display_name: String::new(),
            chat_id: None,
            authorized: false,
            goals: Vec::new(),
            tokens: BTreeMap::new(),
        }
    }

    /// Name for reports, falling back to the id.
    pub fn name(&self) -> String {
        if self.display_name.is_empty() {
            self.id.to_string()
        } else {
            self.display_name.clone()
        }
    }

    pub fn has_goal(&self, title: &str) -> bool {
        self.goals.iter().any(|g| g.title == title)
    }

    /// Add a goal. Titles are unique per user, compared case-sensitively.
    pub fn add_goal(&mut self, goal: Goal) -> Result<(), ModelError> {
        if self.has_goal(&goal.title) {
            return Err(ModelError::DuplicateGoalTitle(goal.title));
        }
        self.goals.push(goal);
        Ok(())
    }

    pub fn remove_goal(&mut self, title: &str) -> Result<Goal, ModelError> {
        let idx = self
            .goals
            .iter()
            .position(|g| g.title == title)
            .ok_or_else(|| ModelError::GoalNotFound(title.to_string()))?;
        Ok(self.goals.remove(idx))
    }

    pub fn goal(&self, title: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.title == title)
    }

    pub fn goal_mut(&mut self, title: &str) -> Option<&mut Goal> {
        self.goals.iter_mut().find(|g| g.title == title)
    }

    /// Goals keyed by canonical schedule string, each group in creation order.
    pub fn goals_by_schedule(&self) -> BTreeMap<String, Vec<&Goal>> {
        let mut groups: BTreeMap<String, Vec<&Goal>> = BTreeMap::new();
        for goal in &self.goals {
            groups
                .entry(goal.cron.as_str().to_string())
                .or_default()
                .push(goal);
        }
        groups
    }

    pub fn insert_token(&mut self, token: ResponseToken) {
        self.tokens.insert(token.token.clone(), token);
    }

    /// Remove and return a token. A token can be taken once.
    pub fn take_token(&mut self, token: &str) -> Option<ResponseToken> {
        self.tokens.remove(token)
    }

    /// Drop tokens issued before `cutoff`, returning how many were removed.
    pub fn prune_tokens(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, t| t.issued_at >= cutoff);
        before - self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoreType;
    use chrono::{Duration, TimeZone};
    use drill_cron::CronSchedule;

    fn goal(title: &str, cron: &str) -> Goal {
        Goal::new(title, CronSchedule::parse(cron).unwrap(), ScoreType::Streak, None)
    }

    fn token(id: &str, issued_at: DateTime<Utc>) -> ResponseToken {
        ResponseToken {
            token: id.to_string(),
            goal_title: "Run".to_string(),
            window_end: issued_at,
            issued_at,
        }
    }

    #[test]
    fn test_duplicate_titles_rejected() {
        let mut user = User::new(1);
        user.add_goal(goal("Run", "0 11 * * *")).unwrap();
        assert_eq!(
            user.add_goal(goal("Run", "0 12 * * *")),
            Err(ModelError::DuplicateGoalTitle("Run".into()))
        );
        // Case-sensitive.
        user.add_goal(goal("run", "0 11 * * *")).unwrap();
        assert_eq!(user.goals.len(), 2);
    }

    #[test]
    fn test_remove_goal() {
        let mut user = User::new(1);
        user.add_goal(goal("Run", "0 11 * * *")).unwrap();
        assert_eq!(user.remove_goal("Run").unwrap().title, "Run");
        assert_eq!(
            user.remove_goal("Run"),
            Err(ModelError::GoalNotFound("Run".into()))
        );
    }

    #[test]
    fn test_goals_by_schedule() {
        let mut user = User::new(1);
        user.add_goal(goal("Run", "0 11 * * *")).unwrap();
        user.add_goal(goal("Read", "*/30 * * * *")).unwrap();
        user.add_goal(goal("Swim", "0  11 * * *")).unwrap();

        let groups = user.goals_by_schedule();
        assert_eq!(groups.len(), 2);
        let daily: Vec<&str> = groups["0 11 * * *"].iter().map(|g| g.title.as_str()).collect();
        assert_eq!(daily, vec!["Run", "Swim"]);
    }

    #[test]
    fn test_tokens_single_use() {
        let mut user = User::new(1);
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 11, 0, 0).unwrap();
        user.insert_token(token("abc", now));
        assert!(user.take_token("abc").is_some());
        assert!(user.take_token("abc").is_none());
    }

    #[test]
    fn test_prune_tokens() {
        let mut user = User::new(1);
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 11, 0, 0).unwrap();
        user.insert_token(token("old", now - Duration::days(40)));
        user.insert_token(token("new", now - Duration::days(1)));
        assert_eq!(user.prune_tokens(now - Duration::days(30)), 1);
        assert!(user.tokens.contains_key("new"));
    }

    #[test]
    fn test_name_fallback() {
        let mut user = User::new(77);
        assert_eq!(user.name(), "77");
        user.display_name = "Alice".into();
        assert_eq!(user.name(), "Alice");
    }
}
