//! Text reports for `/goals` and `/stats`.

use drill_model::{BotState, Goal, ScoreType, User};
use drill_types::ChatId;

/// One goal's current score, phrased for its score type.
pub fn format_score(goal: &Goal) -> String {
    let Some(score) = goal.current_score() else {
        return "[no data yet]".to_string();
    };
    let unit = goal.cron.cadence().unit();
    let window = goal
        .score_range
        .map_or(goal.history().len(), |n| (n as usize).min(goal.history().len()));

    match goal.score_type {
        ScoreType::Streak => format!("streak of {} {unit}", score as u64),
        ScoreType::FloatingAverage => {
            format!("{:.2} % (for the last {window} {unit})", score * 100.0)
        }
        ScoreType::FloatingAmount => format!("{}/{window} {unit}", score as u64),
    }
}

/// Score lines for every goal of a user.
pub fn user_stats(user: &User) -> String {
    if user.goals.is_empty() {
        return "No goals registered".to_string();
    }
    user.goals
        .iter()
        .map(|g| format!("- {}: {}", g.title, format_score(g)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aggregate report for a group chat, members in ascending id order.
pub fn group_stats(state: &BotState, chat_id: ChatId) -> String {
    let members = state.group_members(chat_id);
    if members.is_empty() {
        return "No users have registered for this group".to_string();
    }

    let mut sections = Vec::new();
    for user_id in members {
        match state.users.get(user_id) {
            Err(_) => sections.push(format!("<This user is not registered: {user_id}>")),
            Ok(user) if user.goals.is_empty() => {}
            Ok(user) => sections.push(format!(
                "============\n{}:\n{}\n============",
                user.name(),
                user_stats(user)
            )),
        }
    }

    if sections.is_empty() {
        "I found no goals for this group".to_string()
    } else {
        sections.join("\n\n")
    }
}

/// `/goals` listing: title, schedule and scoring of each goal.
pub fn goal_list(user: &User) -> String {
    if user.goals.is_empty() {
        return "You have no goals yet. Use /add to create one.".to_string();
    }
    user.goals
        .iter()
        .map(|g| {
            let scoring = match g.score_range {
                Some(n) if g.score_type.uses_range() => {
                    format!("{} over {n}", g.score_type.label())
                }
                _ => g.score_type.label().to_string(),
            };
            format!("- {} [{}] {scoring}", g.title, g.cron)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
