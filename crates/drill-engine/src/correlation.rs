//! Matching button presses back to the prompt that produced them.

use chrono::{DateTime, Utc};
use drill_model::{ModelError, User};

/// Prefix of every check-in button payload.
pub const PAYLOAD_PREFIX: &str = "goal_check";

/// The answer to "did you meet your goal?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckChoice {
    Yes,
    No,
}

impl CheckChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    pub fn met(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Button payload: `goal_check:<token>:<yes|no>`.
pub fn encode_payload(token: &str, choice: CheckChoice) -> String {
    format!("{PAYLOAD_PREFIX}:{token}:{}", choice.as_str())
}

/// Split a payload into token and choice. `None` for anything else.
pub fn parse_payload(data: &str) -> Option<(&str, CheckChoice)> {
    let mut parts = data.split(':');
    if parts.next()? != PAYLOAD_PREFIX {
        return None;
    }
    let token = parts.next().filter(|t| !t.is_empty())?;
    let choice = match parts.next()? {
        "yes" => CheckChoice::Yes,
        "no" => CheckChoice::No,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((token, choice))
}

/// Outcome of resolving a token.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The answer was recorded on the goal.
    Applied {
        goal_title: String,
        met: bool,
        window_end: DateTime<Utc>,
    },
    /// Unknown, already answered or expired. The prompt is stale.
    TokenNotFound,
}

/// Apply an answer to the goal its token was minted for.
///
/// The token is consumed whatever happens next. Tokens issued before
/// `issued_after` count as expired. If the goal was deleted after the prompt
/// went out the result is [`ModelError::GoalNotFound`].
pub fn resolve(
    user: &mut User,
    token: &str,
    choice: CheckChoice,
    issued_after: Option<DateTime<Utc>>,
) -> Result<Resolution, ModelError> {
    let Some(token) = user.take_token(token) else {
        return Ok(Resolution::TokenNotFound);
    };
    if issued_after.is_some_and(|cutoff| token.issued_at < cutoff) {
        return Ok(Resolution::TokenNotFound);
    }

    let goal = user
        .goal_mut(&token.goal_title)
        .ok_or_else(|| ModelError::GoalNotFound(token.goal_title.clone()))?;
    goal.add_data(choice.met(), token.window_end);

    Ok(Resolution::Applied {
        goal_title: token.goal_title,
        met: choice.met(),
        window_end: token.window_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use drill_cron::CronSchedule;
    use drill_model::{Goal, ResponseToken, ScoreType};

    fn user_with_token(token: &str, issued_at: DateTime<Utc>) -> User {
        let mut user = User::new(1);
        user.add_goal(Goal::new(
            "Run",
            CronSchedule::parse("0 11 * * *").unwrap(),
            ScoreType::Streak,
            None,
        ))
        .unwrap();
        user.insert_token(ResponseToken {
            token: token.to_string(),
            goal_title: "Run".to_string(),
            window_end: issued_at,
            issued_at,
        });
        user
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 11, 0, 0).unwrap()
    }

    #[test]
    fn test_payload_format() {
        let payload = encode_payload("abc123", CheckChoice::No);
        assert_eq!(payload, "goal_check:abc123:no");
        assert_eq!(parse_payload(&payload), Some(("abc123", CheckChoice::No)));
    }

    #[test]
    fn test_parse_rejects_foreign_payloads() {
        assert_eq!(parse_payload("auth:123:yes"), None);
        assert_eq!(parse_payload("goal_check::yes"), None);
        assert_eq!(parse_payload("goal_check:abc:maybe"), None);
        assert_eq!(parse_payload("goal_check:abc:yes:extra"), None);
    }

    #[test]
    fn test_resolve_applies_once() {
        let mut user = user_with_token("t1", now());

        let first = resolve(&mut user, "t1", CheckChoice::Yes, None).unwrap();
        assert_eq!(
            first,
            Resolution::Applied {
                goal_title: "Run".into(),
                met: true,
                window_end: now(),
            }
        );
        assert_eq!(user.goal("Run").unwrap().history().len(), 1);

        let second = resolve(&mut user, "t1", CheckChoice::No, None).unwrap();
        assert_eq!(second, Resolution::TokenNotFound);
        assert_eq!(user.goal("Run").unwrap().history().len(), 1);
    }

    #[test]
    fn test_pending_tokens_resolve_in_any_order() {
        let mut user = user_with_token("early", now());
        user.insert_token(ResponseToken {
            token: "late".into(),
            goal_title: "Run".into(),
            window_end: now() + Duration::days(1),
            issued_at: now() + Duration::days(1),
        });

        resolve(&mut user, "late", CheckChoice::Yes, None).unwrap();
        resolve(&mut user, "early", CheckChoice::No, None).unwrap();

        let goal = user.goal("Run").unwrap();
        let values: Vec<u8> = goal.history().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![0, 1]);
    }

    #[test]
    fn test_resolve_deleted_goal() {
        let mut user = user_with_token("t1", now());
        user.remove_goal("Run").unwrap();
        assert_eq!(
            resolve(&mut user, "t1", CheckChoice::Yes, None),
            Err(ModelError::GoalNotFound("Run".into()))
        );
        assert!(user.tokens.is_empty());
    }

    #[test]
    fn test_expired_token() {
        let mut user = user_with_token("old", now() - Duration::days(60));
        let cutoff = now() - Duration::days(30);
        assert_eq!(
            resolve(&mut user, "old", CheckChoice::Yes, Some(cutoff)).unwrap(),
            Resolution::TokenNotFound
        );
        assert!(user.goal("Run").unwrap().history().is_empty());
    }
}
