//! Maps goals onto scheduler jobs and prompts users when a job fires.
//!
//! One job exists per `(user, canonical schedule)`. A job is bound to goal
//! titles, not goal values; titles are resolved against the live state at
//! fire time, so goals deleted in the meantime are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Local, Utc};
use drill_cron::{CronSchedule, JobCallback, SchedulerBackend};
use drill_model::{ModelError, ResponseToken, User, UserRegistry};
use drill_types::{Button, InlineKeyboard, ReplyMarkup, UserId};
use tracing::{debug, info, warn};

use crate::SharedState;
use crate::correlation::{CheckChoice, encode_payload};
use crate::error::EngineError;
use crate::messenger::Messenger;

/// Scheduler key for one user's schedule group.
pub fn job_key(user_id: UserId, schedule: &CronSchedule) -> String {
    format!("{user_id}:{}", schedule.as_str())
}

/// A live registration. Process-local; rebuilt from goals at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub schedule: CronSchedule,
    pub owner: UserId,
    pub goal_titles: BTreeSet<String>,
}

/// Keeps scheduler registrations in line with users' goals.
pub struct GoalScheduler {
    backend: Arc<dyn SchedulerBackend>,
    state: SharedState,
    messenger: Arc<dyn Messenger>,
    jobs: Mutex<BTreeMap<String, ScheduledJob>>,
}

impl GoalScheduler {
    pub fn new(
        backend: Arc<dyn SchedulerBackend>,
        state: SharedState,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            backend,
            state,
            messenger,
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Re-register every schedule group of `user`.
    ///
    /// Existing jobs for a group are always cancelled before the fresh one is
    /// registered, so calling this repeatedly leaves exactly one job per
    /// schedule. Groups that no longer have goals lose their job.
    pub fn reschedule_user(&self, user: &User) -> Result<usize, EngineError> {
        let groups = user.goals_by_schedule();
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);

        let stale: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.owner == user.id && !groups.contains_key(job.schedule.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            let cancelled = self.backend.cancel_all(&key);
            jobs.remove(&key);
            info!(user_id = user.id, job_key = %key, cancelled, "Removed check-in job");
        }

        let mut first_error = None;
        let mut registered = 0;
        for goals in groups.values() {
            let schedule = goals[0].cron.clone();
            let key = job_key(user.id, &schedule);
            let titles: BTreeSet<String> = goals.iter().map(|g| g.title.clone()).collect();

            self.backend.cancel_all(&key);
            jobs.remove(&key);

            let callback = self.callback(user.id, schedule.clone(), titles.clone());
            match self.backend.register(&key, &schedule, callback) {
                Ok(()) => {
                    debug!(user_id = user.id, job_key = %key, goals = titles.len(), "Registered check-in job");
                    jobs.insert(
                        key,
                        ScheduledJob {
                            schedule,
                            owner: user.id,
                            goal_titles: titles,
                        },
                    );
                    registered += 1;
                }
                Err(e) => {
                    warn!(user_id = user.id, job_key = %key, "Scheduler rejected schedule: {e}");
                    first_error.get_or_insert(ModelError::InvalidScheduleFormat(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(registered),
        }
    }

    /// Register jobs for every user. Used once at startup.
    pub fn reconcile_all(&self, registry: &UserRegistry) -> usize {
        let mut total = 0;
        for user in registry.iter() {
            match self.reschedule_user(user) {
                Ok(n) => total += n,
                Err(e) => warn!(user_id = user.id, "Failed to schedule goals: {e}"),
            }
        }
        info!(jobs = total, users = registry.len(), "Check-in jobs reconciled");
        total
    }

    /// Live jobs, ordered by key.
    pub fn active_jobs(&self) -> Vec<(String, ScheduledJob)> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.iter().map(|(k, j)| (k.clone(), j.clone())).collect()
    }

    fn callback(
        &self,
        user_id: UserId,
        schedule: CronSchedule,
        titles: BTreeSet<String>,
    ) -> JobCallback {
        let state = self.state.clone();
        let messenger = self.messenger.clone();
        Arc::new(move |fired_at| {
            let state = state.clone();
            let messenger = messenger.clone();
            let schedule = schedule.clone();
            let titles = titles.clone();
            Box::pin(async move {
                if let Err(e) =
                    check_goals(&state, messenger.as_ref(), user_id, &schedule, &titles, fired_at)
                        .await
                {
                    warn!(user_id, schedule = %schedule, "Goal check failed: {e}");
                }
            })
        })
    }
}

/// Prompt the user for every goal of a fired schedule group.
///
/// Mints one token per goal, stores it with the user and sends a yes/no
/// prompt carrying it. Tokens of prompts that fail to send are dropped again.
/// Returns the number of prompts sent. A group whose goals have all been
/// deleted is a no-op.
pub async fn check_goals(
    state: &SharedState,
    messenger: &dyn Messenger,
    user_id: UserId,
    schedule: &CronSchedule,
    titles: &BTreeSet<String>,
    fired_at: DateTime<Utc>,
) -> Result<usize, EngineError> {
    let fired_local = fired_at.with_timezone(&Local);
    let window_end = schedule
        .previous_occurrence(&(fired_local + Duration::seconds(1)))
        .unwrap_or(fired_local);
    let window_start = schedule.previous_occurrence(&window_end);
    let interval = window_start
        .map(|start| describe_interval(window_end - start))
        .unwrap_or_else(|| "interval".to_string());
    let window_end = window_end.with_timezone(&Utc);

    let (chat_id, prompts) = {
        let mut state = state.lock().await;
        let user = state.users.get_mut(user_id)?;

        let goal_titles: Vec<String> = user
            .goals
            .iter()
            .filter(|g| titles.contains(&g.title))
            .map(|g| g.title.clone())
            .collect();
        if goal_titles.is_empty() {
            debug!(user_id, schedule = %schedule, "No goals left for fired job");
            return Ok(0);
        }
        let chat_id = user.chat_id.ok_or(EngineError::NoChat(user_id))?;

        let issued_at = Utc::now();
        let prompts: Vec<(String, String)> = goal_titles
            .into_iter()
            .map(|title| {
                let token = uuid::Uuid::new_v4().simple().to_string();
                user.insert_token(ResponseToken {
                    token: token.clone(),
                    goal_title: title.clone(),
                    window_end,
                    issued_at,
                });
                (title, token)
            })
            .collect();
        (chat_id, prompts)
    };

    info!(user_id, schedule = %schedule, goals = prompts.len(), "Sending goal check");

    let header = format!(
        "Please select whether or not you have met your goals during the last {interval}"
    );
    if let Err(e) = messenger.send_text(chat_id, &header, None).await {
        let tokens: Vec<&str> = prompts.iter().map(|(_, token)| token.as_str()).collect();
        discard_tokens(state, user_id, &tokens).await;
        return Err(e.into());
    }

    let mut sent = 0;
    for (title, token) in &prompts {
        let keyboard = InlineKeyboard::single_row(vec![
            Button::new("yes", encode_payload(token, CheckChoice::Yes)),
            Button::new("no", encode_payload(token, CheckChoice::No)),
        ]);
        match messenger
            .send_text(
                chat_id,
                &format!("Did you meet your goal {title}?"),
                Some(&ReplyMarkup::Inline(keyboard)),
            )
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => {
                warn!(user_id, goal = %title, "Failed to send goal prompt: {e}");
                discard_tokens(state, user_id, &[token.as_str()]).await;
            }
        }
    }
    Ok(sent)
}

/// Drop tokens whose prompt never reached the user.
async fn discard_tokens(state: &SharedState, user_id: UserId, tokens: &[&str]) {
    let mut state = state.lock().await;
    if let Ok(user) = state.users.get_mut(user_id) {
        for token in tokens {
            user.take_token(token);
        }
    }
}

/// Human-readable length of a check-in window.
pub fn describe_interval(length: Duration) -> String {
    let minutes = length.num_minutes();
    if minutes < 120 {
        return format!("{minutes} minutes");
    }
    let hours = length.num_hours();
    if hours < 24 {
        return format!("{hours} hours");
    }
    let days = length.num_days();
    let rest_hours = hours - days * 24;
    if rest_hours > 0 {
        format!("{days} days, {rest_hours} hours")
    } else {
        format!("{days} days")
    }
}
