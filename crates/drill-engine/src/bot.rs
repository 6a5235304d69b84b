//! The event dispatcher: commands, the add-goal dialog and check-in answers.
//!
//! Events are handled one at a time. Scheduled fires run concurrently but
//! only touch state through the same [`SharedState`] lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use drill_cron::SchedulerBackend;
use drill_model::{BotState, ModelError, User};
use drill_storage::DrillStorage;
use drill_types::{
    ChatId, ChatKind, Inbound, IncomingCallback, IncomingMessage, ReplyMarkup, UserId,
};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SharedState;
use crate::coordinator::GoalScheduler;
use crate::correlation::{Resolution, parse_payload, resolve};
use crate::dialog::{AddGoalDialog, DialogLimits, DialogReply};
use crate::error::EngineError;
use crate::guards::{Denied, GROUPS_ONLY, PRIVATE_ONLY, require_authorized, require_chat_type};
use crate::messenger::Messenger;
use crate::stats::{goal_list, group_stats, user_stats};

const ANY_CHAT: &[ChatKind] = &[ChatKind::Private, ChatKind::Group, ChatKind::Supergroup];

const HELP: &str = "Commands:\n\
    /add - create a new goal\n\
    /goals - list your goals\n\
    /delete <title> - delete a goal\n\
    /stats - show your scores (in a group: everyone who joined)\n\
    /join - include yourself in this group's stats\n\
    /authorize <user id> - allow someone to use the bot\n\
    /deauthorize <user id> - revoke access\n\
    /cancel - abort the current dialog";

const SOMETHING_WRONG: &str = "Sorry, something went wrong. Please contact the bot developer";

/// Runtime settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub admin_id: UserId,
    pub daily_hour: u32,
    pub max_score_range: u32,
    /// Prompts older than this can no longer be answered. `None` = never expire.
    pub token_ttl: Option<chrono::Duration>,
    pub autosave: Duration,
}

impl EngineSettings {
    fn limits(&self) -> DialogLimits {
        DialogLimits {
            daily_hour: self.daily_hour,
            max_score_range: self.max_score_range,
        }
    }
}

pub struct DrillBot {
    settings: EngineSettings,
    state: SharedState,
    messenger: Arc<dyn Messenger>,
    scheduler: GoalScheduler,
    storage: Arc<DrillStorage>,
    /// Open add-goal dialogs by chat. Not persisted.
    dialogs: Mutex<HashMap<ChatId, AddGoalDialog>>,
}

impl DrillBot {
    pub fn new(
        settings: EngineSettings,
        state: SharedState,
        messenger: Arc<dyn Messenger>,
        backend: Arc<dyn SchedulerBackend>,
        storage: Arc<DrillStorage>,
    ) -> Self {
        let scheduler = GoalScheduler::new(backend, state.clone(), messenger.clone());
        Self {
            settings,
            state,
            messenger,
            scheduler,
            storage,
            dialogs: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn scheduler(&self) -> &GoalScheduler {
        &self.scheduler
    }

    /// Seed the administrator, drop expired prompts, register every
    /// check-in job and write the result back.
    pub async fn startup(&self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().await;
            state.users.bootstrap(self.settings.admin_id);
            if let Some(cutoff) = self.token_cutoff() {
                let pruned = state.prune_tokens(cutoff);
                if pruned > 0 {
                    info!(pruned, "Discarded expired check-in prompts");
                }
            }
            self.scheduler.reconcile_all(&state.users);
        }
        self.save_checked().await
    }

    /// Process inbound events until cancelled or the channel closes,
    /// saving periodically and once more on exit.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Inbound>, cancel: CancellationToken) {
        let mut autosave = tokio::time::interval(self.settings.autosave.max(Duration::from_secs(1)));
        // The first tick completes immediately.
        autosave.tick().await;

        info!("Event loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = autosave.tick() => self.save().await,
                event = inbound.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        self.save().await;
        info!("Event loop stopped");
    }

    /// Handle one inbound event. Failures are logged, never propagated.
    pub async fn handle_event(&self, event: Inbound) {
        let result = match event {
            Inbound::Message(msg) => self.handle_message(msg).await,
            Inbound::Callback(cb) => self.handle_callback(cb).await,
        };
        if let Err(e) = result {
            warn!("Failed to handle event: {e}");
        }
    }

    /// Persist the current state, logging failures.
    pub async fn save(&self) {
        if let Err(e) = self.save_checked().await {
            warn!("Failed to save state: {e}");
        }
    }

    async fn save_checked(&self) -> Result<(), EngineError> {
        let snapshot = self.state.lock().await.clone();
        self.storage.save_state(&snapshot).await?;
        Ok(())
    }

    fn token_cutoff(&self) -> Option<DateTime<Utc>> {
        self.settings.token_ttl.map(|ttl| Utc::now() - ttl)
    }

    async fn reply(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> Result<(), EngineError> {
        self.messenger.send_text(chat_id, text, markup).await?;
        Ok(())
    }

    /// Run a guard against the current state, replying with the refusal.
    async fn permit<F>(&self, msg: &IncomingMessage, check: F) -> Result<bool, EngineError>
    where
        F: FnOnce(&BotState) -> Result<(), Denied>,
    {
        let verdict = check(&*self.state.lock().await);
        match verdict {
            Ok(()) => Ok(true),
            Err(denied) => {
                debug!(user_id = msg.sender.id, ?denied, "Command refused");
                self.reply(msg.chat.id, &denied.message(), None).await?;
                Ok(false)
            }
        }
    }

    // ─── Messages ───────────────────────────────────────────

    async fn handle_message(&self, msg: IncomingMessage) -> Result<(), EngineError> {
        if msg.chat.kind == ChatKind::Private {
            self.remember_chat(&msg).await;
        }

        let Some(command) = msg.command.clone() else {
            return self.handle_text(msg).await;
        };
        let (sender, kind) = (msg.sender.id, msg.chat.kind);
        let args = command.args.as_str();

        match command.name.as_str() {
            "start" => self.cmd_start(&msg).await,
            "help" => self.reply(msg.chat.id, HELP, None).await,
            "cancel" => self.cmd_cancel(&msg).await,
            "add" => {
                if self
                    .permit(&msg, |s| {
                        require_authorized(s, sender)
                            .and_then(|()| require_chat_type(kind, PRIVATE_ONLY))
                    })
                    .await?
                {
                    self.cmd_add(&msg).await?;
                }
                Ok(())
            }
            "delete" => {
                if self
                    .permit(&msg, |s| {
                        require_authorized(s, sender)
                            .and_then(|()| require_chat_type(kind, PRIVATE_ONLY))
                    })
                    .await?
                {
                    self.cmd_delete(&msg, args).await?;
                }
                Ok(())
            }
            "goals" => {
                if self
                    .permit(&msg, |s| {
                        require_authorized(s, sender)
                            .and_then(|()| require_chat_type(kind, PRIVATE_ONLY))
                    })
                    .await?
                {
                    let text = {
                        let state = self.state.lock().await;
                        goal_list(state.users.get(sender)?)
                    };
                    self.reply(msg.chat.id, &text, None).await?;
                }
                Ok(())
            }
            "stats" => {
                if self
                    .permit(&msg, |s| {
                        require_authorized(s, sender).and_then(|()| require_chat_type(kind, ANY_CHAT))
                    })
                    .await?
                {
                    let text = {
                        let state = self.state.lock().await;
                        if kind.is_group() {
                            group_stats(&state, msg.chat.id)
                        } else {
                            user_stats(state.users.get(sender)?)
                        }
                    };
                    self.reply(msg.chat.id, &text, None).await?;
                }
                Ok(())
            }
            "join" => {
                if self
                    .permit(&msg, |s| {
                        require_authorized(s, sender)
                            .and_then(|()| require_chat_type(kind, GROUPS_ONLY))
                    })
                    .await?
                {
                    self.cmd_join(&msg).await?;
                }
                Ok(())
            }
            "authorize" | "deauthorize" => {
                if self
                    .permit(&msg, |s| require_authorized(s, sender))
                    .await?
                {
                    self.cmd_authorize(&msg, args, command.name == "authorize")
                        .await?;
                }
                Ok(())
            }
            other => {
                debug!(command = other, "Unknown command");
                if kind == ChatKind::Private {
                    self.reply(
                        msg.chat.id,
                        "Unknown command. Send /help for a list of commands.",
                        None,
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    /// Keep a known user's prompt destination and name current.
    async fn remember_chat(&self, msg: &IncomingMessage) {
        let mut state = self.state.lock().await;
        if let Ok(user) = state.users.get_mut(msg.sender.id) {
            user.chat_id = Some(msg.chat.id);
            if !msg.sender.display_name.is_empty() {
                user.display_name = msg.sender.display_name.clone();
            }
        }
    }

    async fn cmd_start(&self, msg: &IncomingMessage) -> Result<(), EngineError> {
        let kind = msg.chat.kind;
        if !self
            .permit(msg, |_| require_chat_type(kind, PRIVATE_ONLY))
            .await?
        {
            return Ok(());
        }

        let authorized = {
            let mut state = self.state.lock().await;
            if !state.users.contains(msg.sender.id) {
                info!(user_id = msg.sender.id, "New user registered");
                state.users.insert(User::new(msg.sender.id));
            }
            let user = state.users.get_mut(msg.sender.id)?;
            user.chat_id = Some(msg.chat.id);
            user.display_name = msg.sender.display_name.clone();
            user.authorized
        };
        self.save().await;

        let text = if authorized {
            format!(
                "Hi {}! I will check in on your goals. Use /add to create one.\n\n{HELP}",
                msg.sender.display_name
            )
        } else {
            Denied::NotAuthorized(msg.sender.id).message()
        };
        self.reply(msg.chat.id, &text, None).await
    }

    async fn cmd_cancel(&self, msg: &IncomingMessage) -> Result<(), EngineError> {
        let removed = self.dialogs.lock().await.remove(&msg.chat.id).is_some();
        let text = if removed {
            "Cancelled."
        } else {
            "There is nothing to cancel."
        };
        self.reply(msg.chat.id, text, Some(&ReplyMarkup::Remove))
            .await
    }

    async fn cmd_add(&self, msg: &IncomingMessage) -> Result<(), EngineError> {
        let (dialog, reply) = AddGoalDialog::start();
        self.dialogs.lock().await.insert(msg.chat.id, dialog);
        self.send_dialog_reply(msg.chat.id, reply).await
    }

    async fn handle_text(&self, msg: IncomingMessage) -> Result<(), EngineError> {
        if msg.chat.kind != ChatKind::Private {
            return Ok(());
        }

        let reply = {
            let mut dialogs = self.dialogs.lock().await;
            if !dialogs.contains_key(&msg.chat.id) {
                return Ok(());
            }
            let state = self.state.lock().await;
            let user = match state.users.get(msg.sender.id) {
                Ok(user) => user,
                Err(e) => {
                    dialogs.remove(&msg.chat.id);
                    return Err(e.into());
                }
            };
            let Some(dialog) = dialogs.get_mut(&msg.chat.id) else {
                return Ok(());
            };
            let reply = dialog.handle(&msg.text, user, self.settings.limits());
            if !matches!(reply, DialogReply::Ask { .. }) {
                dialogs.remove(&msg.chat.id);
            }
            reply
        };

        match reply {
            DialogReply::Done(goal) => self.add_goal(&msg, goal).await,
            other => self.send_dialog_reply(msg.chat.id, other).await,
        }
    }

    async fn send_dialog_reply(&self, chat_id: ChatId, reply: DialogReply) -> Result<(), EngineError> {
        match reply {
            DialogReply::Ask { text, markup } => self.reply(chat_id, &text, markup.as_ref()).await,
            DialogReply::Cancelled(text) => {
                self.reply(chat_id, &text, Some(&ReplyMarkup::Remove)).await
            }
            DialogReply::Done(goal) => {
                warn!(goal = %goal.title, "Completed dialog reply without an owner");
                Ok(())
            }
        }
    }

    async fn add_goal(&self, msg: &IncomingMessage, goal: drill_model::Goal) -> Result<(), EngineError> {
        let title = goal.title.clone();
        let cron = goal.cron.clone();

        let outcome = {
            let mut state = self.state.lock().await;
            let user = state.users.get_mut(msg.sender.id)?;
            match user.add_goal(goal) {
                Ok(()) => match self.scheduler.reschedule_user(user) {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        // Keep goals and jobs in step: drop the goal the
                        // backend could not schedule.
                        if let Err(undo) = user.remove_goal(&title) {
                            warn!(user_id = user.id, goal = %title, "Rolling back goal failed: {undo}");
                        }
                        if let Err(undo) = self.scheduler.reschedule_user(user) {
                            warn!(user_id = user.id, "Rescheduling after rollback failed: {undo}");
                        }
                        Err(e)
                    }
                },
                Err(e) => Err(e.into()),
            }
        };

        let text = match outcome {
            Ok(()) => {
                info!(user_id = msg.sender.id, goal = %title, schedule = %cron, "Goal added");
                self.save().await;
                format!("Added goal {title}. I will check in on schedule {cron}.")
            }
            Err(EngineError::Model(ModelError::DuplicateGoalTitle(_))) => {
                format!("You already have a goal called {title}.")
            }
            Err(EngineError::Model(ModelError::InvalidScheduleFormat(e))) => {
                format!("The schedule could not be registered: {e}")
            }
            Err(e) => return Err(e),
        };
        self.reply(msg.chat.id, &text, Some(&ReplyMarkup::Remove))
            .await
    }

    async fn cmd_delete(&self, msg: &IncomingMessage, title: &str) -> Result<(), EngineError> {
        if title.is_empty() {
            return self
                .reply(msg.chat.id, "Usage: /delete <goal title>", None)
                .await;
        }

        let removed = {
            let mut state = self.state.lock().await;
            let user = state.users.get_mut(msg.sender.id)?;
            match user.remove_goal(title) {
                Ok(_) => {
                    if let Err(e) = self.scheduler.reschedule_user(user) {
                        warn!(user_id = user.id, "Rescheduling after delete failed: {e}");
                    }
                    true
                }
                Err(_) => false,
            }
        };

        let text = if removed {
            info!(user_id = msg.sender.id, goal = title, "Goal deleted");
            self.save().await;
            format!("Deleted goal {title}.")
        } else {
            format!("You have no goal called {title}.")
        };
        self.reply(msg.chat.id, &text, None).await
    }

    async fn cmd_join(&self, msg: &IncomingMessage) -> Result<(), EngineError> {
        let joined = self
            .state
            .lock()
            .await
            .join_group(msg.chat.id, msg.sender.id);
        let text = if joined {
            self.save().await;
            format!("{} joined this group's stats.", msg.sender.display_name)
        } else {
            format!("{} is already part of this group's stats.", msg.sender.display_name)
        };
        self.reply(msg.chat.id, &text, None).await
    }

    async fn cmd_authorize(
        &self,
        msg: &IncomingMessage,
        args: &str,
        grant: bool,
    ) -> Result<(), EngineError> {
        let command = if grant { "authorize" } else { "deauthorize" };
        let Ok(target) = args.trim().parse::<UserId>() else {
            return self
                .reply(msg.chat.id, &format!("Usage: /{command} <user id>"), None)
                .await;
        };
        if !grant && target == self.settings.admin_id {
            return self
                .reply(msg.chat.id, "The administrator cannot be deauthorized.", None)
                .await;
        }

        {
            let mut state = self.state.lock().await;
            if !state.users.contains(target) {
                state.users.insert(User::new(target));
            }
            state.users.get_mut(target)?.authorized = grant;
        }
        info!(user_id = target, by = msg.sender.id, grant, "Authorization changed");
        self.save().await;

        let text = if grant {
            format!("User {target} is now authorized.")
        } else {
            format!("User {target} is no longer authorized.")
        };
        self.reply(msg.chat.id, &text, None).await
    }

    // ─── Callbacks ──────────────────────────────────────────

    async fn handle_callback(&self, cb: IncomingCallback) -> Result<(), EngineError> {
        let Some((token, choice)) = parse_payload(&cb.data) else {
            debug!(data = %cb.data, "Ignoring unknown callback payload");
            self.messenger.answer_callback(&cb.id, None).await?;
            return Ok(());
        };

        let outcome = {
            let mut state = self.state.lock().await;
            match state.users.get_mut(cb.sender.id) {
                Ok(user) => resolve(user, token, choice, self.token_cutoff()),
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(Resolution::Applied {
                goal_title, met, ..
            }) => {
                info!(user_id = cb.sender.id, goal = %goal_title, met, "Goal check answered");
                self.messenger.answer_callback(&cb.id, None).await?;
                if let Some(message) = &cb.message {
                    let mark = if met { "\u{2705}" } else { "\u{274c}" };
                    let text = format!("{} {mark}", cb.message_text.as_deref().unwrap_or_default());
                    self.messenger.edit_text(message, text.trim_start(), None).await?;
                }
                self.save().await;
            }
            Ok(Resolution::TokenNotFound) => {
                debug!(user_id = cb.sender.id, "Stale goal check prompt");
                self.messenger
                    .answer_callback(&cb.id, Some("This check-in was already answered or has expired."))
                    .await?;
                if let Some(message) = &cb.message {
                    self.messenger.edit_buttons(message, None).await?;
                }
            }
            Err(e) => {
                warn!(user_id = cb.sender.id, "Could not apply goal check: {e}");
                self.messenger.answer_callback(&cb.id, None).await?;
                if let Some(message) = &cb.message {
                    self.messenger.edit_buttons(message, None).await?;
                    self.reply(message.chat_id, SOMETHING_WRONG, None).await?;
                }
                // The token is gone either way; persist that.
                self.save().await;
            }
        }
        Ok(())
    }
}
