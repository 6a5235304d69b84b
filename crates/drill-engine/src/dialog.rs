//! The `/add` conversation.
//!
//! Title → schedule type → (weekday | cron expression) → score type →
//! (score range) → confirm. Each answer fills a [`GoalDraft`]; the goal is
//! built only on confirmation.

use drill_cron::CronSchedule;
use drill_model::{Goal, GoalDraft, ScheduleKind, ScoreType, User, WEEKDAYS, parse_score_range};
use drill_types::ReplyMarkup;

const CONFIRM: &str = "Confirm";
const CANCEL: &str = "Cancel";

/// Where the conversation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogStep {
    Title,
    ScheduleType,
    DayOfWeek,
    CronSchedule,
    ScoreType,
    ScoreRange,
    Confirm,
}

/// What to do after an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogReply {
    /// Ask the next question (or repeat the current one).
    Ask {
        text: String,
        markup: Option<ReplyMarkup>,
    },
    /// The user confirmed; add this goal.
    Done(Goal),
    /// The conversation ended without a goal.
    Cancelled(String),
}

impl DialogReply {
    fn ask(text: impl Into<String>, markup: Option<ReplyMarkup>) -> Self {
        Self::Ask {
            text: text.into(),
            markup,
        }
    }
}

/// Limits the dialog validates against.
#[derive(Debug, Clone, Copy)]
pub struct DialogLimits {
    pub daily_hour: u32,
    pub max_score_range: u32,
}

#[derive(Debug, Clone)]
pub struct AddGoalDialog {
    step: DialogStep,
    draft: GoalDraft,
}

impl AddGoalDialog {
    /// Start a conversation and return the first question.
    pub fn start() -> (Self, DialogReply) {
        let dialog = Self {
            step: DialogStep::Title,
            draft: GoalDraft::new(),
        };
        let reply = DialogReply::ask(
            "Let's add a new goal. What should it be called? (/cancel to stop)",
            Some(ReplyMarkup::Remove),
        );
        (dialog, reply)
    }

    pub fn step(&self) -> DialogStep {
        self.step
    }

    /// Feed one answer from `user`.
    pub fn handle(&mut self, input: &str, user: &User, limits: DialogLimits) -> DialogReply {
        let input = input.trim();
        match self.step {
            DialogStep::Title => {
                if input.is_empty() {
                    return DialogReply::ask("The title cannot be empty. Please send a title.", None);
                }
                if user.has_goal(input) {
                    return DialogReply::ask(
                        format!("You already have a goal called {input}. Please choose another title."),
                        None,
                    );
                }
                self.draft.title = Some(input.to_string());
                self.step = DialogStep::ScheduleType;
                schedule_type_question()
            }
            DialogStep::ScheduleType => match input.to_lowercase().as_str() {
                "daily" => {
                    self.draft.schedule = Some(ScheduleKind::Daily);
                    self.step = DialogStep::ScoreType;
                    score_type_question()
                }
                "weekly" => {
                    self.step = DialogStep::DayOfWeek;
                    let rows = WEEKDAYS.chunks(4).map(|c| c.to_vec()).collect();
                    DialogReply::ask(
                        "On which day of the week should I check?",
                        Some(ReplyMarkup::keyboard(rows)),
                    )
                }
                "cron syntax" => {
                    self.step = DialogStep::CronSchedule;
                    DialogReply::ask(
                        "Send a cron expression: minute hour day-of-month month day-of-week \
                         (e.g. 0 20 * * 0). Fields may be a number, *, */N or M/N.",
                        Some(ReplyMarkup::Remove),
                    )
                }
                _ => DialogReply::ask(
                    "Please choose daily, weekly or cron syntax.",
                    Some(schedule_type_keyboard()),
                ),
            },
            DialogStep::DayOfWeek => match ScheduleKind::weekday_from_name(input) {
                Some(weekday) => {
                    self.draft.schedule = Some(ScheduleKind::Weekly { weekday });
                    self.step = DialogStep::ScoreType;
                    score_type_question()
                }
                None => DialogReply::ask("Please choose a day of the week.", None),
            },
            DialogStep::CronSchedule => match CronSchedule::parse(input) {
                Ok(schedule) => {
                    self.draft.schedule = Some(ScheduleKind::Cron(schedule));
                    self.step = DialogStep::ScoreType;
                    score_type_question()
                }
                Err(e) => DialogReply::ask(
                    format!("That is not a valid schedule ({e}). Please try again."),
                    None,
                ),
            },
            DialogStep::ScoreType => match ScoreType::from_label(input) {
                Some(score_type) => {
                    self.draft.score_type = Some(score_type);
                    if score_type.uses_range() {
                        self.step = DialogStep::ScoreRange;
                        DialogReply::ask(
                            format!(
                                "Over how many check-ins should the score be computed? (1-{})",
                                limits.max_score_range
                            ),
                            Some(ReplyMarkup::Remove),
                        )
                    } else {
                        self.draft.score_range = None;
                        self.step = DialogStep::Confirm;
                        self.confirm_question(limits)
                    }
                }
                None => DialogReply::ask(
                    "Please choose one of the offered score types.",
                    Some(score_type_keyboard()),
                ),
            },
            DialogStep::ScoreRange => match parse_score_range(input, limits.max_score_range) {
                Ok(range) => {
                    self.draft.score_range = Some(range);
                    self.step = DialogStep::Confirm;
                    self.confirm_question(limits)
                }
                Err(e) => DialogReply::ask(format!("{e}. Please send a number."), None),
            },
            DialogStep::Confirm => {
                if input.eq_ignore_ascii_case(CANCEL) {
                    return DialogReply::Cancelled("Okay, the goal was not added.".to_string());
                }
                if !input.eq_ignore_ascii_case(CONFIRM) {
                    return DialogReply::ask(
                        "Please answer Confirm or Cancel.",
                        Some(ReplyMarkup::keyboard(vec![vec![CONFIRM, CANCEL]])),
                    );
                }
                match self.draft.build(limits.daily_hour, limits.max_score_range) {
                    Ok(goal) => DialogReply::Done(goal),
                    Err(e) => DialogReply::Cancelled(format!("The goal could not be created: {e}")),
                }
            }
        }
    }

    fn confirm_question(&self, limits: DialogLimits) -> DialogReply {
        let schedule = self
            .draft
            .schedule
            .as_ref()
            .and_then(|s| s.resolve(limits.daily_hour).ok())
            .map(|s| s.to_string())
            .unwrap_or_default();
        let scoring = match (self.draft.score_type, self.draft.score_range) {
            (Some(t), Some(n)) => format!("{} over {n} check-ins", t.label()),
            (Some(t), None) => t.label().to_string(),
            (None, _) => String::new(),
        };
        DialogReply::ask(
            format!(
                "Add this goal?\nTitle: {}\nSchedule: {schedule}\nScore: {scoring}",
                self.draft.title.as_deref().unwrap_or_default()
            ),
            Some(ReplyMarkup::keyboard(vec![vec![CONFIRM, CANCEL]])),
        )
    }
}

fn schedule_type_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(vec![ScheduleKind::LABELS.to_vec()])
}

fn score_type_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(vec![ScoreType::ALL.iter().map(ScoreType::label).collect()])
}

fn schedule_type_question() -> DialogReply {
    DialogReply::ask("How often should I ask about it?", Some(schedule_type_keyboard()))
}

fn score_type_question() -> DialogReply {
    DialogReply::ask("How should your progress be scored?", Some(score_type_keyboard()))
}
