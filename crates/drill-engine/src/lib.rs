//! drill-engine: scheduling, check-in correlation and the command dispatcher.
//!
//! # Architecture
//!
//! ```text
//! Messenger inbound loop ──(Inbound via mpsc)──▶ DrillBot::run
//!                                                   │ commands, dialogs, callbacks
//!                                                   ▼
//!                                 SharedState (UserRegistry + groups)
//!                                                   ▲
//! SchedulerBackend ──(fire)──▶ check_goals ─────────┘──▶ Messenger::send_text
//! ```
//!
//! All state mutations happen under the single [`SharedState`] lock.

pub mod bot;
pub mod coordinator;
pub mod correlation;
pub mod dialog;
pub mod error;
pub mod guards;
pub mod messenger;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use drill_model::BotState;
use tokio::sync::Mutex;

pub use bot::{DrillBot, EngineSettings};
pub use coordinator::{GoalScheduler, ScheduledJob, check_goals, job_key};
pub use correlation::{CheckChoice, Resolution, resolve};
pub use error::EngineError;
pub use messenger::Messenger;

/// The state tree, shared by the dispatcher and scheduled fires.
pub type SharedState = Arc<Mutex<BotState>>;

/// Wrap a state tree for sharing.
pub fn shared(state: BotState) -> SharedState {
    Arc::new(Mutex::new(state))
}
