//! drill-model: goals, scores and the user registry.
//!
//! Everything here is plain data plus synchronous operations. Locking and
//! scheduling live in `drill-engine`; persistence lives in `drill-storage`.

pub mod draft;
pub mod error;
pub mod goal;
pub mod registry;
pub mod score;
pub mod state;
pub mod user;

pub use draft::{GoalDraft, ScheduleKind, WEEKDAYS, parse_score_range};
pub use error::ModelError;
pub use goal::{DEFAULT_RETENTION, Goal, HistoryEntry, ScoreSnapshot};
pub use registry::UserRegistry;
pub use score::ScoreType;
pub use state::BotState;
pub use user::{ResponseToken, User};
