//! drill-storage: SQLite snapshot of the bot state.
//!
//! The whole state tree is written in one transaction and read back at
//! startup. Scheduler jobs are never stored; they are rebuilt from goals.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::sync::Mutex;

use drill_cron::CronSchedule;
use drill_model::{
    BotState, Goal, HistoryEntry, ResponseToken, ScoreSnapshot, ScoreType, User, UserRegistry,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        display_name TEXT NOT NULL DEFAULT '',
        chat_id INTEGER,
        authorized INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS goals (
        user_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        title TEXT NOT NULL,
        cron TEXT NOT NULL,
        score_type TEXT NOT NULL,
        score_range INTEGER,
        PRIMARY KEY (user_id, title),
        FOREIGN KEY (user_id) REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS goal_history (
        user_id INTEGER NOT NULL,
        goal_title TEXT NOT NULL,
        time_ms INTEGER NOT NULL,
        value INTEGER NOT NULL,
        streak INTEGER NOT NULL,
        floating_average REAL NOT NULL,
        floating_amount INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_goal_history_goal
        ON goal_history(user_id, goal_title, time_ms);

    CREATE TABLE IF NOT EXISTS response_tokens (
        token TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        goal_title TEXT NOT NULL,
        window_end_ms INTEGER NOT NULL,
        issued_at_ms INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS group_members (
        chat_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        PRIMARY KEY (chat_id, user_id)
    );";

/// SQLite-backed store for [`BotState`] snapshots.
pub struct DrillStorage {
    conn: Arc<Mutex<Connection>>,
}

impl DrillStorage {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Storage opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace the stored snapshot with `state`.
    pub async fn save_state(&self, state: &BotState) -> Result<()> {
        let conn = self.conn.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            tx.execute_batch(
                "DELETE FROM goal_history;
                 DELETE FROM goals;
                 DELETE FROM response_tokens;
                 DELETE FROM users;
                 DELETE FROM group_members;",
            )?;

            for user in state.users.iter() {
                tx.execute(
                    "INSERT INTO users (id, display_name, chat_id, authorized) VALUES (?1, ?2, ?3, ?4)",
                    params![user.id, user.display_name, user.chat_id, user.authorized as i32],
                )?;

                for (position, goal) in user.goals.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO goals (user_id, position, title, cron, score_type, score_range)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            user.id,
                            position as i64,
                            goal.title,
                            goal.cron.as_str(),
                            goal.score_type.as_str(),
                            goal.score_range,
                        ],
                    )?;

                    for entry in goal.history() {
                        tx.execute(
                            "INSERT INTO goal_history
                                (user_id, goal_title, time_ms, value, streak, floating_average, floating_amount)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            params![
                                user.id,
                                goal.title,
                                entry.time.timestamp_millis(),
                                entry.value,
                                entry.scores.streak,
                                entry.scores.floating_average,
                                entry.scores.floating_amount,
                            ],
                        )?;
                    }
                }

                for token in user.tokens.values() {
                    tx.execute(
                        "INSERT INTO response_tokens (token, user_id, goal_title, window_end_ms, issued_at_ms)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            token.token,
                            user.id,
                            token.goal_title,
                            token.window_end.timestamp_millis(),
                            token.issued_at.timestamp_millis(),
                        ],
                    )?;
                }
            }

            for (chat_id, members) in &state.groups {
                for user_id in members {
                    tx.execute(
                        "INSERT INTO group_members (chat_id, user_id) VALUES (?1, ?2)",
                        params![chat_id, user_id],
                    )?;
                }
            }

            tx.commit()?;
            tracing::debug!(users = state.users.len(), "State saved");
            Ok(())
        })
        .await?
    }

    /// Load the stored snapshot. An empty database yields an empty state.
    pub async fn load_state(&self) -> Result<BotState> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();

            let mut users: BTreeMap<i64, User> = BTreeMap::new();
            let mut stmt =
                conn.prepare("SELECT id, display_name, chat_id, authorized FROM users")?;
            let rows = stmt.query_map([], |row| {
                let mut user = User::new(row.get(0)?);
                user.display_name = row.get(1)?;
                user.chat_id = row.get(2)?;
                user.authorized = row.get::<_, i32>(3)? != 0;
                Ok(user)
            })?;
            for user in rows {
                let user = user?;
                users.insert(user.id, user);
            }

            let mut histories: BTreeMap<(i64, String), Vec<HistoryEntry>> = BTreeMap::new();
            let mut stmt = conn.prepare(
                "SELECT user_id, goal_title, time_ms, value, streak, floating_average, floating_amount
                 FROM goal_history ORDER BY time_ms",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, u8>(3)?,
                    ScoreSnapshot {
                        streak: row.get(4)?,
                        floating_average: row.get(5)?,
                        floating_amount: row.get(6)?,
                    },
                ))
            })?;
            for row in rows {
                let (user_id, title, time_ms, value, scores) = row?;
                histories.entry((user_id, title)).or_default().push(HistoryEntry {
                    value,
                    time: from_millis(time_ms)?,
                    scores,
                });
            }

            let mut stmt = conn.prepare(
                "SELECT user_id, title, cron, score_type, score_range
                 FROM goals ORDER BY user_id, position",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                ))
            })?;
            for row in rows {
                let (user_id, title, cron, score_type, score_range) = row?;
                let cron = CronSchedule::parse(&cron)
                    .map_err(|e| StorageError::Corrupt(format!("goal '{title}': {e}")))?;
                let score_type = ScoreType::parse(&score_type).ok_or_else(|| {
                    StorageError::Corrupt(format!("goal '{title}': unknown score type {score_type}"))
                })?;
                let history = histories
                    .remove(&(user_id, title.clone()))
                    .unwrap_or_default();
                let user = users.get_mut(&user_id).ok_or_else(|| {
                    StorageError::Corrupt(format!("goal '{title}' owned by unknown user {user_id}"))
                })?;
                user.goals
                    .push(Goal::restore(title, cron, score_type, score_range, history));
            }

            let mut stmt = conn.prepare(
                "SELECT token, user_id, goal_title, window_end_ms, issued_at_ms FROM response_tokens",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;
            for row in rows {
                let (token, user_id, goal_title, window_end_ms, issued_at_ms) = row?;
                let Some(user) = users.get_mut(&user_id) else {
                    tracing::warn!(user_id, "Dropping response token of unknown user");
                    continue;
                };
                user.insert_token(ResponseToken {
                    token,
                    goal_title,
                    window_end: from_millis(window_end_ms)?,
                    issued_at: from_millis(issued_at_ms)?,
                });
            }

            let mut state = BotState {
                users: UserRegistry::from_users(users.into_values()),
                ..BotState::default()
            };

            let mut stmt = conn.prepare("SELECT chat_id, user_id FROM group_members")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (chat_id, user_id) = row?;
                state.join_group(chat_id, user_id);
            }

            tracing::info!(users = state.users.len(), "State loaded");
            Ok(state)
        })
        .await?
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {ms}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_state() -> BotState {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 11, 0, 0).unwrap();
        let mut alice = User::new(20);
        alice.display_name = "Alice".into();
        alice.chat_id = Some(20);
        alice.authorized = true;

        let mut run = Goal::new(
            "Run",
            CronSchedule::parse("0 11 * * *").unwrap(),
            ScoreType::FloatingAverage,
            Some(4),
        );
        for (i, met) in [true, false, true].into_iter().enumerate() {
            run.add_data(met, start + Duration::days(i as i64));
        }
        alice.add_goal(run).unwrap();
        alice
            .add_goal(Goal::new(
                "Read",
                CronSchedule::parse("0 20 * * 0").unwrap(),
                ScoreType::Streak,
                None,
            ))
            .unwrap();
        alice.insert_token(ResponseToken {
            token: "tok1".into(),
            goal_title: "Run".into(),
            window_end: start + Duration::days(3),
            issued_at: start + Duration::days(3),
        });

        let mut state = BotState::new();
        state.users.insert(alice);
        state.users.bootstrap(10);
        state.join_group(-500, 20);
        state.join_group(-500, 10);
        state
    }

    #[tokio::test]
    async fn test_empty_database_loads_empty_state() {
        let storage = DrillStorage::open_in_memory().unwrap();
        let state = storage.load_state().await.unwrap();
        assert!(state.users.is_empty());
        assert!(state.groups.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_state() {
        let storage = DrillStorage::open_in_memory().unwrap();
        let state = sample_state();
        storage.save_state(&state).await.unwrap();

        let loaded = storage.load_state().await.unwrap();
        assert_eq!(loaded, state);

        let alice = loaded.users.get(20).unwrap();
        let titles: Vec<&str> = alice.goals.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(titles, vec!["Run", "Read"]);
        assert_eq!(alice.goal("Run").unwrap().history().len(), 3);
        assert!(alice.tokens.contains_key("tok1"));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let storage = DrillStorage::open_in_memory().unwrap();
        let mut state = sample_state();
        storage.save_state(&state).await.unwrap();

        state.users.get_mut(20).unwrap().remove_goal("Read").unwrap();
        state.users.get_mut(20).unwrap().take_token("tok1");
        storage.save_state(&state).await.unwrap();

        let loaded = storage.load_state().await.unwrap();
        let alice = loaded.users.get(20).unwrap();
        assert_eq!(alice.goals.len(), 1);
        assert!(alice.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("drill.db");
        {
            let storage = DrillStorage::open(&path).unwrap();
            storage.save_state(&sample_state()).await.unwrap();
        }
        let storage = DrillStorage::open(&path).unwrap();
        let loaded = storage.load_state().await.unwrap();
        assert_eq!(loaded.users.len(), 2);
        assert_eq!(loaded.group_members(-500), vec![10, 20]);
    }
}
