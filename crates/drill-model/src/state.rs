use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use drill_types::{ChatId, UserId};
use serde::{Deserialize, Serialize};

use crate::registry::UserRegistry;

/// The whole persisted state tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BotState {
    pub users: UserRegistry,
    /// Group chat id to the users who joined its aggregate report.
    #[serde(default)]
    pub groups: BTreeMap<ChatId, BTreeSet<UserId>>,
}

impl BotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user as a member of a group chat. Returns `false` if they
    /// were already a member.
    pub fn join_group(&mut self, chat_id: ChatId, user_id: UserId) -> bool {
        self.groups.entry(chat_id).or_default().insert(user_id)
    }

    /// Members of a group in ascending id order.
    pub fn group_members(&self, chat_id: ChatId) -> Vec<UserId> {
        self.groups
            .get(&chat_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop response tokens issued before `cutoff` from every user.
    pub fn prune_tokens(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.users.iter_mut().map(|u| u.prune_tokens(cutoff)).sum()
    }
}
