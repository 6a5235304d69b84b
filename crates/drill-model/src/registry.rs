use drill_types::UserId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ModelError;
use crate::user::User;

/// All known users, kept sorted by id.
///
/// Lookups never create entries. The only implicit insert is
/// [`UserRegistry::bootstrap`], which seeds the administrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "Vec<User>", into = "Vec<User>")]
pub struct UserRegistry {
    users: Vec<User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from users in any order. Later duplicates replace earlier ones.
    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut registry = Self::new();
        for user in users {
            registry.insert(user);
        }
        registry
    }

    fn position(&self, id: UserId) -> Result<usize, usize> {
        self.users.binary_search_by_key(&id, |u| u.id)
    }

    pub fn get(&self, id: UserId) -> Result<&User, ModelError> {
        self.position(id)
            .map(|idx| &self.users[idx])
            .map_err(|_| ModelError::UserNotFound(id))
    }

    pub fn get_mut(&mut self, id: UserId) -> Result<&mut User, ModelError> {
        match self.position(id) {
            Ok(idx) => Ok(&mut self.users[idx]),
            Err(_) => Err(ModelError::UserNotFound(id)),
        }
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.position(id).is_ok()
    }

    /// Insert keeping id order. A user with the same id is replaced.
    pub fn insert(&mut self, user: User) {
        match self.position(user.id) {
            Ok(idx) => self.users[idx] = user,
            Err(idx) => self.users.insert(idx, user),
        }
    }

    /// Seed the administrator as an authorized user if absent.
    /// Returns whether a user was inserted.
    pub fn bootstrap(&mut self, admin_id: UserId) -> bool {
        if self.contains(admin_id) {
            return false;
        }
        let mut admin = User::new(admin_id);
        admin.authorized = true;
        self.insert(admin);
        info!(user_id = admin_id, "Bootstrapped administrator");
        true
    }

    /// Users in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut User> {
        self.users.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl From<Vec<User>> for UserRegistry {
    fn from(users: Vec<User>) -> Self {
        Self::from_users(users)
    }
}

impl From<UserRegistry> for Vec<User> {
    fn from(registry: UserRegistry) -> Self {
        registry.users
    }
}
