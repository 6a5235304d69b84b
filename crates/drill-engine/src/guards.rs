//! Access checks composed at the call site:
//!
//! ```rust,ignore
//! require_authorized(&state, sender)
//!     .and_then(|()| require_chat_type(chat.kind, PRIVATE_ONLY))?;
//! ```

use drill_model::BotState;
use drill_types::{ChatKind, UserId};

pub const PRIVATE_ONLY: &[ChatKind] = &[ChatKind::Private];
pub const GROUPS_ONLY: &[ChatKind] = &[ChatKind::Group, ChatKind::Supergroup];

/// Why a guard refused an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denied {
    NotAuthorized(UserId),
    WrongChatType(&'static [ChatKind]),
}

impl Denied {
    /// Reply shown to the user.
    pub fn message(&self) -> String {
        match self {
            Self::NotAuthorized(id) => format!(
                "You are not authorized to use this bot. Ask an authorized user to send /authorize {id}"
            ),
            Self::WrongChatType(allowed) => {
                let kinds: Vec<&str> = allowed.iter().map(ChatKind::as_str).collect();
                format!("This action is only available in {} chats", kinds.join(" and "))
            }
        }
    }
}

/// The sender must be a known, authorized user.
pub fn require_authorized(state: &BotState, sender: UserId) -> Result<(), Denied> {
    match state.users.get(sender) {
        Ok(user) if user.authorized => Ok(()),
        _ => Err(Denied::NotAuthorized(sender)),
    }
}

/// The chat must be one of `allowed`.
pub fn require_chat_type(kind: ChatKind, allowed: &'static [ChatKind]) -> Result<(), Denied> {
    if allowed.contains(&kind) {
        Ok(())
    } else {
        Err(Denied::WrongChatType(allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_model::User;

    fn state() -> BotState {
        let mut state = BotState::new();
        state.users.bootstrap(1);
        state.users.insert(User::new(2));
        state
    }

    #[test]
    fn test_require_authorized() {
        let state = state();
        assert_eq!(require_authorized(&state, 1), Ok(()));
        assert_eq!(require_authorized(&state, 2), Err(Denied::NotAuthorized(2)));
        assert_eq!(require_authorized(&state, 3), Err(Denied::NotAuthorized(3)));
    }

    #[test]
    fn test_composed_guards() {
        let state = state();
        let check = |sender, kind| {
            require_authorized(&state, sender).and_then(|()| require_chat_type(kind, PRIVATE_ONLY))
        };
        assert_eq!(check(1, ChatKind::Private), Ok(()));
        assert_eq!(
            check(1, ChatKind::Group),
            Err(Denied::WrongChatType(PRIVATE_ONLY))
        );
        // Authorization is checked first.
        assert_eq!(check(2, ChatKind::Group), Err(Denied::NotAuthorized(2)));
    }

    #[test]
    fn test_denied_messages() {
        assert_eq!(
            Denied::WrongChatType(GROUPS_ONLY).message(),
            "This action is only available in group and supergroup chats"
        );
        assert!(Denied::NotAuthorized(5).message().ends_with("/authorize 5"));
    }
}
