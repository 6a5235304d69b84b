use serde::{Deserialize, Serialize};

// ──────────────────── Identity Types ────────────────────

/// Platform user identifier.
pub type UserId = i64;

/// Platform chat identifier (prompts are delivered to a chat, not a user).
pub type ChatId = i64;

// ──────────────────── Chat Types ────────────────────

/// The kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Parse the platform's chat type string. Unknown kinds map to `Channel`,
    /// which no command accepts.
    pub fn from_platform(kind: &str) -> Self {
        match kind {
            "private" => Self::Private,
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            _ => Self::Channel,
        }
    }

    /// Whether this is a multi-member chat (group or supergroup).
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

/// A chat reference carried by inbound events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRef {
    pub id: ChatId,
    pub kind: ChatKind,
}

/// The user who triggered an inbound event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    /// Display name of the sender (first + last name).
    pub display_name: String,
}

/// Handle to a message previously sent by the bot, used for edits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat_id: ChatId,
    pub message_id: i64,
}

// ──────────────────── Markup Types ────────────────────

/// A single inline button. The payload is opaque to the platform and is
/// delivered back verbatim when the button is pressed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<Button>>,
}

impl InlineKeyboard {
    /// A keyboard with a single row of buttons.
    pub fn single_row(buttons: Vec<Button>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }
}

/// Markup attached to an outgoing text message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyMarkup {
    /// Buttons under the message that produce callbacks.
    Inline(InlineKeyboard),
    /// A custom reply keyboard replacing the user's keyboard.
    Keyboard {
        rows: Vec<Vec<String>>,
        #[serde(default)]
        one_time: bool,
    },
    /// Remove any custom reply keyboard.
    Remove,
}

impl ReplyMarkup {
    /// One-time reply keyboard from rows of labels.
    pub fn keyboard(rows: Vec<Vec<&str>>) -> Self {
        Self::Keyboard {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
            one_time: true,
        }
    }
}

// ──────────────────── Inbound Types ────────────────────

/// A bot command extracted from message text (`/delete@bot Run 5k`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    /// Lowercased command name without the slash or bot suffix.
    pub name: String,
    /// Remaining text after the command, trimmed.
    pub args: String,
}

impl Command {
    /// Parse a command from message text. Returns `None` when the text does
    /// not start with `/`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or("");
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_lowercase(),
            args: args.to_string(),
        })
    }
}

/// A text message sent to the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub chat: ChatRef,
    pub sender: Sender,
    pub message_id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
}

/// A button press on one of the bot's inline keyboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCallback {
    /// Callback id, needed to acknowledge the press.
    pub id: String,
    pub sender: Sender,
    /// The message carrying the pressed button, if still accessible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageHandle>,
    /// Text of that message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
    /// The button payload.
    pub data: String,
}

/// Events delivered by a messenger's inbound loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Message(IncomingMessage),
    Callback(IncomingCallback),
}
