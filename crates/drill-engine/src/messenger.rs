//! The chat platform seen from the engine.

use drill_types::{ChatId, Inbound, InlineKeyboard, MessageHandle, ReplyMarkup};
use tokio::sync::mpsc;

/// A chat platform the bot talks through.
///
/// Use `&self` for all methods; implementations keep any mutable state behind
/// interior mutability.
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    /// Platform identifier (e.g. "telegram").
    fn channel_type(&self) -> &str;

    /// Begin delivering inbound events to `sender`. Implementations spawn
    /// their own listener task and return once it is running.
    async fn start(&self, sender: mpsc::Sender<Inbound>) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> anyhow::Result<MessageHandle>;

    async fn edit_text(
        &self,
        message: &MessageHandle,
        text: &str,
        buttons: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()>;

    /// Replace or remove (`None`) a message's inline buttons.
    async fn edit_buttons(
        &self,
        message: &MessageHandle,
        buttons: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()>;

    /// Acknowledge a button press, optionally with a short notice.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()>;
}
