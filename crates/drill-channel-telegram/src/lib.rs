//! Telegram messenger for drill.
//!
//! Uses the Bot API with long-polling (no webhook required). Configure the
//! token in `~/.drill/config.json5`:
//!
//! ```json5
//! {
//!     telegram: { bot_token: "123456:ABC-DEF..." },
//! }
//! ```
//!
//! or through the `TELEGRAM_API_TOKEN` environment variable.

pub mod api;
pub mod polling;
pub mod types;

use std::sync::Arc;

use anyhow::bail;
use drill_engine::Messenger;
use drill_types::{ChatId, Inbound, InlineKeyboard, MessageHandle, ReplyMarkup};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use api::TelegramApi;
use types::{
    AnswerCallbackQueryParams, BotCommand, EditMessageReplyMarkupParams, EditMessageTextParams,
    SendMessageParams, SetMyCommandsParams,
};

/// Commands shown in the client's menu.
const MENU: &[(&str, &str)] = &[
    ("add", "Create a new goal"),
    ("goals", "List your goals"),
    ("stats", "Show scores"),
    ("delete", "Delete a goal by title"),
    ("join", "Include yourself in this group's stats"),
    ("cancel", "Abort the current dialog"),
    ("help", "Show all commands"),
];

pub struct TelegramMessenger {
    api: Arc<TelegramApi>,
    poller: Mutex<Poller>,
}

#[derive(Default)]
struct Poller {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl TelegramMessenger {
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        Ok(Self {
            api: Arc::new(TelegramApi::new(bot_token)?),
            poller: Mutex::new(Poller::default()),
        })
    }

    /// Check the token without starting the poller.
    pub async fn verify(&self) -> anyhow::Result<String> {
        let bot = self.api.get_me().await?;
        Ok(bot.username.unwrap_or(bot.first_name))
    }
}

#[async_trait::async_trait]
impl Messenger for TelegramMessenger {
    fn channel_type(&self) -> &str {
        "telegram"
    }

    async fn start(&self, sender: mpsc::Sender<Inbound>) -> anyhow::Result<()> {
        let mut poller = self.poller.lock().await;
        if poller.handle.is_some() {
            bail!("Telegram poller is already running");
        }

        match self.api.get_me().await {
            Ok(bot) => info!(
                bot_username = bot.username.as_deref().unwrap_or("unknown"),
                "Telegram bot authenticated"
            ),
            Err(e) => bail!("Failed to authenticate Telegram bot: {e}"),
        }

        let commands = MENU
            .iter()
            .map(|(command, description)| BotCommand {
                command: command.to_string(),
                description: description.to_string(),
            })
            .collect();
        if let Err(e) = self
            .api
            .set_my_commands(&SetMyCommandsParams { commands })
            .await
        {
            warn!("Failed to register bot commands: {e}");
        }

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let api = self.api.clone();
        let handle = tokio::spawn(async move {
            polling::run_polling_loop(&api, sender, cancel_child).await;
        });

        poller.cancel = Some(cancel);
        poller.handle = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut poller = self.poller.lock().await;
        if let Some(cancel) = poller.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = poller.handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> anyhow::Result<MessageHandle> {
        let sent = self
            .api
            .send_message(&SendMessageParams {
                chat_id,
                text: text.to_string(),
                reply_markup: markup.map(Into::into),
            })
            .await?;
        Ok(MessageHandle {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn edit_text(
        &self,
        message: &MessageHandle,
        text: &str,
        buttons: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()> {
        self.api
            .edit_message_text(&EditMessageTextParams {
                chat_id: message.chat_id,
                message_id: message.message_id,
                text: text.to_string(),
                reply_markup: buttons.map(Into::into),
            })
            .await
    }

    async fn edit_buttons(
        &self,
        message: &MessageHandle,
        buttons: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()> {
        self.api
            .edit_message_reply_markup(&EditMessageReplyMarkupParams {
                chat_id: message.chat_id,
                message_id: message.message_id,
                reply_markup: buttons.map(Into::into),
            })
            .await
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        self.api
            .answer_callback_query(&AnswerCallbackQueryParams {
                callback_query_id: callback_id.to_string(),
                text: text.map(str::to_string),
            })
            .await
    }
}
