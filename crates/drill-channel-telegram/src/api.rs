//! Telegram Bot API HTTP client.

use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::{
    AnswerCallbackQueryParams, ApiResponse, BotInfo, EditMessageReplyMarkupParams,
    EditMessageTextParams, GetUpdatesParams, SendMessageParams, SetMyCommandsParams, TgMessage,
    Update,
};

/// HTTP client for the Telegram Bot API.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        // Longer than the getUpdates long-poll timeout.
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
        })
    }

    /// POST `params` to `method` and unwrap the response envelope.
    async fn call<P, R>(&self, method: &str, params: &P) -> anyhow::Result<Option<R>>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp: ApiResponse<R> = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(params)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .json()
            .await
            .with_context(|| format!("{method} response parse failed"))?;

        if !resp.ok {
            bail!(
                "{method} failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(resp.result)
    }

    /// Verify the bot token.
    pub async fn get_me(&self) -> anyhow::Result<BotInfo> {
        self.call("getMe", &serde_json::json!({}))
            .await?
            .context("getMe returned no result")
    }

    /// Long-poll for updates.
    pub async fn get_updates(&self, params: &GetUpdatesParams) -> anyhow::Result<Vec<Update>> {
        Ok(self.call("getUpdates", params).await?.unwrap_or_default())
    }

    pub async fn send_message(&self, params: &SendMessageParams) -> anyhow::Result<TgMessage> {
        self.call("sendMessage", params)
            .await?
            .context("sendMessage returned no result")
    }

    pub async fn edit_message_text(&self, params: &EditMessageTextParams) -> anyhow::Result<()> {
        self.call::<_, serde_json::Value>("editMessageText", params)
            .await?;
        Ok(())
    }

    pub async fn edit_message_reply_markup(
        &self,
        params: &EditMessageReplyMarkupParams,
    ) -> anyhow::Result<()> {
        self.call::<_, serde_json::Value>("editMessageReplyMarkup", params)
            .await?;
        Ok(())
    }

    /// Stop the client's loading indicator on a pressed button.
    pub async fn answer_callback_query(
        &self,
        params: &AnswerCallbackQueryParams,
    ) -> anyhow::Result<()> {
        self.call::<_, bool>("answerCallbackQuery", params).await?;
        Ok(())
    }

    /// Register bot commands in the menu.
    pub async fn set_my_commands(&self, params: &SetMyCommandsParams) -> anyhow::Result<()> {
        self.call::<_, bool>("setMyCommands", params).await?;
        Ok(())
    }
}
