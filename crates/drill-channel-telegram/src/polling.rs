//! Telegram long-polling loop.

use std::time::Duration;

use drill_types::{
    ChatKind, ChatRef, Command, Inbound, IncomingCallback, IncomingMessage, MessageHandle, Sender,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TelegramApi;
use crate::types::{GetUpdatesParams, Update};

/// Run the long-polling loop, converting updates to [`Inbound`] events.
///
/// Exits when `cancel` is cancelled or the `sender` is closed.
pub async fn run_polling_loop(
    api: &TelegramApi,
    sender: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    info!("Telegram polling loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let params = GetUpdatesParams {
            offset,
            timeout: Some(30),
            allowed_updates: Some(vec!["message".into(), "callback_query".into()]),
        };

        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(&params) => result,
        };

        match updates {
            Ok(updates) => {
                backoff = Duration::from_secs(1);

                for update in updates {
                    offset = Some(update.update_id + 1);
                    let update_id = update.update_id;

                    let Some(inbound) = to_inbound(update) else {
                        continue;
                    };
                    debug!(update_id, "Forwarding Telegram update");

                    if sender.send(inbound).await.is_err() {
                        info!("Inbound channel closed, stopping polling");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(backoff_secs = backoff.as_secs(), "getUpdates error: {e}");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {},
                }

                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }

    info!("Telegram polling loop stopped");
}

/// Convert one update. Non-text messages and payload-less presses are dropped.
pub fn to_inbound(update: Update) -> Option<Inbound> {
    if let Some(query) = update.callback_query {
        let data = query.data?;
        let (message, message_text) = match query.message {
            Some(msg) => (
                Some(MessageHandle {
                    chat_id: msg.chat.id,
                    message_id: msg.message_id,
                }),
                msg.text,
            ),
            None => (None, None),
        };
        return Some(Inbound::Callback(IncomingCallback {
            id: query.id,
            sender: Sender {
                id: query.from.id,
                display_name: query.from.display_name(),
            },
            message,
            message_text,
            data,
        }));
    }

    let msg = update.message?;
    let text = msg.text?;
    // Channel posts have no sender; fall back to the chat itself.
    let sender = match &msg.from {
        Some(user) => Sender {
            id: user.id,
            display_name: user.display_name(),
        },
        None => Sender {
            id: msg.chat.id,
            display_name: String::new(),
        },
    };

    Some(Inbound::Message(IncomingMessage {
        chat: ChatRef {
            id: msg.chat.id,
            kind: ChatKind::from_platform(&msg.chat.chat_type),
        },
        sender,
        message_id: msg.message_id,
        command: Command::parse(&text),
        text,
    }))
}
