//! Telegram Bot API adapter (teloxide).
//!
//! Implements the `trb-core` MessagingPort and FileTransport over the Bot API
//! and runs the update dispatcher for bot mode.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode};

use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod router;
pub mod transport;

pub use router::run_polling;
pub use transport::TelegramTransport;

use trb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::{Error, TransferError},
    messaging::{
        port::MessagingPort,
        types::ChatAction,
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

pub(crate) fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

pub(crate) fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(message_id.0)
}

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

/// Errors on the file path become transfer failures the user sees.
pub(crate) fn map_transfer_err(e: teloxide::RequestError) -> Error {
    match e {
        teloxide::RequestError::Api(api) => TransferError::Rejected(api.to_string()).into(),
        other => TransferError::Network(other.to_string()).into(),
    }
}

/// Run `op`, sleeping through one 429 RetryAfter.
pub(crate) async fn with_retry<T, Fut>(
    mut op: impl FnMut() -> Fut,
) -> std::result::Result<T, teloxide::RequestError>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                debug!(?d, "rate limited by Telegram, retrying");
                sleep(d).await;
            }
            Err(other) => return Err(other),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        let msg = with_retry(|| {
            let mut req = self
                .bot
                .send_message(tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html);
            if let Some(id) = reply_to {
                req = req
                    .reply_to_message_id(tg_msg_id(id))
                    .allow_sending_without_reply(true);
            }
            req
        })
        .await
        .map_err(map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        with_retry(|| {
            self.bot
                .edit_message_text(
                    tg_chat(msg.chat_id),
                    tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await
        .map_err(|e| Error::Reporting(e.to_string()))?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        with_retry(|| {
            self.bot
                .delete_message(tg_chat(msg.chat_id), tg_msg_id(msg.message_id))
        })
        .await
        .map_err(|e| Error::Reporting(e.to_string()))?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
            ChatAction::UploadDocument => teloxide::types::ChatAction::UploadDocument,
            ChatAction::UploadVideo => teloxide::types::ChatAction::UploadVideo,
        };
        with_retry(|| self.bot.send_chat_action(tg_chat(chat_id), tg_action))
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
