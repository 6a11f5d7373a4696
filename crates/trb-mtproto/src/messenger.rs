use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::{grammers_tl_types as tl, InputMessage};

use trb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::ChatAction,
    },
    Result,
};

use crate::{map_err, peers::PeerResolver, with_flood_retry};

/// Status and reply messages sent from the user account.
#[derive(Clone)]
pub struct MtprotoMessenger {
    peers: Arc<PeerResolver>,
}

impl MtprotoMessenger {
    pub fn new(peers: Arc<PeerResolver>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl MessagingPort for MtprotoMessenger {
    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        let peer = self.peers.resolve(chat_id).await?;
        let client = self.peers.client();
        let sent = with_flood_retry(|| {
            client.send_message(
                &peer,
                InputMessage::new()
                    .html(html)
                    .reply_to(reply_to.map(|m| m.0)),
            )
        })
        .await
        .map_err(map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(sent.id()),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        let peer = self.peers.resolve(msg.chat_id).await?;
        let client = self.peers.client();
        with_flood_retry(|| {
            client.edit_message(&peer, msg.message_id.0, InputMessage::new().html(html))
        })
        .await
        .map_err(|e| Error::Reporting(e.to_string()))?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        let peer = self.peers.resolve(msg.chat_id).await?;
        let client = self.peers.client();
        let ids = [msg.message_id.0];
        with_flood_retry(|| client.delete_messages(&peer, &ids))
            .await
            .map_err(|e| Error::Reporting(e.to_string()))?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let peer = self.peers.resolve(chat_id).await?;
        let tl_action = match action {
            ChatAction::Typing => tl::enums::SendMessageAction::SendMessageTypingAction,
            ChatAction::UploadDocument => tl::enums::SendMessageAction::SendMessageUploadDocumentAction(
                tl::types::SendMessageUploadDocumentAction { progress: 0 },
            ),
            ChatAction::UploadVideo => tl::enums::SendMessageAction::SendMessageUploadVideoAction(
                tl::types::SendMessageUploadVideoAction { progress: 0 },
            ),
        };
        self.peers
            .client()
            .action(&peer)
            .oneshot(tl_action)
            .await
            .map_err(map_err)
    }
}
