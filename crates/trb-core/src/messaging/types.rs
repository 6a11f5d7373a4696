use crate::domain::{ChatId, ChatKind, MessageId, MessageRef, SourceFile, UserId};

/// Cross-transport incoming message model.
///
/// Adapter crates convert their native message type into this shape; anything
/// the rename flow does not need stays in the adapter.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub message_id: MessageId,
    pub sender: Option<UserId>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub media: Option<SourceFile>,
    /// The message this one replies to, if the adapter could resolve it.
    pub reply_to: Option<Box<IncomingMessage>>,
    pub edited: bool,
}

impl IncomingMessage {
    pub fn msg_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// Outgoing "chat action" (typing indicator, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadDocument,
    UploadVideo,
}
