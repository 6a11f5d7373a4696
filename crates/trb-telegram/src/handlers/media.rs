use teloxide::types::{Chat, FileMeta, Message, PhotoSize};

use trb_core::{
    domain::{ChatId, ChatKind, FileKind, MessageId, MessageRef, RemoteFile, SourceFile, UserId},
    messaging::types::IncomingMessage,
};

/// Convert a Bot API message. With `with_reply`, the replied-to message is
/// converted too (one level deep).
pub fn incoming_from(msg: &Message, with_reply: bool) -> IncomingMessage {
    let reply_to = if with_reply {
        msg.reply_to_message()
            .map(|r| Box::new(incoming_from(r, false)))
    } else {
        None
    };

    IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        chat_kind: chat_kind(&msg.chat),
        message_id: MessageId(msg.id.0),
        sender: msg.from().map(|u| UserId(u.id.0 as i64)),
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        media: source_file(msg),
        reply_to,
        edited: false,
    }
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    }
}

fn remote(meta: &FileMeta) -> RemoteFile {
    RemoteFile {
        id: meta.id.clone(),
        size: u64::from(meta.size),
    }
}

fn thumb(t: Option<&PhotoSize>) -> Option<RemoteFile> {
    t.map(|p| remote(&p.file))
}

/// The file attached to `msg`, if any.
pub fn source_file(msg: &Message) -> Option<SourceFile> {
    let origin = MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    };

    // Animations also carry a document; check them first.
    if let Some(a) = msg.animation() {
        return Some(SourceFile {
            kind: FileKind::Animation,
            file: remote(&a.file),
            file_name: a.file_name.clone(),
            mime_type: a.mime_type.as_ref().map(|m| m.to_string()),
            thumbnail: thumb(a.thumb.as_ref()),
            origin,
        });
    }
    if let Some(d) = msg.document() {
        return Some(SourceFile {
            kind: FileKind::Document,
            file: remote(&d.file),
            file_name: d.file_name.clone(),
            mime_type: d.mime_type.as_ref().map(|m| m.to_string()),
            thumbnail: thumb(d.thumb.as_ref()),
            origin,
        });
    }
    if let Some(v) = msg.video() {
        return Some(SourceFile {
            kind: FileKind::Video,
            file: remote(&v.file),
            file_name: v.file_name.clone(),
            mime_type: v.mime_type.as_ref().map(|m| m.to_string()),
            thumbnail: thumb(v.thumb.as_ref()),
            origin,
        });
    }
    if let Some(a) = msg.audio() {
        return Some(SourceFile {
            kind: FileKind::Audio,
            file: remote(&a.file),
            file_name: a.file_name.clone(),
            mime_type: a.mime_type.as_ref().map(|m| m.to_string()),
            thumbnail: thumb(a.thumb.as_ref()),
            origin,
        });
    }
    if let Some(v) = msg.voice() {
        return Some(SourceFile {
            kind: FileKind::Voice,
            file: remote(&v.file),
            file_name: None,
            mime_type: v.mime_type.as_ref().map(|m| m.to_string()),
            thumbnail: None,
            origin,
        });
    }
    if let Some(sizes) = msg.photo() {
        // Largest size last.
        let best = sizes.last()?;
        return Some(SourceFile {
            kind: FileKind::Photo,
            file: remote(&best.file),
            file_name: None,
            mime_type: Some("image/jpeg".to_string()),
            thumbnail: None,
            origin,
        });
    }
    None
}
