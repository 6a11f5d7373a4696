//! Conversion of grammers messages into the core model.
//!
//! MTProto has no reusable `file_id`; a stored file is re-fetched through the
//! message that carries it, so `RemoteFile::id` holds a [`FileLocator`].

use std::{fmt, str::FromStr};

use grammers_client::{
    grammers_tl_types as tl,
    types::{Media, Message},
};
use tracing::warn;

use trb_core::{
    domain::{ChatId, FileKind, MessageId, MessageRef, RemoteFile, SourceFile, UserId},
    errors::Error,
    messaging::types::IncomingMessage,
};

use crate::peers::{chat_kind, dialog_id};

const THUMB_SUFFIX: &str = ":thumb";

/// `"<dialog id>:<message id>"`, with a `:thumb` suffix for the thumbnail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileLocator {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub thumb: bool,
}

impl FileLocator {
    pub fn media(origin: MessageRef) -> Self {
        Self {
            chat_id: origin.chat_id,
            message_id: origin.message_id,
            thumb: false,
        }
    }

    pub fn thumbnail(origin: MessageRef) -> Self {
        Self {
            thumb: true,
            ..Self::media(origin)
        }
    }
}

impl fmt::Display for FileLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id.0, self.message_id.0)?;
        if self.thumb {
            f.write_str(THUMB_SUFFIX)?;
        }
        Ok(())
    }
}

impl FromStr for FileLocator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::External(format!("invalid file locator: {s:?}"));
        let (body, thumb) = match s.strip_suffix(THUMB_SUFFIX) {
            Some(body) => (body, true),
            None => (s, false),
        };
        let (chat, msg) = body.rsplit_once(':').ok_or_else(invalid)?;
        Ok(Self {
            chat_id: ChatId(chat.parse().map_err(|_| invalid())?),
            message_id: MessageId(msg.parse().map_err(|_| invalid())?),
            thumb,
        })
    }
}

/// What the attributes of a stored document say about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentInfo {
    pub kind: FileKind,
    pub file_name: Option<String>,
}

pub fn describe_attributes(attributes: &[tl::enums::DocumentAttribute]) -> DocumentInfo {
    use tl::enums::DocumentAttribute as A;

    let mut info = DocumentInfo {
        kind: FileKind::Document,
        file_name: None,
    };
    let mut animated = false;
    for attr in attributes {
        match attr {
            A::Filename(f) => info.file_name = Some(f.file_name.clone()),
            A::Animated => animated = true,
            A::Video(_) => info.kind = FileKind::Video,
            A::Audio(a) if a.voice => info.kind = FileKind::Voice,
            A::Audio(_) => info.kind = FileKind::Audio,
            _ => {}
        }
    }
    // GIFs are stored as silent videos flagged animated.
    if animated {
        info.kind = FileKind::Animation;
    }
    info
}

/// Size type of the largest downloadable thumbnail.
pub fn best_thumb_type(thumbs: &[tl::enums::PhotoSize]) -> Option<String> {
    thumbs
        .iter()
        .filter_map(|t| match t {
            tl::enums::PhotoSize::Size(s) => Some((s.size, s.r#type.clone())),
            tl::enums::PhotoSize::Progressive(p) => {
                Some((p.sizes.last().copied().unwrap_or(0), p.r#type.clone()))
            }
            _ => None,
        })
        .max_by_key(|(size, _)| *size)
        .map(|(_, kind)| kind)
}

/// The stored document behind a media, if it is one.
pub fn raw_document(media: &Media) -> Option<&tl::types::Document> {
    let Media::Document(doc) = media else {
        return None;
    };
    match doc.raw.document.as_ref()? {
        tl::enums::Document::Document(d) => Some(d),
        tl::enums::Document::Empty(_) => None,
    }
}

/// The file attached to `msg`, if any.
pub fn source_file(msg: &Message, chat_id: ChatId) -> Option<SourceFile> {
    let origin = MessageRef {
        chat_id,
        message_id: MessageId(msg.id()),
    };
    let media = msg.media()?;

    if let Some(doc) = raw_document(&media) {
        let info = describe_attributes(&doc.attributes);
        let has_thumb = doc
            .thumbs
            .as_deref()
            .and_then(best_thumb_type)
            .is_some();
        return Some(SourceFile {
            kind: info.kind,
            file: RemoteFile {
                id: FileLocator::media(origin).to_string(),
                size: u64::try_from(doc.size).unwrap_or(0),
            },
            file_name: info.file_name,
            mime_type: Some(doc.mime_type.clone()),
            thumbnail: has_thumb.then(|| RemoteFile {
                id: FileLocator::thumbnail(origin).to_string(),
                size: 0,
            }),
            origin,
        });
    }

    match media {
        // Photo sizes are only known per variant; the reupload path reads the
        // actual byte count from disk.
        Media::Photo(_) => Some(SourceFile {
            kind: FileKind::Photo,
            file: RemoteFile {
                id: FileLocator::media(origin).to_string(),
                size: 0,
            },
            file_name: None,
            mime_type: Some("image/jpeg".to_string()),
            thumbnail: None,
            origin,
        }),
        _ => None,
    }
}

/// Convert a message without following its reply.
pub fn incoming_from(msg: &Message) -> IncomingMessage {
    let chat_id = dialog_id(msg.peer_id());
    let media = source_file(msg, chat_id);

    // MTProto keeps a caption in the message text.
    let body = Some(msg.text())
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let (text, caption) = if media.is_some() {
        (None, body)
    } else {
        (body, None)
    };

    IncomingMessage {
        chat_id,
        chat_kind: chat_kind(chat_id.0),
        message_id: MessageId(msg.id()),
        sender: msg.sender().map(|p| UserId(p.id().bot_api_dialog_id())),
        text,
        caption,
        media,
        reply_to: None,
        edited: false,
    }
}

/// Convert a message and the message it replies to (one level deep).
pub async fn incoming_with_reply(msg: &Message) -> IncomingMessage {
    let mut incoming = incoming_from(msg);
    if msg.reply_to_message_id().is_none() {
        return incoming;
    }
    match msg.get_reply().await {
        Ok(Some(reply)) => incoming.reply_to = Some(Box::new(incoming_from(&reply))),
        Ok(None) => {}
        Err(e) => warn!(message_id = msg.id(), "could not fetch replied message: {e}"),
    }
    incoming
}
