/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric, Bot API dialog id convention).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

/// Which kind of media a message carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Document,
    Video,
    Audio,
    Voice,
    Animation,
    Photo,
}

/// An opaque, transport-specific handle to stored bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    /// Size in bytes; 0 when the platform did not report one.
    pub size: u64,
}

/// The file attached to a message, as seen by the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub kind: FileKind,
    pub file: RemoteFile,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub thumbnail: Option<RemoteFile>,
    /// The message the file was attached to.
    pub origin: MessageRef,
}

impl SourceFile {
    pub fn size(&self) -> u64 {
        self.file.size
    }
}

/// How the renamed artifact is presented in the chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presentation {
    Document,
    Video,
}
