use crate::formatting::human_bytes;

/// Core error type for the rename bot.
///
/// Adapter crates map their specific errors into this type so the orchestrator
/// can decide between a user-facing reply, a status edit, or a fatal exit.
/// Only `Config` is fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("status reporting failed: {0}")]
    Reporting(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Malformed `/rename` command or `rename:` caption.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("not a rename command")]
    NotACommand,

    #[error("missing file name")]
    MissingName,

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("file name must have an extension: {0}")]
    MissingExtension(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("file name is too long ({0} bytes, max 255)")]
    NameTooLong(usize),
}

/// Per-request transfer failure. Reported through the status message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error(
        "file is too large: {} exceeds the {} limit",
        human_bytes(*size as f64),
        human_bytes(*limit as f64)
    )]
    TooLarge { size: u64, limit: u64 },

    #[error("message does not contain a file")]
    MissingMedia,

    #[error("network error: {0}")]
    Network(String),

    #[error("rejected by Telegram: {0}")]
    Rejected(String),
}

impl Error {
    /// Short text suitable for a chat reply.
    pub fn user_summary(&self) -> String {
        match self {
            Error::Transfer(e) => e.to_string(),
            Error::Parse(e) => e.to_string(),
            Error::Io(e) => format!("local file error: {e}"),
            other => other.to_string(),
        }
    }
}
