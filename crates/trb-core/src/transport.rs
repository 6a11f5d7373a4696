//! Transfer path selection: server-side copy vs download+reupload.

use std::fmt;

use crate::{config::Mode, errors::TransferError};

const GIB: u64 = 1024 * 1024 * 1024;

/// Size caps for each account kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferLimits {
    /// Bot accounts: platform message-size limit (~2 GB).
    pub bot_max_file_size: u64,
    /// User sessions: platform ceiling (~4 GB).
    pub user_max_file_size: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            bot_max_file_size: 2 * GIB,
            user_max_file_size: 4 * GIB,
        }
    }
}

impl TransferLimits {
    pub fn reupload_limit(&self, mode: Mode) -> u64 {
        match mode {
            Mode::Bot => self.bot_max_file_size,
            Mode::User => self.user_max_file_size,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Re-send by reference; bytes never reach this process.
    ServerCopy,
    /// Download to a temp dir, then upload under the new name.
    DownloadReupload,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::ServerCopy => f.write_str("server_copy"),
            TransportKind::DownloadReupload => f.write_str("download_reupload"),
        }
    }
}

/// Pick a transfer path. `file_size == 0` means "unknown" and is not capped.
///
/// Oversized files fail here, before any bytes move.
pub fn select_transport(
    file_size: u64,
    mode: Mode,
    server_copy_supported: bool,
    limits: &TransferLimits,
) -> Result<TransportKind, TransferError> {
    if mode == Mode::User && server_copy_supported && file_size <= limits.user_max_file_size {
        return Ok(TransportKind::ServerCopy);
    }

    check_reupload_size(file_size, mode, limits)?;
    Ok(TransportKind::DownloadReupload)
}

/// Gate for the download+reupload path, also used before falling back to it.
pub fn check_reupload_size(
    file_size: u64,
    mode: Mode,
    limits: &TransferLimits,
) -> Result<(), TransferError> {
    let limit = limits.reupload_limit(mode);
    if file_size > limit {
        return Err(TransferError::TooLarge {
            size: file_size,
            limit,
        });
    }
    Ok(())
}
