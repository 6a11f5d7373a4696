//! MTProto user-session adapter (grammers).
//!
//! Implements the `trb-core` MessagingPort and FileTransport for user mode,
//! where a logged-in account can re-send stored media by reference and
//! move files far beyond the Bot API limits.

use std::{future::Future, time::Duration};

use grammers_mtsender::InvocationError;
use tokio::time::sleep;
use tracing::debug;

use trb_core::errors::{Error, TransferError};

pub mod media;
pub mod messenger;
pub mod peers;
pub mod runner;
pub mod transport;

pub use messenger::MtprotoMessenger;
pub use runner::run;
pub use transport::MtprotoTransport;

/// Longest FLOOD_WAIT we sit out instead of failing the request.
const MAX_FLOOD_WAIT: Duration = Duration::from_secs(60);

fn map_err(e: InvocationError) -> Error {
    Error::External(format!("mtproto error: {e}"))
}

pub(crate) fn map_transfer_err(e: InvocationError) -> Error {
    match e {
        InvocationError::Rpc(rpc) => TransferError::Rejected(rpc.to_string()).into(),
        other => TransferError::Network(other.to_string()).into(),
    }
}

fn flood_wait(e: &InvocationError) -> Option<Duration> {
    match e {
        InvocationError::Rpc(rpc) if rpc.code == 420 => {
            Some(Duration::from_secs(u64::from(rpc.value.unwrap_or(1))))
        }
        _ => None,
    }
}

/// Run `op`, sleeping through one short FLOOD_WAIT.
pub(crate) async fn with_flood_retry<T, Fut>(
    mut op: impl FnMut() -> Fut,
) -> std::result::Result<T, InvocationError>
where
    Fut: Future<Output = std::result::Result<T, InvocationError>>,
{
    let mut retried = false;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => match flood_wait(&e) {
                Some(d) if !retried && d <= MAX_FLOOD_WAIT => {
                    retried = true;
                    debug!(?d, "flood wait, retrying");
                    sleep(d).await;
                }
                _ => return Err(e),
            },
        }
    }
}
