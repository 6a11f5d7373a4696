//! Telegram update handlers.
//!
//! Each update is converted into the core `IncomingMessage` and handed to the
//! rename service on its own task, so a long transfer never blocks the chat's
//! update queue.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use trb_core::rename::RenameService;

mod media;

pub use media::{incoming_from, source_file};

pub async fn handle_message(msg: Message, service: Arc<RenameService>) -> ResponseResult<()> {
    let incoming = incoming_from(&msg, true);
    tokio::spawn(async move {
        let outcome = service.handle(incoming).await;
        debug!(?outcome, "update handled");
    });
    Ok(())
}

pub async fn handle_edited_message(msg: Message) -> ResponseResult<()> {
    debug!(message_id = msg.id.0, "ignoring edited message");
    Ok(())
}
