//! Bot API dialog ids <-> MTProto peers.
//!
//! The core speaks Bot API ids everywhere: users are positive, basic groups
//! are `-id`, channels and supergroups are `-100<id>`.

use std::{collections::HashMap, sync::Mutex};

use grammers_client::{
    session::defs::{PeerAuth, PeerId, PeerRef},
    types::Peer,
    Client,
};

use trb_core::{
    domain::{ChatId, ChatKind},
    Result,
};

use crate::map_transfer_err;

const CHANNEL_OFFSET: i64 = 1_000_000_000_000;

/// Where a dialog id points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogTarget {
    User(i64),
    Chat(i64),
    Channel(i64),
}

pub fn dialog_target(dialog_id: i64) -> DialogTarget {
    if dialog_id > 0 {
        DialogTarget::User(dialog_id)
    } else if dialog_id <= -(CHANNEL_OFFSET + 1) {
        DialogTarget::Channel(-dialog_id - CHANNEL_OFFSET)
    } else {
        DialogTarget::Chat(-dialog_id)
    }
}

/// Channel ids cannot tell a broadcast channel from a supergroup; both are
/// treated as supergroups, which only matters for the group allow-list.
pub fn chat_kind(dialog_id: i64) -> ChatKind {
    match dialog_target(dialog_id) {
        DialogTarget::User(_) => ChatKind::Private,
        DialogTarget::Chat(_) => ChatKind::Group,
        DialogTarget::Channel(_) => ChatKind::Supergroup,
    }
}

pub fn dialog_id(peer: PeerId) -> ChatId {
    ChatId(peer.bot_api_dialog_id())
}

fn peer_ref(dialog_id: i64) -> PeerRef {
    let id = match dialog_target(dialog_id) {
        DialogTarget::User(bare) => PeerId::user(bare),
        DialogTarget::Chat(bare) => PeerId::chat(bare),
        DialogTarget::Channel(bare) => PeerId::channel(bare),
    };
    PeerRef {
        id,
        auth: PeerAuth::default(),
    }
}

/// Resolves and memoizes peers. Access hashes come from the session's peer
/// cache, which the update stream keeps filled for chats we hear from.
pub struct PeerResolver {
    client: Client,
    cache: Mutex<HashMap<i64, Peer>>,
}

impl PeerResolver {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn resolve(&self, chat_id: ChatId) -> Result<Peer> {
        if let Some(peer) = self
            .cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&chat_id.0)
        {
            return Ok(peer.clone());
        }

        let peer = self
            .client
            .resolve_peer(peer_ref(chat_id.0))
            .await
            .map_err(map_transfer_err)?;
        self.cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(chat_id.0, peer.clone());
        Ok(peer)
    }
}
