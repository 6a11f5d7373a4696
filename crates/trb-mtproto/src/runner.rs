//! User-mode lifecycle: session, connection, update loop.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use base64::Engine;
use grammers_client::{
    client::UpdatesConfiguration, session::storages::TlSession, Client, Update,
};
use grammers_mtsender::SenderPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trb_core::{
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::FileTransport,
    rename::RenameService,
    session::SessionSource,
};

use crate::{
    media::incoming_with_reply, peers::PeerResolver, MtprotoMessenger, MtprotoTransport,
};

/// Read a grammers session from `SESSION_STRING` (base64) or the session file.
pub fn load_session(source: &SessionSource) -> anyhow::Result<TlSession> {
    let bytes = match source {
        SessionSource::String(s) => base64::engine::general_purpose::STANDARD
            .decode(s.trim().as_bytes())
            .context("SESSION_STRING is not valid base64")?,
        SessionSource::File { path, .. } => std::fs::read(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?,
    };
    TlSession::load(&bytes).map_err(|e| anyhow!("session load failed: {e}"))
}

/// Write the session back so cached peers survive a restart. String sessions
/// live in the environment and are left alone.
fn persist_session(source: &SessionSource, session: &TlSession) {
    if let SessionSource::File { path, .. } = source {
        match std::fs::write(path, session.save()) {
            Ok(()) => debug!(path = %path.display(), "session saved"),
            Err(e) => warn!(path = %path.display(), "failed to save session: {e}"),
        }
    }
}

/// Run user mode until `shutdown` fires.
pub async fn run(cfg: Arc<Config>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let api_id = cfg.api_id.context("API_ID is required for user mode")?;
    let source = cfg
        .session
        .clone()
        .context("no user session: set SESSION_STRING or SESSION_FILE_PATH")?;
    info!(kind = source.kind(), "loading user session");
    let session = Arc::new(load_session(&source)?);

    let pool = SenderPool::new(Arc::clone(&session), api_id);
    let client = Client::new(&pool);
    let SenderPool {
        runner, updates, ..
    } = pool;
    let network = tokio::spawn(runner.run());

    let authorized = client
        .is_authorized()
        .await
        .context("could not reach Telegram")?;
    if !authorized {
        network.abort();
        bail!("the user session is not logged in; create it with an interactive client first");
    }

    let me = client.get_me().await.context("failed to fetch own account")?;
    info!(username = me.username().unwrap_or("-"), "user session started");

    let peers = Arc::new(PeerResolver::new(client.clone()));
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(MtprotoMessenger::new(peers.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let transport: Arc<dyn FileTransport> = Arc::new(MtprotoTransport::new(peers));

    let service = Arc::new(
        RenameService::new(cfg.clone(), messenger, transport, shutdown.clone())
            .with_bot_username(me.username().map(str::to_string)),
    );

    let mut stream = client
        .stream_updates(
            updates,
            UpdatesConfiguration {
                catch_up: false,
                ..Default::default()
            },
        );

    loop {
        let update = tokio::select! {
            _ = shutdown.cancelled() => break,
            update = stream.next() => update,
        };
        match update {
            // Outgoing messages are handled too: the account owner may upload
            // with a `rename:` caption. Sent files never carry the directive.
            Ok(Update::NewMessage(msg)) => {
                let service = service.clone();
                tokio::spawn(async move {
                    let incoming = incoming_with_reply(&msg).await;
                    let outcome = service.handle(incoming).await;
                    debug!(?outcome, "update handled");
                });
            }
            Ok(Update::MessageEdited(msg)) => {
                debug!(message_id = msg.id(), "ignoring edited message");
            }
            Ok(_) => {}
            Err(e) => {
                warn!("update stream failed: {e}");
                break;
            }
        }
    }

    info!("update loop stopped");
    persist_session(&source, &session);
    network.abort();
    Ok(())
}
