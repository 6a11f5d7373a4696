//! Rename orchestrator: routes incoming messages and drives one rename from
//! request to delivered file.
//!
//! ```text
//! Received -> Authorized -> Parsed -> Transferring -> Completed
//!     \            \           \            \
//!      Rejected     Rejected    Rejected     Failed
//! ```
//!
//! Per-request errors stop at this boundary and become chat messages. Nothing
//! here is fatal to the process.

use std::{fmt, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    command::{
        carried_caption, is_rename_caption, parse_caption, parse_command, parse_rename_args,
        usage_hint, RenameSpec, RENAME_COMMAND,
    },
    config::Config,
    domain::{ChatKind, MessageId, MessageRef, Presentation, SourceFile},
    errors::{Error, TransferError},
    formatting::{code, escape_html},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, IncomingMessage},
    },
    ports::{DeliveryJob, FileTransport, NoProgress},
    progress::ProgressReporter,
    security::{is_authorized, AccessDecision, AccessPolicy},
    transport::{check_reupload_size, select_transport, TransportKind},
    utils::RequestWorkspace,
    Result,
};

pub const HELP_TEXT: &str = "Send a file and reply to it with <code>/rename new_name.ext</code>\n\
Or send a file with caption: <code>rename: new_name.ext</code>\n\n\
Flags: <code>--thumb</code> keeps the thumbnail, <code>--as-video</code> sends as a video.";

const STATUS_PREPARING: &str = "Preparing rename...";
const STATUS_SERVER_COPY: &str = "Copying file on Telegram servers (fast)...";
const STATUS_DOWNLOAD_START: &str = "Downloading file to temporary storage...";
const STATUS_UPLOAD_START: &str = "Upload: starting...";
const PHASE_DOWNLOAD: &str = "Downloading...";
const PHASE_UPLOAD: &str = "Uploading...";
pub const THUMB_FILE_NAME: &str = "thumb.jpg";

/// Lifecycle of one request, for logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenameState {
    Received,
    Authorized,
    Parsed,
    Transferring,
    Completed,
    Rejected,
    Failed,
}

impl fmt::Display for RenameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RenameState::Received => "received",
            RenameState::Authorized => "authorized",
            RenameState::Parsed => "parsed",
            RenameState::Transferring => "transferring",
            RenameState::Completed => "completed",
            RenameState::Rejected => "rejected",
            RenameState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What `RenameService::handle` did with a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Help,
    Denied(AccessDecision),
    /// Bad command, missing reply or missing media. A hint was sent.
    Usage,
    Completed {
        file_name: String,
        transport: TransportKind,
        /// `--as-video` was rejected and the file went out as a document.
        sent_as_document: bool,
    },
    Failed(String),
    Shutdown,
}

/// One validated rename.
#[derive(Clone, Debug)]
pub struct RenameRequest {
    pub spec: RenameSpec,
    pub source: SourceFile,
    pub caption: Option<String>,
    /// The message the status and the renamed file reply to.
    pub anchor: MessageId,
    /// The message that asked for the rename.
    pub requester: MessageRef,
}

impl RenameRequest {
    fn job(&self) -> DeliveryJob {
        DeliveryJob {
            chat_id: self.requester.chat_id,
            reply_to: Some(self.anchor),
            file_name: self.spec.file_name.clone(),
            caption: self.caption.clone(),
            presentation: if self.spec.flags.as_video {
                Presentation::Video
            } else {
                Presentation::Document
            },
            keep_thumb: self.spec.flags.keep_thumb,
            source: self.source.clone(),
        }
    }
}

#[derive(Debug)]
struct Delivered {
    transport: TransportKind,
    sent_as_document: bool,
}

pub struct RenameService {
    cfg: Arc<Config>,
    policy: AccessPolicy,
    messenger: Arc<dyn MessagingPort>,
    transport: Arc<dyn FileTransport>,
    shutdown: CancellationToken,
    bot_username: Option<String>,
}

impl RenameService {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        transport: Arc<dyn FileTransport>,
        shutdown: CancellationToken,
    ) -> Self {
        let policy = cfg.access_policy();
        Self {
            cfg,
            policy,
            messenger,
            transport,
            shutdown,
            bot_username: None,
        }
    }

    /// Commands addressed to another bot (`/rename@other_bot`) are ignored
    /// once our own username is known.
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    pub async fn handle(&self, msg: IncomingMessage) -> Outcome {
        if msg.edited {
            return Outcome::Ignored;
        }

        let span = info_span!(
            "message",
            chat_id = msg.chat_id.0,
            user_id = msg.sender.map(|u| u.0),
            message_id = msg.message_id.0,
        );
        self.route(msg).instrument(span).await
    }

    async fn route(&self, msg: IncomingMessage) -> Outcome {
        if let Some(cmd) = msg.text.as_deref().and_then(parse_command) {
            if !self.addressed_to_us(cmd.mention.as_deref()) {
                return Outcome::Ignored;
            }
            return match cmd.name.as_str() {
                "start" if msg.chat_kind == ChatKind::Private => {
                    self.reply(&msg, HELP_TEXT).await;
                    Outcome::Help
                }
                RENAME_COMMAND => self.handle_rename_command(&msg, &cmd.args).await,
                "shutdown" => self.handle_shutdown(&msg).await,
                _ => Outcome::Ignored,
            };
        }

        let has_directive = msg.media.is_some()
            && msg.caption.as_deref().is_some_and(is_rename_caption);
        if has_directive {
            return self.handle_caption(&msg).await;
        }

        Outcome::Ignored
    }

    fn addressed_to_us(&self, mention: Option<&str>) -> bool {
        match (mention, self.bot_username.as_deref()) {
            (Some(m), Some(me)) => m.eq_ignore_ascii_case(me),
            _ => true,
        }
    }

    async fn authorize(&self, msg: &IncomingMessage) -> Option<Outcome> {
        debug!(state = %RenameState::Received, "rename requested");
        let decision = is_authorized(msg.sender, msg.chat_id, msg.chat_kind, &self.policy);
        if let Some(text) = decision.denial_text() {
            info!(state = %RenameState::Rejected, ?decision, "rename denied");
            self.reply(msg, text).await;
            return Some(Outcome::Denied(decision));
        }
        debug!(state = %RenameState::Authorized, "sender authorized");
        None
    }

    async fn handle_rename_command(&self, msg: &IncomingMessage, args: &str) -> Outcome {
        if let Some(denied) = self.authorize(msg).await {
            return denied;
        }

        let Some(replied) = msg.reply_to.as_deref() else {
            self.reply(
                msg,
                "Please reply to the file you want to rename with <code>/rename new_name.ext</code>.",
            )
            .await;
            return Outcome::Usage;
        };

        let spec = match parse_rename_args(args) {
            Ok(spec) => spec,
            Err(e) => {
                info!(state = %RenameState::Rejected, error = %e, "bad rename command");
                self.reply(msg, &usage_hint(&e)).await;
                return Outcome::Usage;
            }
        };

        let Some(source) = replied.media.clone() else {
            self.reply(msg, "The replied message does not contain a file/media.")
                .await;
            return Outcome::Usage;
        };

        let request = RenameRequest {
            caption: carried_caption(replied.caption.as_deref()),
            anchor: replied.message_id,
            requester: msg.msg_ref(),
            spec,
            source,
        };
        self.run(request).await
    }

    async fn handle_caption(&self, msg: &IncomingMessage) -> Outcome {
        if let Some(denied) = self.authorize(msg).await {
            return denied;
        }

        let caption = msg.caption.as_deref().unwrap_or_default();
        let spec = match parse_caption(caption) {
            Ok(spec) => spec,
            Err(e) => {
                info!(state = %RenameState::Rejected, error = %e, "bad rename caption");
                self.reply(msg, &usage_hint(&e)).await;
                return Outcome::Usage;
            }
        };

        let Some(source) = msg.media.clone() else {
            return Outcome::Ignored;
        };

        let request = RenameRequest {
            caption: carried_caption(spec.remaining_caption.as_deref()),
            anchor: msg.message_id,
            requester: msg.msg_ref(),
            spec,
            source,
        };
        self.run(request).await
    }

    async fn handle_shutdown(&self, msg: &IncomingMessage) -> Outcome {
        if !self.policy.is_allowed_user(msg.sender) {
            self.reply(msg, "You are not authorized to use this command.")
                .await;
            return Outcome::Denied(AccessDecision::DeniedUser);
        }
        info!("shutdown requested from chat");
        self.reply(msg, "Shutting down...").await;
        self.shutdown.cancel();
        Outcome::Shutdown
    }

    /// Execute a validated request. Always answers in the chat.
    pub async fn run(&self, req: RenameRequest) -> Outcome {
        let span = info_span!(
            "rename",
            file_name = %req.spec.file_name,
            size = req.source.size(),
            kind = ?req.source.kind,
        );
        self.run_inner(req).instrument(span).await
    }

    async fn run_inner(&self, req: RenameRequest) -> Outcome {
        debug!(
            state = %RenameState::Parsed,
            flags = ?req.spec.flags,
            trigger = ?req.spec.trigger,
            "request parsed"
        );
        let chat_id = req.requester.chat_id;

        if let Err(e) = self
            .messenger
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
        {
            debug!(error = %e, "chat action failed");
        }

        let status = match self
            .messenger
            .send_html(chat_id, STATUS_PREPARING, Some(req.anchor))
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(state = %RenameState::Failed, error = %e, "could not post status message");
                let summary = e.user_summary();
                self.reply_to(req.requester, &failure_text(&summary)).await;
                return Outcome::Failed(summary);
            }
        };

        match self.transfer(&req, status).await {
            Ok(done) => {
                info!(
                    state = %RenameState::Completed,
                    transport = %done.transport,
                    sent_as_document = done.sent_as_document,
                    "rename delivered"
                );
                self.complete(&req, status, &done).await;
                Outcome::Completed {
                    file_name: req.spec.file_name.clone(),
                    transport: done.transport,
                    sent_as_document: done.sent_as_document,
                }
            }
            Err(e) => {
                warn!(state = %RenameState::Failed, error = %e, "rename failed");
                let summary = e.user_summary();
                self.edit_status(status, &failure_text(&summary)).await;
                Outcome::Failed(summary)
            }
        }
    }

    async fn complete(&self, req: &RenameRequest, status: MessageRef, done: &Delivered) {
        let name = code(&req.spec.file_name);
        let status_text = match done.transport {
            TransportKind::ServerCopy => format!("Copied and sent as {name}"),
            TransportKind::DownloadReupload => format!("Sent renamed file: {name}"),
        };
        self.edit_status(status, &status_text).await;

        if !self.cfg.status_linger.is_zero() {
            tokio::time::sleep(self.cfg.status_linger).await;
        }
        if let Err(e) = self.messenger.delete_message(status).await {
            debug!(error = %e, "status delete failed");
        }

        let mut reply = format!("Renamed and sent as {name}");
        if done.sent_as_document {
            reply.push_str("\n(video upload was rejected, sent as a document instead)");
        }
        self.reply_to(req.requester, &reply).await;
    }

    async fn transfer(&self, req: &RenameRequest, status: MessageRef) -> Result<Delivered> {
        let job = req.job();
        let size = req.source.size();
        let mode = self.cfg.mode;
        let limits = &self.cfg.limits;

        let supported = self.transport.supports_server_copy(&job);
        let kind = select_transport(size, mode, supported, limits)?;
        info!(
            state = %RenameState::Transferring,
            transport = %kind,
            server_copy_supported = supported,
            "transport selected"
        );

        if kind == TransportKind::ServerCopy {
            self.edit_status(status, STATUS_SERVER_COPY).await;
            match self.transport.server_copy(&job).await {
                Ok(_) => {
                    return Ok(Delivered {
                        transport: TransportKind::ServerCopy,
                        sent_as_document: false,
                    })
                }
                Err(e) => {
                    warn!(error = %e, "server-side copy failed, falling back to download and reupload");
                    check_reupload_size(size, mode, limits)?;
                }
            }
        }

        self.download_reupload(&job, status).await
    }

    async fn download_reupload(&self, job: &DeliveryJob, status: MessageRef) -> Result<Delivered> {
        let workspace = RequestWorkspace::create(&self.cfg.temp_dir)?;
        let local = workspace.file(&job.file_name);

        self.edit_status(status, STATUS_DOWNLOAD_START).await;
        let reporter = self.reporter(status, PHASE_DOWNLOAD);
        match self
            .transport
            .download(&job.source.file, &local, reporter.sink())
            .await
        {
            Ok(bytes) => {
                debug!(bytes, "download finished");
                reporter.finish().await;
            }
            Err(e) => {
                reporter.abandon().await;
                return Err(e);
            }
        }

        let thumb = if job.keep_thumb {
            self.fetch_thumbnail(&job.source, &workspace).await
        } else {
            None
        };

        self.edit_status(status, STATUS_UPLOAD_START).await;
        let action = match job.presentation {
            Presentation::Video => ChatAction::UploadVideo,
            Presentation::Document => ChatAction::UploadDocument,
        };
        if let Err(e) = self.messenger.send_chat_action(job.chat_id, action).await {
            debug!(error = %e, "chat action failed");
        }

        let reporter = self.reporter(status, PHASE_UPLOAD);
        let first = self
            .transport
            .upload(job, &local, thumb.as_deref(), reporter.sink())
            .await;
        let (sent, sent_as_document) = match first {
            Err(Error::Transfer(TransferError::Rejected(reason)))
                if job.presentation == Presentation::Video =>
            {
                warn!(%reason, "video upload rejected, retrying as document");
                let retry = self
                    .transport
                    .upload(&job.as_document(), &local, thumb.as_deref(), reporter.sink())
                    .await;
                (retry, true)
            }
            other => (other, false),
        };

        match sent {
            Ok(_) => reporter.finish().await,
            Err(e) => {
                reporter.abandon().await;
                return Err(e);
            }
        }

        // `workspace` drops here and takes the local copy with it.
        Ok(Delivered {
            transport: TransportKind::DownloadReupload,
            sent_as_document,
        })
    }

    /// Best-effort: a missing or failed thumbnail never fails the rename.
    async fn fetch_thumbnail(
        &self,
        source: &SourceFile,
        workspace: &RequestWorkspace,
    ) -> Option<std::path::PathBuf> {
        let Some(thumb) = source.thumbnail.as_ref() else {
            debug!("--thumb requested but source has no thumbnail");
            return None;
        };
        let path = workspace.file(THUMB_FILE_NAME);
        match self
            .transport
            .download(thumb, &path, Arc::new(NoProgress))
            .await
        {
            Ok(_) => Some(path),
            Err(e) => {
                warn!(error = %e, "thumbnail download failed; sending without it");
                None
            }
        }
    }

    fn reporter(&self, status: MessageRef, phase: &str) -> ProgressReporter {
        ProgressReporter::start(
            self.messenger.clone(),
            status,
            phase,
            self.cfg.progress_interval,
        )
    }

    async fn edit_status(&self, status: MessageRef, html: &str) {
        if let Err(e) = self.messenger.edit_html(status, html).await {
            warn!(error = %e, "status edit failed");
        }
    }

    async fn reply(&self, msg: &IncomingMessage, html: &str) {
        self.reply_to(msg.msg_ref(), html).await;
    }

    async fn reply_to(&self, target: MessageRef, html: &str) {
        if let Err(e) = self
            .messenger
            .send_html(target.chat_id, html, Some(target.message_id))
            .await
        {
            warn!(error = %e, "reply failed");
        }
    }
}

fn failure_text(summary: &str) -> String {
    format!("Failed to rename/send file: {}", escape_html(summary))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, path::Path};

    use super::*;
    use crate::{
        config::Mode,
        domain::{ChatId, FileKind, RemoteFile, UserId},
        testing::{FakeMessenger, FakeTransport, TransportCall},
    };

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    const CHAT: ChatId = ChatId(42);
    const OWNER: UserId = UserId(7);

    fn config(mode: Mode, owners: &str, temp: &Path) -> Config {
        let mut env: HashMap<&str, String> = HashMap::from([
            ("BOT_TOKEN", "123:abc".to_string()),
            ("API_ID", "1".to_string()),
            ("API_HASH", "hash".to_string()),
            ("SESSION_STRING", "AAAA".to_string()),
            ("OWNER_IDS", owners.to_string()),
            ("STATUS_LINGER_MS", "0".to_string()),
            ("PROGRESS_INTERVAL_MS", "0".to_string()),
            ("TEMP_DIR", temp.display().to_string()),
        ]);
        env.insert("MODE", mode.to_string());
        Config::from_lookup(|k| env.get(k).cloned(), temp.to_path_buf()).unwrap()
    }

    struct Harness {
        service: RenameService,
        messenger: Arc<FakeMessenger>,
        transport: Arc<FakeTransport>,
        shutdown: CancellationToken,
        temp: tempfile::TempDir,
    }

    fn harness(mode: Mode, owners: &str, transport: FakeTransport) -> Harness {
        let temp = tempfile::tempdir().unwrap();
        let cfg = Arc::new(config(mode, owners, temp.path()));
        let messenger = Arc::new(FakeMessenger::new());
        let transport = Arc::new(transport);
        let shutdown = CancellationToken::new();
        let service = RenameService::new(cfg, messenger.clone(), transport.clone(), shutdown.clone());
        Harness {
            service,
            messenger,
            transport,
            shutdown,
            temp,
        }
    }

    fn source(kind: FileKind, size: u64, origin: MessageId) -> SourceFile {
        SourceFile {
            kind,
            file: RemoteFile {
                id: "file-1".to_string(),
                size,
            },
            file_name: Some("original.bin".to_string()),
            mime_type: None,
            thumbnail: Some(RemoteFile {
                id: "thumb-1".to_string(),
                size: 2048,
            }),
            origin: MessageRef {
                chat_id: CHAT,
                message_id: origin,
            },
        }
    }

    fn message(id: i32, sender: UserId) -> IncomingMessage {
        IncomingMessage {
            chat_id: CHAT,
            chat_kind: ChatKind::Private,
            message_id: MessageId(id),
            sender: Some(sender),
            text: None,
            caption: None,
            media: None,
            reply_to: None,
            edited: false,
        }
    }

    fn file_message(id: i32, size: u64) -> IncomingMessage {
        IncomingMessage {
            caption: Some("holiday".to_string()),
            media: Some(source(FileKind::Document, size, MessageId(id))),
            ..message(id, OWNER)
        }
    }

    fn rename_reply(text: &str, sender: UserId, file: IncomingMessage) -> IncomingMessage {
        IncomingMessage {
            text: Some(text.to_string()),
            reply_to: Some(Box::new(file)),
            ..message(2, sender)
        }
    }

    #[tokio::test]
    async fn server_copy_capable_transport_skips_reupload() {
        let h = harness(
            Mode::User,
            "7",
            FakeTransport {
                server_copy_supported: true,
                ..FakeTransport::new()
            },
        );
        let msg = rename_reply("/rename movie.mkv --as-video", OWNER, file_message(1, 500 * MIB));

        let outcome = h.service.handle(msg).await;
        assert_eq!(
            outcome,
            Outcome::Completed {
                file_name: "movie.mkv".to_string(),
                transport: TransportKind::ServerCopy,
                sent_as_document: false,
            }
        );
        assert_eq!(
            h.transport.calls(),
            vec![TransportCall::ServerCopy {
                file_name: "movie.mkv".to_string(),
                presentation: Presentation::Video,
            }]
        );

        let edits = h.messenger.edit_texts();
        assert_eq!(edits.first().map(String::as_str), Some(STATUS_SERVER_COPY));
        assert_eq!(
            edits.last().map(String::as_str),
            Some("Copied and sent as <code>movie.mkv</code>")
        );
        let sends = h.messenger.sends();
        assert_eq!(sends[0].text, STATUS_PREPARING);
        assert_eq!(sends[0].reply_to, Some(MessageId(1)));
        assert_eq!(
            sends.last().unwrap().text,
            "Renamed and sent as <code>movie.mkv</code>"
        );
        assert_eq!(sends.last().unwrap().reply_to, Some(MessageId(2)));
        assert_eq!(h.messenger.deletes().len(), 1);
    }

    #[tokio::test]
    async fn user_mode_as_video_rename_reuploads_as_video() {
        let h = harness(Mode::User, "7", FakeTransport::new());
        let msg = rename_reply("/rename movie.mkv --as-video", OWNER, file_message(1, 500 * MIB));

        let outcome = h.service.handle(msg).await;
        assert_eq!(
            outcome,
            Outcome::Completed {
                file_name: "movie.mkv".to_string(),
                transport: TransportKind::DownloadReupload,
                sent_as_document: false,
            }
        );
        let uploads: Vec<(String, Presentation)> = h
            .transport
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Upload {
                    file_name,
                    presentation,
                    ..
                } => Some((file_name, presentation)),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![("movie.mkv".to_string(), Presentation::Video)]);
        assert!(!h
            .transport
            .calls()
            .iter()
            .any(|c| matches!(c, TransportCall::ServerCopy { .. })));
        assert!(h.messenger.actions().contains(&ChatAction::UploadVideo));
    }

    #[tokio::test]
    async fn rename_directive_is_not_carried_to_the_sent_file() {
        let h = harness(Mode::User, "", FakeTransport::new());
        let file = IncomingMessage {
            caption: Some("rename: draft.txt\nmeeting notes".to_string()),
            ..file_message(1, 100)
        };
        let msg = rename_reply("/rename final.txt", OWNER, file);

        let outcome = h.service.handle(msg).await;
        assert!(matches!(outcome, Outcome::Completed { .. }));
        let captions: Vec<Option<String>> = h
            .transport
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Upload { caption, .. } => Some(caption),
                _ => None,
            })
            .collect();
        assert_eq!(captions, vec![Some("meeting notes".to_string())]);

        // In user mode the sent file comes back as an update.
        let echo = IncomingMessage {
            caption: captions[0].clone(),
            media: Some(source(FileKind::Document, 100, MessageId(1000))),
            ..message(1000, OWNER)
        };
        assert_eq!(h.service.handle(echo).await, Outcome::Ignored);
    }

    #[tokio::test]
    async fn stacked_caption_directives_leave_no_directive_behind() {
        let h = harness(Mode::User, "", FakeTransport::new());
        let msg = IncomingMessage {
            caption: Some("rename: a.pdf\nrename: b.pdf".to_string()),
            media: Some(source(FileKind::Document, 64, MessageId(5))),
            ..message(5, OWNER)
        };

        let outcome = h.service.handle(msg).await;
        assert!(matches!(outcome, Outcome::Completed { ref file_name, .. } if file_name == "a.pdf"));
        assert!(h.transport.calls().iter().all(|c| match c {
            TransportCall::Upload { caption, .. } => caption.is_none(),
            _ => true,
        }));
    }

    #[tokio::test]
    async fn bot_mode_oversized_file_fails_before_transfer() {
        let h = harness(Mode::Bot, "", FakeTransport::new());
        let msg = rename_reply("/rename big.iso", OWNER, file_message(1, 3 * GIB));

        let outcome = h.service.handle(msg).await;
        assert!(matches!(outcome, Outcome::Failed(ref s) if s.contains("too large")));
        assert!(h.transport.calls().is_empty());

        let last = h.messenger.edit_texts().pop().unwrap();
        assert!(last.starts_with("Failed to rename/send file: file is too large"));
        // No workspace was created.
        assert_eq!(std::fs::read_dir(h.temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unauthorized_sender_is_rejected_without_transfer() {
        let h = harness(Mode::Bot, "7", FakeTransport::new());
        let msg = rename_reply("/rename x.txt", UserId(99), file_message(1, 10));

        let outcome = h.service.handle(msg).await;
        assert_eq!(outcome, Outcome::Denied(AccessDecision::DeniedUser));
        assert!(h.transport.calls().is_empty());
        assert_eq!(
            h.messenger.sent_texts(),
            vec!["You are not authorized to use this bot."]
        );
    }

    #[tokio::test]
    async fn bot_mode_downloads_and_reuploads_with_progress() {
        let h = harness(Mode::Bot, "", FakeTransport::new());
        let msg = rename_reply("/rename report.pdf --thumb", OWNER, file_message(1, 3000));

        let outcome = h.service.handle(msg).await;
        assert!(matches!(
            outcome,
            Outcome::Completed {
                transport: TransportKind::DownloadReupload,
                ..
            }
        ));
        assert_eq!(
            h.transport.calls(),
            vec![
                TransportCall::Download {
                    file_id: "file-1".to_string()
                },
                TransportCall::Download {
                    file_id: "thumb-1".to_string()
                },
                TransportCall::Upload {
                    file_name: "report.pdf".to_string(),
                    presentation: Presentation::Document,
                    with_thumb: true,
                    bytes: 3000,
                    caption: Some("holiday".to_string()),
                },
            ]
        );

        let edits = h.messenger.edit_texts();
        assert!(edits.iter().any(|e| e.starts_with("Downloading...\n100.0%")));
        assert!(edits.iter().any(|e| e.starts_with("Uploading...\n100.0%")));
        assert_eq!(
            edits.last().map(String::as_str),
            Some("Sent renamed file: <code>report.pdf</code>")
        );
        assert!(h.messenger.actions().contains(&ChatAction::UploadDocument));
        // Workspace cleaned up.
        assert_eq!(std::fs::read_dir(h.temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn server_copy_failure_falls_back_to_reupload() {
        let h = harness(
            Mode::User,
            "",
            FakeTransport {
                server_copy_supported: true,
                server_copy_fails: true,
                ..FakeTransport::new()
            },
        );
        let msg = rename_reply("/rename clip.mp4", OWNER, file_message(1, 100));

        let outcome = h.service.handle(msg).await;
        assert!(matches!(
            outcome,
            Outcome::Completed {
                transport: TransportKind::DownloadReupload,
                ..
            }
        ));
        let calls = h.transport.calls();
        assert!(matches!(calls[0], TransportCall::ServerCopy { .. }));
        assert!(matches!(calls[1], TransportCall::Download { .. }));
        assert!(matches!(calls[2], TransportCall::Upload { .. }));
    }

    #[tokio::test]
    async fn rejected_video_is_resent_as_document() {
        let h = harness(
            Mode::Bot,
            "",
            FakeTransport {
                reject_video: true,
                ..FakeTransport::new()
            },
        );
        let msg = rename_reply("/rename clip.mp4 --as-video", OWNER, file_message(1, 100));

        let outcome = h.service.handle(msg).await;
        assert_eq!(
            outcome,
            Outcome::Completed {
                file_name: "clip.mp4".to_string(),
                transport: TransportKind::DownloadReupload,
                sent_as_document: true,
            }
        );
        let uploads: Vec<Presentation> = h
            .transport
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Upload { presentation, .. } => Some(presentation),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![Presentation::Video, Presentation::Document]);
        assert!(h
            .messenger
            .sent_texts()
            .last()
            .unwrap()
            .contains("sent as a document"));
    }

    #[tokio::test]
    async fn download_failure_is_reported_and_cleaned_up() {
        let h = harness(
            Mode::Bot,
            "",
            FakeTransport {
                download_fails: true,
                ..FakeTransport::new()
            },
        );
        let msg = rename_reply("/rename a.txt", OWNER, file_message(1, 100));

        let outcome = h.service.handle(msg).await;
        assert!(matches!(outcome, Outcome::Failed(ref s) if s.contains("connection reset")));
        assert_eq!(
            h.messenger.edit_texts().last().map(String::as_str),
            Some("Failed to rename/send file: network error: connection reset")
        );
        assert_eq!(std::fs::read_dir(h.temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn caption_directive_renames_and_keeps_remaining_caption() {
        let h = harness(Mode::Bot, "", FakeTransport::new());
        let msg = IncomingMessage {
            caption: Some("rename: notes.pdf\nWeek 12".to_string()),
            media: Some(source(FileKind::Document, 64, MessageId(5))),
            ..message(5, OWNER)
        };

        let outcome = h.service.handle(msg).await;
        assert!(matches!(outcome, Outcome::Completed { ref file_name, .. } if file_name == "notes.pdf"));
        // Status replies to the file message itself.
        assert_eq!(h.messenger.sends()[0].reply_to, Some(MessageId(5)));
    }

    #[tokio::test]
    async fn caption_job_carries_remaining_text() {
        let spec = parse_caption("rename: notes.pdf\nWeek 12").unwrap();
        let req = RenameRequest {
            caption: spec.remaining_caption.clone(),
            spec,
            source: source(FileKind::Document, 1, MessageId(5)),
            anchor: MessageId(5),
            requester: MessageRef {
                chat_id: CHAT,
                message_id: MessageId(5),
            },
        };
        let job = req.job();
        assert_eq!(job.caption.as_deref(), Some("Week 12"));
        assert_eq!(job.presentation, Presentation::Document);
        assert_eq!(job.reply_to, Some(MessageId(5)));
    }

    #[tokio::test]
    async fn usage_hints_for_bad_requests() {
        let h = harness(Mode::Bot, "", FakeTransport::new());

        let no_reply = IncomingMessage {
            text: Some("/rename a.txt".to_string()),
            ..message(3, OWNER)
        };
        assert_eq!(h.service.handle(no_reply).await, Outcome::Usage);

        let no_media = rename_reply("/rename a.txt", OWNER, message(1, OWNER));
        assert_eq!(h.service.handle(no_media).await, Outcome::Usage);

        let bad_name = rename_reply("/rename noext", OWNER, file_message(1, 10));
        assert_eq!(h.service.handle(bad_name).await, Outcome::Usage);

        let texts = h.messenger.sent_texts();
        assert!(texts[0].starts_with("Please reply to the file you want to rename"));
        assert_eq!(texts[1], "The replied message does not contain a file/media.");
        assert!(texts[2].starts_with("file name must have an extension"));
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn ignores_edits_unrelated_text_and_other_bots() {
        let mut h = harness(Mode::Bot, "", FakeTransport::new());
        h.service.bot_username = Some("rename_bot".to_string());

        let edited = IncomingMessage {
            edited: true,
            ..rename_reply("/rename a.txt", OWNER, file_message(1, 10))
        };
        assert_eq!(h.service.handle(edited).await, Outcome::Ignored);

        let chatter = IncomingMessage {
            text: Some("hello".to_string()),
            ..message(4, OWNER)
        };
        assert_eq!(h.service.handle(chatter).await, Outcome::Ignored);

        let other_bot = rename_reply("/rename@other_bot a.txt", OWNER, file_message(1, 10));
        assert_eq!(h.service.handle(other_bot).await, Outcome::Ignored);

        let plain_caption = IncomingMessage {
            caption: Some("just a photo".to_string()),
            ..file_message(6, 10)
        };
        assert_eq!(h.service.handle(plain_caption).await, Outcome::Ignored);

        assert!(h.messenger.sends().is_empty());
    }

    #[tokio::test]
    async fn start_shows_help_in_private_chats() {
        let h = harness(Mode::Bot, "", FakeTransport::new());
        let start = IncomingMessage {
            text: Some("/start".to_string()),
            ..message(1, OWNER)
        };
        assert_eq!(h.service.handle(start).await, Outcome::Help);
        assert_eq!(h.messenger.sent_texts(), vec![HELP_TEXT]);
    }

    #[tokio::test]
    async fn shutdown_requires_owner() {
        let h = harness(Mode::Bot, "7", FakeTransport::new());

        let stranger = IncomingMessage {
            text: Some("/shutdown".to_string()),
            ..message(1, UserId(8))
        };
        assert_eq!(
            h.service.handle(stranger).await,
            Outcome::Denied(AccessDecision::DeniedUser)
        );
        assert!(!h.shutdown.is_cancelled());

        let owner = IncomingMessage {
            text: Some("/shutdown".to_string()),
            ..message(2, OWNER)
        };
        assert_eq!(h.service.handle(owner).await, Outcome::Shutdown);
        assert!(h.shutdown.is_cancelled());
        assert_eq!(h.messenger.sent_texts().last().unwrap(), "Shutting down...");
    }

    #[tokio::test]
    async fn group_not_in_allow_list_is_denied() {
        let temp = tempfile::tempdir().unwrap();
        let mut cfg = config(Mode::Bot, "", temp.path());
        cfg.allow_group_ids = vec![-100];
        let messenger = Arc::new(FakeMessenger::new());
        let transport = Arc::new(FakeTransport::new());
        let service = RenameService::new(
            Arc::new(cfg),
            messenger.clone(),
            transport.clone(),
            CancellationToken::new(),
        );

        let msg = IncomingMessage {
            chat_id: ChatId(-200),
            chat_kind: ChatKind::Supergroup,
            ..rename_reply("/rename a.txt", OWNER, file_message(1, 10))
        };
        assert_eq!(
            service.handle(msg).await,
            Outcome::Denied(AccessDecision::DeniedGroup)
        );
        assert!(transport.calls().is_empty());
    }
}
