use std::{path::Path, sync::Arc};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, Presentation, RemoteFile, SourceFile},
    Result,
};

/// Receives incremental byte counts from a running transfer.
///
/// Called from download/upload loops, so implementations must not block and
/// cannot fail.
pub trait ProgressSink: Send + Sync {
    fn report(&self, done: u64, total: u64);
}

/// Sink that drops every report.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _done: u64, _total: u64) {}
}

/// Everything a transport needs to deliver the renamed file.
#[derive(Clone, Debug)]
pub struct DeliveryJob {
    pub chat_id: ChatId,
    pub reply_to: Option<MessageId>,
    pub file_name: String,
    pub caption: Option<String>,
    pub presentation: Presentation,
    /// Attach the source thumbnail (server copy) or the downloaded one (reupload).
    pub keep_thumb: bool,
    pub source: SourceFile,
}

impl DeliveryJob {
    /// Same job, presented as a plain document.
    pub fn as_document(&self) -> Self {
        Self {
            presentation: Presentation::Document,
            ..self.clone()
        }
    }
}

/// Hexagonal port for moving file bytes (or references) around.
///
/// Implemented over the Bot API (bot mode) and MTProto (user mode).
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Whether `job` can be delivered by re-sending the stored file by
    /// reference. Must not touch the network.
    fn supports_server_copy(&self, job: &DeliveryJob) -> bool;

    async fn server_copy(&self, job: &DeliveryJob) -> Result<MessageRef>;

    /// Download `file` to `dest`. Returns the number of bytes written.
    async fn download(
        &self,
        file: &RemoteFile,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<u64>;

    async fn upload(
        &self,
        job: &DeliveryJob,
        path: &Path,
        thumb: Option<&Path>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MessageRef>;
}
