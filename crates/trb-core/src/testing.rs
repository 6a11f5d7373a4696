//! In-memory ports for unit tests.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, Presentation, RemoteFile},
    errors::{Error, TransferError},
    messaging::{
        port::MessagingPort,
        types::ChatAction,
    },
    ports::{DeliveryJob, FileTransport, ProgressSink},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: ChatId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    actions: Mutex<Vec<ChatAction>>,
    fail_edits: AtomicBool,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Default::default()
        }
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn sends(&self) -> Vec<Sent> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sends().into_iter().map(|s| s.text).collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn edit_texts(&self) -> Vec<String> {
        self.edits().into_iter().map(|(_, t)| t).collect()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<ChatAction> {
        self.actions.lock().unwrap().clone()
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        self.sends.lock().unwrap().push(Sent {
            chat_id,
            text: html.to_string(),
            reply_to,
        });
        Ok(self.alloc(chat_id))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(Error::External("message to edit not found".to_string()));
        }
        self.edits.lock().unwrap().push((msg, html.to_string()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_chat_action(&self, _chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    ServerCopy {
        file_name: String,
        presentation: Presentation,
    },
    Download {
        file_id: String,
    },
    Upload {
        file_name: String,
        presentation: Presentation,
        with_thumb: bool,
        bytes: u64,
        caption: Option<String>,
    },
}

/// Scripted transport. Downloads write `size` zero bytes (capped) so uploads
/// can check the file exists.
#[derive(Default)]
pub struct FakeTransport {
    pub server_copy_supported: bool,
    pub server_copy_fails: bool,
    pub download_fails: bool,
    pub reject_video: bool,
    pub(crate) calls: Mutex<Vec<TransportCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

const FAKE_BODY_CAP: u64 = 4096;

#[async_trait]
impl FileTransport for FakeTransport {
    fn supports_server_copy(&self, _job: &DeliveryJob) -> bool {
        self.server_copy_supported
    }

    async fn server_copy(&self, job: &DeliveryJob) -> Result<MessageRef> {
        self.record(TransportCall::ServerCopy {
            file_name: job.file_name.clone(),
            presentation: job.presentation,
        });
        if self.server_copy_fails {
            return Err(TransferError::Rejected("FILE_REFERENCE_EXPIRED".to_string()).into());
        }
        Ok(MessageRef {
            chat_id: job.chat_id,
            message_id: MessageId(1),
        })
    }

    async fn download(
        &self,
        file: &RemoteFile,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<u64> {
        self.record(TransportCall::Download {
            file_id: file.id.clone(),
        });
        if self.download_fails {
            return Err(TransferError::Network("connection reset".to_string()).into());
        }
        let len = file.size.min(FAKE_BODY_CAP);
        progress.report(len / 2, len);
        tokio::fs::write(dest, vec![0u8; len as usize]).await?;
        progress.report(len, len);
        Ok(len)
    }

    async fn upload(
        &self,
        job: &DeliveryJob,
        path: &Path,
        thumb: Option<&Path>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MessageRef> {
        let bytes = tokio::fs::metadata(path).await?.len();
        self.record(TransportCall::Upload {
            file_name: job.file_name.clone(),
            presentation: job.presentation,
            with_thumb: thumb.is_some_and(|p| p.is_file()),
            bytes,
            caption: job.caption.clone(),
        });
        if self.reject_video && job.presentation == Presentation::Video {
            return Err(TransferError::Rejected("VIDEO_CONTENT_TYPE_INVALID".to_string()).into());
        }
        progress.report(bytes, bytes);
        Ok(MessageRef {
            chat_id: job.chat_id,
            message_id: MessageId(2),
        })
    }
}
