//! Bot API file transfers.
//!
//! Bots cannot re-send a stored file under a new name, so every rename goes
//! through download + reupload. Downloads stream through `download_file_stream`
//! (or a plain copy when a local Bot API server hands back an absolute path);
//! uploads wrap the file in a counting reader.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use futures_util::StreamExt;
use teloxide::{
    net::Download,
    prelude::*,
    types::{InputFile, Message},
};
use tokio::{
    fs::File,
    io::AsyncWriteExt,
    time::sleep,
};
use tracing::{debug, info};

use trb_core::{
    domain::{MessageId, MessageRef, Presentation, RemoteFile},
    errors::TransferError,
    ports::{DeliveryJob, FileTransport, ProgressSink},
    progress::ProgressReader,
    Result,
};

use crate::{map_transfer_err, tg_chat, tg_msg_id, with_retry};

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_once(
        &self,
        job: &DeliveryJob,
        path: &Path,
        thumb: Option<&Path>,
        total: u64,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<std::result::Result<Message, teloxide::RequestError>> {
        let file = File::open(path).await?;
        let input = InputFile::read(ProgressReader::new(file, total, progress))
            .file_name(job.file_name.clone());
        let chat = tg_chat(job.chat_id);

        let sent = match job.presentation {
            Presentation::Video => {
                let mut req = self.bot.send_video(chat, input).supports_streaming(true);
                if let Some(t) = thumb {
                    req = req.thumb(InputFile::file(t.to_path_buf()));
                }
                if let Some(c) = &job.caption {
                    req = req.caption(c.clone());
                }
                if let Some(r) = job.reply_to {
                    req = req
                        .reply_to_message_id(tg_msg_id(r))
                        .allow_sending_without_reply(true);
                }
                req.await
            }
            Presentation::Document => {
                let mut req = self
                    .bot
                    .send_document(chat, input)
                    .disable_content_type_detection(true);
                if let Some(t) = thumb {
                    req = req.thumb(InputFile::file(t.to_path_buf()));
                }
                if let Some(c) = &job.caption {
                    req = req.caption(c.clone());
                }
                if let Some(r) = job.reply_to {
                    req = req
                        .reply_to_message_id(tg_msg_id(r))
                        .allow_sending_without_reply(true);
                }
                req.await
            }
        };
        Ok(sent)
    }
}

#[async_trait]
impl FileTransport for TelegramTransport {
    fn supports_server_copy(&self, _job: &DeliveryJob) -> bool {
        false
    }

    async fn server_copy(&self, _job: &DeliveryJob) -> Result<MessageRef> {
        Err(TransferError::Rejected("server-side copy needs a user session".to_string()).into())
    }

    async fn download(
        &self,
        file: &RemoteFile,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<u64> {
        let tg_file = with_retry(|| self.bot.get_file(file.id.clone()))
            .await
            .map_err(map_transfer_err)?;
        let total = if file.size > 0 {
            file.size
        } else {
            u64::from(tg_file.meta.size)
        };

        // A local Bot API server (`--local`) returns a path on its own disk.
        let local = Path::new(&tg_file.path);
        if local.is_absolute() && tokio::fs::try_exists(local).await.unwrap_or(false) {
            debug!(path = %local.display(), "copying from local Bot API storage");
            let mut reader = ProgressReader::new(File::open(local).await?, total, progress);
            let mut dst = File::create(dest).await?;
            let copied = tokio::io::copy(&mut reader, &mut dst).await?;
            dst.flush().await?;
            return Ok(copied);
        }

        let mut dst = File::create(dest).await?;
        let mut stream = self.bot.download_file_stream(&tg_file.path);
        let mut done = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransferError::Network(e.to_string()))?;
            dst.write_all(&chunk).await?;
            done += chunk.len() as u64;
            progress.report(done, total);
        }
        dst.flush().await?;
        Ok(done)
    }

    async fn upload(
        &self,
        job: &DeliveryJob,
        path: &Path,
        thumb: Option<&Path>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MessageRef> {
        let total = tokio::fs::metadata(path).await?.len();

        // The body is a one-shot reader, so a RetryAfter means reopening the file.
        let mut retried = false;
        loop {
            match self
                .send_once(job, path, thumb, total, progress.clone())
                .await?
            {
                Ok(msg) => {
                    info!(bytes = total, presentation = ?job.presentation, "upload finished");
                    return Ok(MessageRef {
                        chat_id: job.chat_id,
                        message_id: MessageId(msg.id.0),
                    });
                }
                Err(teloxide::RequestError::RetryAfter(d)) if !retried => {
                    retried = true;
                    debug!(?d, "upload rate limited, retrying");
                    sleep(d).await;
                }
                Err(e) => return Err(map_transfer_err(e)),
            }
        }
    }
}
