//! MTProto file transfers.
//!
//! A user session can post stored media again by reference, but the
//! reference carries the original attributes: the file name and the
//! video/document presentation cannot change that way. Anything else goes
//! through download + reupload with MTProto's 2 GB/4 GB limits.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use grammers_client::{
    client::files::MAX_CHUNK_SIZE,
    grammers_tl_types as tl,
    types::{media::Uploaded, Attribute, Media, Message},
    InputMessage,
};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, info, warn};

use trb_core::{
    domain::{FileKind, MessageId, MessageRef, Presentation, RemoteFile},
    errors::TransferError,
    ports::{DeliveryJob, FileTransport, NoProgress, ProgressSink},
    progress::ProgressReader,
    rename::THUMB_FILE_NAME,
    Result,
};

use crate::{
    map_transfer_err,
    media::{best_thumb_type, raw_document, FileLocator},
    peers::PeerResolver,
    with_flood_retry,
};

/// `upload.getFile` limit; thumbnails are far smaller.
const THUMB_REQUEST_LIMIT: i32 = 1024 * 1024;

/// Whether re-posting the stored media yields the requested result.
pub fn can_copy_by_reference(job: &DeliveryJob) -> bool {
    let same_name = job.source.file_name.as_deref() == Some(job.file_name.as_str());
    let same_presentation = match job.presentation {
        Presentation::Video => job.source.kind == FileKind::Video,
        Presentation::Document => {
            matches!(job.source.kind, FileKind::Document | FileKind::Audio)
        }
    };
    same_name && same_presentation
}

/// Stream metadata carried over to a reupload sent as video.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VideoMeta {
    pub duration: Duration,
    pub w: i32,
    pub h: i32,
}

impl VideoMeta {
    pub fn from_attributes(attrs: &[tl::enums::DocumentAttribute]) -> Self {
        attrs
            .iter()
            .find_map(|a| match a {
                tl::enums::DocumentAttribute::Video(v) => Some(Self {
                    duration: Duration::try_from_secs_f64(v.duration).unwrap_or_default(),
                    w: v.w,
                    h: v.h,
                }),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn attribute(self) -> Attribute {
        Attribute::Video {
            round_message: false,
            supports_streaming: true,
            duration: self.duration,
            w: self.w,
            h: self.h,
        }
    }
}

/// Without a `video/*` type Telegram shows the upload as a plain file.
pub fn video_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "3gp" => "video/3gpp",
        _ => "video/mp4",
    }
}

#[derive(Clone)]
pub struct MtprotoTransport {
    peers: Arc<PeerResolver>,
}

impl MtprotoTransport {
    pub fn new(peers: Arc<PeerResolver>) -> Self {
        Self { peers }
    }

    async fn fetch_message(&self, origin: MessageRef) -> Result<Message> {
        let peer = self.peers.resolve(origin.chat_id).await?;
        let ids = [origin.message_id.0];
        let mut msgs = with_flood_retry(|| self.peers.client().get_messages_by_id(&peer, &ids))
        .await
        .map_err(map_transfer_err)?;
        Ok(msgs.pop().flatten().ok_or(TransferError::MissingMedia)?)
    }

    async fn download_thumb(
        &self,
        media: &Media,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<u64> {
        let doc = raw_document(media).ok_or(TransferError::MissingMedia)?;
        let thumb_size = doc
            .thumbs
            .as_deref()
            .and_then(best_thumb_type)
            .ok_or(TransferError::MissingMedia)?;

        let request = tl::functions::upload::GetFile {
            precise: false,
            cdn_supported: false,
            location: tl::enums::InputFileLocation::InputDocumentFileLocation(
                tl::types::InputDocumentFileLocation {
                    id: doc.id,
                    access_hash: doc.access_hash,
                    file_reference: doc.file_reference.clone(),
                    thumb_size,
                },
            ),
            offset: 0,
            limit: THUMB_REQUEST_LIMIT,
        };
        let bytes = match self
            .peers
            .client()
            .invoke(&request)
            .await
            .map_err(map_transfer_err)?
        {
            tl::enums::upload::File::File(f) => f.bytes,
            tl::enums::upload::File::CdnRedirect(_) => {
                return Err(TransferError::Rejected("thumbnail is served from a CDN".into()).into())
            }
        };

        tokio::fs::write(dest, &bytes).await?;
        let len = bytes.len() as u64;
        progress.report(len, len);
        Ok(len)
    }

    /// Best-effort: a video without dimensions still plays.
    async fn source_video_meta(&self, origin: MessageRef) -> VideoMeta {
        let media = match self.fetch_message(origin).await {
            Ok(msg) => msg.media(),
            Err(e) => {
                warn!("could not read source video attributes: {e}");
                None
            }
        };
        media
            .as_ref()
            .and_then(raw_document)
            .map(|doc| VideoMeta::from_attributes(&doc.attributes))
            .unwrap_or_default()
    }

    async fn upload_file(
        &self,
        path: &Path,
        name: String,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(Uploaded, u64)> {
        let total = tokio::fs::metadata(path).await?.len();
        let size = usize::try_from(total).map_err(|_| TransferError::TooLarge {
            size: total,
            limit: usize::MAX as u64,
        })?;
        let mut reader = ProgressReader::new(File::open(path).await?, total, progress);
        let uploaded = self
            .peers
            .client()
            .upload_stream(&mut reader, size, name)
            .await
            .map_err(|e| TransferError::Network(e.to_string()))?;
        Ok((uploaded, total))
    }
}

#[async_trait]
impl FileTransport for MtprotoTransport {
    fn supports_server_copy(&self, job: &DeliveryJob) -> bool {
        can_copy_by_reference(job)
    }

    async fn server_copy(&self, job: &DeliveryJob) -> Result<MessageRef> {
        let source = self.fetch_message(job.source.origin).await?;
        let media = source.media().ok_or(TransferError::MissingMedia)?;
        let dest = self.peers.resolve(job.chat_id).await?;
        let caption = job.caption.clone().unwrap_or_default();

        let sent = with_flood_retry(|| {
            self.peers.client().send_message(
                &dest,
                InputMessage::new()
                    .text(caption.as_str())
                    .copy_media(&media)
                    .reply_to(job.reply_to.map(|m| m.0)),
            )
        })
        .await
        .map_err(map_transfer_err)?;

        info!(message_id = sent.id(), "media re-posted by reference");
        Ok(MessageRef {
            chat_id: job.chat_id,
            message_id: MessageId(sent.id()),
        })
    }

    async fn download(
        &self,
        file: &RemoteFile,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<u64> {
        let locator: FileLocator = file.id.parse()?;
        let origin = MessageRef {
            chat_id: locator.chat_id,
            message_id: locator.message_id,
        };
        let msg = self.fetch_message(origin).await?;
        let media = msg.media().ok_or(TransferError::MissingMedia)?;
        if locator.thumb {
            return self.download_thumb(&media, dest, progress).await;
        }

        let total = match raw_document(&media) {
            Some(doc) => u64::try_from(doc.size).unwrap_or(file.size),
            None => file.size,
        };
        let mut dst = File::create(dest).await?;
        let mut download = self
            .peers
            .client()
            .iter_download(&media)
            .chunk_size(MAX_CHUNK_SIZE);
        let mut done = 0u64;
        while let Some(chunk) = download.next().await.map_err(map_transfer_err)? {
            dst.write_all(&chunk).await?;
            done += chunk.len() as u64;
            progress.report(done, total);
        }
        dst.flush().await?;
        debug!(bytes = done, "download finished");
        Ok(done)
    }

    async fn upload(
        &self,
        job: &DeliveryJob,
        path: &Path,
        thumb: Option<&Path>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MessageRef> {
        let (uploaded, total) = self
            .upload_file(path, job.file_name.clone(), progress)
            .await?;

        let thumb = match thumb {
            Some(t) => match self
                .upload_file(t, THUMB_FILE_NAME.to_string(), Arc::new(NoProgress))
                .await
            {
                Ok((u, _)) => Some(u),
                Err(e) => {
                    warn!("thumbnail upload failed, sending without it: {e}");
                    None
                }
            },
            None => None,
        };

        let mut message = InputMessage::new().text(job.caption.clone().unwrap_or_default());
        // The mime type is read when the media is attached, so it goes first.
        message = match job.presentation {
            Presentation::Video => {
                let meta = self.source_video_meta(job.source.origin).await;
                message
                    .mime_type(video_mime(&job.file_name))
                    .document(uploaded)
                    .attribute(meta.attribute())
            }
            Presentation::Document => message.file(uploaded),
        };
        if let Some(t) = thumb {
            message = message.thumbnail(t);
        }
        message = message.reply_to(job.reply_to.map(|m| m.0));

        let dest = self.peers.resolve(job.chat_id).await?;
        let sent = self
            .peers
            .client()
            .send_message(&dest, message)
            .await
            .map_err(map_transfer_err)?;

        info!(bytes = total, presentation = ?job.presentation, "upload finished");
        Ok(MessageRef {
            chat_id: job.chat_id,
            message_id: MessageId(sent.id()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trb_core::domain::{ChatId, SourceFile};

    fn job(
        kind: FileKind,
        stored: Option<&str>,
        target: &str,
        presentation: Presentation,
    ) -> DeliveryJob {
        let origin = MessageRef {
            chat_id: ChatId(5),
            message_id: MessageId(10),
        };
        DeliveryJob {
            chat_id: ChatId(5),
            reply_to: Some(MessageId(11)),
            file_name: target.to_string(),
            caption: None,
            presentation,
            keep_thumb: false,
            source: SourceFile {
                kind,
                file: RemoteFile {
                    id: FileLocator::media(origin).to_string(),
                    size: 500 * 1024 * 1024,
                },
                file_name: stored.map(str::to_string),
                mime_type: None,
                thumbnail: None,
                origin,
            },
        }
    }

    #[test]
    fn unchanged_document_is_copied() {
        assert!(can_copy_by_reference(&job(
            FileKind::Document,
            Some("movie.mkv"),
            "movie.mkv",
            Presentation::Document
        )));
        assert!(can_copy_by_reference(&job(
            FileKind::Video,
            Some("clip.mp4"),
            "clip.mp4",
            Presentation::Video
        )));
    }

    #[test]
    fn new_name_needs_reupload() {
        assert!(!can_copy_by_reference(&job(
            FileKind::Document,
            Some("old.mkv"),
            "movie.mkv",
            Presentation::Document
        )));
        assert!(!can_copy_by_reference(&job(
            FileKind::Photo,
            None,
            "pic.jpg",
            Presentation::Document
        )));
    }

    #[test]
    fn presentation_change_needs_reupload() {
        assert!(!can_copy_by_reference(&job(
            FileKind::Document,
            Some("movie.mkv"),
            "movie.mkv",
            Presentation::Video
        )));
        assert!(!can_copy_by_reference(&job(
            FileKind::Video,
            Some("clip.mp4"),
            "clip.mp4",
            Presentation::Document
        )));
    }

    #[test]
    fn video_upload_keeps_source_dimensions() {
        let attrs = vec![
            tl::types::DocumentAttributeFilename {
                file_name: "old.mkv".into(),
            }
            .into(),
            tl::types::DocumentAttributeVideo {
                round_message: false,
                supports_streaming: false,
                nosound: false,
                duration: 12.5,
                w: 1280,
                h: 720,
                preload_prefix_size: None,
                video_start_ts: None,
                video_codec: None,
            }
            .into(),
        ];
        let meta = VideoMeta::from_attributes(&attrs);
        assert_eq!(meta.duration, Duration::from_millis(12_500));
        assert_eq!((meta.w, meta.h), (1280, 720));

        let tl::enums::DocumentAttribute::Video(video) = meta.attribute().into() else {
            panic!("expected a video attribute");
        };
        assert!(video.supports_streaming);
        assert!(!video.round_message);
        assert_eq!((video.w, video.h), (1280, 720));
    }

    #[test]
    fn document_source_yields_empty_video_meta() {
        let attrs = vec![tl::types::DocumentAttributeFilename {
            file_name: "movie.mkv".into(),
        }
        .into()];
        assert_eq!(VideoMeta::from_attributes(&attrs), VideoMeta::default());
    }

    #[test]
    fn video_mime_follows_extension() {
        assert_eq!(video_mime("movie.mkv"), "video/x-matroska");
        assert_eq!(video_mime("CLIP.MOV"), "video/quicktime");
        assert_eq!(video_mime("talk.webm"), "video/webm");
        assert_eq!(video_mime("clip.mp4"), "video/mp4");
        assert_eq!(video_mime("noext"), "video/mp4");
    }
}
