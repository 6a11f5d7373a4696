//! Transfer progress tracking and debounced status edits.
//!
//! Transports report `(done, total)` through a [`ProgressSink`]. The reporter
//! renders a progress line at most once per interval and hands it to a single
//! editor task through a `watch` channel, so only the newest line is ever
//! written and edits never pile up behind a slow API.

use std::{
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::watch,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    domain::MessageRef,
    formatting::{escape_html, human_bytes},
    messaging::port::MessagingPort,
    ports::ProgressSink,
};

/// Byte counters of one transfer.
#[derive(Clone, Debug)]
pub struct TransferProgress {
    done: u64,
    total: u64,
    percent: f64,
    started_at: Instant,
}

impl TransferProgress {
    pub fn new(started_at: Instant) -> Self {
        Self {
            done: 0,
            total: 0,
            percent: 0.0,
            started_at,
        }
    }

    /// Record a report. Counters and percent never move backwards and `done`
    /// never exceeds a known total.
    pub fn update(&mut self, done: u64, total: u64) {
        self.total = self.total.max(total);
        let done = if self.total > 0 {
            done.min(self.total)
        } else {
            done
        };
        self.done = self.done.max(done);
        if self.total > 0 {
            let pct = self.done as f64 * 100.0 / self.total as f64;
            self.percent = self.percent.max(pct);
        }
    }

    /// Mark the transfer complete: exactly 100%.
    pub fn complete(&mut self) {
        if self.total == 0 {
            self.total = self.done;
        }
        self.done = self.total;
        self.percent = 100.0;
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Average bytes per second since the start.
    pub fn throughput(&self, now: Instant) -> f64 {
        let elapsed = now
            .saturating_duration_since(self.started_at)
            .as_secs_f64()
            .max(1e-6);
        self.done as f64 / elapsed
    }

    /// Whole seconds left at the current throughput; 0 when unknown.
    pub fn eta_secs(&self, now: Instant) -> u64 {
        let speed = self.throughput(now);
        if speed <= 0.0 {
            return 0;
        }
        (self.total.saturating_sub(self.done) as f64 / speed) as u64
    }

    /// Plain-text status line, e.g.
    ///
    /// ```text
    /// Downloading...
    /// 42.0% — 1.00MB/2.38MB
    /// Speed: 512.00KB/s — ETA: 2s
    /// ```
    pub fn render(&self, phase: &str, now: Instant) -> String {
        format!(
            "{phase}\n{:.1}% — {}/{}\nSpeed: {}/s — ETA: {}s",
            self.percent,
            human_bytes(self.done as f64),
            human_bytes(self.total as f64),
            human_bytes(self.throughput(now)),
            self.eta_secs(now),
        )
    }
}

/// Debounce policy over a [`TransferProgress`].
#[derive(Debug)]
pub struct ProgressState {
    phase: String,
    interval: Duration,
    progress: TransferProgress,
    last_publish: Instant,
}

impl ProgressState {
    /// The phase header is assumed to be on screen at `started_at`, so the
    /// first line is due one interval later.
    pub fn new(phase: impl Into<String>, interval: Duration, started_at: Instant) -> Self {
        Self {
            phase: phase.into(),
            interval,
            progress: TransferProgress::new(started_at),
            last_publish: started_at,
        }
    }

    /// Record a report and return a line if one is due.
    pub fn offer(&mut self, done: u64, total: u64, now: Instant) -> Option<String> {
        self.progress.update(done, total);
        if now.saturating_duration_since(self.last_publish) < self.interval {
            return None;
        }
        self.last_publish = now;
        Some(self.progress.render(&self.phase, now))
    }

    /// The 100% line, regardless of timing.
    pub fn final_line(&mut self, now: Instant) -> String {
        self.progress.complete();
        self.last_publish = now;
        self.progress.render(&self.phase, now)
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }
}

struct Shared {
    state: Mutex<ProgressState>,
    // None once finished or abandoned; late reports are dropped.
    tx: Mutex<Option<watch::Sender<Option<String>>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, line: String) {
        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(tx) = tx.as_ref() {
            tx.send_replace(Some(line));
        }
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    fn report_at(&self, done: u64, total: u64, now: Instant) {
        let line = self.state().offer(done, total, now);
        if let Some(line) = line {
            self.publish(line);
        }
    }
}

impl ProgressSink for Shared {
    fn report(&self, done: u64, total: u64) {
        self.report_at(done, total, Instant::now());
    }
}

/// Drives one status message for the duration of one transfer phase.
pub struct ProgressReporter {
    shared: Arc<Shared>,
    editor: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Spawn the editor task. Must be called inside a tokio runtime.
    pub fn start(
        messenger: Arc<dyn MessagingPort>,
        status: MessageRef,
        phase: &str,
        interval: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(None);
        let shared = Arc::new(Shared {
            state: Mutex::new(ProgressState::new(phase, interval, Instant::now())),
            tx: Mutex::new(Some(tx)),
        });
        let editor = tokio::spawn(run_editor(messenger, status, rx));
        Self {
            shared,
            editor: Some(editor),
        }
    }

    /// Handle for the transport.
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        self.shared.clone()
    }

    /// Publish the 100% line and wait until the editor has written it.
    pub async fn finish(mut self) {
        let line = self.shared.state().final_line(Instant::now());
        self.shared.publish(line);
        self.shared.close();
        self.join().await;
    }

    /// Stop without a final line. Pending edits are flushed first so a later
    /// failure text is not overwritten.
    pub async fn abandon(mut self) {
        self.shared.close();
        self.join().await;
    }

    async fn join(&mut self) {
        if let Some(editor) = self.editor.take() {
            if let Err(e) = editor.await {
                warn!(error = %e, "progress editor task failed");
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Ends the editor if the request was cancelled mid-transfer.
        self.shared.close();
    }
}

async fn run_editor(
    messenger: Arc<dyn MessagingPort>,
    status: MessageRef,
    mut rx: watch::Receiver<Option<String>>,
) {
    let mut last_sent: Option<String> = None;
    // A value sent right before the sender is dropped is still delivered.
    while rx.changed().await.is_ok() {
        let Some(line) = rx.borrow_and_update().clone() else {
            continue;
        };
        if last_sent.as_deref() == Some(line.as_str()) {
            continue;
        }
        match messenger.edit_html(status, &escape_html(&line)).await {
            Ok(()) => debug!(message_id = status.message_id.0, "progress edited"),
            Err(e) => warn!(error = %e, "progress edit failed; transfer continues"),
        }
        last_sent = Some(line);
    }
}

/// `AsyncRead` wrapper that reports bytes read to a progress sink.
pub struct ProgressReader<R> {
    inner: R,
    done: u64,
    total: u64,
    sink: Arc<dyn ProgressSink>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, total: u64, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            inner,
            done: 0,
            total,
            sink,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                self.done += read as u64;
                let (done, total) = (self.done, self.total);
                self.sink.report(done, total);
            }
        }
        poll
    }
}
