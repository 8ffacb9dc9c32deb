//! Dedicated writer task for a session's outbound frames.
//!
//! All senders of a channel share one [`WriterHandle`]; frames go through an
//! mpsc queue to a single task that owns the write half. This keeps frames
//! ordered and lets several queued frames go out in one vectored write.
//!
//! # Architecture
//!
//! ```text
//! send() 1 ─┐
//! send() 2 ─┼─► mpsc::Sender<WriterCommand> ─► Writer Task ─► Socket
//! close()  ─┘          (Frame / Shutdown)
//! ```
//!
//! Every frame carries an optional ack that resolves after the batch holding
//! it has been flushed. A `Shutdown` command is processed in order, so every
//! frame queued before it is written before the write half is shut down.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{DEFAULT_MAX_PENDING_FRAMES, DEFAULT_WRITER_QUEUE_CAPACITY};
use crate::error::{ChannelError, Result};
use crate::protocol::{Frame, HEADER_SIZE};

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

type Ack = oneshot::Sender<Result<()>>;

/// A frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (10 bytes).
    pub header: [u8; HEADER_SIZE],
    pub head: Bytes,
    pub body: Bytes,
    ack: Option<Ack>,
}

impl OutboundFrame {
    /// Create an outbound frame from a decoded frame.
    #[inline]
    pub fn new(frame: Frame) -> Self {
        Self {
            header: frame.header.encode(),
            head: frame.head,
            body: frame.body,
            ack: None,
        }
    }

    /// Total size of this frame (header + head + body).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.head.len() + self.body.len()
    }

    fn parts(&self) -> [&[u8]; 3] {
        [&self.header, &self.head, &self.body]
    }

    fn acknowledge(self, result: Result<()>) {
        if let Some(ack) = self.ack {
            let _ = ack.send(result);
        }
    }
}

enum WriterCommand {
    Frame(OutboundFrame),
    Shutdown(Ack),
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before senders wait.
    pub max_pending_frames: usize,
    /// Capacity of the command queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_WRITER_QUEUE_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
    /// Frames queued but not yet written.
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    /// Signalled whenever the writer finishes a batch.
    drained: Arc<Notify>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been flushed.
    ///
    /// Waits for backpressure to clear first. Both waits are bounded by
    /// `deadline`; on expiry the error is `Timeout` and the frame may still be
    /// written later.
    pub async fn send(&self, frame: Frame, deadline: Instant) -> Result<()> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (ack_tx, ack_rx) = oneshot::channel();
        let mut outbound = OutboundFrame::new(frame);
        outbound.ack = Some(ack_tx);

        let queued = async {
            self.wait_for_backpressure().await;
            self.enqueue(outbound).await?;
            ack_rx.await.map_err(|_| ChannelError::ChannelClosed)?
        };

        tokio::time::timeout_at(deadline, queued)
            .await
            .map_err(|_| ChannelError::timeout("send", timeout))?
    }

    /// Queue a frame without waiting for it to be written.
    pub async fn send_detached(&self, frame: Frame) -> Result<()> {
        self.wait_for_backpressure().await;
        self.enqueue(OutboundFrame::new(frame)).await
    }

    async fn enqueue(&self, frame: OutboundFrame) -> Result<()> {
        // Count before sending so the writer never decrements below zero.
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| {
                self.pending.fetch_sub(1, Ordering::Release);
                ChannelError::ChannelClosed
            })
    }

    async fn wait_for_backpressure(&self) {
        loop {
            let drained = self.drained.notified();
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return;
            }
            tracing::trace!(
                pending = self.pending_count(),
                "writer backpressure, waiting for drain"
            );
            drained.await;
        }
    }

    /// Flush everything queued so far, then shut down the write half.
    ///
    /// Idempotent: once the writer has stopped this returns `Ok(())`.
    pub async fn shutdown(&self, deadline: Instant) -> Result<()> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (done_tx, done_rx) = oneshot::channel();

        if self.tx.send(WriterCommand::Shutdown(done_tx)).await.is_err() {
            return Ok(());
        }

        match tokio::time::timeout_at(deadline, done_rx).await {
            Ok(Ok(result)) => result,
            // Writer exited without answering: it already stopped.
            Ok(Err(_)) => Ok(()),
            Err(_) => Err(ChannelError::timeout("close", timeout)),
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends after a `Shutdown` command, when every handle is dropped, or
/// on the first write error (which is also delivered to every ack in the
/// failed batch).
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));
    let drained = Arc::new(Notify::new());

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
        max_pending: config.max_pending_frames,
        drained: drained.clone(),
    };

    let task = tokio::spawn(writer_loop(rx, writer, pending, drained));

    (handle, task)
}

/// Main writer loop - receives commands and writes frames in batches.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<WriterCommand>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        let mut shutdown = None;

        match rx.recv().await {
            Some(WriterCommand::Frame(frame)) => batch.push(frame),
            Some(WriterCommand::Shutdown(done)) => shutdown = Some(done),
            None => {
                // Every handle dropped.
                let _ = writer.shutdown().await;
                return Ok(());
            }
        }

        // Collect additional ready frames, stopping at a shutdown request.
        while shutdown.is_none() && batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriterCommand::Frame(frame)) => batch.push(frame),
                Ok(WriterCommand::Shutdown(done)) => shutdown = Some(done),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let written = write_batch(&mut writer, &batch).await;
        pending.fetch_sub(batch_size, Ordering::Release);
        drained.notify_waiters();

        if let Err(e) = written {
            tracing::error!(frames = batch_size, "Write failed: {}", e);
            for frame in batch {
                frame.acknowledge(Err(e.clone()));
            }
            if let Some(done) = shutdown {
                let _ = done.send(Err(e.clone()));
            }
            reject_queued(&mut rx, &pending, &drained, &e);
            return Err(e);
        }

        for frame in batch {
            frame.acknowledge(Ok(()));
        }

        if let Some(done) = shutdown {
            let result = writer.shutdown().await.map_err(ChannelError::from);
            tracing::debug!("Writer shut down");
            let _ = done.send(result.clone());
            reject_queued(&mut rx, &pending, &drained, &ChannelError::ChannelClosed);
            return result;
        }
    }
}

/// Close the queue and fail everything still in it.
fn reject_queued(
    rx: &mut mpsc::Receiver<WriterCommand>,
    pending: &AtomicUsize,
    drained: &Notify,
    reason: &ChannelError,
) {
    rx.close();
    while let Ok(command) = rx.try_recv() {
        match command {
            WriterCommand::Frame(frame) => {
                pending.fetch_sub(1, Ordering::Release);
                frame.acknowledge(Err(reason.clone()));
            }
            WriterCommand::Shutdown(done) => {
                let _ = done.send(Ok(()));
            }
        }
    }
    drained.notify_waiters();
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(ChannelError::from(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut offset = 0;

    for frame in batch {
        for part in frame.parts() {
            if part.is_empty() {
                continue;
            }
            let end = offset + part.len();
            if skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
