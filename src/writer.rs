//! Dedicated writer task for outbound frame sending.
//!
//! Every connection gets one writer task fed through an mpsc channel, so
//! the dispatcher and any number of in-flight sends share the socket
//! without lock contention.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ──┐
//! File stream ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! ```
//!
//! # Flush confirmation
//!
//! A frame may carry a one-shot `flushed` sender. The writer fires it
//! only after the batch containing the frame has been fully written and
//! flushed to the socket, which is what lets the dispatcher sequence
//! "response fully sent" before releasing the execution slot or closing
//! the connection.
//!
//! # Backpressure
//!
//! A pending-frame counter caps how many frames may sit between the
//! producers and the socket; senders wait (bounded by a timeout) for the
//! writer to drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::{Header, HEADER_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames to batch between flushes.
const MAX_BATCH_SIZE: usize = 64;

/// Interval between backpressure checks.
const CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (6 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (can be empty for stream-end frames).
    pub payload: Bytes,
    /// Fired after this frame has been written and flushed.
    pub flushed: Option<oneshot::Sender<()>>,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    #[inline]
    pub fn new(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
            flushed: None,
        }
    }

    /// Create a frame that confirms its own flush through `flushed`.
    #[inline]
    pub fn with_ack(header: &Header, payload: Bytes, flushed: oneshot::Sender<()>) -> Self {
        Self {
            header: header.encode(),
            payload,
            flushed: Some(flushed),
        }
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; shared by the dispatcher and file streams.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Send a frame to the writer task.
    ///
    /// Waits if backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        // Increment pending count BEFORE sending
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            Error::ConnectionClosed
        })
    }

    /// Wait for backpressure to clear with timeout.
    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(Error::BackpressureTimeout);
            }

            tokio::time::sleep(CHECK_INTERVAL).await;
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
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task runs until every [`WriterHandle`] clone is dropped or a
/// write fails; either way it drops the socket write half, which is what
/// finally closes the connection from our side.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Main writer loop - receives frames and writes them to the socket.
///
/// Batches ready frames between flushes; flush confirmations fire after
/// the flush of the batch they belong to.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        // Wait for first frame
        let first = match rx.recv().await {
            Some(frame) => frame,
            None => {
                // All handles dropped, clean shutdown
                let _ = writer.shutdown().await;
                return Ok(());
            }
        };

        // Collect additional ready frames (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let write_result = write_batch(&mut writer, &mut batch).await;

        pending.fetch_sub(batch_size, Ordering::Release);

        match write_result {
            Ok(()) => {
                for frame in &mut batch {
                    if let Some(flushed) = frame.flushed.take() {
                        let _ = flushed.send(());
                    }
                }
            }
            Err(err) => {
                // Dropping the un-fired flush senders tells every waiter
                // the transport is gone.
                return Err(err);
            }
        }
    }
}

/// Write a batch of frames and flush once at the end.
async fn write_batch<W>(writer: &mut W, batch: &mut [OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for frame in batch.iter() {
        writer.write_all(&frame.header).await?;
        if !frame.payload.is_empty() {
            writer.write_all(&frame.payload).await?;
        }
    }

    writer.flush().await?;
    Ok(())
}
