//! Connection multiplexer - owns one accepted socket's lifecycle.
//!
//! Each accepted connection gets:
//! - a unique `uid`,
//! - a read task: socket bytes -> [`FrameBuffer`] -> decoded jobs ->
//!   scheduler enqueue handle,
//! - a writer task (see [`crate::writer`]) reached through the cloneable
//!   [`ConnectionHandle`].
//!
//! Decode errors (unparseable payload, missing `id`, unknown action) are
//! connection-fatal: the read task stops and the connection is closed,
//! but other connections and the job queue never notice.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Notify};

use crate::actions::Action;
use crate::codec::{JsonCodec, RawCodec};
use crate::error::{Error, Result};
use crate::protocol::{flags, Frame, FrameBuffer, FrameKind, Header};
use crate::queue::{Job, SchedulerHandle};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Socket read buffer size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// File stream chunk size.
const FILE_CHUNK_SIZE: usize = 64 * 1024;

struct ConnState {
    closed: AtomicBool,
    notify: Notify,
}

/// Cheaply cloneable handle to one connection's write side and
/// lifecycle.
///
/// Jobs carry a clone so the dispatcher can answer (or terminate) the
/// connection that asked.
#[derive(Clone)]
pub struct ConnectionHandle {
    uid: u64,
    writer: WriterHandle,
    state: Arc<ConnState>,
}

impl ConnectionHandle {
    fn new(uid: u64, writer: WriterHandle) -> Self {
        Self {
            uid,
            writer,
            state: Arc::new(ConnState {
                closed: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Handle backed by a null writer, for tests that need a `Job`
    /// without a socket.
    pub fn detached(uid: u64) -> Self {
        let (writer, _task) = spawn_writer_task(tokio::io::sink(), WriterConfig::default());
        Self::new(uid, writer)
    }

    /// Connection identifier, unique within the process.
    #[inline]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Mark the connection closed and wake the read task.
    ///
    /// Idempotent. In-flight sends fail from here on; the socket is torn
    /// down once the writer drains.
    pub fn close(&self) {
        if !self.state.closed.swap(true, Ordering::AcqRel) {
            self.state.notify.notify_waiters();
        }
    }

    /// Check if the connection has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Resolve once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);

        // Register before the flag check so a concurrent close() between
        // the check and the await cannot be missed.
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// Send a structured JSON response.
    ///
    /// Resolves only once the frame has been written and flushed to the
    /// socket, so the caller can safely proceed to the next response or
    /// close.
    pub async fn send_json<T: serde::Serialize>(&self, kind: FrameKind, body: &T) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let payload = JsonCodec::encode(body)?;
        let header = Header::new(kind, flags::RESPONSE, payload.len() as u32);

        let (tx, rx) = oneshot::channel();
        self.writer
            .send(OutboundFrame::with_ack(&header, Bytes::from(payload), tx))
            .await?;

        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Stream a file's bytes as a chunked `file` response.
    ///
    /// Never buffers the whole file; each chunk is framed and handed to
    /// the writer, with backpressure bounding memory. Resolves after the
    /// final stream-end frame has been flushed.
    pub async fn send_file(&self, path: &Path) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let mut file = tokio::fs::File::open(path).await?;

        loop {
            let mut chunk = BytesMut::with_capacity(FILE_CHUNK_SIZE);
            let n = file.read_buf(&mut chunk).await?;
            if n == 0 {
                break;
            }

            let header = Header::new(FrameKind::File, flags::FILE_CHUNK, n as u32);
            self.writer
                .send(OutboundFrame::new(
                    &header,
                    RawCodec::serialize_bytes(chunk.freeze()),
                ))
                .await?;
        }

        let end = Header::new(FrameKind::File, flags::FILE_END, 0);
        let (tx, rx) = oneshot::channel();
        self.writer
            .send(OutboundFrame::with_ack(&end, Bytes::new(), tx))
            .await?;

        rx.await.map_err(|_| Error::ConnectionClosed)
    }
}

/// Spawn the read task for one accepted connection.
pub(crate) fn spawn(stream: TcpStream, uid: u64, scheduler: SchedulerHandle, max_payload: u32) {
    let (read_half, write_half) = stream.into_split();
    let (writer, _writer_task) = spawn_writer_task(write_half, WriterConfig::default());
    let handle = ConnectionHandle::new(uid, writer);

    tokio::spawn(async move {
        if let Err(err) = read_loop(read_half, max_payload, &scheduler, &handle).await {
            tracing::warn!(conn_uid = uid, error = %err, "connection error");
        }
        handle.close();
        tracing::debug!(conn_uid = uid, "connection closed");
    });
}

/// Read loop: reassemble frames, decode jobs, enqueue.
///
/// Returns on peer close or [`ConnectionHandle::close`]; any error is
/// connection-fatal and reported by the caller.
async fn read_loop<R>(
    mut reader: R,
    max_payload: u32,
    scheduler: &SchedulerHandle,
    conn: &ConnectionHandle,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::with_max_payload(max_payload);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = conn.closed() => return Ok(()),
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }

                for frame in frames.push(&buf[..n])? {
                    let job = decode_job(&frame, conn)?;
                    tracing::debug!(
                        conn_uid = conn.uid(),
                        job_id = %job.id,
                        action = job.action.name(),
                        "job enqueued"
                    );
                    scheduler.enqueue(job);
                }
            }
        }
    }
}

/// Turn a decoded frame into a job, validating the payload.
///
/// Requires a request-kind frame whose JSON payload carries a non-empty
/// `id`. The action comes from the payload's `action` field, falling
/// back to the frame kind; a name outside the registry is
/// [`Error::NoAction`].
pub(crate) fn decode_job(frame: &Frame, conn: &ConnectionHandle) -> Result<Job> {
    if frame.kind().is_response() {
        return Err(Error::Protocol(format!(
            "unexpected {} frame from client",
            frame.kind().name()
        )));
    }

    let value = JsonCodec::decode_value(frame.payload())?;

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(Error::MissingId)?
        .to_string();

    let action = match value.get("action").and_then(|v| v.as_str()) {
        Some(name) => Action::from_name(name).ok_or_else(|| Error::NoAction(name.to_string()))?,
        None => Action::from_kind(frame.kind())
            .ok_or_else(|| Error::NoAction(frame.kind().name().to_string()))?,
    };

    let overrides = serde_json::from_value(value)?;

    Ok(Job {
        id,
        action,
        overrides,
        conn: conn.clone(),
        enqueued_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;

    fn request_frame(kind: FrameKind, payload: &[u8]) -> Frame {
        let header = Header::new(kind, 0, payload.len() as u32);
        Frame::from_parts(header, payload)
    }

    #[tokio::test]
    async fn test_decode_job_full_payload() {
        let conn = ConnectionHandle::detached(1);
        let frame = request_frame(
            FrameKind::Makeshot,
            br#"{"id":"job1","action":"makeshot","wrapSelector":".main"}"#,
        );

        let job = decode_job(&frame, &conn).unwrap();

        assert_eq!(job.id, "job1");
        assert_eq!(job.action, Action::Makeshot);
        assert_eq!(job.overrides.wrap_selector.as_deref(), Some(".main"));
        assert_eq!(job.conn.uid(), 1);
    }

    #[tokio::test]
    async fn test_decode_job_action_falls_back_to_kind() {
        let conn = ConnectionHandle::detached(2);
        let frame = request_frame(FrameKind::Getfile, br#"{"id":"f1","url":"/tmp/x"}"#);

        let job = decode_job(&frame, &conn).unwrap();
        assert_eq!(job.action, Action::Getfile);
    }

    #[tokio::test]
    async fn test_decode_job_payload_action_overrides_kind() {
        let conn = ConnectionHandle::detached(3);
        let frame = request_frame(FrameKind::Hello, br#"{"id":"c1","action":"clean"}"#);

        let job = decode_job(&frame, &conn).unwrap();
        assert_eq!(job.action, Action::Clean);
    }

    #[tokio::test]
    async fn test_decode_job_missing_id() {
        let conn = ConnectionHandle::detached(4);
        let frame = request_frame(FrameKind::Makeshot, br#"{"action":"makeshot"}"#);

        assert!(matches!(
            decode_job(&frame, &conn),
            Err(Error::MissingId)
        ));

        let empty = request_frame(FrameKind::Makeshot, br#"{"id":""}"#);
        assert!(matches!(decode_job(&empty, &conn), Err(Error::MissingId)));
    }

    #[tokio::test]
    async fn test_decode_job_bad_json() {
        let conn = ConnectionHandle::detached(5);
        let frame = request_frame(FrameKind::Makeshot, b"definitely not json");

        assert!(matches!(decode_job(&frame, &conn), Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_decode_job_unknown_action() {
        let conn = ConnectionHandle::detached(6);
        let frame = request_frame(FrameKind::Hello, br#"{"id":"x","action":"explode"}"#);

        match decode_job(&frame, &conn) {
            Err(Error::NoAction(name)) => assert_eq!(name, "explode"),
            other => panic!("expected NoAction, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decode_job_rejects_response_kind() {
        let conn = ConnectionHandle::detached(7);
        let header = Header::new(FrameKind::Result, flags::RESPONSE, 11);
        let frame = Frame::from_parts(header, br#"{"id":"x"}"#);

        assert!(matches!(
            decode_job(&frame, &conn),
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_observable() {
        let conn = ConnectionHandle::detached(8);
        assert!(!conn.is_closed());

        conn.close();
        conn.close();
        assert!(conn.is_closed());

        // Must resolve immediately on an already-closed handle.
        conn.closed().await;
    }

    #[tokio::test]
    async fn test_send_json_after_close_fails() {
        let conn = ConnectionHandle::detached(9);
        conn.close();

        let err = conn
            .send_json(FrameKind::Result, &"late")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_loop_decode_error_is_fatal() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let conn = ConnectionHandle::detached(10);
        let engine = std::sync::Arc::new(crate::engine::MockEngine::new());
        let (scheduler, handle) = crate::queue::Scheduler::new(
            crate::config::ServiceConfig::default(),
            engine,
            crate::queue::FailurePolicy::default(),
        );
        drop(scheduler);

        let task = tokio::spawn(async move {
            read_loop(server, 1024, &handle, &conn).await
        });

        use tokio::io::AsyncWriteExt;
        let bytes = build_frame(
            &Header::new(FrameKind::Makeshot, 0, 7),
            b"not { }",
        );
        client.write_all(&bytes).await.unwrap();

        let result = task.await.unwrap();
        assert!(result.is_err());
    }
}
