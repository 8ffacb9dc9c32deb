//! Session transport: one connection carrying framed messages.
//!
//! A [`Session`] is split into a [`FrameReader`] (owned by exactly one reader)
//! and a [`WriterHandle`] (shared by all senders). The reader takes `&mut self`,
//! so only one logical reader can exist per session.

use std::collections::VecDeque;

use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::address::EndpointAddress;
use super::stream::{self, BoxedReader, SessionStream};
use crate::error::{ChannelError, Result};
use crate::protocol::{Frame, FrameBuffer};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Read buffer size per socket read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Reads frames from the inbound half of a session.
pub struct FrameReader {
    reader: BoxedReader,
    buffer: FrameBuffer,
    ready: VecDeque<Frame>,
    read_buf: Vec<u8>,
    eof: bool,
}

impl FrameReader {
    pub fn new(reader: BoxedReader, max_frame_size: u32) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::with_max_frame_size(max_frame_size),
            ready: VecDeque::new(),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            eof: false,
        }
    }

    /// Receive the next frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` for a complete frame
    /// - `Ok(None)` once the peer has closed its side cleanly
    /// - `Err(Timeout)` if `deadline` passes first (nothing is lost; call again)
    /// - `Err(...)` on I/O errors, protocol violations, or EOF inside a frame
    pub async fn receive_frame(&mut self, deadline: Option<Instant>) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            let n = match deadline {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    tokio::time::timeout_at(deadline, self.reader.read(&mut self.read_buf))
                        .await
                        .map_err(|_| ChannelError::timeout("receive", timeout))??
                }
                None => self.reader.read(&mut self.read_buf).await?,
            };

            if n == 0 {
                self.eof = true;
                if self.buffer.has_partial_frame() {
                    return Err(ChannelError::Protocol(format!(
                        "connection closed inside a frame ({} bytes buffered)",
                        self.buffer.len()
                    )));
                }
                continue;
            }

            let frames = self.buffer.push(&self.read_buf[..n])?;
            self.ready.extend(frames);
        }
    }
}

/// An established connection: frame reader plus writer task.
pub struct Session {
    pub reader: FrameReader,
    pub writer: WriterHandle,
    pub writer_task: JoinHandle<Result<()>>,
    /// Peer description for logs.
    pub peer: String,
}

impl Session {
    /// Connect to `address` within `deadline`.
    pub async fn connect(
        address: &EndpointAddress,
        deadline: Instant,
        max_frame_size: u32,
        writer_config: WriterConfig,
    ) -> Result<Self> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let stream = tokio::time::timeout_at(deadline, stream::connect(address))
            .await
            .map_err(|_| ChannelError::timeout("connect", timeout))??;
        Ok(Self::from_stream(stream, max_frame_size, writer_config))
    }

    /// Build a session over an already connected stream.
    ///
    /// Must be called inside a Tokio runtime (spawns the writer task).
    pub fn from_stream(
        stream: SessionStream,
        max_frame_size: u32,
        writer_config: WriterConfig,
    ) -> Self {
        let (writer, writer_task) = spawn_writer_task(stream.writer, writer_config);
        Self {
            reader: FrameReader::new(stream.reader, max_frame_size),
            writer,
            writer_task,
            peer: stream.peer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, flags, Header};
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt};

    fn reader_over(io: tokio::io::DuplexStream) -> FrameReader {
        FrameReader::new(Box::new(io), crate::protocol::DEFAULT_MAX_FRAME_SIZE)
    }

    #[tokio::test]
    async fn test_receive_frame_then_eof() {
        let (mut tx, rx) = duplex(1024);
        let mut reader = reader_over(rx);

        let header = Header::new(flags::HAS_RELATES_TO, 2, 3);
        tx.write_all(&build_frame(&header, b"hh", b"bbb")).await.unwrap();
        drop(tx);

        let frame = reader.receive_frame(None).await.unwrap().unwrap();
        assert_eq!(frame.body(), b"bbb");
        assert!(reader.receive_frame(None).await.unwrap().is_none());
        // Stays at EOF.
        assert!(reader.receive_frame(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receive_frame_timeout_is_retryable() {
        let (mut tx, rx) = duplex(1024);
        let mut reader = reader_over(rx);

        let deadline = Instant::now() + Duration::from_millis(50);
        let err = reader.receive_frame(Some(deadline)).await.unwrap_err();
        assert!(err.is_retryable());

        let header = Header::new(0, 1, 0);
        tx.write_all(&build_frame(&header, b"h", b"")).await.unwrap();
        let frame = reader.receive_frame(None).await.unwrap().unwrap();
        assert_eq!(frame.head(), b"h");
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_protocol_error() {
        let (mut tx, rx) = duplex(1024);
        let mut reader = reader_over(rx);

        let header = Header::new(0, 4, 4);
        let bytes = build_frame(&header, b"head", b"body");
        tx.write_all(&bytes[..7]).await.unwrap();
        drop(tx);

        let err = reader.receive_frame(None).await.unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_session_over_duplex_stream() {
        let (a, b) = duplex(4096);
        let mut left = Session::from_stream(
            SessionStream::from_io(a, "left"),
            crate::protocol::DEFAULT_MAX_FRAME_SIZE,
            WriterConfig::default(),
        );
        let mut right = Session::from_stream(
            SessionStream::from_io(b, "right"),
            crate::protocol::DEFAULT_MAX_FRAME_SIZE,
            WriterConfig::default(),
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        let frame = Frame::with_flags(0, Bytes::from_static(b"x"), Bytes::from_static(b"y"));
        left.writer.send(frame, deadline).await.unwrap();

        let got = right.reader.receive_frame(Some(deadline)).await.unwrap().unwrap();
        assert_eq!(got.body(), b"y");

        left.writer.shutdown(deadline).await.unwrap();
        assert!(right.reader.receive_frame(Some(deadline)).await.unwrap().is_none());

        right.writer.shutdown(deadline).await.unwrap();
        assert!(left.reader.receive_frame(Some(deadline)).await.unwrap().is_none());
    }
}
