//! Integration tests for the framing and session layers.
//!
//! These tests verify the integration between codec, protocol, writer and
//! transport modules without going through a channel.

use std::time::Duration;

use bytes::Bytes;
use duplex_session::codec::MsgPackCodec;
use duplex_session::protocol::{build_frame, flags, Frame, FrameBuffer, Header, HEADER_SIZE};
use duplex_session::transport::{FrameReader, SessionStream};
use duplex_session::writer::{spawn_writer_task, WriterConfig};
use duplex_session::ChannelError;
use tokio::time::Instant;

#[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
struct TestHead {
    id: String,
    action: String,
}

fn head(id: &str) -> Vec<u8> {
    MsgPackCodec::encode(&TestHead {
        id: id.to_string(),
        action: "urn:test".to_string(),
    })
    .unwrap()
}

/// Test full frame encode/decode cycle with a MsgPack head.
#[test]
fn test_frame_with_msgpack_head() {
    let head_bytes = head("urn:test:1");
    let body = b"raw body bytes";

    let header = Header::new(0, head_bytes.len() as u32, body.len() as u32);
    let frame_bytes = build_frame(&header, &head_bytes, body);
    assert_eq!(frame_bytes.len(), HEADER_SIZE + head_bytes.len() + body.len());

    let mut buffer = FrameBuffer::new();
    let frames = buffer.push(&frame_bytes).unwrap();
    assert_eq!(frames.len(), 1);

    let frame = &frames[0];
    let decoded: TestHead = MsgPackCodec::decode(frame.head()).unwrap();
    assert_eq!(decoded.id, "urn:test:1");
    assert_eq!(frame.body(), body);
    assert!(!frame.is_fault());
}

/// Test multiple frames in sequence, delivered in odd-sized chunks.
#[test]
fn test_multiple_frames_chunked() {
    let mut all_bytes = Vec::new();
    for i in 1..=5 {
        let head_bytes = head(&format!("urn:test:{}", i));
        let body = format!("body {}", i).into_bytes();
        let frame_flags = if i % 2 == 0 { flags::HAS_RELATES_TO } else { 0 };
        let header = Header::new(frame_flags, head_bytes.len() as u32, body.len() as u32);
        all_bytes.extend(build_frame(&header, &head_bytes, &body));
    }

    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    for chunk in all_bytes.chunks(7) {
        frames.extend(buffer.push(chunk).unwrap());
    }

    assert_eq!(frames.len(), 5);
    assert!(!buffer.has_partial_frame());
    for (i, frame) in frames.iter().enumerate() {
        let n = i + 1;
        let decoded: TestHead = MsgPackCodec::decode(frame.head()).unwrap();
        assert_eq!(decoded.id, format!("urn:test:{}", n));
        assert_eq!(frame.body(), format!("body {}", n).as_bytes());
        assert_eq!(frame.header.has_relates_to(), n % 2 == 0);
    }
}

/// A frame above the configured maximum is a protocol error.
#[test]
fn test_oversized_frame_rejected() {
    let header = Header::new(0, 10, 100);
    let mut buffer = FrameBuffer::with_max_frame_size(64);
    let err = buffer.push(&header.encode()).unwrap_err();
    assert!(matches!(err, ChannelError::Protocol(_)));
}

/// Frames written through the writer task arrive intact and in order.
#[tokio::test]
async fn test_writer_to_reader_over_stream() {
    let (a, b) = tokio::io::duplex(1024);
    let writer_side = SessionStream::from_io(a, "writer");
    let reader_side = SessionStream::from_io(b, "reader");

    let (writer, writer_task) = spawn_writer_task(writer_side.writer, WriterConfig::default());
    let mut reader = FrameReader::new(reader_side.reader, 1024 * 1024);
    let deadline = Instant::now() + Duration::from_secs(5);

    let sender = tokio::spawn(async move {
        for i in 0..20u32 {
            let frame = Frame::with_flags(
                0,
                Bytes::from(head(&format!("urn:test:{}", i))),
                Bytes::from(vec![i as u8; (i as usize) * 100]),
            );
            writer.send(frame, deadline).await.unwrap();
        }
        writer.shutdown(deadline).await.unwrap();
    });

    for i in 0..20u32 {
        let frame = reader.receive_frame(Some(deadline)).await.unwrap().unwrap();
        let decoded: TestHead = MsgPackCodec::decode(frame.head()).unwrap();
        assert_eq!(decoded.id, format!("urn:test:{}", i));
        assert_eq!(frame.body().len(), (i as usize) * 100);
    }

    // Write half shut down: clean end of stream.
    assert!(reader.receive_frame(Some(deadline)).await.unwrap().is_none());

    sender.await.unwrap();
    writer_task.await.unwrap().unwrap();
}

/// An empty frame (no head, no body) is valid on the wire.
#[test]
fn test_empty_frame() {
    let header = Header::new(0, 0, 0);
    let bytes = build_frame(&header, &[], &[]);
    assert_eq!(bytes.len(), HEADER_SIZE);

    let frames = FrameBuffer::new().push(&bytes).unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].head().is_empty());
    assert!(frames[0].body().is_empty());
}
