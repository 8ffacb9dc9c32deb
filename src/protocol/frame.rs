//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame: header, envelope head and body.
//! Uses `bytes::Bytes` so head and body share the read buffer without copying.
//!
//! # Example
//!
//! ```
//! use duplex_session::protocol::{Frame, Header, flags};
//! use bytes::Bytes;
//!
//! let header = Header::new(flags::HAS_RELATES_TO, 4, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"head"), Bytes::from_static(b"hello"));
//!
//! assert!(frame.has_relates_to());
//! assert_eq!(frame.body(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Encoded envelope head.
    pub head: Bytes,
    /// Raw body bytes.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from header, head and body.
    pub fn new(header: Header, head: Bytes, body: Bytes) -> Self {
        Self { header, head, body }
    }

    /// Build a frame for the given flags, deriving the lengths.
    pub fn with_flags(flags: u8, head: Bytes, body: Bytes) -> Self {
        let header = Header::new(flags, head.len() as u32, body.len() as u32);
        Self { header, head, body }
    }

    /// Get a reference to the head bytes.
    #[inline]
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the flags byte.
    #[inline]
    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    /// Total encoded size (header + head + body).
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.head.len() + self.body.len()
    }

    /// Check if this is a session preamble.
    #[inline]
    pub fn is_preamble(&self) -> bool {
        self.header.is_preamble()
    }

    /// Check if this is a preamble acknowledgment.
    #[inline]
    pub fn is_preamble_ack(&self) -> bool {
        self.header.is_preamble_ack()
    }

    /// Check if this is a fault.
    #[inline]
    pub fn is_fault(&self) -> bool {
        self.header.is_fault()
    }

    /// Check if this frame is a reply.
    #[inline]
    pub fn has_relates_to(&self) -> bool {
        self.header.has_relates_to()
    }
}

/// Build a complete frame as a single byte vector.
///
/// Use the writer task for real sends; this is handy for tests and tools.
///
/// # Example
///
/// ```
/// use duplex_session::protocol::{build_frame, Header, HEADER_SIZE};
///
/// let header = Header::new(0, 4, 5);
/// let bytes = build_frame(&header, b"head", b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 4 + 5);
/// ```
pub fn build_frame(header: &Header, head: &[u8], body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + head.len() + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(head);
    buf.extend_from_slice(body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    #[test]
    fn test_frame_with_flags_derives_lengths() {
        let frame = Frame::with_flags(
            flags::HAS_RELATES_TO,
            Bytes::from_static(b"abc"),
            Bytes::from_static(b"hello"),
        );

        assert_eq!(frame.header.head_length, 3);
        assert_eq!(frame.header.body_length, 5);
        assert_eq!(frame.encoded_len(), HEADER_SIZE + 8);
        assert!(frame.has_relates_to());
    }

    #[test]
    fn test_frame_flag_accessors() {
        let preamble = Frame::with_flags(flags::PREAMBLE, Bytes::new(), Bytes::new());
        assert!(preamble.is_preamble());
        assert!(!preamble.is_preamble_ack());

        let ack = Frame::with_flags(flags::PREAMBLE_ACK, Bytes::new(), Bytes::new());
        assert!(ack.is_preamble_ack());

        let fault = Frame::with_flags(flags::FAULT, Bytes::new(), Bytes::new());
        assert!(fault.is_fault());
        assert!(!fault.has_relates_to());
    }

    #[test]
    fn test_build_frame_layout() {
        let header = Header::new(0, 2, 3);
        let bytes = build_frame(&header, b"hh", b"bbb");

        assert_eq!(Header::decode(&bytes).unwrap(), header);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 2], b"hh");
        assert_eq!(&bytes[HEADER_SIZE + 2..], b"bbb");
    }
}
