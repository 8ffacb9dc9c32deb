//! Wire format encoding and decoding.
//!
//! Implements the 10-byte frame header:
//! ```text
//! ┌─────────┬───────┬───────────┬───────────┐
//! │ Version │ Flags │ Head len  │ Body len  │
//! │ 1 byte  │ 1 byte│ uint32 BE │ uint32 BE │
//! └─────────┴───────┴───────────┴───────────┘
//! ```
//!
//! The head carries the encoded envelope (ids, action, headers), the body
//! carries the raw message body. All multi-byte integers are Big Endian.

use crate::error::{ChannelError, Result};

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Wire version spoken by this crate.
pub const WIRE_VERSION: u8 = 1;

/// Default maximum frame size, head plus body (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Absolute maximum frame size (~2 GB, max i32).
pub const ABSOLUTE_MAX_FRAME_SIZE: u32 = 2_147_483_647;

/// Flag constants for the protocol.
pub mod flags {
    /// Session preamble sent by the connecting side.
    pub const PREAMBLE: u8 = 0b0000_0001;
    /// Preamble accepted by the listening side.
    pub const PREAMBLE_ACK: u8 = 0b0000_0010;
    /// Fault: a rejected preamble or a fault message.
    pub const FAULT: u8 = 0b0000_0100;
    /// The envelope carries a `relates_to` reference (reply).
    pub const HAS_RELATES_TO: u8 = 0b0000_1000;

    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0b1111_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Preamble rejection: preamble + fault.
    pub const PREAMBLE_FAULT: u8 = PREAMBLE | FAULT;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Wire version of the sender.
    pub version: u8,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Length of the encoded envelope head.
    pub head_length: u32,
    /// Length of the raw body.
    pub body_length: u32,
}

impl Header {
    /// Create a new header at the current wire version.
    pub fn new(flags: u8, head_length: u32, body_length: u32) -> Self {
        Self {
            version: WIRE_VERSION,
            flags,
            head_length,
            body_length,
        }
    }

    /// Total number of bytes following the header.
    #[inline]
    pub fn frame_length(&self) -> u64 {
        self.head_length as u64 + self.body_length as u64
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_session::protocol::{Header, HEADER_SIZE};
    ///
    /// let header = Header::new(0, 12, 100);
    /// assert_eq!(header.encode().len(), HEADER_SIZE);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (10 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.version;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.head_length.to_be_bytes());
        buf[6..10].copy_from_slice(&self.body_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_session::protocol::Header;
    ///
    /// let bytes = [1, 0x08, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.head_length, 42);
    /// assert_eq!(header.body_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            flags: buf[1],
            head_length: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            body_length: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Version matches `WIRE_VERSION`
    /// - Head plus body doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.version != WIRE_VERSION {
            return Err(ChannelError::Protocol(format!(
                "Unsupported wire version {} (expected {})",
                self.version, WIRE_VERSION
            )));
        }

        if self.frame_length() > max_frame_size as u64 {
            return Err(ChannelError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                self.frame_length(),
                max_frame_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(ChannelError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this is a session preamble (or its rejection).
    #[inline]
    pub fn is_preamble(&self) -> bool {
        flags::has_flag(self.flags, flags::PREAMBLE)
    }

    /// Check if this is a preamble acknowledgment.
    #[inline]
    pub fn is_preamble_ack(&self) -> bool {
        flags::has_flag(self.flags, flags::PREAMBLE_ACK)
    }

    /// Check if this is a fault.
    #[inline]
    pub fn is_fault(&self) -> bool {
        flags::has_flag(self.flags, flags::FAULT)
    }

    /// Check if this frame answers an earlier message.
    #[inline]
    pub fn has_relates_to(&self) -> bool {
        flags::has_flag(self.flags, flags::HAS_RELATES_TO)
    }

    /// Check if this is a session control frame rather than a message.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.is_preamble() || self.is_preamble_ack()
    }
}
