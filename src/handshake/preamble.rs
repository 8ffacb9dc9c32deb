//! Preamble records and their frames.
//!
//! The connecting side opens every session with a `PREAMBLE` frame telling the
//! accepting side:
//! - The wire version it speaks
//! - The `via` address it meant to reach
//! - The envelope encoding it will use
//!
//! # Example
//!
//! ```
//! use duplex_session::handshake::{Preamble, PreambleAck};
//!
//! let preamble = Preamble::new("net.tcp://localhost:8080/echo");
//! let frame = preamble.to_frame().unwrap();
//! assert!(frame.is_preamble());
//!
//! let decoded = Preamble::from_frame(&frame).unwrap();
//! assert_eq!(decoded.via, "net.tcp://localhost:8080/echo");
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{MsgPackCodec, ENCODING_NAME};
use crate::error::{ChannelError, Result};
use crate::protocol::{flags, Frame, WIRE_VERSION};

/// Session preamble sent by the connecting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preamble {
    pub version: u8,
    pub via: String,
    pub encoding: String,
}

impl Preamble {
    /// Preamble for the current wire version and encoding.
    pub fn new(via: impl Into<String>) -> Self {
        Self {
            version: WIRE_VERSION,
            via: via.into(),
            encoding: ENCODING_NAME.to_string(),
        }
    }

    pub fn to_frame(&self) -> Result<Frame> {
        control_frame(flags::PREAMBLE, self)
    }

    /// Decode a preamble frame. Rejects anything that isn't a plain `PREAMBLE`.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if !frame.is_preamble() || frame.is_fault() || frame.is_preamble_ack() {
            return Err(ChannelError::Protocol(format!(
                "expected session preamble, got frame with flags {:#04x}",
                frame.flags()
            )));
        }
        MsgPackCodec::decode(frame.head())
    }

    /// Check that this side can serve the preamble.
    pub fn check_compatible(&self) -> std::result::Result<(), String> {
        if self.version != WIRE_VERSION {
            return Err(format!(
                "unsupported preamble version {} (expected {})",
                self.version, WIRE_VERSION
            ));
        }
        if self.encoding != ENCODING_NAME {
            return Err(format!("unsupported encoding '{}'", self.encoding));
        }
        Ok(())
    }
}

/// Preamble accepted; carries the session id chosen by the accepting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreambleAck {
    pub session_id: String,
}

impl PreambleAck {
    pub fn to_frame(&self) -> Result<Frame> {
        control_frame(flags::PREAMBLE_ACK, self)
    }
}

/// Preamble rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreambleFault {
    pub reason: String,
}

impl PreambleFault {
    pub fn to_frame(&self) -> Result<Frame> {
        control_frame(flags::PREAMBLE_FAULT, self)
    }
}

/// The accepting side's answer to a preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreambleReply {
    Accepted(PreambleAck),
    Rejected(PreambleFault),
}

impl PreambleReply {
    /// Decode the answer frame; any other frame is a protocol error.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.is_preamble_ack() && !frame.is_fault() {
            return Ok(Self::Accepted(MsgPackCodec::decode(frame.head())?));
        }
        if frame.is_preamble() && frame.is_fault() {
            return Ok(Self::Rejected(MsgPackCodec::decode(frame.head())?));
        }
        Err(ChannelError::Protocol(format!(
            "unexpected frame during handshake (flags {:#04x})",
            frame.flags()
        )))
    }
}

fn control_frame<T: Serialize>(frame_flags: u8, record: &T) -> Result<Frame> {
    Ok(Frame::with_flags(
        frame_flags,
        MsgPackCodec::encode_bytes(record)?,
        Bytes::new(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_defaults() {
        let preamble = Preamble::new("net.tcp://h/p");
        assert_eq!(preamble.version, WIRE_VERSION);
        assert_eq!(preamble.encoding, "msgpack");
        assert!(preamble.check_compatible().is_ok());
    }

    #[test]
    fn test_incompatible_preamble() {
        let mut preamble = Preamble::new("net.tcp://h/p");
        preamble.version = 42;
        assert!(preamble.check_compatible().unwrap_err().contains("version 42"));

        let mut preamble = Preamble::new("net.tcp://h/p");
        preamble.encoding = "xml".to_string();
        assert!(preamble.check_compatible().unwrap_err().contains("xml"));
    }

    #[test]
    fn test_reply_decoding() {
        let ack = PreambleAck {
            session_id: "urn:uuid:1".to_string(),
        };
        let reply = PreambleReply::from_frame(&ack.to_frame().unwrap()).unwrap();
        assert_eq!(reply, PreambleReply::Accepted(ack));

        let fault = PreambleFault {
            reason: "nope".to_string(),
        };
        let reply = PreambleReply::from_frame(&fault.to_frame().unwrap()).unwrap();
        assert_eq!(reply, PreambleReply::Rejected(fault));
    }

    #[test]
    fn test_message_frame_is_not_a_reply() {
        let frame = Frame::with_flags(0, Bytes::new(), Bytes::new());
        assert!(PreambleReply::from_frame(&frame).is_err());
        assert!(Preamble::from_frame(&frame).is_err());
    }

    #[test]
    fn test_fault_frame_is_not_a_preamble() {
        let fault = PreambleFault {
            reason: "x".to_string(),
        };
        assert!(Preamble::from_frame(&fault.to_frame().unwrap()).is_err());
    }
}
