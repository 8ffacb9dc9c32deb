//! Codec module - serialization of envelopes, handshake records and bodies.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`, struct-as-map)
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! The session preamble advertises [`ENCODING_NAME`] so both ends agree on it
//! before the first message is exchanged.
//!
//! # Example
//!
//! ```
//! use duplex_session::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::{MsgPackCodec, ENCODING_NAME};
