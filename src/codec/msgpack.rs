//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`: structs are written as maps keyed by field
//! name, so optional envelope fields can be added without breaking older
//! peers that decode by name.

use bytes::Bytes;

use crate::error::Result;

/// Encoding name advertised in the session preamble.
pub const ENCODING_NAME: &str = "msgpack";

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Encoding`](crate::ChannelError::Encoding) if the
    /// value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Encode straight into a shareable `Bytes` buffer.
    #[inline]
    pub fn encode_bytes<T: serde::Serialize>(value: &T) -> Result<Bytes> {
        Self::encode(value).map(Bytes::from)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Encoding`](crate::ChannelError::Encoding) if the
    /// bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Greeting {
        id: u32,
        text: String,
        urgent: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Greeting {
            id: 42,
            text: "hello".to_string(),
            urgent: true,
        };

        let encoded = MsgPackCodec::encode_bytes(&original).unwrap();
        let decoded: Greeting = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_structs_are_encoded_as_maps() {
        let value = Greeting {
            id: 1,
            text: "x".to_string(),
            urgent: false,
        };

        let encoded = MsgPackCodec::encode(&value).unwrap();

        // fixmap with 3 entries; positional encoding would give 0x93.
        assert_eq!(encoded[0], 0x83, "Expected fixmap, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_decode_tolerates_unknown_fields() {
        #[derive(Serialize)]
        struct Newer {
            id: u32,
            text: String,
            urgent: bool,
            extra: Vec<u8>,
        }

        let encoded = MsgPackCodec::encode(&Newer {
            id: 7,
            text: "t".to_string(),
            urgent: false,
            extra: vec![1, 2],
        })
        .unwrap();

        let decoded: Greeting = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.id, 7);
    }

    #[test]
    fn test_decode_error_is_encoding_error() {
        let result: Result<Greeting> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(ChannelError::Encoding(_))));
    }

    #[test]
    fn test_option_none_is_nil() {
        let val: Option<i32> = None;
        let encoded = MsgPackCodec::encode(&val).unwrap();
        assert_eq!(encoded, vec![0xc0]);
    }
}
