//! Message model: identifiers, headers, bodies and the wire envelope.
//!
//! A [`Message`] is what callers hand to [`DuplexChannel::send`] and get back
//! from `receive`. On the wire it becomes one frame whose head is a MsgPack map
//! `{id, relates_to, action, headers, one_way}` and whose body is the raw body
//! bytes.
//!
//! # Example
//!
//! ```
//! use duplex_session::Message;
//!
//! let mut request = Message::with_body("urn:echo", &"ping".to_string()).unwrap();
//! let id = request.ensure_id();
//!
//! let mut reply = Message::reply_to(&request, "urn:echo/reply", &"pong".to_string()).unwrap();
//! assert_eq!(reply.relates_to(), Some(&id));
//! assert_eq!(reply.read_body_as::<String>().unwrap(), "pong");
//! ```
//!
//! [`DuplexChannel::send`]: crate::DuplexChannel::send

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::MsgPackCodec;
use crate::error::{ChannelError, Result};
use crate::protocol::{flags, Frame};

/// Opaque message identifier.
///
/// Generated ids look like `urn:uuid:<v4 uuid>`; any string received from a
/// peer is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh unique id.
    pub fn new() -> Self {
        Self(format!("urn:uuid:{}", Uuid::new_v4()))
    }

    /// The id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordered list of `(name, value)` header pairs.
///
/// Names may repeat; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHeaders(Vec<(String, String)>);

impl MessageHeaders {
    /// Create an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping insertion order.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug)]
enum BodyState {
    /// Readable any number of times.
    Buffered(Bytes),
    /// Readable once; `None` after the first read.
    Streamed(Option<Bytes>),
}

/// Message body.
///
/// Bodies built locally are buffered. Bodies of received messages are
/// streamed: they can be read once unless [`Message::buffer_body`] is called
/// first.
#[derive(Debug)]
pub struct MessageBody {
    state: BodyState,
}

impl MessageBody {
    /// A buffered body that can be read repeatedly.
    pub fn buffered(bytes: impl Into<Bytes>) -> Self {
        Self {
            state: BodyState::Buffered(bytes.into()),
        }
    }

    /// A streamed body that can be read exactly once.
    pub fn streamed(bytes: impl Into<Bytes>) -> Self {
        Self {
            state: BodyState::Streamed(Some(bytes.into())),
        }
    }

    /// An empty buffered body.
    pub fn empty() -> Self {
        Self::buffered(Bytes::new())
    }

    /// True if the body is streamed (whether or not it was already read).
    pub fn is_streamed(&self) -> bool {
        matches!(self.state, BodyState::Streamed(_))
    }

    /// True once a streamed body has been read.
    pub fn is_consumed(&self) -> bool {
        matches!(self.state, BodyState::Streamed(None))
    }

    /// Read the body bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::BodyConsumed`] on the second read of a streamed body.
    pub fn read(&mut self) -> Result<Bytes> {
        match &mut self.state {
            BodyState::Buffered(bytes) => Ok(bytes.clone()),
            BodyState::Streamed(slot) => slot.take().ok_or(ChannelError::BodyConsumed),
        }
    }

    /// Turn a streamed body into a buffered one.
    pub fn buffer(&mut self) -> Result<()> {
        if let BodyState::Streamed(slot) = &mut self.state {
            let bytes = slot.take().ok_or(ChannelError::BodyConsumed)?;
            self.state = BodyState::Buffered(bytes);
        }
        Ok(())
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::empty()
    }
}

/// Envelope head as it travels in the frame head.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHead {
    id: Option<MessageId>,
    #[serde(default)]
    relates_to: Option<MessageId>,
    action: String,
    #[serde(default)]
    headers: MessageHeaders,
    #[serde(default)]
    one_way: bool,
}

/// A message exchanged over a duplex channel.
#[derive(Debug)]
pub struct Message {
    id: Option<MessageId>,
    relates_to: Option<MessageId>,
    action: String,
    headers: MessageHeaders,
    body: MessageBody,
    fault: bool,
    one_way: bool,
}

impl Message {
    /// Create a request with a raw buffered body and no id.
    ///
    /// The channel assigns an id on send when none is set.
    pub fn new(action: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            id: None,
            relates_to: None,
            action: action.into(),
            headers: MessageHeaders::new(),
            body: MessageBody::buffered(body),
            fault: false,
            one_way: false,
        }
    }

    /// Create a request whose body is `value` encoded as MsgPack.
    pub fn with_body<T: Serialize>(action: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(action, MsgPackCodec::encode_bytes(value)?))
    }

    /// Create a reply to `request` with a MsgPack-encoded body.
    ///
    /// `relates_to` is set to the request id.
    pub fn reply_to<T: Serialize>(
        request: &Message,
        action: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let mut reply = Self::with_body(action, value)?;
        reply.relates_to = request.id.clone();
        Ok(reply)
    }

    /// Create a fault reply to `request` carrying a reason text.
    pub fn fault_reply(request: &Message, reason: &str) -> Result<Self> {
        let mut reply = Self::reply_to(request, request.action.clone(), &reason)?;
        reply.fault = true;
        Ok(reply)
    }

    /// Set an explicit id.
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the correlation reference, making this message a reply.
    pub fn with_relates_to(mut self, relates_to: impl Into<MessageId>) -> Self {
        self.relates_to = Some(relates_to.into());
        self
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Mark the message as one-way: no reply is expected for it.
    pub fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    /// Mark the message as a fault.
    pub fn as_fault(mut self) -> Self {
        self.fault = true;
        self
    }

    #[inline]
    pub fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }

    #[inline]
    pub fn relates_to(&self) -> Option<&MessageId> {
        self.relates_to.as_ref()
    }

    #[inline]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[inline]
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut MessageHeaders {
        &mut self.headers
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        self.fault
    }

    #[inline]
    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    /// True if sending this message registers a correlation entry.
    ///
    /// Replies (messages with `relates_to`), faults and one-way messages do not
    /// expect a reply.
    pub fn expects_reply(&self) -> bool {
        self.relates_to.is_none() && !self.one_way && !self.fault
    }

    /// Return the id, generating one first if absent.
    pub fn ensure_id(&mut self) -> MessageId {
        self.id.get_or_insert_with(MessageId::new).clone()
    }

    #[inline]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Read the raw body bytes. A streamed body can be read once.
    pub fn read_body(&mut self) -> Result<Bytes> {
        self.body.read()
    }

    /// Read and decode a MsgPack body.
    pub fn read_body_as<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.body.read()?;
        MsgPackCodec::decode(&bytes)
    }

    /// Buffer a streamed body so it can be read repeatedly.
    pub fn buffer_body(&mut self) -> Result<()> {
        self.body.buffer()
    }

    /// Encode into a wire frame, consuming the body.
    pub(crate) fn into_frame(mut self) -> Result<Frame> {
        let body = self.body.read()?;
        let mut frame_flags = 0;
        if self.relates_to.is_some() {
            frame_flags |= flags::HAS_RELATES_TO;
        }
        if self.fault {
            frame_flags |= flags::FAULT;
        }

        let head = EnvelopeHead {
            id: self.id,
            relates_to: self.relates_to,
            action: self.action,
            headers: self.headers,
            one_way: self.one_way,
        };

        Ok(Frame::with_flags(
            frame_flags,
            MsgPackCodec::encode_bytes(&head)?,
            body,
        ))
    }

    /// Decode a received frame. The body is streamed.
    pub(crate) fn from_frame(frame: Frame) -> Result<Self> {
        let head: EnvelopeHead = MsgPackCodec::decode(frame.head())?;

        if frame.has_relates_to() != head.relates_to.is_some() {
            return Err(ChannelError::Protocol(
                "HAS_RELATES_TO flag disagrees with envelope head".to_string(),
            ));
        }

        Ok(Self {
            id: head.id,
            relates_to: head.relates_to,
            action: head.action,
            headers: head.headers,
            fault: frame.is_fault(),
            one_way: head.one_way,
            body: MessageBody::streamed(frame.body),
        })
    }
}
