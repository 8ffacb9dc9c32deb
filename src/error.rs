//! Error types for duplex-session.
//!
//! Every error belongs to one of three classes (see [`ErrorClass`]) so callers can
//! tell "retry this call" apart from "this channel is dead, create a new one" and
//! "the API was used wrong".

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::message::MessageId;

/// Main error type for all channel, factory and transport operations.
///
/// The type is `Clone` because a single cause (a fault, a close) is delivered to
/// every pending operation of a channel at once.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The binding configuration is internally inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The endpoint address could not be parsed or uses an unsupported scheme.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The operation is not valid in the current lifecycle state.
    #[error("cannot {operation}: {reason}")]
    InvalidOperation {
        operation: &'static str,
        reason: String,
    },

    /// Connecting or negotiating the session failed. The channel is faulted.
    #[error("failed to open channel to {address}: {source}")]
    OpenFailed {
        address: String,
        #[source]
        source: Box<ChannelError>,
    },

    /// I/O error on the underlying connection.
    #[error("transport error: {0}")]
    Transport(Arc<std::io::Error>),

    /// The channel faulted; the cause is attached. The channel must be recreated.
    #[error("channel faulted: {0}")]
    TransportFault(Arc<ChannelError>),

    /// The deadline elapsed. Retryable; the channel is unaffected.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A message id was reused while a reply for it is still outstanding.
    #[error("message id {0} is already awaiting a reply")]
    DuplicateCorrelation(MessageId),

    /// No reply is outstanding for the given message id.
    #[error("no reply is outstanding for message id {0}")]
    NotAwaitingReply(MessageId),

    /// The channel was closed by its holder.
    #[error("channel closed")]
    ChannelClosed,

    /// The remote peer ended the session.
    #[error("session ended by remote peer")]
    SessionEnded,

    /// Protocol violation (bad frame, wrong flags, failed handshake, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Envelope or body (de)serialization failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A streamed message body was already read.
    #[error("message body already consumed")]
    BodyConsumed,

    /// The operation was abandoned before completing (runtime shut down).
    #[error("{0} was abandoned before completion")]
    Aborted(&'static str),
}

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The call may be retried on the same channel.
    Retryable,
    /// The channel can no longer be used; create a new one.
    ChannelUnusable,
    /// The API was used incorrectly.
    Misuse,
}

impl ChannelError {
    /// Classify the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ChannelError::Timeout { .. } => ErrorClass::Retryable,
            ChannelError::OpenFailed { .. }
            | ChannelError::Transport(_)
            | ChannelError::TransportFault(_)
            | ChannelError::ChannelClosed
            | ChannelError::SessionEnded
            | ChannelError::Protocol(_)
            | ChannelError::Aborted(_) => ErrorClass::ChannelUnusable,
            ChannelError::Configuration(_)
            | ChannelError::InvalidAddress { .. }
            | ChannelError::InvalidOperation { .. }
            | ChannelError::DuplicateCorrelation(_)
            | ChannelError::NotAwaitingReply(_)
            | ChannelError::Encoding(_)
            | ChannelError::BodyConsumed => ErrorClass::Misuse,
        }
    }

    /// True for errors that may succeed when retried on the same channel.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// True when the channel that produced this error must be recreated.
    #[inline]
    pub fn is_channel_unusable(&self) -> bool {
        self.class() == ErrorClass::ChannelUnusable
    }

    pub(crate) fn timeout(operation: &'static str, timeout: Duration) -> Self {
        ChannelError::Timeout { operation, timeout }
    }

    pub(crate) fn invalid(operation: &'static str, reason: impl Into<String>) -> Self {
        ChannelError::InvalidOperation {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn fault(cause: ChannelError) -> Self {
        match cause {
            already @ ChannelError::TransportFault(_) => already,
            other => ChannelError::TransportFault(Arc::new(other)),
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Transport(Arc::new(err))
    }
}

impl From<rmp_serde::encode::Error> for ChannelError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ChannelError::Encoding(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ChannelError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ChannelError::Encoding(err.to_string())
    }
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable() {
        let err = ChannelError::timeout("receive", Duration::from_secs(5));
        assert!(err.is_retryable());
        assert!(!err.is_channel_unusable());
        assert_eq!(err.to_string(), "receive timed out after 5s");
    }

    #[test]
    fn test_fault_wraps_once() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let fault = ChannelError::fault(ChannelError::from(io));
        assert!(matches!(fault, ChannelError::TransportFault(_)));

        let again = ChannelError::fault(fault.clone());
        match again {
            ChannelError::TransportFault(cause) => {
                assert!(matches!(*cause, ChannelError::Transport(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classes() {
        assert_eq!(ChannelError::ChannelClosed.class(), ErrorClass::ChannelUnusable);
        assert_eq!(ChannelError::SessionEnded.class(), ErrorClass::ChannelUnusable);
        assert_eq!(
            ChannelError::invalid("open", "channel is Opened").class(),
            ErrorClass::Misuse
        );
        assert_eq!(
            ChannelError::DuplicateCorrelation(MessageId::from("urn:x")).class(),
            ErrorClass::Misuse
        );
        assert_eq!(ChannelError::BodyConsumed.class(), ErrorClass::Misuse);
    }

    #[test]
    fn test_open_failed_keeps_source() {
        let err = ChannelError::OpenFailed {
            address: "net.tcp://localhost:1/".to_string(),
            source: Box::new(ChannelError::timeout("open", Duration::from_millis(10))),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("open timed out after 10ms"));
        assert!(err.is_channel_unusable());
    }
}
