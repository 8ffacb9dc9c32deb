//! Binding configuration.
//!
//! [`BindingConfig`] carries the timeouts, security mode, addressing policy and
//! queue sizes shared by a factory and every channel it creates. Channels take
//! their own copy at creation, so later changes never affect live channels.
//!
//! Configurations can be built in code with the fluent setters or loaded from
//! JSON. Durations are written as milliseconds and every field is optional:
//!
//! ```
//! use duplex_session::{BindingConfig, ReceiveTimeoutPolicy};
//! use std::time::Duration;
//!
//! let config = BindingConfig::from_json(r#"{
//!     "target_address": "net.tcp://localhost:8080/echo",
//!     "receive_timeout": 1500,
//!     "receive_timeout_policy": "cancel_pending"
//! }"#).unwrap();
//!
//! assert_eq!(config.receive_timeout, Duration::from_millis(1500));
//! assert_eq!(config.receive_timeout_policy, ReceiveTimeoutPolicy::CancelPending);
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};
use crate::protocol::{ABSOLUTE_MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE};
use crate::transport::EndpointAddress;
use crate::writer::WriterConfig;

/// Default open, send and close timeout (1 minute).
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default receive timeout (10 minutes).
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of uncorrelated inbound messages a channel buffers.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Default maximum frames queued in the writer before senders wait.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default capacity of the writer command queue.
pub const DEFAULT_WRITER_QUEUE_CAPACITY: usize = 1024;

/// Security mode requested by the binding.
///
/// The stream transports in this crate carry no security layer, so only
/// [`SecurityMode::None`] passes validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    #[default]
    None,
    Transport,
    Message,
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityMode::None => f.write_str("none"),
            SecurityMode::Transport => f.write_str("transport"),
            SecurityMode::Message => f.write_str("message"),
        }
    }
}

/// What happens to an outstanding request when a receive for it times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveTimeoutPolicy {
    /// The entry stays registered; a later receive may still observe a late reply.
    #[default]
    KeepPending,
    /// The entry is cancelled; a late reply is dropped as uncorrelated.
    CancelPending,
}

/// Binding configuration for factories, channels and listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Address used by [`ChannelFactory::create_default_channel`](crate::ChannelFactory::create_default_channel).
    pub target_address: Option<String>,
    pub security_mode: SecurityMode,
    #[serde(with = "duration_ms")]
    pub open_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub send_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub receive_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub close_timeout: Duration,
    pub receive_timeout_policy: ReceiveTimeoutPolicy,
    /// Maximum head + body size of one frame, in bytes.
    pub max_frame_size: u32,
    /// Uncorrelated inbound messages buffered before new ones are dropped.
    pub inbound_capacity: usize,
    /// Frames queued in the writer before senders wait.
    pub max_pending_frames: usize,
    pub writer_queue_capacity: usize,
}

impl BindingConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ChannelError::Configuration(format!("invalid binding JSON: {}", e)))
    }

    /// Serialize the configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ChannelError::Configuration(e.to_string()))
    }

    pub fn target_address(mut self, address: impl Into<String>) -> Self {
        self.target_address = Some(address.into());
        self
    }

    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn receive_timeout_policy(mut self, policy: ReceiveTimeoutPolicy) -> Self {
        self.receive_timeout_policy = policy;
        self
    }

    /// Set the maximum frame size.
    ///
    /// Default: 64 MiB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the inbound mailbox capacity.
    ///
    /// Default: 1024
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.max_pending_frames = limit;
        self
    }

    /// Set the writer queue capacity.
    ///
    /// Default: 1024
    pub fn writer_queue_capacity(mut self, capacity: usize) -> Self {
        self.writer_queue_capacity = capacity;
        self
    }

    /// Check the configuration for inconsistencies.
    ///
    /// Checks:
    /// - Security mode is supported by the stream transports
    /// - All timeouts are non-zero
    /// - Frame size is within `1..=ABSOLUTE_MAX_FRAME_SIZE`
    /// - Capacities are non-zero
    /// - `target_address`, when set, parses with a supported scheme
    pub fn validate(&self) -> Result<()> {
        if self.security_mode != SecurityMode::None {
            return Err(ChannelError::Configuration(format!(
                "security mode '{}' is not supported by stream transports",
                self.security_mode
            )));
        }

        let timeouts = [
            ("open_timeout", self.open_timeout),
            ("send_timeout", self.send_timeout),
            ("receive_timeout", self.receive_timeout),
            ("close_timeout", self.close_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(ChannelError::Configuration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.max_frame_size == 0 || self.max_frame_size > ABSOLUTE_MAX_FRAME_SIZE {
            return Err(ChannelError::Configuration(format!(
                "max_frame_size must be between 1 and {}, got {}",
                ABSOLUTE_MAX_FRAME_SIZE, self.max_frame_size
            )));
        }

        let capacities = [
            ("inbound_capacity", self.inbound_capacity),
            ("max_pending_frames", self.max_pending_frames),
            ("writer_queue_capacity", self.writer_queue_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ChannelError::Configuration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if let Some(address) = &self.target_address {
            EndpointAddress::parse(address)
                .map_err(|e| ChannelError::Configuration(format!("target_address: {}", e)))?;
        }

        Ok(())
    }

    /// Writer settings derived from this binding.
    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.max_pending_frames,
            channel_capacity: self.writer_queue_capacity,
        }
    }
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            target_address: None,
            security_mode: SecurityMode::None,
            open_timeout: DEFAULT_OPERATION_TIMEOUT,
            send_timeout: DEFAULT_OPERATION_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            close_timeout: DEFAULT_OPERATION_TIMEOUT,
            receive_timeout_policy: ReceiveTimeoutPolicy::KeepPending,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            writer_queue_capacity: DEFAULT_WRITER_QUEUE_CAPACITY,
        }
    }
}

/// `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
