//! Channel factory: validated binding configuration plus channel construction.
//!
//! # Example
//!
//! ```ignore
//! use duplex_session::{BindingConfig, ChannelFactory};
//!
//! let factory = ChannelFactory::builder()
//!     .binding(BindingConfig::default())
//!     .build()?;
//! factory.open(Duration::from_secs(1)).await?;
//!
//! let channel = factory.create_channel("net.tcp://localhost:8080/echo")?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::channel::{ChannelShared, CommunicationState, DuplexChannel};
use crate::config::BindingConfig;
use crate::error::{ChannelError, Result};
use crate::operation::Operation;
use crate::transport::EndpointAddress;

/// Builder for [`ChannelFactory`].
#[derive(Debug, Default)]
pub struct ChannelFactoryBuilder {
    binding: BindingConfig,
    runtime: Option<Handle>,
}

impl ChannelFactoryBuilder {
    /// Create a builder with the default binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the binding configuration. It is validated by [`ChannelFactory::open`].
    pub fn binding(mut self, binding: BindingConfig) -> Self {
        self.binding = binding;
        self
    }

    /// Run channel I/O on `handle` instead of the current runtime.
    ///
    /// Required when the factory is built outside a Tokio runtime, e.g. by a
    /// caller that only uses the blocking surface.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<ChannelFactory> {
        let handle = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                ChannelError::Configuration(
                    "no Tokio runtime: call ChannelFactoryBuilder::runtime or build inside a runtime"
                        .to_string(),
                )
            })?,
        };

        Ok(ChannelFactory {
            binding: self.binding,
            handle,
            state: Mutex::new(CommunicationState::Created),
            open_flag: Arc::new(AtomicBool::new(false)),
            channels: Mutex::new(Vec::new()),
        })
    }
}

/// Constructs [`DuplexChannel`]s from one binding configuration.
///
/// Lifecycle is `Created → Opened → Closed`. Closing the factory doesn't close
/// the channels it created, but channels not yet opened can no longer open.
pub struct ChannelFactory {
    binding: BindingConfig,
    handle: Handle,
    state: Mutex<CommunicationState>,
    /// Shared with every channel; cleared on close.
    open_flag: Arc<AtomicBool>,
    channels: Mutex<Vec<Weak<ChannelShared>>>,
}

impl ChannelFactory {
    pub fn builder() -> ChannelFactoryBuilder {
        ChannelFactoryBuilder::new()
    }

    /// Validate the binding and move to `Opened`.
    ///
    /// Runs synchronously; the returned operation is already complete.
    pub fn begin_open(&self, _timeout: Duration) -> Operation<()> {
        Operation::ready(&self.handle, "open", self.open_now())
    }

    pub async fn open(&self, timeout: Duration) -> Result<()> {
        self.begin_open(timeout).await
    }

    pub fn open_blocking(&self, timeout: Duration) -> Result<()> {
        self.begin_open(timeout).wait()
    }

    fn open_now(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != CommunicationState::Created {
            return Err(ChannelError::invalid(
                "open",
                format!("channel factory is {}", *state),
            ));
        }

        self.binding.validate()?;

        *state = CommunicationState::Opened;
        self.open_flag.store(true, Ordering::Release);
        tracing::debug!(security = %self.binding.security_mode, "Channel factory opened");
        Ok(())
    }

    /// Create a `Created` channel for `address` with a copy of the binding.
    pub fn create_channel<A>(&self, address: A) -> Result<DuplexChannel>
    where
        A: TryInto<EndpointAddress, Error = ChannelError>,
    {
        let state = *self.state.lock();
        if state != CommunicationState::Opened {
            return Err(ChannelError::invalid(
                "create_channel",
                format!("channel factory is {}", state),
            ));
        }

        let address = address.try_into()?;
        let channel = DuplexChannel::new(
            address,
            self.binding.clone(),
            self.handle.clone(),
            self.open_flag.clone(),
        );

        let mut channels = self.channels.lock();
        channels.retain(|weak| weak.strong_count() > 0);
        channels.push(channel.downgrade());

        tracing::debug!(channel = channel.id(), address = %channel.address(), "Channel created");
        Ok(channel)
    }

    /// Create a channel for the binding's `target_address`.
    pub fn create_default_channel(&self) -> Result<DuplexChannel> {
        let target = self.binding.target_address.clone().ok_or_else(|| {
            ChannelError::invalid("create_channel", "binding has no target_address")
        })?;
        self.create_channel(target.as_str())
    }

    /// Move to `Closed`. Idempotent.
    pub fn begin_close(&self, _timeout: Duration) -> Operation<()> {
        self.close_now();
        Operation::ready(&self.handle, "close", Ok(()))
    }

    pub async fn close(&self, timeout: Duration) -> Result<()> {
        self.begin_close(timeout).await
    }

    pub fn close_blocking(&self, timeout: Duration) -> Result<()> {
        self.begin_close(timeout).wait()
    }

    /// [`begin_open`](Self::begin_open) with the binding's `open_timeout`.
    pub fn begin_open_default(&self) -> Operation<()> {
        self.begin_open(self.binding.open_timeout)
    }

    pub async fn open_default(&self) -> Result<()> {
        self.begin_open_default().await
    }

    pub fn open_default_blocking(&self) -> Result<()> {
        self.begin_open_default().wait()
    }

    /// [`begin_close`](Self::begin_close) with the binding's `close_timeout`.
    pub fn begin_close_default(&self) -> Operation<()> {
        self.begin_close(self.binding.close_timeout)
    }

    pub async fn close_default(&self) -> Result<()> {
        self.begin_close_default().await
    }

    pub fn close_default_blocking(&self) -> Result<()> {
        self.begin_close_default().wait()
    }

    fn close_now(&self) {
        let mut state = self.state.lock();
        if *state == CommunicationState::Closed {
            return;
        }
        *state = CommunicationState::Closed;
        self.open_flag.store(false, Ordering::Release);
        tracing::debug!(live_channels = self.live_channels(), "Channel factory closed");
    }

    pub fn state(&self) -> CommunicationState {
        *self.state.lock()
    }

    #[inline]
    pub fn binding(&self) -> &BindingConfig {
        &self.binding
    }

    /// Number of created channels that are still alive.
    pub fn live_channels(&self) -> usize {
        self.channels
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("state", &self.state())
            .field("live_channels", &self.live_channels())
            .finish()
    }
}
