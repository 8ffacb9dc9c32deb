//! # duplex-session
//!
//! Session-oriented duplex messaging channels over TCP and Unix sockets.
//!
//! A [`DuplexChannel`] carries independent traffic in both directions over
//! one session. Replies are matched to their requests through a correlation
//! table keyed by [`MessageId`], so sends and receives can be interleaved
//! freely by any number of callers.
//!
//! ## Architecture
//!
//! - **Factory** ([`ChannelFactory`]): validated binding configuration, creates channels
//! - **Channel** ([`DuplexChannel`]): lifecycle state machine, send/receive/close
//! - **Listener** ([`ChannelListener`]): accepting side, yields opened channels
//! - **Session** (`transport`, `writer`, `handshake`): framing, writer task, preamble
//!
//! Every channel operation is available three ways: `begin_*` returning an
//! [`Operation`], an `async fn`, and a `*_blocking` variant.
//!
//! ## Example
//!
//! ```ignore
//! use duplex_session::{BindingConfig, ChannelFactory, Message};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> duplex_session::Result<()> {
//!     let timeout = Duration::from_secs(5);
//!     let factory = ChannelFactory::builder()
//!         .binding(BindingConfig::default())
//!         .build()?;
//!     factory.open(timeout).await?;
//!
//!     let channel = factory.create_channel("net.tcp://localhost:8080/echo")?;
//!     channel.open(timeout).await?;
//!
//!     let request = Message::with_body("urn:echo", &"hello".to_string())?;
//!     let mut reply = channel.request(request, timeout).await?;
//!     let text: String = reply.read_body_as()?;
//!     println!("{}", text);
//!
//!     channel.close(timeout).await?;
//!     factory.close(timeout).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod handshake;
pub mod message;
pub mod protocol;
pub mod transport;
pub mod writer;

mod channel;
mod factory;
mod listener;
mod operation;

pub use channel::{CommunicationState, DuplexChannel};
pub use config::{BindingConfig, ReceiveTimeoutPolicy, SecurityMode};
pub use error::{ChannelError, ErrorClass, Result};
pub use factory::{ChannelFactory, ChannelFactoryBuilder};
pub use listener::ChannelListener;
pub use message::{Message, MessageBody, MessageHeaders, MessageId};
pub use operation::Operation;
pub use transport::EndpointAddress;
