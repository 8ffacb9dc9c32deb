//! Transport module - addressing, stream connections and sessions.
//!
//! Provides abstraction over:
//! - TCP (`net.tcp`)
//! - Unix Domain Sockets (`net.pipe`, Unix only)

mod address;
mod session;
mod stream;

pub use address::{EndpointAddress, TransportScheme, TransportTarget, DEFAULT_TCP_PORT};
pub use session::{FrameReader, Session};
pub use stream::{connect, BoxedReader, BoxedWriter, SessionListener, SessionStream};
