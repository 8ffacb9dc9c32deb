//! Stream connections and listeners.
//!
//! - `net.tcp`: TCP with `TCP_NODELAY`
//! - `net.pipe`: Unix Domain Socket (Unix only)
//!
//! Both produce a [`SessionStream`]: boxed read and write halves that the
//! session layer owns separately (single reader, single writer task).
//!
//! # Example
//!
//! ```ignore
//! use duplex_session::transport::{EndpointAddress, SessionListener};
//!
//! let address = EndpointAddress::parse("net.tcp://127.0.0.1:0/echo")?;
//! let listener = SessionListener::bind(&address).await?;
//! let stream = listener.accept().await?;
//! ```

use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use super::address::{EndpointAddress, TransportTarget};
use crate::error::Result;

/// Boxed read half of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected stream, already split into halves.
pub struct SessionStream {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    /// Human-readable peer description for logs.
    pub peer: String,
}

impl SessionStream {
    /// Wrap any duplex byte stream (used by tests with `tokio::io::duplex`).
    pub fn from_io<S>(io: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: peer.into(),
        }
    }

    fn from_tcp(stream: TcpStream, peer: SocketAddr) -> Result<Self> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: peer.to_string(),
        })
    }

    #[cfg(unix)]
    fn from_unix(stream: UnixStream, path: &Path) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: path.display().to_string(),
        }
    }
}

/// Connect to the transport target of `address`.
pub async fn connect(address: &EndpointAddress) -> Result<SessionStream> {
    match address.target() {
        TransportTarget::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            let peer = stream.peer_addr()?;
            SessionStream::from_tcp(stream, peer)
        }
        #[cfg(unix)]
        TransportTarget::Pipe(path) => {
            let stream = UnixStream::connect(&path).await?;
            Ok(SessionStream::from_unix(stream, &path))
        }
    }
}

/// Removes a Unix socket file on drop.
#[cfg(unix)]
struct SocketFileGuard {
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
        _guard: SocketFileGuard,
    },
}

/// Listener for inbound stream connections.
pub struct SessionListener {
    kind: ListenerKind,
    local_address: EndpointAddress,
}

impl SessionListener {
    /// Bind to the transport target of `address`.
    ///
    /// TCP port 0 binds an ephemeral port; [`local_address`](Self::local_address)
    /// reports the assigned one. For Unix sockets any stale socket file at the
    /// path is removed before binding, and the file is removed again on drop.
    pub async fn bind(address: &EndpointAddress) -> Result<Self> {
        match address.target() {
            TransportTarget::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), port)).await?;
                let bound = listener.local_addr()?;
                let local_address = if port == bound.port() {
                    address.clone()
                } else {
                    address.with_port(bound.port())?
                };
                Ok(Self {
                    kind: ListenerKind::Tcp(listener),
                    local_address,
                })
            }
            #[cfg(unix)]
            TransportTarget::Pipe(path) => {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                let listener = UnixListener::bind(&path)?;
                Ok(Self {
                    kind: ListenerKind::Unix {
                        listener,
                        _guard: SocketFileGuard { path: path.clone() },
                        path,
                    },
                    local_address: address.clone(),
                })
            }
        }
    }

    /// The effective bound address.
    pub fn local_address(&self) -> &EndpointAddress {
        &self.local_address
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<SessionStream> {
        match &self.kind {
            ListenerKind::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                SessionStream::from_tcp(stream, peer)
            }
            #[cfg(unix)]
            ListenerKind::Unix { listener, path, .. } => {
                let (stream, _addr) = listener.accept().await?;
                Ok(SessionStream::from_unix(stream, path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_bind_reports_assigned_port() {
        let address = EndpointAddress::parse("net.tcp://127.0.0.1:0/svc").unwrap();
        let listener = SessionListener::bind(&address).await.unwrap();

        match listener.local_address().target() {
            TransportTarget::Tcp { port, .. } => assert_ne!(port, 0),
            #[cfg(unix)]
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(listener.local_address().path(), "/svc");
    }

    #[tokio::test]
    async fn test_tcp_connect_and_exchange_bytes() {
        let address = EndpointAddress::parse("net.tcp://127.0.0.1:0/").unwrap();
        let listener = SessionListener::bind(&address).await.unwrap();
        let target = listener.local_address().clone();

        let server = tokio::spawn(async move {
            let mut stream = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.reader.read_exact(&mut buf).await.unwrap();
            stream.writer.write_all(&buf).await.unwrap();
            stream.writer.flush().await.unwrap();
        });

        let mut client = connect(&target).await.unwrap();
        client.writer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Grab a free port, then close it.
        let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);

        let address = EndpointAddress::parse(&format!("net.tcp://127.0.0.1:{}/", port)).unwrap();
        let err = connect(&address).await.err().unwrap();
        assert!(matches!(err, crate::ChannelError::Transport(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_file_removed_on_drop() {
        let path = std::env::temp_dir().join(format!("duplex-{}.sock", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"stale").unwrap();

        let address =
            EndpointAddress::parse(&format!("net.pipe://{}", path.display())).unwrap();
        let listener = SessionListener::bind(&address).await.unwrap();
        assert!(path.exists());

        let client = connect(&address);
        let (client, accepted) = tokio::join!(client, listener.accept());
        assert!(client.is_ok());
        assert!(accepted.is_ok());

        drop(listener);
        assert!(!path.exists());
    }
}
