//! Endpoint addresses.
//!
//! Supported forms:
//! - `net.tcp://host[:port]/path` (port defaults to 808)
//! - `net.pipe:///absolute/socket/path` (Unix domain socket, Unix only)
//!
//! # Example
//!
//! ```
//! use duplex_session::transport::{EndpointAddress, TransportTarget};
//!
//! let address = EndpointAddress::parse("net.tcp://localhost:8080/echo").unwrap();
//! assert_eq!(
//!     address.target(),
//!     TransportTarget::Tcp { host: "localhost".to_string(), port: 8080 }
//! );
//! ```

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use url::{Host, Url};

use crate::error::{ChannelError, Result};

/// Port used by `net.tcp` addresses that don't name one.
pub const DEFAULT_TCP_PORT: u16 = 808;

/// Scheme of an endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportScheme {
    Tcp,
    Pipe,
}

impl TransportScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportScheme::Tcp => "net.tcp",
            TransportScheme::Pipe => "net.pipe",
        }
    }
}

/// Where the transport connects or binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    Pipe(PathBuf),
}

/// A parsed, validated endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAddress {
    url: Url,
    scheme: TransportScheme,
    /// Decoded socket path of a `net.pipe` address.
    #[cfg(unix)]
    socket_path: Option<PathBuf>,
}

impl EndpointAddress {
    /// Parse and validate an address string.
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = |reason: &str| ChannelError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(address).map_err(|e| invalid(&e.to_string()))?;

        let scheme = match url.scheme() {
            "net.tcp" => TransportScheme::Tcp,
            "net.pipe" => TransportScheme::Pipe,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };

        match scheme {
            TransportScheme::Tcp => {
                if host_string(&url).is_empty() {
                    return Err(invalid("net.tcp address requires a host"));
                }
            }
            TransportScheme::Pipe => {
                if !cfg!(unix) {
                    return Err(invalid("net.pipe requires Unix domain sockets"));
                }
                if url.host_str().is_some_and(|h| !h.is_empty()) {
                    return Err(invalid("net.pipe address must not name a host"));
                }
                if url.path().len() <= 1 {
                    return Err(invalid("net.pipe address requires a socket path"));
                }
            }
        }

        #[cfg(unix)]
        let socket_path = match scheme {
            TransportScheme::Pipe => Some(
                decode_socket_path(&url)
                    .ok_or_else(|| invalid("net.pipe path is not a valid socket path"))?,
            ),
            TransportScheme::Tcp => None,
        };

        Ok(Self {
            url,
            scheme,
            #[cfg(unix)]
            socket_path,
        })
    }

    #[inline]
    pub fn scheme(&self) -> TransportScheme {
        self.scheme
    }

    /// The address as written (normalized by URL parsing).
    #[inline]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The path component, e.g. `/echo`.
    #[inline]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Resolve the transport target for connecting or binding.
    pub fn target(&self) -> TransportTarget {
        #[cfg(unix)]
        if let Some(path) = &self.socket_path {
            return TransportTarget::Pipe(path.clone());
        }
        TransportTarget::Tcp {
            host: host_string(&self.url),
            port: self.url.port().unwrap_or(DEFAULT_TCP_PORT),
        }
    }

    /// Same address with a different TCP port.
    pub(crate) fn with_port(&self, port: u16) -> Result<Self> {
        let mut url = self.url.clone();
        url.set_port(Some(port))
            .map_err(|_| ChannelError::InvalidAddress {
                address: self.url.to_string(),
                reason: "address cannot carry a port".to_string(),
            })?;
        Ok(Self {
            url,
            scheme: self.scheme,
            #[cfg(unix)]
            socket_path: self.socket_path.clone(),
        })
    }
}

/// Percent-decode the path of a `net.pipe` URL into a filesystem path.
#[cfg(unix)]
fn decode_socket_path(url: &Url) -> Option<PathBuf> {
    let mut file = Url::parse("file:///").ok()?;
    file.set_path(url.path());
    file.to_file_path().ok()
}

fn host_string(url: &Url) -> String {
    match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => String::new(),
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl FromStr for EndpointAddress {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for EndpointAddress {
    type Error = ChannelError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<String> for EndpointAddress {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&EndpointAddress> for EndpointAddress {
    type Error = ChannelError;

    fn try_from(value: &EndpointAddress) -> Result<Self> {
        Ok(value.clone())
    }
}
