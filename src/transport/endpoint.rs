//! Endpoint addressing and connection establishment.
//!
//! # Example
//!
//! ```ignore
//! use ordermgmt_client::transport::{connect, Endpoint};
//!
//! let endpoint: Endpoint = "localhost:50051".parse()?;
//! let (reader, writer) = connect(&endpoint, Duration::from_secs(5)).await?;
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Result, RpcError};

/// Read half of an established transport.
pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Write half of an established transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

const UNIX_PREFIX: &str = "unix:";

/// Network address of the remote order service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, resolved at connect time.
    Tcp(String),
    /// Unix Domain Socket path.
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(RpcError::Connection("empty unix socket path".to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(s.to_string()))
            }
            _ => Err(RpcError::Connection(format!(
                "invalid endpoint {:?}, expected host:port or unix:/path",
                s
            ))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => f.write_str(addr),
            Endpoint::Unix(path) => write!(f, "{}{}", UNIX_PREFIX, path.display()),
        }
    }
}

/// Connect to `endpoint` within `timeout` and split the stream.
///
/// Every failure, including the timeout, is reported as
/// [`RpcError::Connection`].
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<(BoxedReader, BoxedWriter)> {
    match tokio::time::timeout(timeout, connect_inner(endpoint)).await {
        Ok(Ok(halves)) => Ok(halves),
        Ok(Err(e)) => Err(RpcError::Connection(format!("{}: {}", endpoint, e))),
        Err(_) => Err(RpcError::Connection(format!(
            "{}: timed out after {:?}",
            endpoint, timeout
        ))),
    }
}

async fn connect_inner(endpoint: &Endpoint) -> std::io::Result<(BoxedReader, BoxedWriter)> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix sockets are not available on this platform",
        )),
    }
}
