//! Async levin transport.
//!
//! The transport moves whole [`Message`](crate::levin::Message) frames over any
//! [`AsyncRead`](tokio::io::AsyncRead)/[`AsyncWrite`](tokio::io::AsyncWrite)
//! pair. It validates framing (signature, length ceiling) but leaves the payload
//! uninterpreted, that is the connection layer's job.
//!
//! # Example
//!
//! ```no_run
//! use monero_peers_connection::levin::{Command, Message};
//! use monero_peers_connection::transport::AsyncLevinTransport;
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:18080").await?;
//! let (reader, writer) = stream.into_split();
//! let mut transport = AsyncLevinTransport::new(reader, writer);
//!
//! transport.write(&Message::request(Command::Ping, true)).await?;
//! let response = transport.read().await?;
//! println!("Received {response}");
//! # Ok(())
//! # }
//! ```

mod levin;

pub use levin::{AsyncLevinReader, AsyncLevinTransport, AsyncLevinWriter};

use crate::levin::HeaderError;
use std::fmt;
use std::io;

/// Error types specific to the transport layer.
#[derive(Debug)]
pub enum TransportError {
    /// IO error during read/write operations.
    Io(io::Error),
    /// Frame header was malformed.
    Header(HeaderError),
    /// Header announced a payload larger than the configured ceiling.
    PayloadTooLarge { length: u64, max: u64 },
}

impl TransportError {
    /// Whether the peer sent something that is not a valid levin frame.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            TransportError::Header(_) | TransportError::PayloadTooLarge { .. }
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::Header(e) => write!(f, "Malformed header: {e}"),
            TransportError::PayloadTooLarge { length, max } => {
                write!(f, "Payload of {length} bytes exceeds maximum of {max}")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Header(e) => Some(e),
            TransportError::PayloadTooLarge { .. } => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

impl From<HeaderError> for TransportError {
    fn from(e: HeaderError) -> Self {
        TransportError::Header(e)
    }
}
