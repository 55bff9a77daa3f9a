//! Error types for connection handling.

use crate::storage::StorageError;
use crate::transport::TransportError;
use std::error::Error;
use std::fmt;
use std::io;

/// Errors that can occur during peer connection establishment and communication.
///
/// [`is_transient`](ConnectionError::is_transient) separates the expected
/// failures of an unreliable network (unreachable, slow) from a peer speaking
/// something other than the protocol.
#[derive(Debug)]
pub enum ConnectionError {
    /// TCP connection could not be established.
    DialFailed(io::Error),
    /// The SOCKS5 proxy could not be reached or refused the connection.
    ProxyFailed(String),
    /// Operation did not finish before its deadline.
    Timeout,
    /// An I/O error occurred on an established connection.
    Io(io::Error),
    /// The peer sent a malformed levin frame (bad signature, oversized length).
    FramingFailed(TransportError),
    /// The peer sent a malformed portable storage payload.
    DecodeFailed(StorageError),
    /// A local message could not be encoded.
    EncodeFailed(StorageError),
    /// The peer answered with a negative return code.
    RemoteError(i32),
    /// Connection was already closed.
    Closed,
}

impl ConnectionError {
    /// Whether the failure is an expected, retryable network condition.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectionError::DialFailed(_)
                | ConnectionError::Timeout
                | ConnectionError::Io(_)
                | ConnectionError::ProxyFailed(_)
        )
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::DialFailed(err) => write!(f, "Dial failed: {err}"),
            ConnectionError::ProxyFailed(reason) => write!(f, "SOCKS5 proxy failed: {reason}"),
            ConnectionError::Timeout => write!(f, "Timed out waiting for peer"),
            ConnectionError::Io(err) => write!(f, "Connection error: {err}"),
            ConnectionError::FramingFailed(err) => write!(f, "Framing error: {err}"),
            ConnectionError::DecodeFailed(err) => write!(f, "Payload decode error: {err}"),
            ConnectionError::EncodeFailed(err) => write!(f, "Payload encode error: {err}"),
            ConnectionError::RemoteError(code) => {
                write!(f, "Peer responded with return code {code}")
            }
            ConnectionError::Closed => write!(f, "Connection closed"),
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConnectionError::DialFailed(err) => Some(err),
            ConnectionError::Io(err) => Some(err),
            ConnectionError::FramingFailed(err) => Some(err),
            ConnectionError::DecodeFailed(err) => Some(err),
            ConnectionError::EncodeFailed(err) => Some(err),
            ConnectionError::ProxyFailed(_)
            | ConnectionError::Timeout
            | ConnectionError::RemoteError(_)
            | ConnectionError::Closed => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        ConnectionError::Io(err)
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(err) => ConnectionError::Io(err),
            framing => ConnectionError::FramingFailed(framing),
        }
    }
}
