//! TCP-specific connections.

use super::{AsyncConnection, ConnectionConfiguration, ConnectionError};
use crate::peer::Peer;
use log::{debug, info};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

/// A TCP-based connection to a monero peer.
///
/// This is a convenience type alias for [`AsyncConnection`] with Tokio's TCP stream halves.
pub type TcpConnection = AsyncConnection<OwnedReadHalf, OwnedWriteHalf>;

/// Helper function to establish TCP connection with timeout and nodelay.
async fn establish_tcp_connection(
    socket_addr: SocketAddr,
    timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
        Ok(Ok(stream)) => {
            // No delay is helpful for the small frames of the levin protocol.
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(ConnectionError::DialFailed(e)),
        Err(_) => Err(ConnectionError::Timeout),
    }
}

/// Establish a TCP connection to `target` tunneled through a SOCKS5 proxy.
async fn establish_proxied_connection(
    proxy: SocketAddr,
    target: SocketAddr,
    timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    let stream = match tokio::time::timeout(timeout, Socks5Stream::connect(proxy, target)).await {
        Ok(Ok(stream)) => stream,
        // The proxy itself is fine, the target could not be reached through it.
        Ok(Err(
            e @ (tokio_socks::Error::HostUnreachable
            | tokio_socks::Error::NetworkUnreachable
            | tokio_socks::Error::ConnectionRefused
            | tokio_socks::Error::TtlExpired),
        )) => {
            return Err(ConnectionError::DialFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e.to_string(),
            )))
        }
        Ok(Err(e)) => return Err(ConnectionError::ProxyFailed(e.to_string())),
        Err(_) => return Err(ConnectionError::Timeout),
    };

    let stream = stream.into_inner();
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// SOCKS5 greeting offering only the "no authentication" method.
const SOCKS5_GREETING: [u8; 3] = [0x05, 0x01, 0x00];
/// Reply of a SOCKS5 server that accepted the "no authentication" method.
const SOCKS5_NO_AUTH_ACCEPTED: [u8; 2] = [0x05, 0x00];

/// Check that `proxy` speaks SOCKS5 and accepts unauthenticated clients.
///
/// Only the method negotiation is run, no tunnel is requested. This rules out
/// a misconfigured address before dialing many peers through it.
pub async fn check_proxy(proxy: SocketAddr, timeout: Duration) -> Result<(), ConnectionError> {
    let negotiate = async {
        let mut stream = TcpStream::connect(proxy).await?;
        stream.write_all(&SOCKS5_GREETING).await?;
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await?;
        Ok::<_, std::io::Error>(reply)
    };

    match tokio::time::timeout(timeout, negotiate).await {
        Ok(Ok(SOCKS5_NO_AUTH_ACCEPTED)) => Ok(()),
        Ok(Ok(reply)) => Err(ConnectionError::ProxyFailed(format!(
            "proxy {proxy} refused the SOCKS5 greeting, replied {reply:02x?}"
        ))),
        Ok(Err(e)) => Err(ConnectionError::ProxyFailed(format!(
            "proxy {proxy} unreachable: {e}"
        ))),
        Err(_) => Err(ConnectionError::ProxyFailed(format!(
            "proxy {proxy} did not answer within {timeout:?}"
        ))),
    }
}

/// Open a TCP connection to a monero peer.
///
/// Dials directly, or through the configured SOCKS5 proxy, within the
/// configured connection timeout. No messages are exchanged.
pub async fn connect(
    peer: Peer,
    configuration: ConnectionConfiguration,
) -> Result<TcpConnection, ConnectionError> {
    let target = peer.socket_addr();
    let timeout = configuration.connection_timeout;

    let stream = match configuration.proxy {
        Some(proxy) => {
            debug!("Dialing {target} through SOCKS5 proxy {proxy}");
            establish_proxied_connection(proxy, target, timeout).await?
        }
        None => establish_tcp_connection(target, timeout).await?,
    };
    info!("Connected to {target}");

    let (reader, writer) = stream.into_split();
    Ok(AsyncConnection::new(peer, configuration, reader, writer))
}
