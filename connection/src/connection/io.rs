//! I/O layer for connection handling.
//!
//! [`AsyncConnection`] owns the levin transport halves for one peer and runs the
//! request/response exchanges on top of them. It works with any
//! AsyncRead/AsyncWrite pair, which keeps it testable with mock I/O.

use super::configuration::ConnectionConfiguration;
use super::error::ConnectionError;
use super::handshake::{generate_peer_id, handshake_request, support_flags_response};
use crate::levin::{Command, Header, Message, RETURN_OK};
use crate::peer::Peer;
use crate::peer_list::PeerDirectory;
use crate::storage::{PortableStorage, Section};
use crate::transport::{AsyncLevinReader, AsyncLevinWriter};
use log::debug;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

/// Represents a connection to a monero peer.
///
/// One request is in flight at a time. While waiting for a response the
/// connection answers the requests a node typically interleaves
/// (`support_flags`, `ping`) and skips anything else.
///
/// # Trait Bounds
///
/// * [`AsyncRead`]/[`AsyncWrite`] - Required for async I/O operations.
/// * [`Unpin`] - Required because uses `&mut self` with `.await`.
/// * [`Send`] - Allows the connection to be sent between threads/tasks.
///
/// [`AsyncRead`]: tokio::io::AsyncRead
/// [`AsyncWrite`]: tokio::io::AsyncWrite
#[derive(Debug)]
pub struct AsyncConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    configuration: ConnectionConfiguration,
    /// The peer this connection is established with, enriched by the handshake.
    peer: Peer,
    /// Peer id advertised by this side of the connection.
    local_peer_id: u64,
    /// `None` once closed.
    reader: Option<AsyncLevinReader<R>>,
    /// `None` once closed.
    writer: Option<AsyncLevinWriter<W>>,
}

impl<R, W> std::fmt::Display for AsyncConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_closed() { "closed" } else { "open" };
        write!(f, "Levin connection to {} ({state})", self.peer)
    }
}

impl<R, W> AsyncConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a new connection over an established reader and writer.
    pub fn new(peer: Peer, configuration: ConnectionConfiguration, reader: R, writer: W) -> Self {
        let reader = AsyncLevinReader::with_max_payload_size(reader, configuration.max_payload_size);
        Self {
            configuration,
            peer,
            local_peer_id: generate_peer_id(),
            reader: Some(reader),
            writer: Some(AsyncLevinWriter::new(writer)),
        }
    }

    /// The peer this connection is established with.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Send a single frame.
    pub async fn send(&mut self, message: &Message) -> Result<(), ConnectionError> {
        let writer = self.writer.as_mut().ok_or(ConnectionError::Closed)?;
        writer.write(message).await?;
        Ok(())
    }

    /// Receive a single frame. Cancellation safe.
    pub async fn receive(&mut self) -> Result<Message, ConnectionError> {
        let reader = self.reader.as_mut().ok_or(ConnectionError::Closed)?;
        Ok(reader.read().await?)
    }

    /// Perform the levin handshake and decode the peer directory it returns.
    ///
    /// The peer's own metadata from the response is folded into [`peer`](Self::peer).
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Timeout`] if no handshake response arrives within `max_wait`.
    pub async fn handshake(&mut self, max_wait: Duration) -> Result<PeerDirectory, ConnectionError> {
        let request = Message::storage_request(
            Command::Handshake,
            true,
            &handshake_request(&self.configuration, self.local_peer_id),
        )
        .map_err(ConnectionError::EncodeFailed)?;

        let response = self
            .exchange(request, max_wait, |header| {
                header.command == Command::Handshake.id()
            })
            .await?;

        let storage = response.storage().map_err(ConnectionError::DecodeFailed)?;
        let directory = PeerDirectory::from_section(&storage.root);
        self.peer = self.peer.with_node_info(&directory.node, &directory.chain);
        debug!(
            "Handshake with {} returned {} peers",
            self.peer,
            directory.len()
        );
        Ok(directory)
    }

    /// Send a bare ping and wait for any well-formed response frame.
    pub async fn ping(&mut self, max_wait: Duration) -> Result<(), ConnectionError> {
        let request = Message::request(Command::Ping, true);
        self.exchange(request, max_wait, Header::is_response).await?;
        Ok(())
    }

    /// Release the underlying connection.
    ///
    /// Safe to call more than once. Any later send or receive fails with
    /// [`ConnectionError::Closed`].
    pub async fn close(&mut self) {
        self.reader.take();
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error shutting down connection to {}: {e}", self.peer);
            }
        }
    }

    /// Send `request` and wait for the first response frame accepted by `is_reply`.
    async fn exchange<F>(
        &mut self,
        request: Message,
        max_wait: Duration,
        is_reply: F,
    ) -> Result<Message, ConnectionError>
    where
        F: Fn(&Header) -> bool,
    {
        match timeout(max_wait, self.await_reply(&request, &is_reply)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    async fn await_reply<F>(
        &mut self,
        request: &Message,
        is_reply: &F,
    ) -> Result<Message, ConnectionError>
    where
        F: Fn(&Header) -> bool,
    {
        self.send(request).await?;
        debug!("Sent {request} to {}", self.peer);

        loop {
            let message = self.receive().await?;
            let header = message.header();

            if header.is_response() && is_reply(header) {
                if header.return_code < RETURN_OK {
                    return Err(ConnectionError::RemoteError(header.return_code));
                }
                return Ok(message);
            }

            if header.is_request() && header.expects_response {
                self.answer(&message).await?;
            } else {
                debug!("Ignoring {message} from {} while waiting", self.peer);
            }
        }
    }

    /// Answer a request the peer sent while we wait on our own.
    async fn answer(&mut self, request: &Message) -> Result<(), ConnectionError> {
        let storage = match request.command() {
            Some(Command::SupportFlags) => support_flags_response(&self.configuration),
            Some(Command::Ping) => PortableStorage::new(
                Section::new()
                    .with("status", "OK")
                    .with("peer_id", self.local_peer_id),
            ),
            _ => {
                debug!("Not answering {request} from {}", self.peer);
                return Ok(());
            }
        };

        let response = Message::storage_response(request.header().command, RETURN_OK, &storage)
            .map_err(ConnectionError::EncodeFailed)?;
        debug!("Answering {request} from {}", self.peer);
        self.send(&response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::configuration::Network;
    use crate::levin::{Flags, HEADER_SIZE, MAX_HANDSHAKE_PAYLOAD_SIZE};
    use crate::transport::TransportError;
    use crate::storage::{Array, Value};
    use std::net::Ipv4Addr;
    use tokio_test::io::Builder as MockIoBuilder;

    fn test_peer() -> Peer {
        Peer::new(Ipv4Addr::new(127, 0, 0, 1), 18080)
    }

    fn config() -> ConnectionConfiguration {
        ConnectionConfiguration::non_listening(Network::Mainnet)
    }

    fn handshake_response(return_code: i32) -> Message {
        let peer = Section::new().with(
            "adr",
            Section::new().with(
                "addr",
                Section::new()
                    .with("m_ip", u32::from_le_bytes([10, 0, 0, 2]))
                    .with("m_port", 18080u16),
            ),
        );
        let storage = PortableStorage::new(
            Section::new()
                .with(
                    "node_data",
                    Section::new()
                        .with("peer_id", 99u64)
                        .with("rpc_port", 18089u16),
                )
                .with(
                    "payload_data",
                    Section::new()
                        .with("current_height", 3_000_000u64)
                        .with("top_version", 16u8),
                )
                .with("local_peerlist_new", Array::of_sections(vec![peer])),
        );
        Message::storage_response(Command::Handshake.id(), return_code, &storage).unwrap()
    }

    fn support_flags_request() -> Message {
        Message::storage_request(Command::SupportFlags, true, &PortableStorage::default()).unwrap()
    }

    #[tokio::test]
    async fn test_handshake() {
        let mock_reader = MockIoBuilder::new()
            .read(&handshake_response(RETURN_OK).to_bytes())
            .build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        let directory = conn.handshake(Duration::from_secs(1)).await.unwrap();
        assert!(directory.peers.contains_key("10.0.0.2:18080"));
        assert_eq!(conn.peer().current_height, Some(3_000_000));
        assert_eq!(conn.peer().id, Some(99));
        assert_eq!(conn.peer().rpc_port, Some(18089));

        // The request went out as a portable storage handshake.
        let writer = conn.writer.take().unwrap();
        let sent = crate::transport::AsyncLevinTransport::new(
            MockIoBuilder::new().read(&writer_bytes(writer)).build(),
            Vec::new(),
        )
        .read()
        .await
        .unwrap();
        assert_eq!(sent.command(), Some(Command::Handshake));
        assert!(sent.header().expects_response);
        assert!(sent.storage().unwrap().root.section("node_data").is_some());
    }

    fn writer_bytes(writer: AsyncLevinWriter<Vec<u8>>) -> Vec<u8> {
        writer.into_inner()
    }

    #[tokio::test]
    async fn test_handshake_answers_support_flags_first() {
        let mock_reader = MockIoBuilder::new()
            .read(&support_flags_request().to_bytes())
            .read(&handshake_response(RETURN_OK).to_bytes())
            .build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        let directory = conn.handshake(Duration::from_secs(1)).await.unwrap();
        assert_eq!(directory.len(), 1);

        let written = writer_bytes(conn.writer.take().unwrap());
        let mut transport = crate::transport::AsyncLevinTransport::new(
            MockIoBuilder::new().read(&written).build(),
            Vec::new(),
        );
        let request = transport.read().await.unwrap();
        assert_eq!(request.command(), Some(Command::Handshake));
        let answer = transport.read().await.unwrap();
        assert_eq!(answer.command(), Some(Command::SupportFlags));
        assert!(answer.header().flags.contains(Flags::RESPONSE));
        assert_eq!(
            answer.storage().unwrap().root.get("support_flags"),
            Some(&Value::UInt32(1))
        );
    }

    #[tokio::test]
    async fn test_handshake_remote_error() {
        let mock_reader = MockIoBuilder::new()
            .read(&handshake_response(-1).to_bytes())
            .build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        let result = conn.handshake(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ConnectionError::RemoteError(-1))));
    }

    #[tokio::test]
    async fn test_handshake_bad_payload() {
        let header = Header {
            length: 4,
            expects_response: false,
            command: Command::Handshake.id(),
            return_code: RETURN_OK,
            flags: Flags::RESPONSE,
            protocol_version: 1,
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let mock_reader = MockIoBuilder::new().read(&bytes).build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        let result = conn.handshake(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ConnectionError::DecodeFailed(_))));
    }

    #[tokio::test]
    async fn test_handshake_bad_signature() {
        let mut bytes = handshake_response(RETURN_OK).to_bytes();
        bytes[0] = 0x00;
        let mock_reader = MockIoBuilder::new().read(&bytes[..HEADER_SIZE]).build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        let result = conn.handshake(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ConnectionError::FramingFailed(_))));
    }

    #[tokio::test]
    async fn test_handshake_rejects_oversized_frame() {
        // Only the header arrives, the payload is never read.
        let mut bytes = handshake_response(RETURN_OK).to_bytes();
        let length = MAX_HANDSHAKE_PAYLOAD_SIZE + 1;
        bytes[8..16].copy_from_slice(&length.to_le_bytes());
        let mock_reader = MockIoBuilder::new().read(&bytes[..HEADER_SIZE]).build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        let result = conn.handshake(Duration::from_secs(1)).await;
        match result {
            Err(ConnectionError::FramingFailed(TransportError::PayloadTooLarge { length: got, max })) => {
                assert_eq!(got, length);
                assert_eq!(max, MAX_HANDSHAKE_PAYLOAD_SIZE);
            }
            other => panic!("expected an oversized frame error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (client, _server) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        let mut conn = AsyncConnection::new(test_peer(), config(), reader, writer);

        let result = conn.handshake(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ConnectionError::Timeout)));
    }

    #[tokio::test]
    async fn test_ping() {
        let pong = Message::storage_response(
            Command::Ping.id(),
            RETURN_OK,
            &PortableStorage::new(Section::new().with("status", "OK")),
        )
        .unwrap();
        let mock_reader = MockIoBuilder::new().read(&pong.to_bytes()).build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        conn.ping(Duration::from_secs(1)).await.unwrap();
        let written = writer_bytes(conn.writer.take().unwrap());
        assert_eq!(written, Message::request(Command::Ping, true).to_bytes());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock_reader = MockIoBuilder::new().build();
        let mut conn = AsyncConnection::new(test_peer(), config(), mock_reader, Vec::new());

        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        assert!(matches!(
            conn.ping(Duration::from_secs(1)).await,
            Err(ConnectionError::Closed)
        ));
    }
}
