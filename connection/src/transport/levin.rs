//! Levin frame reader and writer.

use crate::levin::{Header, Message, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::transport::TransportError;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// State machine for the [`AsyncLevinReader`] read method.
///
/// Tracking progress across interruptions makes the read cancellation safe. A
/// read interrupted by `tokio::select!` resumes where it left off when called
/// again, without losing partially read bytes.
#[derive(Debug)]
enum ReceiveState {
    /// Reading the 33 byte header.
    ReadingHeader {
        header: [u8; HEADER_SIZE],
        bytes_read: usize,
    },
    /// Reading exactly `header.length` payload bytes.
    ReadingPayload {
        header: Header,
        payload: Vec<u8>,
        bytes_read: usize,
    },
}

impl ReceiveState {
    fn reading_header() -> Self {
        ReceiveState::ReadingHeader {
            header: [0u8; HEADER_SIZE],
            bytes_read: 0,
        }
    }

    fn reading_payload(header: Header) -> Self {
        ReceiveState::ReadingPayload {
            payload: vec![0u8; header.length as usize],
            header,
            bytes_read: 0,
        }
    }
}

/// Implements the writer half of the levin transport.
#[derive(Debug)]
pub struct AsyncLevinWriter<W> {
    writer: W,
}

impl<W> AsyncLevinWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one complete frame and flush it.
    pub async fn write(&mut self, message: &Message) -> Result<(), io::Error> {
        self.writer.write_all(&message.to_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write direction of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<(), io::Error> {
        self.writer.shutdown().await
    }

    /// Consume the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Implements the reader half of the levin transport.
#[derive(Debug)]
pub struct AsyncLevinReader<R> {
    /// Largest payload accepted before reading it.
    max_payload_size: u64,
    receive_state: ReceiveState,
    reader: R,
}

impl<R> AsyncLevinReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self::with_max_payload_size(reader, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload_size(reader: R, max_payload_size: u64) -> Self {
        Self {
            max_payload_size,
            receive_state: ReceiveState::reading_header(),
            reader,
        }
    }

    /// Read one complete levin frame.
    ///
    /// Short reads are retried until the header and then exactly `length`
    /// payload bytes have arrived. A bad signature or oversized length fails
    /// without reading the payload.
    ///
    /// This function is cancellation safe, meaning it can be safely used with `tokio::select!`
    /// and similar constructs without the risk of leaving the reader in an inconsistent state.
    pub async fn read(&mut self) -> Result<Message, TransportError> {
        loop {
            match &mut self.receive_state {
                ReceiveState::ReadingHeader { header, bytes_read } => {
                    while *bytes_read < HEADER_SIZE {
                        let n = self.reader.read(&mut header[*bytes_read..]).await?;
                        if n == 0 {
                            return Err(TransportError::Io(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed while reading header",
                            )));
                        }
                        *bytes_read += n;
                    }

                    let parsed = Header::from_bytes(header);
                    // Whatever happens next, the next frame starts with a fresh header.
                    self.receive_state = ReceiveState::reading_header();
                    let parsed = parsed?;
                    if parsed.length > self.max_payload_size {
                        return Err(TransportError::PayloadTooLarge {
                            length: parsed.length,
                            max: self.max_payload_size,
                        });
                    }
                    self.receive_state = ReceiveState::reading_payload(parsed);
                }

                ReceiveState::ReadingPayload {
                    header,
                    payload,
                    bytes_read,
                } => {
                    while *bytes_read < payload.len() {
                        let n = self.reader.read(&mut payload[*bytes_read..]).await?;
                        if n == 0 {
                            return Err(TransportError::Io(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed while reading payload",
                            )));
                        }
                        *bytes_read += n;
                    }

                    let header = *header;
                    let payload = std::mem::take(payload);
                    self.receive_state = ReceiveState::reading_header();
                    return Message::from_parts(header, payload).ok_or_else(|| {
                        TransportError::Io(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "payload length does not match header",
                        ))
                    });
                }
            }
        }
    }
}

/// Implements the levin transport over a reader and writer pair.
///
/// # Examples
///
/// ```rust
/// use monero_peers_connection::levin::{Command, Message};
/// use monero_peers_connection::transport::AsyncLevinTransport;
/// use tokio::net::TcpStream;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = TcpStream::connect("127.0.0.1:18080").await?;
/// let (reader, writer) = stream.into_split();
/// let mut transport = AsyncLevinTransport::new(reader, writer);
///
/// transport.write(&Message::request(Command::Ping, true)).await?;
/// let response = transport.read().await?;
/// assert!(response.header().is_response());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncLevinTransport<R, W> {
    writer: AsyncLevinWriter<W>,
    reader: AsyncLevinReader<R>,
}

impl<R, W> AsyncLevinTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_max_payload_size(reader, writer, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload_size(reader: R, writer: W, max_payload_size: u64) -> Self {
        Self {
            writer: AsyncLevinWriter::new(writer),
            reader: AsyncLevinReader::with_max_payload_size(reader, max_payload_size),
        }
    }

    /// Read one levin frame. Cancellation safe.
    pub async fn read(&mut self) -> Result<Message, TransportError> {
        self.reader.read().await
    }

    pub async fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        self.writer.write(message).await.map_err(TransportError::Io)
    }

    /// Split this transport into separate reader and writer halves.
    pub fn into_split(self) -> (AsyncLevinReader<R>, AsyncLevinWriter<W>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levin::{Command, Flags, SIGNATURE};
    use crate::storage::{PortableStorage, Section};
    use tokio_test::io::Builder as MockIoBuilder;

    fn handshake_message() -> Message {
        let storage = PortableStorage::new(Section::new().with("peer_id", 7u64));
        Message::storage_request(Command::Handshake, true, &storage).unwrap()
    }

    #[tokio::test]
    async fn test_basic_message_receive() {
        let message = handshake_message();
        let mock_reader = MockIoBuilder::new().read(&message.to_bytes()).build();
        let mut transport = AsyncLevinTransport::new(mock_reader, Vec::new());

        let received = transport.read().await.unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_send_message() {
        let mock_reader = MockIoBuilder::new().build();
        let mut transport = AsyncLevinTransport::new(mock_reader, Vec::new());

        let message = Message::request(Command::Ping, true);
        transport.write(&message).await.unwrap();

        let (_, writer) = transport.into_split();
        assert_eq!(writer.writer, message.to_bytes());
    }

    #[tokio::test]
    async fn test_bad_signature() {
        let mut bytes = handshake_message().to_bytes();
        bytes[7] = 0xff;
        let mock_reader = MockIoBuilder::new().read(&bytes[..HEADER_SIZE]).build();
        let mut transport = AsyncLevinTransport::new(mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(result, Err(TransportError::Header(_))));
        assert!(result.unwrap_err().is_framing());
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_reading() {
        let header = Header {
            length: 1024,
            expects_response: false,
            command: Command::Handshake.id(),
            return_code: 0,
            flags: Flags::RESPONSE,
            protocol_version: 1,
        };
        // Only the header is available, the reader must not ask for more.
        let mock_reader = MockIoBuilder::new().read(&header.to_bytes()).build();
        let mut transport = AsyncLevinTransport::with_max_payload_size(mock_reader, Vec::new(), 512);

        let result = transport.read().await;
        assert!(matches!(
            result,
            Err(TransportError::PayloadTooLarge {
                length: 1024,
                max: 512
            })
        ));
    }

    #[tokio::test]
    async fn test_unexpected_eof_during_header() {
        let partial = SIGNATURE.to_le_bytes();
        let mock_reader = MockIoBuilder::new().read(&partial).build();
        let mut transport = AsyncLevinTransport::new(mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_unexpected_eof_during_payload() {
        let mut bytes = handshake_message().to_bytes();
        bytes.truncate(HEADER_SIZE + 2);
        let mock_reader = MockIoBuilder::new().read(&bytes).build();
        let mut transport = AsyncLevinTransport::new(mock_reader, Vec::new());

        let result = transport.read().await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_one_byte_at_a_time() {
        let message = handshake_message();
        let bytes = message.to_bytes();

        let mut mock_reader = MockIoBuilder::new();
        for i in 0..bytes.len() {
            mock_reader.read(&bytes[i..i + 1]);
        }
        let mut transport = AsyncLevinTransport::new(mock_reader.build(), Vec::new());

        assert_eq!(transport.read().await.unwrap(), message);
    }

    #[tokio::test]
    async fn test_multiple_messages() {
        let first = Message::request(Command::Ping, true);
        let second = handshake_message();
        let mut combined = first.to_bytes();
        combined.extend_from_slice(&second.to_bytes());

        let mock_reader = MockIoBuilder::new().read(&combined).build();
        let mut transport = AsyncLevinTransport::new(mock_reader, Vec::new());

        assert_eq!(transport.read().await.unwrap(), first);
        assert_eq!(transport.read().await.unwrap(), second);
    }
}
