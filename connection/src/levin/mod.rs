//! Levin, the framing protocol of the monero p2p network.
//!
//! Every message is a fixed [`HEADER_SIZE`] byte [`Header`] followed by exactly
//! `length` payload bytes. Admin commands either carry a portable storage blob
//! or, for the simplest requests, a bare payload.

mod header;

pub use header::{
    Flags, Header, HeaderError, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, MAX_HANDSHAKE_PAYLOAD_SIZE,
    PROTOCOL_VERSION_0, PROTOCOL_VERSION_1, RETURN_OK, SIGNATURE,
};

use crate::storage::{PortableStorage, StorageError};
use std::fmt;

/// P2P admin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Handshake,
    TimedSync,
    Ping,
    Stat,
    NetworkState,
    PeerId,
    SupportFlags,
}

impl Command {
    pub fn id(self) -> u32 {
        match self {
            Command::Handshake => 0x1001,
            Command::TimedSync => 0x1002,
            Command::Ping => 0x1003,
            Command::Stat => 0x1004,
            Command::NetworkState => 0x1005,
            Command::PeerId => 0x1006,
            Command::SupportFlags => 0x1007,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        let command = match id {
            0x1001 => Command::Handshake,
            0x1002 => Command::TimedSync,
            0x1003 => Command::Ping,
            0x1004 => Command::Stat,
            0x1005 => Command::NetworkState,
            0x1006 => Command::PeerId,
            0x1007 => Command::SupportFlags,
            _ => return None,
        };
        Some(command)
    }

    /// ASCII name, also used as the payload of legacy debug requests.
    pub fn name(self) -> &'static str {
        match self {
            Command::Handshake => "handshake",
            Command::TimedSync => "timed_sync",
            Command::Ping => "ping",
            Command::Stat => "stat",
            Command::NetworkState => "network_state",
            Command::PeerId => "peer_id",
            Command::SupportFlags => "support_flags",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), self.id())
    }
}

/// A complete levin frame.
///
/// Constructors keep `header.length` equal to the payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    payload: Vec<u8>,
}

impl Message {
    /// A request with an empty payload.
    pub fn request(command: Command, expects_response: bool) -> Self {
        Self::request_with_payload(command, expects_response, Vec::new())
    }

    /// A request carrying the command name as a legacy debug payload.
    pub fn legacy_request(command: Command, expects_response: bool) -> Self {
        Self::request_with_payload(command, expects_response, command.name().as_bytes().to_vec())
    }

    /// A request carrying a portable storage payload.
    pub fn storage_request(
        command: Command,
        expects_response: bool,
        storage: &PortableStorage,
    ) -> Result<Self, StorageError> {
        Ok(Self::request_with_payload(
            command,
            expects_response,
            storage.to_bytes()?,
        ))
    }

    /// A response to `command` carrying a portable storage payload.
    pub fn storage_response(
        command: u32,
        return_code: i32,
        storage: &PortableStorage,
    ) -> Result<Self, StorageError> {
        let payload = storage.to_bytes()?;
        Ok(Message {
            header: Header {
                length: payload.len() as u64,
                expects_response: false,
                command,
                return_code,
                flags: Flags::RESPONSE,
                protocol_version: PROTOCOL_VERSION_0,
            },
            payload,
        })
    }

    fn request_with_payload(command: Command, expects_response: bool, payload: Vec<u8>) -> Self {
        Message {
            header: Header {
                length: payload.len() as u64,
                expects_response,
                command: command.id(),
                return_code: RETURN_OK,
                flags: Flags::REQUEST,
                protocol_version: PROTOCOL_VERSION_0,
            },
            payload,
        }
    }

    /// Pair a header read off the wire with its payload.
    ///
    /// Returns `None` if the payload length does not match the header.
    pub fn from_parts(header: Header, payload: Vec<u8>) -> Option<Self> {
        if header.length != payload.len() as u64 {
            return None;
        }
        Some(Message { header, payload })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The command, if it is one this crate knows.
    pub fn command(&self) -> Option<Command> {
        Command::from_id(self.header.command)
    }

    /// Decode the payload as portable storage.
    pub fn storage(&self) -> Result<PortableStorage, StorageError> {
        PortableStorage::from_bytes(&self.payload)
    }

    /// Header bytes followed by the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command() {
            Some(command) => write!(f, "{command}")?,
            None => write!(f, "unknown ({:#06x})", self.header.command)?,
        }
        write!(
            f,
            " [{}] {} bytes, return code {}",
            self.header.flags,
            self.payload.len(),
            self.header.return_code
        )
    }
}
