//! Fixed size levin header.
//!
//! ```text
//! offset  size  field
//!      0     8  signature        01 21 01 01 01 01 01 01
//!      8     8  payload length   u64 little-endian
//!     16     1  expects response 0 or 1
//!     17     4  command          u32 little-endian
//!     21     4  return code      i32 little-endian
//!     25     4  flags            u32 little-endian
//!     29     4  protocol version u32 little-endian
//! ```

use std::fmt;

/// Magic value every levin frame begins with.
pub const SIGNATURE: u64 = 0x0101_0101_0101_2101;
/// Size of an encoded header in bytes.
pub const HEADER_SIZE: usize = 33;
/// Largest payload accepted by default.
///
/// Same ceiling a monero node applies to a single levin packet.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 100_000_000;
/// Largest payload accepted from a peer that has not completed a handshake.
///
/// Monero nodes apply this ceiling before a connection is established. A
/// handshake response with a full peer list stays well below it.
pub const MAX_HANDSHAKE_PAYLOAD_SIZE: u64 = 256 * 1024;

/// Protocol version written in frames this crate builds.
pub const PROTOCOL_VERSION_0: u32 = 0;
/// Protocol version written by current monero nodes.
pub const PROTOCOL_VERSION_1: u32 = 1;

/// Return code of a successful response.
pub const RETURN_OK: i32 = 0;

/// Packet flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u32);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Frame is a request.
    pub const REQUEST: Flags = Flags(0x01);
    /// Frame is a response to a request.
    pub const RESPONSE: Flags = Flags(0x02);
    /// First frame of a fragmented message.
    pub const START_FRAGMENT: Flags = Flags(0x04);
    /// Last frame of a fragmented message.
    pub const END_FRAGMENT: Flags = Flags(0x08);

    pub fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Flags::REQUEST, "request"),
            (Flags::RESPONSE, "response"),
            (Flags::START_FRAGMENT, "start"),
            (Flags::END_FRAGMENT, "end"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Errors parsing a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// The frame does not start with [`SIGNATURE`].
    BadSignature(u64),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::BadSignature(sig) => {
                write!(f, "bad levin signature {sig:#018x}")
            }
        }
    }
}

impl std::error::Error for HeaderError {}

/// A decoded levin header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Exact number of payload bytes following the header.
    pub length: u64,
    /// Whether the sender waits for a response.
    pub expects_response: bool,
    /// Raw command id, see [`super::Command`].
    pub command: u32,
    /// Status of a response, negative on failure.
    pub return_code: i32,
    pub flags: Flags,
    pub protocol_version: u32,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&SIGNATURE.to_le_bytes());
        out[8..16].copy_from_slice(&self.length.to_le_bytes());
        out[16] = u8::from(self.expects_response);
        out[17..21].copy_from_slice(&self.command.to_le_bytes());
        out[21..25].copy_from_slice(&self.return_code.to_le_bytes());
        out[25..29].copy_from_slice(&self.flags.bits().to_le_bytes());
        out[29..33].copy_from_slice(&self.protocol_version.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, HeaderError> {
        let signature = u64::from_le_bytes(le_field(bytes, 0));
        if signature != SIGNATURE {
            return Err(HeaderError::BadSignature(signature));
        }

        Ok(Header {
            length: u64::from_le_bytes(le_field(bytes, 8)),
            expects_response: bytes[16] != 0,
            command: u32::from_le_bytes(le_field(bytes, 17)),
            return_code: i32::from_le_bytes(le_field(bytes, 21)),
            flags: Flags::from_bits(u32::from_le_bytes(le_field(bytes, 25))),
            protocol_version: u32::from_le_bytes(le_field(bytes, 29)),
        })
    }

    pub fn is_request(&self) -> bool {
        self.flags.contains(Flags::REQUEST)
    }

    pub fn is_response(&self) -> bool {
        self.flags.contains(Flags::RESPONSE)
    }
}

fn le_field<const N: usize>(bytes: &[u8; HEADER_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
