//! Portable storage, the self-describing binary format carried in levin payloads.
//!
//! A blob is a fixed 9 byte preamble followed by one root [`Section`].
//!
//! ```text
//! preamble   01 11 01 01 | 01 01 02 01 | 01
//! section    varint(count) entry*
//! entry      u8(name_len) name type_tag value
//! ```
//!
//! Scalars are fixed width little-endian. Strings are a varint length and raw
//! bytes. Arrays set [`ARRAY_FLAG`] on the element type tag and are followed
//! by a varint count and the bare element encodings.
//!
//! # Example
//!
//! ```
//! use monero_peers_connection::storage::{PortableStorage, Section};
//!
//! let storage = PortableStorage::new(
//!     Section::new()
//!         .with("status", "OK")
//!         .with("peer_id", 42u64),
//! );
//! let bytes = storage.to_bytes().unwrap();
//! let decoded = PortableStorage::from_bytes(&bytes).unwrap();
//! assert_eq!(decoded, storage);
//! ```

mod reader;
mod value;
mod writer;

pub use reader::Reader;
pub use value::{Array, Entry, Section, Value, ValueType, ARRAY_FLAG};

use crate::varint::VarIntError;
use std::fmt;

/// First preamble signature, `0x01011101` little-endian.
pub const SIGNATURE_A: u32 = 0x0101_1101;
/// Second preamble signature, `0x01020101` little-endian.
pub const SIGNATURE_B: u32 = 0x0102_0101;
/// Format version following the signatures.
pub const FORMAT_VERSION: u8 = 1;
/// Length of the preamble.
pub const PREAMBLE_SIZE: usize = 9;
/// Maximum nesting of objects and arrays accepted while decoding.
pub const MAX_DEPTH: usize = 100;

/// Errors from encoding or decoding portable storage.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// First preamble signature did not match.
    BadSignatureA(u32),
    /// Second preamble signature did not match.
    BadSignatureB(u32),
    /// Format version did not match.
    BadVersion(u8),
    /// Input ended before a value was complete.
    Truncated { needed: usize, available: usize },
    /// Varint length or count could not be read or written.
    VarInt(VarIntError),
    /// Type tag is not part of the format.
    UnknownType(u8),
    /// Objects and arrays are nested deeper than [`MAX_DEPTH`].
    DepthExceeded,
    /// A count claims more elements than the remaining input could hold.
    CountTooLarge { count: u64, remaining: usize },
    /// Entry names are length-prefixed by a single byte.
    NameTooLong(usize),
    /// Entry name is not valid UTF-8.
    InvalidName,
    /// Array values do not all share the declared element type.
    MixedArray {
        expected: ValueType,
        found: ValueType,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::BadSignatureA(sig) => {
                write!(f, "bad portable storage signature A: {sig:#010x}")
            }
            StorageError::BadSignatureB(sig) => {
                write!(f, "bad portable storage signature B: {sig:#010x}")
            }
            StorageError::BadVersion(v) => write!(f, "unsupported portable storage version {v}"),
            StorageError::Truncated { needed, available } => {
                write!(f, "truncated input, needed {needed} bytes but {available} remain")
            }
            StorageError::VarInt(e) => write!(f, "varint error: {e}"),
            StorageError::UnknownType(tag) => write!(f, "unknown type tag {tag:#04x}"),
            StorageError::DepthExceeded => {
                write!(f, "nesting deeper than {MAX_DEPTH} levels")
            }
            StorageError::CountTooLarge { count, remaining } => {
                write!(f, "count {count} exceeds the {remaining} remaining bytes")
            }
            StorageError::NameTooLong(len) => {
                write!(f, "entry name of {len} bytes exceeds 255")
            }
            StorageError::InvalidName => write!(f, "entry name is not valid UTF-8"),
            StorageError::MixedArray { expected, found } => {
                write!(f, "array of {expected} contains a {found}")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::VarInt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VarIntError> for StorageError {
    fn from(e: VarIntError) -> Self {
        match e {
            VarIntError::Truncated { needed, available } => {
                StorageError::Truncated { needed, available }
            }
            other => StorageError::VarInt(other),
        }
    }
}

/// A complete portable storage blob.
///
/// Owns its whole entry tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortableStorage {
    pub root: Section,
}

impl PortableStorage {
    pub fn new(root: Section) -> Self {
        PortableStorage { root }
    }

    /// Serialize the preamble and root section.
    ///
    /// # Errors
    ///
    /// Fails if an entry name is longer than 255 bytes, a length or count
    /// needs the unsupported 8 byte varint width, or an array is mixed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&SIGNATURE_A.to_le_bytes());
        out.extend_from_slice(&SIGNATURE_B.to_le_bytes());
        out.push(FORMAT_VERSION);
        writer::write_section(&self.root, &mut out)?;
        Ok(out)
    }

    /// Deserialize a blob, checking the preamble first.
    ///
    /// Bytes after the root section are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let mut reader = Reader::new(bytes);

        let sig_a = u32::from_le_bytes(reader.read_array()?);
        if sig_a != SIGNATURE_A {
            return Err(StorageError::BadSignatureA(sig_a));
        }
        let sig_b = u32::from_le_bytes(reader.read_array()?);
        if sig_b != SIGNATURE_B {
            return Err(StorageError::BadSignatureB(sig_b));
        }
        let version = reader.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(StorageError::BadVersion(version));
        }

        let root = reader.read_section()?;
        Ok(PortableStorage { root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PortableStorage {
        let peer = Section::new().with(
            "adr",
            Section::new().with("type", 1u8).with(
                "addr",
                Section::new()
                    .with("m_ip", 0x0403_0201u32)
                    .with("m_port", 18080u16),
            ),
        );
        PortableStorage::new(
            Section::new()
                .with("i64", -5i64)
                .with("i32", -4i32)
                .with("i16", -3i16)
                .with("i8", -2i8)
                .with("u64", u64::MAX)
                .with("u32", 7u32)
                .with("u16", 8u16)
                .with("u8", 9u8)
                .with("double", 1.5f64)
                .with("bool", true)
                .with("string", vec![0u8, 1, 2, 0xff])
                .with("empty", Section::new())
                .with(
                    "ids",
                    Array::new(
                        ValueType::UInt64,
                        vec![Value::UInt64(1), Value::UInt64(2)],
                    )
                    .unwrap(),
                )
                .with(
                    "names",
                    Array::new(ValueType::String, vec!["a".into(), "bc".into()]).unwrap(),
                )
                .with("peers", Array::of_sections(vec![peer.clone(), peer]))
                .with(
                    "nested",
                    Array::new(
                        ValueType::Array,
                        vec![Value::Array(
                            Array::new(ValueType::Bool, vec![Value::Bool(false)]).unwrap(),
                        )],
                    )
                    .unwrap(),
                ),
        )
    }

    #[test]
    fn test_round_trip() {
        let storage = sample();
        let bytes = storage.to_bytes().unwrap();
        assert_eq!(PortableStorage::from_bytes(&bytes).unwrap(), storage);
    }

    #[test]
    fn test_empty_storage_bytes() {
        let bytes = PortableStorage::default().to_bytes().unwrap();
        assert_eq!(
            bytes,
            vec![0x01, 0x11, 0x01, 0x01, 0x01, 0x01, 0x02, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn test_scalar_entry_bytes() {
        let storage = PortableStorage::new(Section::new().with("p", 18080u16));
        let bytes = storage.to_bytes().unwrap();
        assert_eq!(
            &bytes[PREAMBLE_SIZE..],
            &[0x04, 0x01, b'p', 0x07, 0xa0, 0x46]
        );
    }

    #[test]
    fn test_array_elements_have_no_tag() {
        let array = Array::new(ValueType::UInt8, vec![Value::UInt8(1), Value::UInt8(2)]).unwrap();
        let storage = PortableStorage::new(Section::new().with("a", array));
        let bytes = storage.to_bytes().unwrap();
        assert_eq!(
            &bytes[PREAMBLE_SIZE..],
            &[0x04, 0x01, b'a', 0x88, 0x08, 0x01, 0x02]
        );
    }

    #[test]
    fn test_bad_preamble() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = 0x02;
        assert!(matches!(
            PortableStorage::from_bytes(&bytes),
            Err(StorageError::BadSignatureA(_))
        ));

        let mut bytes = sample().to_bytes().unwrap();
        bytes[6] = 0x03;
        assert!(matches!(
            PortableStorage::from_bytes(&bytes),
            Err(StorageError::BadSignatureB(_))
        ));

        let mut bytes = sample().to_bytes().unwrap();
        bytes[8] = 0x02;
        assert_eq!(
            PortableStorage::from_bytes(&bytes),
            Err(StorageError::BadVersion(2))
        );
    }

    #[test]
    fn test_unknown_type_tag() {
        let mut bytes = PortableStorage::new(Section::new().with("x", 1u8))
            .to_bytes()
            .unwrap();
        // Type tag follows count, name length and name.
        bytes[PREAMBLE_SIZE + 3] = 0x0e;
        assert_eq!(
            PortableStorage::from_bytes(&bytes),
            Err(StorageError::UnknownType(0x0e))
        );
    }

    #[test]
    fn test_every_truncation_fails() {
        let bytes = sample().to_bytes().unwrap();
        for len in 0..bytes.len() {
            assert!(
                PortableStorage::from_bytes(&bytes[..len]).is_err(),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn test_mutated_input_never_panics() {
        let bytes = sample().to_bytes().unwrap();
        // Deterministic xorshift so failures are reproducible.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..2000 {
            let mut mutated = bytes.clone();
            for _ in 0..(next() % 4 + 1) {
                let i = (next() as usize) % mutated.len();
                mutated[i] = next() as u8;
            }
            let cut = (next() as usize) % (mutated.len() + 1);
            mutated.truncate(cut.max(PREAMBLE_SIZE));
            let _ = PortableStorage::from_bytes(&mutated);
        }
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let mut section = Section::new();
        for _ in 0..(MAX_DEPTH + 5) {
            section = Section::new().with("o", section);
        }
        let bytes = PortableStorage::new(section).to_bytes().unwrap();
        assert_eq!(
            PortableStorage::from_bytes(&bytes),
            Err(StorageError::DepthExceeded)
        );
    }

    #[test]
    fn test_name_too_long() {
        let name = "n".repeat(256);
        let storage = PortableStorage::new(Section::new().with(name, 1u8));
        assert_eq!(storage.to_bytes(), Err(StorageError::NameTooLong(256)));
    }
}
