//! Variable width integers used for lengths and counts in portable storage.
//!
//! The two low bits of the first byte select the width of the whole integer.
//!
//! * `00` - 1 byte, values `0..=63`.
//! * `01` - 2 bytes, values `0..=16_383`.
//! * `10` - 4 bytes, values `0..=1_073_741_823`.
//! * `11` - 8 bytes, defined on the wire but not supported here.
//!
//! The value sits in the remaining high bits, read as a little-endian integer
//! shifted right by two.

use std::fmt;

/// Largest value which fits the 1 byte width.
pub const MAX_ONE_BYTE: u64 = (1 << 6) - 1;
/// Largest value which fits the 2 byte width.
pub const MAX_TWO_BYTES: u64 = (1 << 14) - 1;
/// Largest value which fits the 4 byte width, and the largest supported value.
pub const MAX_FOUR_BYTES: u64 = (1 << 30) - 1;

const WIDTH_MASK: u8 = 0b11;
const WIDTH_ONE_BYTE: u8 = 0b00;
const WIDTH_TWO_BYTES: u8 = 0b01;
const WIDTH_FOUR_BYTES: u8 = 0b10;

/// Errors from encoding or decoding a varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Value needs the 8 byte width, which is not implemented.
    TooLarge(u64),
    /// Encoded value uses the 8 byte width, which is not implemented.
    UnsupportedWidth,
    /// Buffer ended before the full width could be read.
    Truncated { needed: usize, available: usize },
}

impl fmt::Display for VarIntError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarIntError::TooLarge(n) => {
                write!(f, "varint value {n} exceeds maximum of {MAX_FOUR_BYTES}")
            }
            VarIntError::UnsupportedWidth => {
                write!(f, "8 byte varint width is not implemented")
            }
            VarIntError::Truncated { needed, available } => {
                write!(f, "varint needs {needed} bytes, only {available} available")
            }
        }
    }
}

impl std::error::Error for VarIntError {}

/// Number of bytes the canonical encoding of `n` occupies.
pub fn encoded_len(n: u64) -> Result<usize, VarIntError> {
    if n <= MAX_ONE_BYTE {
        Ok(1)
    } else if n <= MAX_TWO_BYTES {
        Ok(2)
    } else if n <= MAX_FOUR_BYTES {
        Ok(4)
    } else {
        Err(VarIntError::TooLarge(n))
    }
}

/// Append the canonical (smallest width) encoding of `n` to `out`.
pub fn write(n: u64, out: &mut Vec<u8>) -> Result<(), VarIntError> {
    match encoded_len(n)? {
        1 => out.push(((n as u8) << 2) | WIDTH_ONE_BYTE),
        2 => out.extend_from_slice(&(((n as u16) << 2) | WIDTH_TWO_BYTES as u16).to_le_bytes()),
        _ => out.extend_from_slice(&(((n as u32) << 2) | WIDTH_FOUR_BYTES as u32).to_le_bytes()),
    }
    Ok(())
}

/// Canonical encoding of `n`.
///
/// # Errors
///
/// [`VarIntError::TooLarge`] if `n` would need the unsupported 8 byte width.
pub fn encode(n: u64) -> Result<Vec<u8>, VarIntError> {
    let mut out = Vec::with_capacity(4);
    write(n, &mut out)?;
    Ok(out)
}

/// Decode a varint from the front of `bytes`.
///
/// Non-minimal widths are accepted.
///
/// # Returns
///
/// A tuple of the number of bytes consumed and the decoded value.
pub fn decode(bytes: &[u8]) -> Result<(usize, u64), VarIntError> {
    let first = *bytes.first().ok_or(VarIntError::Truncated {
        needed: 1,
        available: 0,
    })?;

    let width = match first & WIDTH_MASK {
        WIDTH_ONE_BYTE => 1,
        WIDTH_TWO_BYTES => 2,
        WIDTH_FOUR_BYTES => 4,
        _ => return Err(VarIntError::UnsupportedWidth),
    };

    let raw = bytes.get(..width).ok_or(VarIntError::Truncated {
        needed: width,
        available: bytes.len(),
    })?;

    let mut le = [0u8; 4];
    le[..width].copy_from_slice(raw);
    Ok((width, (u32::from_le_bytes(le) >> 2) as u64))
}
