//! Cursor based decoder for portable storage.

use super::value::{Array, Entry, Section, Value, ValueType, ARRAY_FLAG};
use super::{StorageError, MAX_DEPTH};
use crate::varint;

/// Decoder which owns its read position over a borrowed buffer.
///
/// Every read either advances the cursor past a complete value or returns an
/// error, so input straight off the network can be fed in directly.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    /// Current offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], StorageError> {
        let available = self.remaining();
        if n > available {
            return Err(StorageError::Truncated {
                needed: n,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StorageError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, StorageError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_varint(&mut self) -> Result<u64, StorageError> {
        let (consumed, value) = varint::decode(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a count and check it against the remaining input.
    ///
    /// Every element takes at least `min_size` bytes, so anything larger is
    /// rejected before allocating.
    fn read_count(&mut self, min_size: usize) -> Result<usize, StorageError> {
        let count = self.read_varint()?;
        let remaining = self.remaining();
        if count.saturating_mul(min_size as u64) > remaining as u64 {
            return Err(StorageError::CountTooLarge { count, remaining });
        }
        Ok(count as usize)
    }

    fn descend(&mut self) -> Result<(), StorageError> {
        if self.depth >= MAX_DEPTH {
            return Err(StorageError::DepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    /// Read a varint entry count followed by that many entries.
    pub fn read_section(&mut self) -> Result<Section, StorageError> {
        self.descend()?;
        // Smallest entry is a one byte name, its tag and a one byte value.
        let count = self.read_count(3)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(self.read_entry()?);
        }
        self.depth -= 1;
        Ok(Section::from(entries))
    }

    fn read_entry(&mut self) -> Result<Entry, StorageError> {
        let name_len = self.read_u8()? as usize;
        let name = std::str::from_utf8(self.read_bytes(name_len)?)
            .map_err(|_| StorageError::InvalidName)?
            .to_string();
        let tag = self.read_u8()?;
        let value = self.read_tagged(tag)?;
        Ok(Entry { name, value })
    }

    /// Read a value whose full type tag has already been consumed.
    fn read_tagged(&mut self, tag: u8) -> Result<Value, StorageError> {
        let base = ValueType::from_tag(tag & !ARRAY_FLAG).ok_or(StorageError::UnknownType(tag))?;
        if tag & ARRAY_FLAG != 0 {
            Ok(Value::Array(self.read_array_body(base)?))
        } else if base == ValueType::Array {
            // An array only exists with the flag set on its element type.
            Err(StorageError::UnknownType(tag))
        } else {
            self.read_value(base)
        }
    }

    fn read_array_body(&mut self, element_type: ValueType) -> Result<Array, StorageError> {
        self.descend()?;
        let count = self.read_count(min_encoded_size(element_type))?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match element_type {
                // Nested arrays declare their own element type.
                ValueType::Array => {
                    let tag = self.read_u8()?;
                    if tag & ARRAY_FLAG == 0 {
                        return Err(StorageError::UnknownType(tag));
                    }
                    self.read_tagged(tag)?
                }
                other => self.read_value(other)?,
            };
            values.push(value);
        }
        self.depth -= 1;
        Array::new(element_type, values)
    }

    fn read_value(&mut self, ty: ValueType) -> Result<Value, StorageError> {
        let value = match ty {
            ValueType::Int64 => Value::Int64(i64::from_le_bytes(self.read_array()?)),
            ValueType::Int32 => Value::Int32(i32::from_le_bytes(self.read_array()?)),
            ValueType::Int16 => Value::Int16(i16::from_le_bytes(self.read_array()?)),
            ValueType::Int8 => Value::Int8(i8::from_le_bytes(self.read_array()?)),
            ValueType::UInt64 => Value::UInt64(u64::from_le_bytes(self.read_array()?)),
            ValueType::UInt32 => Value::UInt32(u32::from_le_bytes(self.read_array()?)),
            ValueType::UInt16 => Value::UInt16(u16::from_le_bytes(self.read_array()?)),
            ValueType::UInt8 => Value::UInt8(self.read_u8()?),
            ValueType::Double => Value::Double(f64::from_le_bytes(self.read_array()?)),
            ValueType::Bool => Value::Bool(self.read_u8()? != 0),
            ValueType::String => {
                let len = self.read_count(1)?;
                Value::String(self.read_bytes(len)?.to_vec())
            }
            ValueType::Object => Value::Object(self.read_section()?),
            ValueType::Array => return Err(StorageError::UnknownType(ty.tag())),
        };
        Ok(value)
    }
}

/// Fewest bytes a single array element of this type can take.
fn min_encoded_size(ty: ValueType) -> usize {
    match ty {
        ValueType::Int64 | ValueType::UInt64 | ValueType::Double => 8,
        ValueType::Int32 | ValueType::UInt32 => 4,
        ValueType::Int16 | ValueType::UInt16 => 2,
        // Strings and objects take at least their one byte varint.
        ValueType::Int8
        | ValueType::UInt8
        | ValueType::Bool
        | ValueType::String
        | ValueType::Object => 1,
        // Tag plus count.
        ValueType::Array => 2,
    }
}
