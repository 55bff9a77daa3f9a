//! Portable storage encoder.

use super::value::{Array, Section, Value, ValueType};
use super::StorageError;
use crate::varint;

pub(super) fn write_section(section: &Section, out: &mut Vec<u8>) -> Result<(), StorageError> {
    varint::write(section.len() as u64, out)?;
    for entry in section.entries() {
        let name = entry.name.as_bytes();
        if name.len() > u8::MAX as usize {
            return Err(StorageError::NameTooLong(name.len()));
        }
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out.push(entry.value.type_tag());
        write_value(&entry.value, out)?;
    }
    Ok(())
}

/// Write a value without its type tag.
fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), StorageError> {
    match value {
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt8(v) => out.push(*v),
        Value::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::String(bytes) => {
            varint::write(bytes.len() as u64, out)?;
            out.extend_from_slice(bytes);
        }
        Value::Object(section) => write_section(section, out)?,
        Value::Array(array) => write_array_body(array, out)?,
    }
    Ok(())
}

fn write_array_body(array: &Array, out: &mut Vec<u8>) -> Result<(), StorageError> {
    varint::write(array.len() as u64, out)?;
    for value in array {
        if array.element_type() == ValueType::Array {
            out.push(value.type_tag());
        }
        write_value(value, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_string_entry() {
        let section = Section::new().with("status", "OK");
        let mut out = Vec::new();
        write_section(&section, &mut out).unwrap();

        let mut expected = vec![0x04, 0x06];
        expected.extend_from_slice(b"status");
        expected.extend_from_slice(&[0x0a, 0x08]);
        expected.extend_from_slice(b"OK");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_write_object_array() {
        let section = Section::new().with(
            "l",
            Array::of_sections(vec![Section::new().with("b", false)]),
        );
        let mut out = Vec::new();
        write_section(&section, &mut out).unwrap();
        assert_eq!(
            out,
            vec![0x04, 0x01, b'l', 0x8c, 0x04, 0x04, 0x01, b'b', 0x0b, 0x00]
        );
    }
}
