//! Dynamically typed values of the portable storage format.

use super::StorageError;
use std::fmt;

/// Bit set on a type tag to mark an array of the base type.
pub const ARRAY_FLAG: u8 = 0x80;

/// Base type of a portable storage value, as written in its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int64,
    Int32,
    Int16,
    Int8,
    UInt64,
    UInt32,
    UInt16,
    UInt8,
    Double,
    String,
    Bool,
    Object,
    /// Arrays nested inside arrays. Each element carries its own type tag.
    Array,
}

impl ValueType {
    /// The tag byte for this type, without the array flag.
    pub fn tag(self) -> u8 {
        match self {
            ValueType::Int64 => 0x01,
            ValueType::Int32 => 0x02,
            ValueType::Int16 => 0x03,
            ValueType::Int8 => 0x04,
            ValueType::UInt64 => 0x05,
            ValueType::UInt32 => 0x06,
            ValueType::UInt16 => 0x07,
            ValueType::UInt8 => 0x08,
            ValueType::Double => 0x09,
            ValueType::String => 0x0a,
            ValueType::Bool => 0x0b,
            ValueType::Object => 0x0c,
            ValueType::Array => 0x0d,
        }
    }

    /// Look up the base type for a tag byte with the array flag cleared.
    pub fn from_tag(tag: u8) -> Option<Self> {
        let ty = match tag {
            0x01 => ValueType::Int64,
            0x02 => ValueType::Int32,
            0x03 => ValueType::Int16,
            0x04 => ValueType::Int8,
            0x05 => ValueType::UInt64,
            0x06 => ValueType::UInt32,
            0x07 => ValueType::UInt16,
            0x08 => ValueType::UInt8,
            0x09 => ValueType::Double,
            0x0a => ValueType::String,
            0x0b => ValueType::Bool,
            0x0c => ValueType::Object,
            0x0d => ValueType::Array,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int64 => "int64",
            ValueType::Int32 => "int32",
            ValueType::Int16 => "int16",
            ValueType::Int8 => "int8",
            ValueType::UInt64 => "uint64",
            ValueType::UInt32 => "uint32",
            ValueType::UInt16 => "uint16",
            ValueType::UInt8 => "uint8",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Object => "object",
            ValueType::Array => "array",
        };
        f.write_str(name)
    }
}

/// A portable storage value.
///
/// Strings are raw byte strings on the wire. They frequently carry binary
/// data such as hashes and network ids, so no UTF-8 validation is done.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int64(i64),
    Int32(i32),
    Int16(i16),
    Int8(i8),
    UInt64(u64),
    UInt32(u32),
    UInt16(u16),
    UInt8(u8),
    Double(f64),
    String(Vec<u8>),
    Bool(bool),
    Object(Section),
    Array(Array),
}

impl Value {
    /// The base type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int64(_) => ValueType::Int64,
            Value::Int32(_) => ValueType::Int32,
            Value::Int16(_) => ValueType::Int16,
            Value::Int8(_) => ValueType::Int8,
            Value::UInt64(_) => ValueType::UInt64,
            Value::UInt32(_) => ValueType::UInt32,
            Value::UInt16(_) => ValueType::UInt16,
            Value::UInt8(_) => ValueType::UInt8,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Bool(_) => ValueType::Bool,
            Value::Object(_) => ValueType::Object,
            Value::Array(_) => ValueType::Array,
        }
    }

    /// The full type tag written ahead of this value in an entry.
    pub fn type_tag(&self) -> u8 {
        match self {
            Value::Array(array) => array.element_type().tag() | ARRAY_FLAG,
            other => other.value_type().tag(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Value::UInt8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::UInt16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Any unsigned integer widened to `u64`.
    ///
    /// Nodes are not always consistent about integer widths for the same
    /// field, so readers of optional metadata use this instead of the exact
    /// accessors.
    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Value::UInt8(v) => Some(*v as u64),
            Value::UInt16(v) => Some(*v as u64),
            Value::UInt32(v) => Some(*v as u64),
            Value::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// The string value, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_section(&self) -> Option<&Section> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.as_bytes().to_vec())
    }
}

impl From<Section> for Value {
    fn from(s: Section) -> Self {
        Value::Object(s)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

/// A homogeneous array of values.
///
/// The element type is declared once for the whole array, so every element
/// must share it. Construction enforces that.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    element_type: ValueType,
    values: Vec<Value>,
}

impl Array {
    /// Create an array, checking every value against `element_type`.
    ///
    /// # Errors
    ///
    /// [`StorageError::MixedArray`] if a value has a different type.
    pub fn new(element_type: ValueType, values: Vec<Value>) -> Result<Self, StorageError> {
        if let Some(bad) = values.iter().find(|v| v.value_type() != element_type) {
            return Err(StorageError::MixedArray {
                expected: element_type,
                found: bad.value_type(),
            });
        }
        Ok(Array {
            element_type,
            values,
        })
    }

    /// Array of objects, which cannot be mixed by construction.
    pub fn of_sections(sections: Vec<Section>) -> Self {
        Array {
            element_type: ValueType::Object,
            values: sections.into_iter().map(Value::Object).collect(),
        }
    }

    pub fn element_type(&self) -> ValueType {
        self.element_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// A named value inside a [`Section`].
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub value: Value,
}

impl Entry {
    pub fn new<S: Into<String>, V: Into<Value>>(name: S, value: V) -> Self {
        Entry {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An object: an ordered sequence of named entries.
///
/// Order is preserved so that a decoded section re-encodes to the same bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    entries: Vec<Entry>,
}

impl Section {
    pub fn new() -> Self {
        Section::default()
    }

    /// Append an entry, returning self for chaining.
    pub fn with<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.push(name, value);
        self
    }

    pub fn push<S: Into<String>, V: Into<Value>>(&mut self, name: S, value: V) {
        self.entries.push(Entry::new(name, value));
    }

    /// First entry value with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    /// First entry with the given name, if it is an object.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.get(name).and_then(Value::as_section)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Entry>> for Section {
    fn from(entries: Vec<Entry>) -> Self {
        Section { entries }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_value_from!(
    i64 => Int64,
    i32 => Int32,
    i16 => Int16,
    i8 => Int8,
    u64 => UInt64,
    u32 => UInt32,
    u16 => UInt16,
    u8 => UInt8,
    f64 => Double,
    bool => Bool,
    Vec<u8> => String,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup_is_inverse() {
        for tag in 0x01..=0x0d {
            let ty = ValueType::from_tag(tag).unwrap();
            assert_eq!(ty.tag(), tag);
        }
        assert_eq!(ValueType::from_tag(0x00), None);
        assert_eq!(ValueType::from_tag(0x0e), None);
    }

    #[test]
    fn test_array_type_tag() {
        let array = Array::new(ValueType::UInt32, vec![Value::UInt32(1)]).unwrap();
        assert_eq!(Value::Array(array).type_tag(), 0x86);
        assert_eq!(Value::Object(Section::new()).type_tag(), 0x0c);
    }

    #[test]
    fn test_mixed_array_rejected() {
        let err = Array::new(ValueType::UInt8, vec![Value::UInt8(1), Value::UInt16(2)]);
        assert!(matches!(
            err,
            Err(StorageError::MixedArray {
                expected: ValueType::UInt8,
                found: ValueType::UInt16
            })
        ));
    }

    #[test]
    fn test_checked_accessors() {
        let v = Value::UInt16(18080);
        assert_eq!(v.as_u16(), Some(18080));
        assert_eq!(v.as_u32(), None);
        assert_eq!(v.to_u64(), Some(18080));
        assert_eq!(Value::Int64(-1).to_u64(), None);
        assert_eq!(Value::from("OK").as_str(), Some("OK"));
        assert_eq!(Value::String(vec![0xff, 0xfe]).as_str(), None);
    }

    #[test]
    fn test_section_lookup_keeps_first() {
        let section = Section::new()
            .with("a", 1u8)
            .with("b", Section::new().with("c", true))
            .with("a", 2u8);
        assert_eq!(section.get("a"), Some(&Value::UInt8(1)));
        assert_eq!(
            section.section("b").and_then(|s| s.get("c")),
            Some(&Value::Bool(true))
        );
        assert_eq!(section.len(), 3);
    }
}
