use crate::{block::BlockAddress, error::EnvelopeError};
use chrono::{DateTime, Utc};

/// A dynamically-typed input value: the discriminated model the parse
/// dispatch runs over. Build one per shape, or convert JSON bytes through
/// [`Value::from_json`].
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    /// Absent value; becomes an Empty block
    Null,
    /// A first-class reference to an already-allocated block
    Address(BlockAddress),
    /// Text
    Str(String),
    /// An opaque byte string
    Bytes(Vec<u8>),
    /// True or false
    Bool(bool),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit unsigned integer
    U64(u64),
    /// Single-precision float; widens to f64 on parse
    F32(f32),
    /// Double-precision float
    F64(f64),
    /// A number of undeclared kind, as JSON carries them: parses as an Int
    /// when integer-valued, a Float otherwise
    Decimal(f64),
    /// A string-keyed mapping in iteration order
    Map(Vec<(String, Value)>),
    /// An introspected record: field name (or its rename) paired with the
    /// field value
    Record(Vec<(String, Value)>),
    /// A heterogeneous ordered sequence; children keyed 0..n, `A` clear
    Sequence(Vec<Value>),
    /// A typed ordered sequence; children keyed 0..n, `A` set
    Array(Vec<Value>),
    /// An optional referent: absent parses as Empty
    Reference(Option<Box<Value>>),
    /// A timestamp; the payload is reserved and currently parses as Empty
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Convert a pre-decoded JSON tree. Numbers come through as
    /// [`Value::Decimal`]; objects iterate in serde_json's sorted key order,
    /// so the conversion is deterministic.
    pub fn from_json(input: serde_json::Value) -> Result<Self, EnvelopeError> {
        Ok(match input {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => Value::Decimal(
                number
                    .as_f64()
                    .ok_or_else(|| EnvelopeError::unsupported_type(number.to_string()))?,
            ),
            serde_json::Value::String(value) => Value::Str(value),
            serde_json::Value::Array(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<Value>, EnvelopeError>>()?,
            ),
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, Value::from_json(value)?)))
                    .collect::<Result<Vec<(String, Value)>, EnvelopeError>>()?,
            ),
        })
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i8> for Value {
    fn from(value: i8) -> Self {
        Self::I8(value)
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Self::I16(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Self::U8(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::U16(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<BlockAddress> for Value {
    fn from(value: BlockAddress) -> Self {
        Self::Address(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}
