use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Logical column types, keyed by the type byte of a column descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Currency,
    Float32,
    Float64,
    DateTime,
    Binary,
    Text,
    Ole,
    Memo,
    Guid,
    Numeric,
    Complex,
    Unknown(u8),
}

impl ColumnType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => ColumnType::Boolean,
            0x02 => ColumnType::Byte,
            0x03 => ColumnType::Int16,
            0x04 => ColumnType::Int32,
            0x05 => ColumnType::Currency,
            0x06 => ColumnType::Float32,
            0x07 => ColumnType::Float64,
            0x08 => ColumnType::DateTime,
            0x09 => ColumnType::Binary,
            0x0A => ColumnType::Text,
            0x0B => ColumnType::Ole,
            0x0C => ColumnType::Memo,
            0x0F => ColumnType::Guid,
            0x10 => ColumnType::Numeric,
            0x12 => ColumnType::Complex,
            0x13 => ColumnType::Int64,
            other => ColumnType::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ColumnType::Boolean => 0x01,
            ColumnType::Byte => 0x02,
            ColumnType::Int16 => 0x03,
            ColumnType::Int32 => 0x04,
            ColumnType::Currency => 0x05,
            ColumnType::Float32 => 0x06,
            ColumnType::Float64 => 0x07,
            ColumnType::DateTime => 0x08,
            ColumnType::Binary => 0x09,
            ColumnType::Text => 0x0A,
            ColumnType::Ole => 0x0B,
            ColumnType::Memo => 0x0C,
            ColumnType::Guid => 0x0F,
            ColumnType::Numeric => 0x10,
            ColumnType::Complex => 0x12,
            ColumnType::Int64 => 0x13,
            ColumnType::Unknown(code) => *code,
        }
    }

    /// Width in bytes of the stored value for fixed-width types.
    ///
    /// Booleans report zero: their value lives in the record's null mask.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ColumnType::Boolean => Some(0),
            ColumnType::Byte => Some(1),
            ColumnType::Int16 => Some(2),
            ColumnType::Int32 | ColumnType::Float32 | ColumnType::Complex => Some(4),
            ColumnType::Int64
            | ColumnType::Currency
            | ColumnType::Float64
            | ColumnType::DateTime => Some(8),
            ColumnType::Guid => Some(16),
            ColumnType::Numeric => Some(17),
            ColumnType::Binary
            | ColumnType::Text
            | ColumnType::Ole
            | ColumnType::Memo
            | ColumnType::Unknown(_) => None,
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Memo)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Unknown(code) => write!(f, "UNKNOWN(0x{:02x})", code),
            other => write!(f, "{}", format!("{:?}", other).to_uppercase()),
        }
    }
}

/// A decoded column value.
///
/// Currency and numeric columns decode to exact decimal text, GUIDs to their
/// hyphenated hex form and OLE objects to their raw stored bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Binary(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::DateTime(dt) => write!(f, "{}", dt),
        }
    }
}
