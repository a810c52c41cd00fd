//! Scalar values carried by record fields
//!
//! Only a fixed set of scalar types can be persisted. Everything else is
//! carried as [`Value::Opaque`] so it still shows up in the raw field list.

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A field value taken from an entity attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Any signed integer width
    Int(i64),
    /// Any unsigned integer width
    UInt(u64),
    Bool(bool),
    Text(String),
    /// Single precision float
    Float(f32),
    /// Double precision float
    Double(f64),
    Timestamp(DateTime<Utc>),
    /// A value of a type outside the persistable set, kept as its debug rendering
    Opaque(String),
}

impl Value {
    /// Wraps a value of a non-persistable type
    pub fn opaque(value: &dyn fmt::Debug) -> Self {
        Self::Opaque(format!("{:?}", value))
    }

    /// Returns true if the value's type is one the database driver accepts
    pub fn is_db_type(&self) -> bool {
        !matches!(self, Self::Opaque(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{:?}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Opaque(v) => write!(f, "<{}>", v),
        }
    }
}

/// Raised when a value cannot be bound as a statement parameter
#[derive(Debug, Error)]
pub enum BindError {
    #[error("unsigned value {0} does not fit a signed 64-bit column")]
    Overflow(u64),

    #[error("value {0} has no database representation")]
    Unsupported(String),
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Int(v) => Ok(ToSqlOutput::from(*v)),
            Self::UInt(v) => i64::try_from(*v).map(ToSqlOutput::from).map_err(|_| {
                rusqlite::Error::ToSqlConversionFailure(Box::new(BindError::Overflow(*v)))
            }),
            Self::Bool(v) => Ok(ToSqlOutput::from(*v)),
            Self::Text(v) => Ok(ToSqlOutput::from(v.as_str())),
            Self::Float(v) => Ok(ToSqlOutput::from(f64::from(*v))),
            Self::Double(v) => Ok(ToSqlOutput::from(*v)),
            Self::Timestamp(v) => Ok(ToSqlOutput::from(v.to_rfc3339())),
            Self::Opaque(v) => Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
                BindError::Unsupported(v.clone()),
            ))),
        }
    }
}

/// Conversion from an attribute's type into a field value
///
/// Implemented for the persistable scalar types, both by value and wrapped in
/// one level of `Option`. `None` maps to an absent value.
pub trait Column {
    fn to_value(&self) -> Option<Value>;
}

macro_rules! signed_column {
    ($($t:ty),*) => {
        $(impl Column for $t {
            fn to_value(&self) -> Option<Value> {
                Some(Value::Int(*self as i64))
            }
        })*
    };
}

macro_rules! unsigned_column {
    ($($t:ty),*) => {
        $(impl Column for $t {
            fn to_value(&self) -> Option<Value> {
                Some(Value::UInt(*self as u64))
            }
        })*
    };
}

signed_column!(i8, i16, i32, i64, isize);
unsigned_column!(u8, u16, u32, u64, usize);

impl Column for bool {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

impl Column for String {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Text(self.clone()))
    }
}

impl Column for &str {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Text((*self).to_string()))
    }
}

impl Column for f32 {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Float(*self))
    }
}

impl Column for f64 {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Double(*self))
    }
}

impl Column for DateTime<Utc> {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Timestamp(*self))
    }
}

impl<T: Column> Column for Option<T> {
    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(Column::to_value)
    }
}
