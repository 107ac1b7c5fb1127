// crates/plcsim-rs/src/address_space/value.rs

use crate::types::StatusCode;
use std::time::SystemTime;

/// Data types a variable can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int32,
    UInt32,
    Double,
    String,
    UInt32Array,
    Range,
    /// Accepts any value (used by folders and method nodes, which hold none).
    BaseDataType,
}

/// Represents any value that can be held by a variable node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Double(f64),
    String(String),
    UInt32Array(Vec<u32>),
    /// Engineering units range, stored in `EURange` properties.
    Range { low: f64, high: f64 },
}

impl Variant {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// True for scalar numbers, the only values a deadband can be applied to.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int32(_) | Self::UInt32(_) | Self::Double(_))
    }

    /// Widens a numeric scalar to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int32(v) => Some(f64::from(v)),
            Self::UInt32(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::UInt32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Self::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// The data type matching this value, `None` for `Empty`.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Self::Empty => return None,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::UInt32Array(_) => DataType::UInt32Array,
            Self::Range { .. } => DataType::Range,
        })
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u32>> for Variant {
    fn from(v: Vec<u32>) -> Self {
        Self::UInt32Array(v)
    }
}

/// A value together with its quality and the time it was produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: Option<SystemTime>,
}

impl DataValue {
    /// A good value stamped with the current time.
    pub fn new_now(value: impl Into<Variant>) -> Self {
        Self {
            value: value.into(),
            status: StatusCode::GOOD,
            source_timestamp: Some(SystemTime::now()),
        }
    }

    /// A value carrying only a status, as produced for failed reads.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            value: Variant::Empty,
            status,
            source_timestamp: Some(SystemTime::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Variant::UInt32(7).as_f64(), Some(7.0));
        assert_eq!(Variant::Int32(-3).as_f64(), Some(-3.0));
        assert_eq!(Variant::Boolean(true).as_f64(), None);
        assert!(!Variant::UInt32Array(vec![1]).is_numeric());
    }

    #[test]
    fn test_data_type_of_value() {
        assert_eq!(Variant::from(1.5).data_type(), Some(DataType::Double));
        assert_eq!(Variant::Empty.data_type(), None);
    }
}
