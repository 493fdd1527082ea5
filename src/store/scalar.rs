use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::model::Timestamp;

/// A single value produced by a query: the content of its only row and only column.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bool(bool),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(Timestamp),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Integer(_) | Scalar::Float(_) | Scalar::Decimal(_))
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Decimal(value) => write!(f, "{}", value.normalize()),
            Scalar::Text(value) => f.write_str(value),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Uuid(value) => write!(f, "{value}"),
            Scalar::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Scalar::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
        }
    }
}
