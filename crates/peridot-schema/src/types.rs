//! SQL column types and the coarse categories oracles reason with.

use serde::{Deserialize, Serialize};

/// Declared SQL column type, MySQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Bool,
    Float,
    Double,
    Decimal,
    Char,
    Varchar,
    Text,
    Blob,
    Date,
    Time,
    Datetime,
    Timestamp,
    Year,
    Json,
    Enum,
    Set,
    Bit,
}

/// Coarse type buckets used for join-key pairing and predicate folding.
///
/// Integers and booleans share a bucket (MySQL treats BOOL as TINYINT);
/// the string bucket covers CHAR/VARCHAR/TEXT; date and time types share
/// a bucket because they compare through implicit temporal coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    String,
    Temporal,
    Json,
    Binary,
    Other,
}

impl DataType {
    pub fn category(self) -> TypeCategory {
        match self {
            DataType::TinyInt
            | DataType::SmallInt
            | DataType::MediumInt
            | DataType::Int
            | DataType::BigInt
            | DataType::Bool
            | DataType::Bit
            | DataType::Year => TypeCategory::Integer,
            DataType::Float | DataType::Double => TypeCategory::Float,
            DataType::Decimal => TypeCategory::Decimal,
            DataType::Char | DataType::Varchar | DataType::Text => TypeCategory::String,
            DataType::Date | DataType::Time | DataType::Datetime | DataType::Timestamp => {
                TypeCategory::Temporal
            }
            DataType::Json => TypeCategory::Json,
            DataType::Blob => TypeCategory::Binary,
            DataType::Enum | DataType::Set => TypeCategory::Other,
        }
    }

    /// Whether two columns of these types can be equi-joined without a
    /// lossy coercion. Used by CERT when it synthesizes join keys.
    pub fn join_compatible(self, other: DataType) -> bool {
        use TypeCategory::{Decimal, Float, Integer, String, Temporal};
        let (a, b) = (self.category(), other.category());
        match (a, b) {
            (Integer, Integer) | (String, String) | (Temporal, Temporal) => true,
            // Numeric widening is fine in either direction.
            (Integer | Float | Decimal, Integer | Float | Decimal) => true,
            _ => false,
        }
    }

    /// Whether values of this type survive a round-trip through the text
    /// protocol without precision hazards. Floats and doubles do not.
    pub fn text_roundtrip_safe(self) -> bool {
        !matches!(self, DataType::Float | DataType::Double)
    }
}
