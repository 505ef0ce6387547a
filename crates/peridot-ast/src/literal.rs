//! SQL literal values.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A SQL literal as it appears in generated queries.
///
/// Temporal values are kept in their textual form (`2024-01-31`) because
/// the generator produces them from the server's own output and the
/// oracles only ever re-emit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Date(String),
    Time(String),
    Datetime(String),
}

/// Coarse literal buckets used by EET to pick an identity rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Null,
    Bool,
    Numeric,
    String,
    Date,
    Time,
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn kind(&self) -> LiteralKind {
        match self {
            Literal::Null => LiteralKind::Null,
            Literal::Bool(_) => LiteralKind::Bool,
            Literal::Int(_) | Literal::Uint(_) | Literal::Float(_) => LiteralKind::Numeric,
            Literal::Str(_) => LiteralKind::String,
            Literal::Date(_) | Literal::Datetime(_) => LiteralKind::Date,
            Literal::Time(_) => LiteralKind::Time,
        }
    }

    /// Renders the literal as a SQL fragment. Strings double embedded
    /// single quotes; backslashes are doubled as well because MySQL
    /// treats them as escape introducers by default.
    pub fn sql(&self) -> String {
        self.to_string()
    }
}

fn quote_str(s: &str, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    out.write_str("'")?;
    for ch in s.chars() {
        match ch {
            '\'' => out.write_str("''")?,
            '\\' => out.write_str("\\\\")?,
            _ => write!(out, "{ch}")?,
        }
    }
    out.write_str("'")
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Bool(true) => f.write_str("TRUE"),
            Literal::Bool(false) => f.write_str("FALSE"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Uint(v) => write!(f, "{v}"),
            Literal::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Literal::Str(s) => quote_str(s, f),
            Literal::Date(s) | Literal::Time(s) | Literal::Datetime(s) => quote_str(s, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Literal::Null, "NULL")]
    #[test_case(Literal::Bool(true), "TRUE")]
    #[test_case(Literal::Int(-7), "-7")]
    #[test_case(Literal::Uint(18_446_744_073_709_551_615), "18446744073709551615")]
    #[test_case(Literal::Float(2.0), "2.0")]
    #[test_case(Literal::Str("a'b".into()), "'a''b'" ; "quote_escape")]
    #[test_case(Literal::Str("a\\b".into()), "'a\\\\b'" ; "backslash_escape")]
    #[test_case(Literal::Date("2024-01-31".into()), "'2024-01-31'")]
    fn renders(lit: Literal, want: &str) {
        assert_eq!(lit.sql(), want);
    }

    #[test]
    fn kinds() {
        assert_eq!(Literal::Int(1).kind(), LiteralKind::Numeric);
        assert_eq!(Literal::Float(1.5).kind(), LiteralKind::Numeric);
        assert_eq!(Literal::Str(String::new()).kind(), LiteralKind::String);
        assert_eq!(Literal::Datetime("2024-01-01 00:00:00".into()).kind(), LiteralKind::Date);
        assert_eq!(Literal::Null.kind(), LiteralKind::Null);
    }
}
