//! Positional bind values for statements.
//!
//! A [`QueryParam`] is a backend-neutral value; `bind_params` attaches a list
//! of them to a prepared query, narrowing each to the parameter type the
//! server declared for it.

use crate::error::{DbError, DbResult};
use sqlx::query::Query;
use sqlx::{Database, Encode, Type, TypeInfo};

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for QueryParam {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&String> for QueryParam {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for QueryParam {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A parameter narrowed to the wire type the prepared statement expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Coerced<'a> {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

/// Narrow `param` to the parameter type the server declared for it.
///
/// Servers that describe parameter types (PostgreSQL) reject a binary value
/// whose width differs from the declared type, so an `Int` bound to an
/// `INT4` slot must go out as 4 bytes. Without a declared type, values go out
/// in their widest form.
pub(crate) fn coerce<'a>(param: &'a QueryParam, target: Option<&str>) -> DbResult<Coerced<'a>> {
    let target = target.map(str::to_ascii_uppercase);
    let coerced = match (param, target.as_deref()) {
        (QueryParam::Null, _) => Coerced::Null,
        (QueryParam::Bool(v), _) => Coerced::Bool(*v),
        (QueryParam::Int(v), Some("INT2" | "SMALLINT")) => {
            Coerced::I16(i16::try_from(*v).map_err(|_| out_of_range(*v, "INT2"))?)
        }
        (QueryParam::Int(v), Some("INT4" | "INT" | "INTEGER")) => {
            Coerced::I32(i32::try_from(*v).map_err(|_| out_of_range(*v, "INT4"))?)
        }
        (QueryParam::Int(v), Some("FLOAT4" | "REAL")) => Coerced::F32(*v as f32),
        (QueryParam::Int(v), Some("FLOAT8" | "DOUBLE PRECISION")) => Coerced::F64(*v as f64),
        (QueryParam::Int(v), _) => Coerced::I64(*v),
        (QueryParam::Float(v), Some("FLOAT4" | "REAL")) => Coerced::F32(*v as f32),
        (QueryParam::Float(v), _) => Coerced::F64(*v),
        (QueryParam::String(v), _) => Coerced::Str(v),
        (QueryParam::Bytes(v), _) => Coerced::Bytes(v),
    };
    Ok(coerced)
}

fn out_of_range(value: i64, target: &str) -> DbError {
    DbError::Binding {
        message: format!("{} does not fit in a {} parameter", value, target),
    }
}

/// Bind `args` to a prepared query of any supported backend, narrowing each
/// to the matching entry of `targets` when the backend declared one.
pub(crate) fn bind_params<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    args: &'q [QueryParam],
    targets: &[<DB as Database>::TypeInfo],
) -> DbResult<Query<'q, DB, <DB as Database>::Arguments<'q>>>
where
    DB: Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i16: Encode<'q, DB> + Type<DB>,
    i32: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f32: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    &'q [u8]: Encode<'q, DB> + Type<DB>,
{
    for (position, param) in args.iter().enumerate() {
        let target = targets.get(position).map(TypeInfo::name);
        query = match coerce(param, target)? {
            Coerced::Null => query.bind(None::<String>),
            Coerced::Bool(v) => query.bind(v),
            Coerced::I16(v) => query.bind(v),
            Coerced::I32(v) => query.bind(v),
            Coerced::I64(v) => query.bind(v),
            Coerced::F32(v) => query.bind(v),
            Coerced::F64(v) => query.bind(v),
            Coerced::Str(v) => query.bind(v),
            Coerced::Bytes(v) => query.bind(v),
        };
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(QueryParam::from(7_i32), QueryParam::Int(7));
        assert_eq!(QueryParam::from(7_u32), QueryParam::Int(7));
        assert_eq!(QueryParam::from("abc"), QueryParam::String("abc".into()));
        assert_eq!(QueryParam::from(true), QueryParam::Bool(true));
        assert_eq!(QueryParam::from(vec![1_u8, 2]), QueryParam::Bytes(vec![1, 2]));
    }

    #[test]
    fn test_option_maps_none_to_null() {
        assert!(QueryParam::from(None::<i64>).is_null());
        assert_eq!(QueryParam::from(Some(3_i64)), QueryParam::Int(3));
    }

    #[test]
    fn test_int_narrowed_to_declared_width() {
        let param = QueryParam::Int(42);
        assert_eq!(coerce(&param, Some("INT2")).unwrap(), Coerced::I16(42));
        assert_eq!(coerce(&param, Some("INT4")).unwrap(), Coerced::I32(42));
        assert_eq!(coerce(&param, Some("int8")).unwrap(), Coerced::I64(42));
        assert_eq!(coerce(&param, Some("FLOAT4")).unwrap(), Coerced::F32(42.0));
        assert_eq!(coerce(&param, None).unwrap(), Coerced::I64(42));
    }

    #[test]
    fn test_float_narrowed_to_real() {
        let param = QueryParam::Float(2.5);
        assert_eq!(coerce(&param, Some("FLOAT4")).unwrap(), Coerced::F32(2.5));
        assert_eq!(coerce(&param, Some("FLOAT8")).unwrap(), Coerced::F64(2.5));
    }

    #[test]
    fn test_int_out_of_range_is_binding_error() {
        let err = coerce(&QueryParam::Int(i64::from(i32::MAX) + 1), Some("INT4")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Binding);
    }

    #[test]
    fn test_untyped_values_pass_through() {
        let text = QueryParam::from("abc");
        assert_eq!(coerce(&text, Some("TEXT")).unwrap(), Coerced::Str("abc"));
        assert_eq!(coerce(&QueryParam::Null, Some("INT4")).unwrap(), Coerced::Null);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(QueryParam::Null.type_name(), "null");
        assert_eq!(QueryParam::Float(1.5).type_name(), "float");
        assert_eq!(QueryParam::Bytes(Vec::new()).type_name(), "bytes");
    }
}
