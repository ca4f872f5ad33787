use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strata_dtype::DType;
use strata_error::{StrataResult, strata_err};

use crate::pvalue::PValue;

/// A single typed cell of a scalar column, or one element of a ragged cell.
///
/// Values are only meaningful together with the [`DType`] of the column they belong to, see
/// [`ScalarValue::is_instance_of`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarValue {
    Bool(bool),
    Primitive(PValue),
    Utf8(String),
    // Only valid for nullable dtypes.
    Null,
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn is_instance_of(&self, dtype: &DType) -> bool {
        match (self, dtype) {
            (ScalarValue::Bool(_), DType::Bool(_)) => true,
            (ScalarValue::Primitive(pvalue), DType::Primitive(ptype, _)) => {
                pvalue.is_instance_of(ptype)
            }
            (ScalarValue::Utf8(_), DType::Utf8(_)) => true,
            (ScalarValue::Null, dtype) => dtype.is_nullable(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> StrataResult<Option<bool>> {
        match self {
            ScalarValue::Null => Ok(None),
            ScalarValue::Bool(b) => Ok(Some(*b)),
            _ => Err(strata_err!("Expected a bool scalar, found {:?}", self)),
        }
    }

    pub fn as_pvalue(&self) -> StrataResult<Option<PValue>> {
        match self {
            ScalarValue::Null => Ok(None),
            ScalarValue::Primitive(p) => Ok(Some(*p)),
            _ => Err(strata_err!("Expected a primitive scalar, found {:?}", self)),
        }
    }

    pub fn as_str(&self) -> StrataResult<Option<&str>> {
        match self {
            ScalarValue::Null => Ok(None),
            ScalarValue::Utf8(s) => Ok(Some(s.as_str())),
            _ => Err(strata_err!("Expected a string scalar, found {:?}", self)),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl From<PValue> for ScalarValue {
    fn from(value: PValue) -> Self {
        ScalarValue::Primitive(value)
    }
}

macro_rules! scalar_from_native {
    ($($T:ty),*) => {
        $(
            impl From<$T> for ScalarValue {
                fn from(value: $T) -> Self {
                    ScalarValue::Primitive(PValue::from(value))
                }
            }

            impl From<$T> for Value {
                fn from(value: $T) -> Self {
                    Value::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_from_native!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, usize);

impl Display for ScalarValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Primitive(p) => write!(f, "{}", p),
            ScalarValue::Utf8(s) => {
                if s.len() > 20 {
                    let head: String = s.chars().take(10).collect();
                    write!(f, "\"{}..\"", head)
                } else {
                    write!(f, "\"{}\"", s)
                }
            }
            ScalarValue::Null => write!(f, "null"),
        }
    }
}

/// The content of one table cell: a scalar, or a variable-length list of scalars for ragged
/// columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Scalar(ScalarValue),
    Ragged(Vec<ScalarValue>),
}

impl Value {
    /// An empty ragged cell.
    pub fn empty_ragged() -> Self {
        Value::Ragged(Vec::new())
    }

    /// Build a ragged cell from native values.
    pub fn ragged_from<T, I>(values: I) -> Self
    where
        T: Into<ScalarValue>,
        I: IntoIterator<Item = T>,
    {
        Value::Ragged(values.into_iter().map(Into::into).collect())
    }

    pub fn is_instance_of(&self, dtype: &DType) -> bool {
        match (self, dtype) {
            (Value::Ragged(values), DType::List(element, _)) => {
                values.iter().all(|v| v.is_instance_of(element))
            }
            (Value::Scalar(ScalarValue::Null), DType::List(_, n)) => (*n).into(),
            (Value::Scalar(scalar), dtype) if !dtype.is_ragged() => scalar.is_instance_of(dtype),
            _ => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Ragged(_) => None,
        }
    }

    pub fn as_ragged(&self) -> Option<&[ScalarValue]> {
        match self {
            Value::Ragged(values) => Some(values),
            Value::Scalar(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(ScalarValue::Utf8(s)) => Some(s),
            _ => None,
        }
    }
}

impl From<ScalarValue> for Value {
    fn from(value: ScalarValue) -> Self {
        Value::Scalar(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Scalar(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(value.into())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Ragged(values) => write!(f, "[{}]", values.iter().format(", ")),
        }
    }
}

#[cfg(test)]
mod test {
    use strata_dtype::{Nullability, PType};

    use super::*;

    #[test]
    fn scalar_type_checks() {
        let f64_dtype = DType::Primitive(PType::F64, Nullability::NonNullable);
        assert!(ScalarValue::from(1.0f64).is_instance_of(&f64_dtype));
        assert!(!ScalarValue::from(1u32).is_instance_of(&f64_dtype));
        assert!(!ScalarValue::Null.is_instance_of(&f64_dtype));
        assert!(ScalarValue::Null.is_instance_of(&f64_dtype.as_nullable()));
    }

    #[test]
    fn ragged_type_checks() {
        let dtype = DType::ragged(DType::Primitive(PType::F64, Nullability::NonNullable));
        assert!(Value::ragged_from([0.1f64, 0.2]).is_instance_of(&dtype));
        assert!(Value::empty_ragged().is_instance_of(&dtype));
        assert!(!Value::from(0.1f64).is_instance_of(&dtype));
        assert!(!Value::ragged_from(["a"]).is_instance_of(&dtype));
    }

    #[test]
    fn display() {
        assert_eq!(Value::from("probe").to_string(), "\"probe\"");
        assert_eq!(Value::ragged_from([1u64, 2]).to_string(), "[1u64, 2u64]");
    }

    #[test]
    fn accessors() {
        assert_eq!(ScalarValue::from("x").as_str().unwrap(), Some("x"));
        assert!(ScalarValue::from(true).as_pvalue().is_err());
        assert_eq!(ScalarValue::Null.as_bool().unwrap(), None);
    }
}
