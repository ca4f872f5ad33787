use std::fmt::{Display, Formatter};

use strata_dtype::DType;
use strata_error::{StrataResult, strata_bail, strata_err};

use crate::{PValue, ScalarValue, Value};

/// The definition of one table column.
///
/// `null_value` is the caller's choice of fill for rows that predate the column. When it is
/// absent, [`ColumnSpec::resolve_null`] falls back to the null value policy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnSpec {
    name: String,
    description: String,
    dtype: DType,
    null_value: Option<Value>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            dtype,
            null_value: None,
        }
    }

    /// Supply an explicit fill value for back-filled rows.
    pub fn with_null_value(mut self, null_value: impl Into<Value>) -> StrataResult<Self> {
        let null_value = null_value.into();
        if !null_value.is_instance_of(&self.dtype) {
            strata_bail!(
                Schema: "null value {} of column {} is not a {}",
                null_value,
                self.name,
                self.dtype
            );
        }
        self.null_value = Some(null_value);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    pub fn is_ragged(&self) -> bool {
        self.dtype.is_ragged()
    }

    pub fn null_value(&self) -> Option<&Value> {
        self.null_value.as_ref()
    }

    /// The value used for rows that have no entry in this column.
    ///
    /// An explicit null value wins. Otherwise ragged columns use an empty list, strings the empty
    /// string, floats NaN, and nullable columns a null cell. Anything else cannot be inferred.
    pub fn resolve_null(&self) -> StrataResult<Value> {
        if let Some(null_value) = &self.null_value {
            return Ok(null_value.clone());
        }
        infer_null(&self.dtype).ok_or_else(|| {
            strata_err!(
                NullInference: "column {} of type {} needs an explicit null value",
                self.name,
                self.dtype
            )
        })
    }

    /// Check that `value` may be stored in this column.
    pub fn check_value(&self, value: &Value) -> StrataResult<()> {
        if !value.is_instance_of(&self.dtype) {
            strata_bail!(
                Schema: "value {} does not match type {} of column {}",
                value,
                self.dtype,
                self.name
            );
        }
        Ok(())
    }

    /// Whether this column can hold the same cells as `other`.
    pub fn is_compatible_with(&self, other: &ColumnSpec) -> bool {
        self.dtype.eq_ignore_nullability(&other.dtype)
    }
}

/// The null value policy for a dtype, without any caller input.
pub fn infer_null(dtype: &DType) -> Option<Value> {
    match dtype {
        DType::List(..) => Some(Value::empty_ragged()),
        DType::Utf8(_) => Some(Value::Scalar(ScalarValue::Utf8(String::new()))),
        DType::Primitive(ptype, _) if ptype.is_float() => {
            PValue::nan_of(*ptype).map(|nan| Value::Scalar(ScalarValue::Primitive(nan)))
        }
        dtype if dtype.is_nullable() => Some(Value::Scalar(ScalarValue::Null)),
        _ => None,
    }
}

impl Display for ColumnSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.dtype)
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use strata_dtype::{Nullability, PType};

    use super::*;

    fn prim(ptype: PType) -> DType {
        DType::Primitive(ptype, Nullability::NonNullable)
    }

    #[rstest]
    #[case(DType::Utf8(Nullability::NonNullable), Value::from(""))]
    #[case(prim(PType::F64), Value::from(f64::NAN))]
    #[case(prim(PType::F32), Value::from(f32::NAN))]
    #[case(DType::ragged(prim(PType::U64)), Value::empty_ragged())]
    #[case(prim(PType::I32).as_nullable(), Value::Scalar(ScalarValue::Null))]
    #[case(DType::Bool(Nullability::Nullable), Value::Scalar(ScalarValue::Null))]
    fn inferred_nulls(#[case] dtype: DType, #[case] expected: Value) {
        let spec = ColumnSpec::new("c", "", dtype);
        assert_eq!(spec.resolve_null().unwrap(), expected);
    }

    #[rstest]
    #[case(prim(PType::I64))]
    #[case(DType::Bool(Nullability::NonNullable))]
    fn uninferrable_nulls_fail(#[case] dtype: DType) {
        let spec = ColumnSpec::new("count", "", dtype);
        assert!(matches!(
            spec.resolve_null(),
            Err(strata_error::StrataError::NullInference(..))
        ));
    }

    #[test]
    fn explicit_null_wins() {
        let spec = ColumnSpec::new("count", "", prim(PType::I64))
            .with_null_value(-1i64)
            .unwrap();
        assert_eq!(spec.resolve_null().unwrap(), Value::from(-1i64));
    }

    #[test]
    fn explicit_null_must_match_dtype() {
        assert!(
            ColumnSpec::new("count", "", prim(PType::I64))
                .with_null_value("none")
                .is_err()
        );
    }
}
