use std::fmt::{Display, Formatter};
use std::sync::Arc;

use DType::*;

use crate::nullability::Nullability;
use crate::PType;

/// The logical types of table columns.
///
/// A column is either scalar (one value per row) or ragged, in which case every row holds a
/// variable-length list of scalars of the element type.
#[derive(Debug, Clone, PartialOrd, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DType {
    /// `true` or `false`
    Bool(Nullability),
    /// Fixed-width numbers
    Primitive(PType, Nullability),
    /// UTF-8 strings, used for names and labels
    Utf8(Nullability),
    /// A ragged column holding a list of `element` values per row
    List(Arc<DType>, Nullability),
}

impl DType {
    /// Whether cells of this type may be null
    pub fn is_nullable(&self) -> bool {
        match self {
            Bool(n) | Primitive(_, n) | Utf8(n) | List(_, n) => n.is_nullable(),
        }
    }

    /// The same type with the given nullability
    pub fn with_nullability(&self, nullability: Nullability) -> Self {
        match self {
            Bool(_) => Bool(nullability),
            Primitive(p, _) => Primitive(*p, nullability),
            Utf8(_) => Utf8(nullability),
            List(element, _) => List(element.clone(), nullability),
        }
    }

    /// The same type, allowing nulls
    pub fn as_nullable(&self) -> Self {
        self.with_nullability(Nullability::Nullable)
    }

    /// Whether a column of `self` can hold the cells of a column of `other`
    pub fn eq_ignore_nullability(&self, other: &Self) -> bool {
        self.as_nullable() == other.as_nullable()
    }

    /// A non-nullable ragged column of `element` values
    pub fn ragged(element: DType) -> Self {
        List(Arc::new(element), Nullability::NonNullable)
    }

    /// Whether every row holds a list of values
    pub fn is_ragged(&self) -> bool {
        matches!(self, List(..))
    }

    /// Get the element type if `self` is ragged, otherwise `None`
    pub fn element_dtype(&self) -> Option<&DType> {
        match self {
            List(element, _) => Some(element),
            _ => None,
        }
    }

    /// Get the PType if `self` is primitive, otherwise `None`
    pub fn as_ptype(&self) -> Option<PType> {
        match self {
            Primitive(p, _) => Some(*p),
            _ => None,
        }
    }

    /// Check if `self` is a floating point number
    pub fn is_float(&self) -> bool {
        self.as_ptype().is_some_and(PType::is_float)
    }

    /// Check if `self` is an integer (signed or unsigned)
    pub fn is_int(&self) -> bool {
        self.as_ptype().is_some_and(PType::is_int)
    }

    /// Check if `self` is a UTF-8 string
    pub fn is_utf8(&self) -> bool {
        matches!(self, Utf8(_))
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Bool(n) => write!(f, "bool{}", n),
            Primitive(pt, n) => write!(f, "{}{}", pt, n),
            Utf8(n) => write!(f, "utf8{}", n),
            List(edt, n) => write!(f, "list({}){}", edt, n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_exposes_element_type() {
        let dtype = DType::ragged(Primitive(PType::F64, Nullability::NonNullable));
        assert!(dtype.is_ragged());
        assert!(dtype.element_dtype().is_some_and(DType::is_float));
        assert_eq!(dtype.to_string(), "list(f64)");
    }

    #[test]
    fn nullability_is_ignored_on_request() {
        let a = Utf8(Nullability::Nullable);
        let b = Utf8(Nullability::NonNullable);
        assert_ne!(a, b);
        assert!(a.eq_ignore_nullability(&b));
        assert_eq!(a.to_string(), "utf8?");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_round_trip() {
        let dtype = DType::ragged(Primitive(PType::U64, Nullability::NonNullable));
        let json = serde_json::to_string(&dtype).unwrap();
        assert_eq!(serde_json::from_str::<DType>(&json).unwrap(), dtype);
    }
}
