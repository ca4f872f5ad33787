use std::fmt::{Display, Formatter};

/// Whether the cells of a column may be left without a value.
///
/// A nullable column is back-filled with a null cell when no better null value can be inferred
/// for its type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Nullability {
    /// Every cell holds a value
    #[default]
    NonNullable,
    /// Cells may be null
    Nullable,
}

impl Nullability {
    /// Whether null cells are allowed
    pub fn is_nullable(self) -> bool {
        self == Self::Nullable
    }
}

impl From<bool> for Nullability {
    fn from(nullable: bool) -> Self {
        if nullable {
            Self::Nullable
        } else {
            Self::NonNullable
        }
    }
}

impl From<Nullability> for bool {
    fn from(nullability: Nullability) -> Self {
        nullability.is_nullable()
    }
}

/// Nullable types print with a trailing `?`, e.g. `f64?`.
impl Display for Nullability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_nullable() {
            f.write_str("?")
        } else {
            Ok(())
        }
    }
}
