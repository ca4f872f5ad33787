//! Typed table cells for Strata.
//!
//! Every cell of the element and entity tables is a [`Value`]: either a [`ScalarValue`] or, for
//! ragged columns, a list of them. A [`ColumnSpec`] ties a column name to its [`strata_dtype::DType`]
//! and knows which value to back-fill when a row predates the column.

pub use column::*;
pub use pvalue::*;
pub use value::*;

mod column;
mod pvalue;
mod value;
