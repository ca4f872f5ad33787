#![cfg(target_endian = "little")]
#![deny(missing_docs)]

//! A type system for Strata tables and recordings
//!
//! This crate contains the logical types of table columns (scalar or ragged) and the native
//! primitive types that chunked recordings are made of.

pub use dtype::*;
pub use nullability::*;
pub use ptype::*;

mod dtype;
mod nullability;
mod ptype;
