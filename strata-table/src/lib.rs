//! Append-only wide tables reconciled from independent sources.
//!
//! Sources hand rows to a table as [`Batch`]es. The [`TableEngine`] matches every row to the
//! table by its [`VirtualId`], appends the rows it has not seen, and grows the table with the
//! extra columns of the batch, back-filling older rows with the column's null. The element and
//! entity tables are typed fronts over the engine.

pub use batch::*;
pub use config::*;
pub use element::*;
pub use engine::*;
pub use entity::*;
pub use group::*;
pub use identity::*;
pub use plan::*;
pub use store::*;

mod batch;
mod config;
mod element;
mod engine;
mod entity;
mod group;
mod identity;
mod plan;
mod store;
