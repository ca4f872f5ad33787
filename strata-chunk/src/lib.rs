//! Bounded-memory export of large N-D numeric recordings.
//!
//! A [`ChunkPlan`] fixes the chunk shape of the backing storage and the buffer shape processed per
//! step. The [`ExportIterator`] then walks a [`NumericSource`] one buffer tile at a time, and a
//! [`TileWriter`] receives each tile exactly once.

pub use export::*;
pub use geometry::*;
pub use prefetch::*;
pub use selection::Selection;
pub use source::*;
pub use writer::*;

mod export;
pub mod geometry;
mod prefetch;
mod selection;
mod source;
mod writer;
