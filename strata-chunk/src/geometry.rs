//! Chunk and buffer geometry for exporting N-D recordings.
//!
//! The chunk shape is a hint for the physical layout of the backing storage, the buffer shape is
//! the unit of work of the [`crate::ExportIterator`]. Buffers are always a whole number of chunks
//! along every axis so that a writer never has to split a chunk across two iterations.

use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strata_error::{StrataResult, strata_bail, strata_err};

use crate::selection::Selection;

/// Maximum chunk width along the last ("fast", usually channel) axis.
pub const FAST_AXIS_CAP: usize = 64;

/// Memory budgets used to derive a [`ChunkPlan`] when no explicit shapes are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChunkBudget {
    /// Target size of one chunk, in bytes.
    pub chunk_bytes: usize,
    /// Upper bound on the size of one in-memory buffer, in bytes.
    pub buffer_bytes: usize,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            chunk_bytes: 10_000_000,
            buffer_bytes: 1_000_000_000,
        }
    }
}

fn validate_shape(full_shape: &[usize], dtype_size: usize) -> StrataResult<()> {
    if full_shape.is_empty() {
        strata_bail!(Geometry: "cannot chunk an array of rank 0");
    }
    if let Some((axis, _)) = full_shape.iter().find_position(|&&extent| extent == 0) {
        strata_bail!(Geometry: "axis {} of shape {:?} has zero extent", axis, full_shape);
    }
    if dtype_size == 0 {
        strata_bail!(Geometry: "element size must be positive");
    }
    Ok(())
}

fn checked_bytes(shape: &[usize], dtype_size: usize) -> StrataResult<usize> {
    shape
        .iter()
        .try_fold(dtype_size, |acc, &extent| acc.checked_mul(extent))
        .ok_or_else(|| strata_err!(Geometry: "byte size of shape {:?} overflows", shape))
}

/// Compute the chunk shape of an array from a chunk size target.
///
/// The last axis is capped at [`FAST_AXIS_CAP`]. Intermediate axes, innermost first, keep as
/// much of their extent as the budget left by the inner axes allows, which may be a partial
/// extent. The first axis absorbs the rest of the budget. Every axis is clamped to `[1, extent]`.
pub fn compute_chunk_shape(
    full_shape: &[usize],
    dtype_size: usize,
    target_chunk_bytes: usize,
) -> StrataResult<Vec<usize>> {
    validate_shape(full_shape, dtype_size)?;
    if target_chunk_bytes == 0 {
        strata_bail!(Geometry: "target chunk size must be positive");
    }

    let rank = full_shape.len();
    if rank == 1 {
        return Ok(vec![(target_chunk_bytes / dtype_size).clamp(1, full_shape[0])]);
    }

    let mut chunk_shape = vec![1; rank];
    let last = rank - 1;
    chunk_shape[last] = full_shape[last].min(FAST_AXIS_CAP);

    let mut inner_bytes = dtype_size * chunk_shape[last];
    for axis in (1..last).rev() {
        chunk_shape[axis] = (target_chunk_bytes / inner_bytes).clamp(1, full_shape[axis]);
        inner_bytes = inner_bytes.saturating_mul(chunk_shape[axis]);
    }
    chunk_shape[0] = (target_chunk_bytes / inner_bytes).clamp(1, full_shape[0]);

    log::debug!(
        "chunk shape {:?} for array {:?} with {} byte elements and {} byte target",
        chunk_shape,
        full_shape,
        dtype_size,
        target_chunk_bytes
    );
    Ok(chunk_shape)
}

/// Compute the buffer shape of an array given its chunk shape and a memory budget.
///
/// Each axis of the result is a multiple of the chunk along that axis and no larger than the
/// array. The budget is shared between axes, starting with those that have the fewest chunks
/// so that budget left over by short axes flows to the long ones.
pub fn compute_buffer_shape(
    full_shape: &[usize],
    chunk_shape: &[usize],
    dtype_size: usize,
    target_buffer_bytes: usize,
) -> StrataResult<Vec<usize>> {
    validate_shape(full_shape, dtype_size)?;
    validate_chunk_shape(full_shape, chunk_shape)?;
    if target_buffer_bytes == 0 {
        strata_bail!(Geometry: "target buffer size must be positive");
    }

    let chunk_bytes = checked_bytes(chunk_shape, dtype_size)?;
    if target_buffer_bytes < chunk_bytes {
        strata_bail!(
            Geometry: "buffer budget of {} bytes is smaller than one {:?} chunk of {} bytes",
            target_buffer_bytes,
            chunk_shape,
            chunk_bytes
        );
    }

    // Number of whole chunks that fit along each axis.
    let max_chunks: Vec<usize> = full_shape
        .iter()
        .zip(chunk_shape)
        .map(|(extent, chunk)| extent / chunk)
        .collect();

    let fits_entirely = checked_bytes(full_shape, dtype_size)
        .map(|bytes| bytes <= target_buffer_bytes)
        .unwrap_or(false);

    let factors = if fits_entirely {
        max_chunks.clone()
    } else {
        share_budget(&max_chunks, target_buffer_bytes / chunk_bytes)
    };

    let buffer_shape: Vec<usize> = factors
        .iter()
        .zip(chunk_shape)
        .map(|(factor, chunk)| factor * chunk)
        .collect();

    log::debug!(
        "buffer shape {:?} for array {:?} with chunk {:?} and {} byte budget",
        buffer_shape,
        full_shape,
        chunk_shape,
        target_buffer_bytes
    );
    Ok(buffer_shape)
}

/// Split `budget_chunks` multiplicatively over the axes, never exceeding `max_chunks` on an axis
/// and never going below one chunk.
fn share_budget(max_chunks: &[usize], budget_chunks: usize) -> Vec<usize> {
    let mut factors = vec![1; max_chunks.len()];
    let mut remaining = budget_chunks.max(1);

    let order = (0..max_chunks.len()).sorted_by_key(|&axis| (max_chunks[axis], axis));
    for (position, axis) in order.enumerate() {
        let axes_left = u32::try_from(max_chunks.len() - position).unwrap_or(u32::MAX);
        let share = integer_root(remaining, axes_left).max(1);
        factors[axis] = share.min(max_chunks[axis]);
        remaining = (remaining / factors[axis]).max(1);
    }
    factors
}

/// The largest `r` such that `r^n <= value`.
fn integer_root(value: usize, n: u32) -> usize {
    if n <= 1 || value <= 1 {
        return value;
    }
    let exceeds = |r: usize| r.checked_pow(n).is_none_or(|p| p > value);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut root = (value as f64).powf(1.0 / f64::from(n)) as usize;
    while root > 0 && exceeds(root) {
        root -= 1;
    }
    while !exceeds(root + 1) {
        root += 1;
    }
    root
}

fn validate_chunk_shape(full_shape: &[usize], chunk_shape: &[usize]) -> StrataResult<()> {
    if chunk_shape.len() != full_shape.len() {
        strata_bail!(
            Geometry: "chunk shape {:?} does not match rank of array {:?}",
            chunk_shape,
            full_shape
        );
    }
    for (axis, (&chunk, &extent)) in chunk_shape.iter().zip(full_shape).enumerate() {
        if chunk == 0 || chunk > extent {
            strata_bail!(
                Geometry: "chunk extent {} on axis {} must be within 1..={}",
                chunk,
                axis,
                extent
            );
        }
    }
    Ok(())
}

/// The geometry used to export one array: its shape, chunk shape and buffer shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    full_shape: Vec<usize>,
    chunk_shape: Vec<usize>,
    buffer_shape: Vec<usize>,
    dtype_size: usize,
}

impl ChunkPlan {
    /// Validate explicitly chosen chunk and buffer shapes.
    pub fn try_new(
        full_shape: Vec<usize>,
        chunk_shape: Vec<usize>,
        buffer_shape: Vec<usize>,
        dtype_size: usize,
    ) -> StrataResult<Self> {
        validate_shape(&full_shape, dtype_size)?;
        validate_chunk_shape(&full_shape, &chunk_shape)?;
        if buffer_shape.len() != full_shape.len() {
            strata_bail!(
                Geometry: "buffer shape {:?} does not match rank of array {:?}",
                buffer_shape,
                full_shape
            );
        }
        for axis in 0..full_shape.len() {
            let (buffer, chunk, extent) = (buffer_shape[axis], chunk_shape[axis], full_shape[axis]);
            if buffer == 0 || buffer % chunk != 0 {
                strata_bail!(
                    Geometry: "buffer extent {} on axis {} is not a multiple of chunk extent {}",
                    buffer,
                    axis,
                    chunk
                );
            }
            if buffer > extent {
                strata_bail!(
                    Geometry: "buffer extent {} on axis {} exceeds array extent {}",
                    buffer,
                    axis,
                    extent
                );
            }
        }
        checked_bytes(&chunk_shape, dtype_size)?;
        checked_bytes(&buffer_shape, dtype_size)?;
        Ok(Self {
            full_shape,
            chunk_shape,
            buffer_shape,
            dtype_size,
        })
    }

    /// Derive both shapes from memory budgets.
    pub fn from_budget(
        full_shape: Vec<usize>,
        dtype_size: usize,
        budget: &ChunkBudget,
    ) -> StrataResult<Self> {
        let chunk_shape = compute_chunk_shape(&full_shape, dtype_size, budget.chunk_bytes)?;
        Self::from_chunk_shape(full_shape, chunk_shape, dtype_size, budget.buffer_bytes)
    }

    /// Use an explicit chunk shape and derive the buffer shape from a memory budget.
    pub fn from_chunk_shape(
        full_shape: Vec<usize>,
        chunk_shape: Vec<usize>,
        dtype_size: usize,
        buffer_bytes: usize,
    ) -> StrataResult<Self> {
        let buffer_shape =
            compute_buffer_shape(&full_shape, &chunk_shape, dtype_size, buffer_bytes)?;
        Self::try_new(full_shape, chunk_shape, buffer_shape, dtype_size)
    }

    pub fn full_shape(&self) -> &[usize] {
        &self.full_shape
    }

    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunk_shape
    }

    pub fn buffer_shape(&self) -> &[usize] {
        &self.buffer_shape
    }

    pub fn dtype_size(&self) -> usize {
        self.dtype_size
    }

    pub fn rank(&self) -> usize {
        self.full_shape.len()
    }

    /// Bytes in one full chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_shape.iter().product::<usize>() * self.dtype_size
    }

    /// Bytes in one full buffer.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_shape.iter().product::<usize>() * self.dtype_size
    }

    /// Number of buffer tiles along each axis.
    pub fn tile_grid(&self) -> Vec<usize> {
        self.full_shape
            .iter()
            .zip(&self.buffer_shape)
            .map(|(extent, buffer)| extent.div_ceil(*buffer))
            .collect()
    }

    /// Total number of buffer tiles, i.e. the number of reads of a full export.
    pub fn num_tiles(&self) -> usize {
        self.tile_grid().iter().product()
    }

    /// The selection of the `index`-th tile in row-major scan order, clipped to the array.
    pub fn tile_selection(&self, index: usize) -> StrataResult<Selection> {
        let grid = self.tile_grid();
        let num_tiles: usize = grid.iter().product();
        if index >= num_tiles {
            strata_bail!(OutOfBounds: index, 0, num_tiles);
        }

        let mut ranges = vec![0..0; self.rank()];
        let mut rest = index;
        for axis in (0..self.rank()).rev() {
            let position = rest % grid[axis];
            rest /= grid[axis];
            let start = position * self.buffer_shape[axis];
            let end = (start + self.buffer_shape[axis]).min(self.full_shape[axis]);
            ranges[axis] = start..end;
        }
        Selection::try_new(ranges)
    }
}

impl Display for ChunkPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChunkPlan(shape=[{}], chunk=[{}], buffer=[{}], {} byte elements)",
            self.full_shape.iter().format(", "),
            self.chunk_shape.iter().format(", "),
            self.buffer_shape.iter().format(", "),
            self.dtype_size
        )
    }
}
