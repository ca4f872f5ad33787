use std::fmt::{Display, Formatter};
use std::ops::Range;

use itertools::Itertools;
use strata_error::{StrataResult, strata_bail};

/// A hyper-rectangular selection of an N-D array, one half-open range per axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    ranges: Vec<Range<usize>>,
}

impl Selection {
    /// Create a selection, rejecting empty or inverted ranges.
    pub fn try_new(ranges: Vec<Range<usize>>) -> StrataResult<Self> {
        if ranges.is_empty() {
            strata_bail!("a selection needs at least one axis");
        }
        if let Some((axis, range)) = ranges.iter().find_position(|r| r.start >= r.end) {
            strata_bail!("axis {} of selection has empty range {:?}", axis, range);
        }
        Ok(Self { ranges })
    }

    /// The selection covering an entire array of the given shape.
    pub fn full(shape: &[usize]) -> StrataResult<Self> {
        Self::try_new(shape.iter().map(|&extent| 0..extent).collect())
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn into_ranges(self) -> Vec<Range<usize>> {
        self.ranges
    }

    pub fn rank(&self) -> usize {
        self.ranges.len()
    }

    /// The extent of the selection along each axis.
    pub fn shape(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.end - r.start).collect()
    }

    pub fn num_elements(&self) -> usize {
        self.ranges.iter().map(|r| r.end - r.start).product()
    }

    /// Whether the selection lies entirely within an array of the given shape.
    pub fn is_within(&self, shape: &[usize]) -> bool {
        self.rank() == shape.len()
            && self
                .ranges
                .iter()
                .zip(shape)
                .all(|(range, &extent)| range.end <= extent)
    }

    /// Whether the two selections share no element.
    pub fn is_disjoint(&self, other: &Selection) -> bool {
        self.rank() != other.rank()
            || self
                .ranges
                .iter()
                .zip(&other.ranges)
                .any(|(a, b)| a.end <= b.start || b.end <= a.start)
    }
}

impl Display for Selection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.ranges
                .iter()
                .map(|r| format!("{}..{}", r.start, r.end))
                .format(", ")
        )
    }
}

/// Row-major strides, in elements, of an array with the given shape.
pub(crate) fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Visit the flat offset of the first element of every contiguous run of a selection.
///
/// A run spans the selection's last axis, so the callback receives `(array_offset, run_len)`
/// in row-major order.
pub(crate) fn for_each_run<F>(selection: &Selection, shape: &[usize], mut f: F) -> StrataResult<()>
where
    F: FnMut(usize, usize) -> StrataResult<()>,
{
    let strides = strides(shape);
    let ranges = selection.ranges();
    let last = ranges.len() - 1;
    let run_len = ranges[last].end - ranges[last].start;

    let mut index: Vec<usize> = ranges[..last].iter().map(|r| r.start).collect();
    loop {
        let offset = index
            .iter()
            .zip(&strides)
            .map(|(i, s)| i * s)
            .sum::<usize>()
            + ranges[last].start * strides[last];
        f(offset, run_len)?;

        // Odometer increment over the outer axes.
        let mut axis = last;
        loop {
            if axis == 0 {
                return Ok(());
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < ranges[axis].end {
                break;
            }
            index[axis] = ranges[axis].start;
        }
    }
}
