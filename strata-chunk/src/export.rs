use bytes::Bytes;
use strata_dtype::{NativePType, decode_le};
use strata_error::{StrataError, StrataResult, strata_bail, strata_err};

use crate::geometry::{ChunkBudget, ChunkPlan};
use crate::selection::Selection;
use crate::source::NumericSource;

/// One buffer-shaped piece of an exported array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub selection: Selection,
    /// Raw little-endian values of the selection in row-major order.
    pub data: Bytes,
}

impl Tile {
    pub fn shape(&self) -> Vec<usize> {
        self.selection.shape()
    }

    pub fn num_elements(&self) -> usize {
        self.selection.num_elements()
    }

    /// Reinterpret the tile bytes as native values.
    pub fn decode<T: NativePType>(&self) -> StrataResult<Vec<T>> {
        let values = decode_le::<T>(&self.data)?;
        if values.len() != self.num_elements() {
            strata_bail!(
                "tile {} holds {} values, expected {}",
                self.selection,
                values.len(),
                self.num_elements()
            );
        }
        Ok(values)
    }
}

/// Streams a [`NumericSource`] one buffer tile at a time in row-major scan order.
///
/// Every call to `next` performs exactly one read of the source. Once a read fails the iterator
/// yields the error and then stops.
pub struct ExportIterator<S> {
    source: S,
    plan: ChunkPlan,
    next_tile: usize,
    num_tiles: usize,
    failed: bool,
}

impl<S: NumericSource> ExportIterator<S> {
    pub fn try_new(source: S, plan: ChunkPlan) -> StrataResult<Self> {
        if source.shape() != plan.full_shape() {
            strata_bail!(
                Geometry: "plan for shape {:?} cannot export a source of shape {:?}",
                plan.full_shape(),
                source.shape()
            );
        }
        if source.dtype_size() != plan.dtype_size() {
            strata_bail!(
                Geometry: "plan for {} byte elements cannot export a source of {} byte elements",
                plan.dtype_size(),
                source.dtype_size()
            );
        }

        let num_tiles = plan.num_tiles();
        log::debug!("exporting {} in {} tiles", plan, num_tiles);
        Ok(Self {
            source,
            plan,
            next_tile: 0,
            num_tiles,
            failed: false,
        })
    }

    /// Derive the plan from memory budgets and the shape of the source.
    pub fn from_budget(source: S, budget: &ChunkBudget) -> StrataResult<Self> {
        let plan = ChunkPlan::from_budget(source.shape().to_vec(), source.dtype_size(), budget)?;
        Self::try_new(source, plan)
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    fn read_tile(&self, selection: Selection) -> StrataResult<Tile> {
        let data = self
            .source
            .read(&selection)
            .map_err(|err| tag_read_error(err, &selection))?;

        let expected = selection.num_elements() * self.plan.dtype_size();
        if data.len() != expected {
            return Err(strata_err!(
                Read: selection.ranges().to_vec(),
                "source returned {} bytes, expected {}",
                data.len(),
                expected
            ));
        }
        Ok(Tile { selection, data })
    }
}

fn tag_read_error(err: StrataError, selection: &Selection) -> StrataError {
    if err.read_selection().is_some() {
        err
    } else {
        strata_err!(Read: selection.ranges().to_vec(), "{}", err)
    }
}

impl<S: NumericSource> Iterator for ExportIterator<S> {
    type Item = StrataResult<Tile>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next_tile >= self.num_tiles {
            return None;
        }

        let index = self.next_tile;
        self.next_tile += 1;

        let result = self
            .plan
            .tile_selection(index)
            .and_then(|selection| self.read_tile(selection));
        match &result {
            Ok(tile) => log::trace!("read tile {}/{} {}", index + 1, self.num_tiles, tile.selection),
            Err(err) => {
                log::debug!("export stopped at tile {}: {}", index, err);
                self.failed = true;
            }
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.failed {
            0
        } else {
            self.num_tiles - self.next_tile
        };
        (remaining, Some(remaining))
    }
}

impl<S: NumericSource> ExactSizeIterator for ExportIterator<S> {}

impl<S: NumericSource> std::iter::FusedIterator for ExportIterator<S> {}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rstest::rstest;
    use strata_dtype::encode_le;

    use super::*;
    use crate::source::ArraySource;

    fn iota(shape: &[usize]) -> ArraySource<u32> {
        let n: usize = shape.iter().product();
        let values: Vec<u32> = (0..n as u32).collect();
        ArraySource::try_new(shape.to_vec(), &values).unwrap()
    }

    struct CountingSource {
        inner: ArraySource<u32>,
        reads: Cell<usize>,
    }

    impl NumericSource for CountingSource {
        fn shape(&self) -> &[usize] {
            self.inner.shape()
        }

        fn dtype_size(&self) -> usize {
            4
        }

        fn read(&self, selection: &Selection) -> StrataResult<Bytes> {
            self.reads.set(self.reads.get() + 1);
            self.inner.read(selection)
        }
    }

    /// Returns one element less than asked for once past the first row of tiles.
    struct TruncatingSource {
        shape: Vec<usize>,
    }

    impl NumericSource for TruncatingSource {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn dtype_size(&self) -> usize {
            4
        }

        fn read(&self, selection: &Selection) -> StrataResult<Bytes> {
            let n = selection.num_elements();
            let n = if selection.ranges()[0].start > 0 { n - 1 } else { n };
            Ok(Bytes::from(encode_le(&vec![0u32; n])))
        }
    }

    #[rstest]
    #[case(vec![10, 7], vec![2, 3], vec![4, 3])]
    #[case(vec![9], vec![2], vec![4])]
    #[case(vec![5, 4, 3], vec![1, 2, 3], vec![2, 2, 3])]
    #[case(vec![6, 6], vec![6, 6], vec![6, 6])]
    fn tiles_partition_the_array(
        #[case] shape: Vec<usize>,
        #[case] chunk: Vec<usize>,
        #[case] buffer: Vec<usize>,
    ) {
        let plan = ChunkPlan::try_new(shape.clone(), chunk, buffer, 4).unwrap();
        let expected_reads = plan.num_tiles();
        let source = CountingSource {
            inner: iota(&shape),
            reads: Cell::new(0),
        };
        let iter = ExportIterator::try_new(&source, plan).unwrap();
        assert_eq!(iter.len(), expected_reads);

        let n: usize = shape.iter().product();
        let mut seen = vec![0u8; n];
        let mut tiles = Vec::new();
        for tile in iter {
            let tile = tile.unwrap();
            // Values are their own flat index, so decoding tells us what was covered.
            for value in tile.decode::<u32>().unwrap() {
                seen[value as usize] += 1;
            }
            tiles.push(tile.selection);
        }

        assert!(seen.iter().all(|&count| count == 1));
        assert_eq!(source.reads.get(), expected_reads);
        for (i, a) in tiles.iter().enumerate() {
            assert!(a.is_within(&shape));
            assert!(tiles[i + 1..].iter().all(|b| a.is_disjoint(b)));
        }
    }

    #[test]
    fn scan_order_is_row_major() {
        let plan = ChunkPlan::try_new(vec![4, 4], vec![2, 2], vec![2, 2], 4).unwrap();
        let starts: Vec<(usize, usize)> = ExportIterator::try_new(iota(&[4, 4]), plan)
            .unwrap()
            .map(|tile| {
                let tile = tile.unwrap();
                (tile.selection.ranges()[0].start, tile.selection.ranges()[1].start)
            })
            .collect();
        assert_eq!(starts, vec![(0, 0), (0, 2), (2, 0), (2, 2)]);
    }

    #[test]
    fn edge_tiles_are_clipped() {
        let plan = ChunkPlan::try_new(vec![5, 3], vec![2, 3], vec![4, 3], 4).unwrap();
        let shapes: Vec<Vec<usize>> = ExportIterator::try_new(iota(&[5, 3]), plan)
            .unwrap()
            .map(|tile| tile.unwrap().shape())
            .collect();
        assert_eq!(shapes, vec![vec![4, 3], vec![1, 3]]);
    }

    #[test]
    fn short_read_is_tagged_and_fuses() {
        let plan = ChunkPlan::try_new(vec![4, 2], vec![1, 2], vec![1, 2], 4).unwrap();
        let mut iter = ExportIterator::try_new(
            TruncatingSource {
                shape: vec![4, 2],
            },
            plan,
        )
        .unwrap();

        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.read_selection(), Some(&[1..2, 0..2][..]));
        assert!(iter.next().is_none());
        assert_eq!(iter.len(), 0);
    }

    #[test]
    fn source_failures_are_tagged_with_the_selection() {
        struct Failing;

        impl NumericSource for Failing {
            fn shape(&self) -> &[usize] {
                &[3]
            }

            fn dtype_size(&self) -> usize {
                8
            }

            fn read(&self, _selection: &Selection) -> StrataResult<Bytes> {
                Err(StrataError::from(std::io::Error::other("disk gone")))
            }
        }

        let plan = ChunkPlan::try_new(vec![3], vec![3], vec![3], 8).unwrap();
        let err = ExportIterator::try_new(Failing, plan)
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.read_selection(), Some(&[0..3][..]));
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn plan_must_match_source() {
        let plan = ChunkPlan::try_new(vec![4, 4], vec![2, 2], vec![2, 2], 8).unwrap();
        assert!(matches!(
            ExportIterator::try_new(iota(&[4, 4]), plan),
            Err(StrataError::Geometry(..))
        ));
    }

    #[test]
    fn from_budget_covers_the_array() {
        let source = iota(&[300, 10]);
        let budget = ChunkBudget {
            chunk_bytes: 400,
            buffer_bytes: 2_000,
        };
        let iter = ExportIterator::from_budget(&source, &budget).unwrap();
        let expected = iter.plan().num_tiles();
        let total: usize = iter.map(|tile| tile.unwrap().num_elements()).sum();
        assert_eq!(total, 3000);
        assert!(expected > 1);
    }
}
