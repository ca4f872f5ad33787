use bit_vec::BitVec;
use bytes::Bytes;
use strata_dtype::{NativePType, decode_le};
use strata_error::{StrataResult, strata_bail};

use crate::export::Tile;
use crate::selection::for_each_run;

/// A sink for the tiles of an export, called in the order the tiles are yielded.
///
/// Every tile of an array must be written exactly once before [`TileWriter::finish`].
pub trait TileWriter {
    type Output;

    fn write_tile(&mut self, tile: Tile) -> StrataResult<()>;

    fn finish(&mut self) -> StrataResult<Self::Output>;
}

pub trait TileWriterExt: TileWriter {
    /// Box the tile writer.
    fn boxed(self) -> Box<dyn TileWriter<Output = Self::Output>>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }

    /// Write every tile of the iterator and return the finished output.
    ///
    /// Stops at the first error, either from the iterator or from the writer.
    fn write_all<I: IntoIterator<Item = StrataResult<Tile>>>(
        &mut self,
        tiles: I,
    ) -> StrataResult<Self::Output> {
        for tile in tiles {
            self.write_tile(tile?)?;
        }
        self.finish()
    }
}

impl<W: TileWriter + ?Sized> TileWriterExt for W {}

/// Assembles tiles into one dense row-major buffer of the full array.
#[derive(Debug)]
pub struct DenseTileWriter {
    shape: Vec<usize>,
    dtype_size: usize,
    data: Vec<u8>,
    written: BitVec,
    finished: bool,
}

impl DenseTileWriter {
    pub fn try_new(shape: Vec<usize>, dtype_size: usize) -> StrataResult<Self> {
        if shape.is_empty() || dtype_size == 0 {
            strata_bail!(
                "cannot assemble shape {:?} of {} byte elements",
                shape,
                dtype_size
            );
        }
        let n: usize = shape.iter().product();
        Ok(Self {
            shape,
            dtype_size,
            data: vec![0; n * dtype_size],
            written: BitVec::from_elem(n, false),
            finished: false,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements written so far.
    pub fn num_written(&self) -> usize {
        self.written.iter().filter(|&b| b).count()
    }

    /// Finish and reinterpret the assembled array as native values.
    pub fn finish_decoded<T: NativePType>(&mut self) -> StrataResult<Vec<T>> {
        if T::PTYPE.byte_width() != self.dtype_size {
            strata_bail!(
                "cannot decode {} byte elements as {}",
                self.dtype_size,
                T::PTYPE
            );
        }
        let bytes = self.finish()?;
        decode_le(&bytes)
    }
}

impl TileWriter for DenseTileWriter {
    type Output = Bytes;

    fn write_tile(&mut self, tile: Tile) -> StrataResult<()> {
        if self.finished {
            strata_bail!("tile {} written after finish", tile.selection);
        }
        if !tile.selection.is_within(&self.shape) {
            strata_bail!(
                "tile {} is outside array of shape {:?}",
                tile.selection,
                self.shape
            );
        }
        let expected = tile.num_elements() * self.dtype_size;
        if tile.data.len() != expected {
            strata_bail!(
                "tile {} holds {} bytes, expected {}",
                tile.selection,
                tile.data.len(),
                expected
            );
        }

        // Check the whole tile before touching anything so a rejected tile leaves no trace.
        for_each_run(&tile.selection, &self.shape, |offset, len| {
            if (offset..offset + len).any(|i| self.written.get(i).unwrap_or(false)) {
                strata_bail!("tile {} overlaps a tile already written", tile.selection);
            }
            Ok(())
        })?;

        let width = self.dtype_size;
        let mut cursor = 0;
        for_each_run(&tile.selection, &self.shape, |offset, len| {
            let run = len * width;
            self.data[offset * width..offset * width + run]
                .copy_from_slice(&tile.data[cursor..cursor + run]);
            cursor += run;
            for i in offset..offset + len {
                self.written.set(i, true);
            }
            Ok(())
        })?;

        log::trace!("wrote tile {}", tile.selection);
        Ok(())
    }

    fn finish(&mut self) -> StrataResult<Bytes> {
        if self.finished {
            strata_bail!("writer already finished");
        }
        if !self.written.all() {
            strata_bail!(
                "only {} of {} elements were written",
                self.num_written(),
                self.written.len()
            );
        }
        self.finished = true;
        Ok(Bytes::from(std::mem::take(&mut self.data)))
    }
}
