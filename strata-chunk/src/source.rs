use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use strata_dtype::{NativePType, encode_le};
use strata_error::{StrataResult, strata_bail};

use crate::selection::{Selection, for_each_run};

/// An addressable N-D numeric array that can be read one hyper-rectangle at a time.
///
/// Implementations return the selected elements as contiguous little-endian bytes in row-major
/// order. A source that cannot deliver every requested byte must fail rather than pad.
pub trait NumericSource {
    /// The full shape of the array.
    fn shape(&self) -> &[usize];

    /// Size in bytes of one element.
    fn dtype_size(&self) -> usize;

    /// Read the elements of `selection`.
    fn read(&self, selection: &Selection) -> StrataResult<Bytes>;
}

impl<S: NumericSource + ?Sized> NumericSource for &S {
    fn shape(&self) -> &[usize] {
        (**self).shape()
    }

    fn dtype_size(&self) -> usize {
        (**self).dtype_size()
    }

    fn read(&self, selection: &Selection) -> StrataResult<Bytes> {
        (**self).read(selection)
    }
}

impl<S: NumericSource + ?Sized> NumericSource for Box<S> {
    fn shape(&self) -> &[usize] {
        self.as_ref().shape()
    }

    fn dtype_size(&self) -> usize {
        self.as_ref().dtype_size()
    }

    fn read(&self, selection: &Selection) -> StrataResult<Bytes> {
        self.as_ref().read(selection)
    }
}

impl<S: NumericSource + ?Sized> NumericSource for Arc<S> {
    fn shape(&self) -> &[usize] {
        self.as_ref().shape()
    }

    fn dtype_size(&self) -> usize {
        self.as_ref().dtype_size()
    }

    fn read(&self, selection: &Selection) -> StrataResult<Bytes> {
        self.as_ref().read(selection)
    }
}

/// An in-memory, row-major [`NumericSource`].
#[derive(Debug, Clone)]
pub struct ArraySource<T> {
    shape: Vec<usize>,
    bytes: Bytes,
    _ptype: PhantomData<T>,
}

impl<T: NativePType> ArraySource<T> {
    pub fn try_new(shape: Vec<usize>, values: &[T]) -> StrataResult<Self> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || expected != values.len() {
            strata_bail!(
                "{} values cannot fill an array of shape {:?}",
                values.len(),
                shape
            );
        }
        Ok(Self {
            shape,
            bytes: Bytes::from(encode_le(values)),
            _ptype: PhantomData,
        })
    }
}

impl<T: NativePType> NumericSource for ArraySource<T> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype_size(&self) -> usize {
        T::PTYPE.byte_width()
    }

    fn read(&self, selection: &Selection) -> StrataResult<Bytes> {
        if !selection.is_within(&self.shape) {
            strata_bail!(
                Read: selection.ranges().to_vec(),
                "selection is outside array of shape {:?}",
                self.shape
            );
        }

        let width = self.dtype_size();
        let (start, end) = (selection.ranges()[0].start, selection.ranges()[0].end);
        if selection.rank() == 1 {
            return Ok(self.bytes.slice(start * width..end * width));
        }

        let mut out = Vec::with_capacity(selection.num_elements() * width);
        for_each_run(selection, &self.shape, |offset, len| {
            out.extend_from_slice(&self.bytes[offset * width..(offset + len) * width]);
            Ok(())
        })?;
        Ok(Bytes::from(out))
    }
}
