//! Physical type definitions and behavior.

use std::fmt::{Debug, Display, Formatter};

use num_traits::{Num, NumCast};
use strata_error::{StrataResult, strata_bail, strata_err};

/// Physical type enum, represents the in-memory physical layout but might represent a different logical type.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PType {
    /// An 8-bit unsigned integer
    U8,
    /// A 16-bit unsigned integer
    U16,
    /// A 32-bit unsigned integer
    U32,
    /// A 64-bit unsigned integer
    U64,
    /// An 8-bit signed integer
    I8,
    /// A 16-bit signed integer
    I16,
    /// A 32-bit signed integer
    I32,
    /// A 64-bit signed integer
    I64,
    /// A 32-bit floating point number
    F32,
    /// A 64-bit floating point number
    F64,
}

/// A trait for native Rust types that correspond 1:1 to a PType
pub trait NativePType:
    Send + Sync + Clone + Copy + Debug + Display + PartialEq + PartialOrd + Default + Num + NumCast + 'static
{
    /// The PType that corresponds to this native type
    const PTYPE: PType;

    /// Append the little-endian encoding of `self` to `out`.
    fn append_le_bytes(self, out: &mut Vec<u8>);

    /// Decode one value from exactly `PTYPE.byte_width()` little-endian bytes.
    fn from_le_chunk(chunk: &[u8]) -> Option<Self>;

    /// Whether this instance (`self`) is NaN.
    /// For integer types, this is always `false`
    fn is_nan(self) -> bool;
}

macro_rules! native_ptype {
    ($T:ty, $ptype:tt) => {
        impl NativePType for $T {
            const PTYPE: PType = PType::$ptype;

            #[inline]
            fn append_le_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn from_le_chunk(chunk: &[u8]) -> Option<Self> {
                chunk.try_into().ok().map(<$T>::from_le_bytes)
            }

            #[allow(clippy::float_cmp, clippy::eq_op)]
            #[inline]
            fn is_nan(self) -> bool {
                self != self
            }
        }
    };
}

native_ptype!(u8, U8);
native_ptype!(u16, U16);
native_ptype!(u32, U32);
native_ptype!(u64, U64);
native_ptype!(i8, I8);
native_ptype!(i16, I16);
native_ptype!(i32, I32);
native_ptype!(i64, I64);
native_ptype!(f32, F32);
native_ptype!(f64, F64);

impl PType {
    /// Returns `true` iff this PType is an unsigned integer type
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Returns `true` iff this PType is a signed integer type
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Returns `true` iff this PType is an integer type
    pub const fn is_int(self) -> bool {
        self.is_unsigned_int() || self.is_signed_int()
    }

    /// Returns `true` iff this PType is a floating point type
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns the number of bytes in this PType
    pub const fn byte_width(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

impl Display for PType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::U16 => write!(f, "u16"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::I8 => write!(f, "i8"),
            Self::I16 => write!(f, "i16"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

/// Encode a slice of native values as contiguous little-endian bytes.
pub fn encode_le<T: NativePType>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::PTYPE.byte_width());
    for v in values {
        v.append_le_bytes(&mut out);
    }
    out
}

/// Decode contiguous little-endian bytes into native values.
pub fn decode_le<T: NativePType>(bytes: &[u8]) -> StrataResult<Vec<T>> {
    let width = T::PTYPE.byte_width();
    if bytes.len() % width != 0 {
        strata_bail!(
            "{} bytes is not a whole number of {} values",
            bytes.len(),
            T::PTYPE
        );
    }
    bytes
        .chunks_exact(width)
        .map(|chunk| {
            T::from_le_chunk(chunk)
                .ok_or_else(|| strata_err!("cannot decode {} from {:?}", T::PTYPE, chunk))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PType::U8, 1)]
    #[case(PType::I16, 2)]
    #[case(PType::F32, 4)]
    #[case(PType::F64, 8)]
    fn byte_widths(#[case] ptype: PType, #[case] width: usize) {
        assert_eq!(ptype.byte_width(), width);
    }

    #[test]
    fn decode_round_trips_floats() {
        let values = [1.5f64, -2.25, f64::MAX];
        let decoded: Vec<f64> = decode_le(&encode_le(&values)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn decode_rejects_partial_values() {
        assert!(decode_le::<u32>(&[0, 1, 2]).is_err());
    }

    #[test]
    fn nan_is_detected_for_floats_only() {
        assert!(f32::NAN.is_nan());
        assert!(!NativePType::is_nan(7u16));
    }
}
