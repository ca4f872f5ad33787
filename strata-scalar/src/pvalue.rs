use core::fmt::Display;
use std::hash::{Hash, Hasher};

use num_traits::NumCast;
use paste::paste;
use strata_dtype::{NativePType, PType};

/// A single primitive value, tagged with its physical type.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

// Floats compare by bit pattern, so a NaN back-fill equals itself.
impl PartialEq for PValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::U8(s), Self::U8(o)) => s == o,
            (Self::U16(s), Self::U16(o)) => s == o,
            (Self::U32(s), Self::U32(o)) => s == o,
            (Self::U64(s), Self::U64(o)) => s == o,
            (Self::I8(s), Self::I8(o)) => s == o,
            (Self::I16(s), Self::I16(o)) => s == o,
            (Self::I32(s), Self::I32(o)) => s == o,
            (Self::I64(s), Self::I64(o)) => s == o,
            (Self::F32(s), Self::F32(o)) => s.to_bits() == o.to_bits(),
            (Self::F64(s), Self::F64(o)) => s.to_bits() == o.to_bits(),
            (..) => false,
        }
    }
}

impl Eq for PValue {}

impl Hash for PValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptype().hash(state);
        self.to_le_bytes().hash(state);
    }
}

macro_rules! as_primitive {
    ($T:ty) => {
        paste! {
            #[doc = "Access PValue as `" $T "`, returning `None` if conversion is unsuccessful"]
            pub fn [<as_ $T>](self) -> Option<$T> {
                match self {
                    PValue::U8(v) => <$T as NumCast>::from(v),
                    PValue::U16(v) => <$T as NumCast>::from(v),
                    PValue::U32(v) => <$T as NumCast>::from(v),
                    PValue::U64(v) => <$T as NumCast>::from(v),
                    PValue::I8(v) => <$T as NumCast>::from(v),
                    PValue::I16(v) => <$T as NumCast>::from(v),
                    PValue::I32(v) => <$T as NumCast>::from(v),
                    PValue::I64(v) => <$T as NumCast>::from(v),
                    PValue::F32(v) => <$T as NumCast>::from(v),
                    PValue::F64(v) => <$T as NumCast>::from(v),
                }
            }
        }
    };
}

impl PValue {
    pub fn ptype(&self) -> PType {
        match self {
            Self::U8(_) => PType::U8,
            Self::U16(_) => PType::U16,
            Self::U32(_) => PType::U32,
            Self::U64(_) => PType::U64,
            Self::I8(_) => PType::I8,
            Self::I16(_) => PType::I16,
            Self::I32(_) => PType::I32,
            Self::I64(_) => PType::I64,
            Self::F32(_) => PType::F32,
            Self::F64(_) => PType::F64,
        }
    }

    pub fn is_instance_of(&self, ptype: &PType) -> bool {
        &self.ptype() == ptype
    }

    /// The NaN of the given floating point type, or `None` for integers.
    pub fn nan_of(ptype: PType) -> Option<Self> {
        match ptype {
            PType::F32 => Some(Self::F32(f32::NAN)),
            PType::F64 => Some(Self::F64(f64::NAN)),
            _ => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        match self {
            Self::F32(v) => v.is_nan(),
            Self::F64(v) => v.is_nan(),
            _ => false,
        }
    }

    fn to_le_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ptype().byte_width());
        match self {
            Self::U8(v) => v.append_le_bytes(&mut out),
            Self::U16(v) => v.append_le_bytes(&mut out),
            Self::U32(v) => v.append_le_bytes(&mut out),
            Self::U64(v) => v.append_le_bytes(&mut out),
            Self::I8(v) => v.append_le_bytes(&mut out),
            Self::I16(v) => v.append_le_bytes(&mut out),
            Self::I32(v) => v.append_le_bytes(&mut out),
            Self::I64(v) => v.append_le_bytes(&mut out),
            Self::F32(v) => v.append_le_bytes(&mut out),
            Self::F64(v) => v.append_le_bytes(&mut out),
        }
        out
    }

    as_primitive!(u64);
    as_primitive!(i64);
    as_primitive!(f64);
}

macro_rules! pvalue_from {
    ($T:ty, $PT:tt) => {
        impl From<$T> for PValue {
            fn from(value: $T) -> Self {
                PValue::$PT(value)
            }
        }
    };
}

pvalue_from!(u8, U8);
pvalue_from!(u16, U16);
pvalue_from!(u32, U32);
pvalue_from!(u64, U64);
pvalue_from!(i8, I8);
pvalue_from!(i16, I16);
pvalue_from!(i32, I32);
pvalue_from!(i64, I64);
pvalue_from!(f32, F32);
pvalue_from!(f64, F64);

impl From<usize> for PValue {
    fn from(value: usize) -> PValue {
        PValue::U64(value as u64)
    }
}

impl Display for PValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{}u8", v),
            Self::U16(v) => write!(f, "{}u16", v),
            Self::U32(v) => write!(f, "{}u32", v),
            Self::U64(v) => write!(f, "{}u64", v),
            Self::I8(v) => write!(f, "{}i8", v),
            Self::I16(v) => write!(f, "{}i16", v),
            Self::I32(v) => write!(f, "{}i32", v),
            Self::I64(v) => write!(f, "{}i64", v),
            Self::F32(v) => write!(f, "{}f32", v),
            Self::F64(v) => write!(f, "{}f64", v),
        }
    }
}
