#![deny(missing_docs)]
#![feature(error_generic_member_access)]

//! This crate defines error & result types for Strata.
//! It also contains a variety of useful macros for error handling.

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Deref, Range};
use std::{env, fmt, io};

pub use ext::*;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

#[allow(clippy::fallible_impl_from)]
impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        if env::var("STRATA_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for Strata.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum StrataError {
    /// A shape, chunk size or memory budget that cannot produce a valid chunk plan.
    #[error("invalid geometry: {0}\nBacktrace:\n{1}")]
    Geometry(ErrString, Backtrace),
    /// An upstream source could not satisfy the read of a selection.
    #[error("read of selection {0:?} failed: {1}\nBacktrace:\n{2}")]
    Read(Vec<Range<usize>>, ErrString, Backtrace),
    /// Two rows claim the same identity, or a key field would change.
    #[error("identity conflict: {0}\nBacktrace:\n{1}")]
    IdentityConflict(ErrString, Backtrace),
    /// No null value can be inferred for a back-filled column.
    #[error("cannot infer null value: {0}\nBacktrace:\n{1}")]
    NullInference(ErrString, Backtrace),
    /// A column definition clashes with the table schema.
    #[error("schema error: {0}\nBacktrace:\n{1}")]
    Schema(ErrString, Backtrace),
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, Backtrace),
    /// An invalid argument was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// An assertion failed.
    #[error("{0}\nBacktrace:\n{1}")]
    AssertionFailed(ErrString, Backtrace),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<StrataError>),
    /// A wrapper for IO errors.
    #[error("{0}\nBacktrace:\n{1}")]
    IOError(#[from] io::Error, Backtrace),
    /// A wrapper for JSON (de)serialization errors.
    #[cfg(feature = "serde")]
    #[error("{0}\nBacktrace:\n{1}")]
    JSONError(#[from] serde_json::Error, Backtrace),
}

impl StrataError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        StrataError::Context(msg.into(), Box::new(self))
    }

    /// The selection that failed to read, if this is a read error (possibly wrapped in context).
    pub fn read_selection(&self) -> Option<&[Range<usize>]> {
        match self {
            StrataError::Read(selection, ..) => Some(selection),
            StrataError::Context(_, inner) => inner.read_selection(),
            _ => None,
        }
    }

    /// Strips any [`StrataError::Context`] wrappers and returns the underlying error.
    pub fn root(&self) -> &StrataError {
        match self {
            StrataError::Context(_, inner) => inner.root(),
            other => other,
        }
    }
}

impl Debug for StrataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return StrataErrors as their error type.
pub type StrataResult<T> = Result<T, StrataError>;

/// A convenient macro for creating a StrataError.
#[macro_export]
macro_rules! strata_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::StrataError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
        )
    }};
    (Read: $selection:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::StrataError::Read($selection, format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::StrataError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::strata_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a StrataError.
#[macro_export]
macro_rules! strata_bail {
    ($($tt:tt)+) => {
        return Err($crate::strata_err!($($tt)+))
    };
}

// Not public, referenced by macros only.
#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[must_use]
    pub const fn must_use(error: crate::StrataError) -> crate::StrataError {
        error
    }
}
