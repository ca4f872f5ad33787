use crate::{ErrString, StrataResult};

/// Attach context to the error branch of a [`StrataResult`].
pub trait ContextExt<T> {
    /// Wrap any error in a [`crate::StrataError::Context`] built lazily from `f`.
    fn with_context<M, F>(self, f: F) -> StrataResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M;
}

impl<T> ContextExt<T> for StrataResult<T> {
    fn with_context<M, F>(self, f: F) -> StrataResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
