//! Talk loader error types.

use crate::ResourceId;
use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The loader error type. This type is used in all external
/// loader apis as well as internally by the fetcher modules.
///
/// This type is required to implement `Clone` so a single fetch result
/// can be handed to every waiter of a wave.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoaderError {
    /// Fetching a resource failed.
    #[error("fetch failed for {id} (src: {src})")]
    Fetch {
        /// The resource that could not be fetched.
        id: ResourceId,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// Generic loader error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

impl LoaderError {
    /// Construct a "fetch" error with an inner source error.
    pub fn fetch_src<S: std::error::Error + 'static + Send + Sync>(
        id: ResourceId,
        src: S,
    ) -> Self {
        Self::Fetch {
            id,
            src: DynInnerError::new(src),
        }
    }

    /// Construct a "fetch" error without a source.
    pub fn fetch(id: ResourceId) -> Self {
        Self::Fetch {
            id,
            src: DynInnerError::default(),
        }
    }

    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }
}

/// The loader result type.
pub type LoaderResult<T> = Result<T, LoaderError>;
