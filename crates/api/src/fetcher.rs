//! Talk loader fetcher types.
//!
//! A fetcher is the collaborator that actually makes a resource available
//! locally, for example by downloading it. It knows nothing about
//! coalescing; every call to [Fetcher::fetch] is one independent fetch.

use crate::*;
use std::sync::Arc;

/// Trait for implementing a single-shot resource fetch.
pub trait Fetcher: 'static + Send + Sync + std::fmt::Debug {
    /// Fetch the resource identified by `id`, resolving once it is
    /// available locally or the fetch failed.
    fn fetch(&self, id: ResourceId) -> BoxFut<'_, LoaderResult<LocalResource>>;
}

/// Trait object [Fetcher].
pub type DynFetcher = Arc<dyn Fetcher>;

/// A factory for creating Fetcher instances.
pub trait FetcherFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> LoaderResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &config::Config) -> LoaderResult<()>;

    /// Construct a Fetcher instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, LoaderResult<DynFetcher>>;
}

/// Trait object [FetcherFactory].
pub type DynFetcherFactory = Arc<dyn FetcherFactory>;
