//! Talk loader types.
//!
//! A loader hands out resources by id while guaranteeing that at most one
//! fetch per id is in flight. Concurrent requests for the same id attach
//! to the running fetch (the current "wave") and all receive its single
//! result.

use crate::*;
use std::sync::Arc;

/// A waiter registered with [Loader::request].
///
/// Receives `Some` with the fetched resource, or `None` if the wave
/// failed for any reason (fetch error, timeout, cancellation, shutdown).
pub type Completion = Box<dyn FnOnce(Option<LocalResource>) + Send + 'static>;

/// Counters describing the work a loader has done so far.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct LoaderStats {
    /// Total number of requests received.
    pub requests: u64,
    /// Requests that attached to an already running wave.
    pub coalesced: u64,
    /// Fetches started, i.e. the number of waves.
    pub fetches_started: u64,
    /// Waves that delivered a resource.
    pub fetches_succeeded: u64,
    /// Waves that failed, timed out or were aborted.
    pub fetches_failed: u64,
    /// Waves terminated through [Loader::cancel].
    pub cancelled: u64,
}

/// Trait for implementing a coalescing resource loader.
pub trait Loader: 'static + Send + Sync + std::fmt::Debug {
    /// Request a resource. If a fetch for `id` is already running the
    /// completion is queued behind it, otherwise a new fetch is started.
    ///
    /// The completion is invoked exactly once.
    fn request(&self, id: ResourceId, completion: Completion);

    /// Terminate the running wave for `id`, if any. All of its waiters
    /// receive `None`. Returns false if no wave was running.
    fn cancel(&self, id: &ResourceId) -> bool;

    /// Returns true if a wave is currently running for `id`.
    fn is_fetching(&self, id: &ResourceId) -> bool;

    /// A snapshot of the loader counters.
    fn stats(&self) -> LoaderStats;

    /// Awaitable form of [Loader::request].
    ///
    /// The request is registered when this function is called, not when
    /// the returned future is first polled.
    fn load(&self, id: ResourceId) -> BoxFut<'static, Option<LocalResource>> {
        let (send, recv) = futures::channel::oneshot::channel();
        self.request(
            id,
            Box::new(move |res| {
                let _ = send.send(res);
            }),
        );
        Box::pin(async move { recv.await.ok().flatten() })
    }
}

/// Trait object [Loader].
pub type DynLoader = Arc<dyn Loader>;

/// A factory for creating Loader instances.
pub trait LoaderFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> LoaderResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &config::Config) -> LoaderResult<()>;

    /// Construct a Loader instance around the given fetcher.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
        fetcher: DynFetcher,
    ) -> BoxFut<'static, LoaderResult<DynLoader>>;
}

/// Trait object [LoaderFactory].
pub type DynLoaderFactory = Arc<dyn LoaderFactory>;
