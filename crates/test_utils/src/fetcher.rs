//! A fetcher whose fetches are resolved by the test.

use futures::channel::oneshot;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use talk_loader_api::{builder::Builder, config::Config, *};

type Resolver = oneshot::Sender<LoaderResult<LocalResource>>;

#[derive(Debug, Default)]
struct Inner {
    fetch_counts: HashMap<ResourceId, usize>,
    pending: HashMap<ResourceId, Vec<Resolver>>,
}

/// A [Fetcher] that never finishes a fetch on its own.
///
/// Every call to [Fetcher::fetch] is counted and parked until the test
/// resolves it with [ManualFetcher::succeed], [ManualFetcher::fail] or
/// [ManualFetcher::resolve]. Dropping a parked resolver fails the fetch.
#[derive(Debug, Default)]
pub struct ManualFetcher(Mutex<Inner>);

impl ManualFetcher {
    /// Construct a new ManualFetcher.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// How many times `id` has been fetched.
    pub fn fetch_count(&self, id: &ResourceId) -> usize {
        self.0
            .lock()
            .unwrap()
            .fetch_counts
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    /// How many fetches have been started in total.
    pub fn total_fetch_count(&self) -> usize {
        self.0.lock().unwrap().fetch_counts.values().sum()
    }

    /// How many fetches of `id` are parked waiting for a result.
    pub fn pending_count(&self, id: &ResourceId) -> usize {
        self.0
            .lock()
            .unwrap()
            .pending
            .get(id)
            .map(|p| p.len())
            .unwrap_or_default()
    }

    /// Resolve the oldest parked fetch of `id`. Returns false if there was
    /// none, or if the fetch had been abandoned by the caller.
    pub fn resolve(
        &self,
        id: &ResourceId,
        result: LoaderResult<LocalResource>,
    ) -> bool {
        let resolver = {
            let mut lock = self.0.lock().unwrap();
            let pending = match lock.pending.get_mut(id) {
                Some(pending) if !pending.is_empty() => pending,
                _ => return false,
            };
            let resolver = pending.remove(0);
            if pending.is_empty() {
                lock.pending.remove(id);
            }
            resolver
        };
        resolver.send(result).is_ok()
    }

    /// Resolve the oldest parked fetch of `id` with a resource at `path`.
    pub fn succeed(&self, id: &ResourceId, path: impl Into<PathBuf>) -> bool {
        let resource = LocalResource::new(id.clone(), path, 0);
        self.resolve(id, Ok(resource))
    }

    /// Fail the oldest parked fetch of `id`.
    pub fn fail(&self, id: &ResourceId) -> bool {
        self.resolve(id, Err(LoaderError::fetch(id.clone())))
    }
}

impl Fetcher for ManualFetcher {
    fn fetch(&self, id: ResourceId) -> BoxFut<'_, LoaderResult<LocalResource>> {
        let (send, recv) = oneshot::channel();
        {
            let mut lock = self.0.lock().unwrap();
            *lock.fetch_counts.entry(id.clone()).or_default() += 1;
            lock.pending.entry(id.clone()).or_default().push(send);
        }
        Box::pin(async move {
            recv.await.unwrap_or_else(|_| Err(LoaderError::fetch(id)))
        })
    }
}

/// A [FetcherFactory] that hands out one shared [ManualFetcher], so the
/// test keeps control over a fetcher created through a [Builder].
#[derive(Debug)]
pub struct ManualFetcherFactory(Arc<ManualFetcher>);

impl ManualFetcherFactory {
    /// Construct a new ManualFetcherFactory.
    pub fn create(fetcher: Arc<ManualFetcher>) -> DynFetcherFactory {
        let out: DynFetcherFactory = Arc::new(Self(fetcher));
        out
    }
}

impl FetcherFactory for ManualFetcherFactory {
    fn default_config(&self, _config: &mut Config) -> LoaderResult<()> {
        Ok(())
    }

    fn validate_config(&self, _config: &Config) -> LoaderResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<Builder>,
    ) -> BoxFut<'static, LoaderResult<DynFetcher>> {
        let out: DynFetcher = self.0.clone();
        Box::pin(async move { Ok(out) })
    }
}
