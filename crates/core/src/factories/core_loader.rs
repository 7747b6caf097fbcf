//! The core loader coalesces concurrent requests for the same resource
//! into a single fetch.
//!
//! ### State
//!
//! A single [std::sync::Mutex] guards two maps that always change together:
//! - active fetches, keyed by resource id, each carrying the wave number
//!   and an abort handle for the spawned fetch task.
//! - pending waiters, keyed by resource id, in registration order.
//!
//! An id has an entry in one map if and only if it has an entry in the other.
//! The lock is never held while calling the fetcher or a waiter.
//!
//! ### Waves
//!
//! - The first request for an idle id allocates a wave number, registers the
//!   waiter and spawns a fetch task.
//! - Requests arriving while the wave is running only append their waiter.
//! - When the fetch task finishes it removes both entries, provided the wave
//!   number still matches, and hands the captured waiters to delivery.
//!   A request arriving after that starts a new wave.
//! - A fetch task that ends without a result (panic, abort, timeout) or a
//!   wave that is cancelled delivers `None`.
//!
//! ### Delivery
//!
//! All waiters run on one delivery task owned by the loader. They never run
//! concurrently with each other, run in registration order within a wave,
//! and may freely issue new requests, including for the id that just
//! completed.

use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use talk_loader_api::{builder::Builder, config::Config, *};
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::AbortHandle,
};

/// CoreLoader configuration types.
pub mod config {
    use std::time::Duration;

    /// Configuration parameters for [CoreLoaderFactory](super::CoreLoaderFactory).
    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreLoaderConfig {
        /// Abandon a fetch that has not finished after this many
        /// milliseconds, failing its wave. Zero disables the timeout.
        /// Default: 0.
        pub fetch_timeout_ms: u64,
    }

    impl CoreLoaderConfig {
        /// Get the fetch timeout, if enabled.
        pub fn fetch_timeout(&self) -> Option<Duration> {
            match self.fetch_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            }
        }
    }

    /// Module-level configuration for CoreLoader.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreLoaderModConfig {
        /// CoreLoader configuration.
        pub core_loader: CoreLoaderConfig,
    }
}

pub use config::*;

/// The core loader implementation provided by talk loader.
#[derive(Debug)]
pub struct CoreLoaderFactory {}

impl CoreLoaderFactory {
    /// Construct a new CoreLoaderFactory.
    pub fn create() -> DynLoaderFactory {
        let out: DynLoaderFactory = Arc::new(CoreLoaderFactory {});
        out
    }
}

impl LoaderFactory for CoreLoaderFactory {
    fn default_config(&self, config: &mut Config) -> LoaderResult<()> {
        config.set_module_config(&CoreLoaderModConfig::default())
    }

    fn validate_config(&self, config: &Config) -> LoaderResult<()> {
        let _: CoreLoaderModConfig = config.get_module_config()?;
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<Builder>,
        fetcher: DynFetcher,
    ) -> BoxFut<'static, LoaderResult<DynLoader>> {
        Box::pin(async move {
            let config: CoreLoaderModConfig =
                builder.config.get_module_config()?;
            let out: DynLoader =
                Arc::new(CoreLoader::new(config.core_loader, fetcher)?);
            Ok(out)
        })
    }
}

type Wave = u64;

struct ActiveFetch {
    wave: Wave,
    // Not known until the fetch task has been spawned.
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct State {
    last_wave: Wave,
    active: HashMap<ResourceId, ActiveFetch>,
    waiters: HashMap<ResourceId, Vec<Completion>>,
    stats: LoaderStats,
}

/// The captured waiters of a finished wave together with its result.
struct Delivery {
    id: ResourceId,
    resource: Option<LocalResource>,
    waiters: Vec<Completion>,
}

impl Delivery {
    fn run(self) {
        let Self {
            id,
            resource,
            waiters,
        } = self;

        tracing::debug!(
            %id,
            ok = resource.is_some(),
            waiter_count = waiters.len(),
            "delivering"
        );

        for waiter in waiters {
            let resource = resource.clone();
            if std::panic::catch_unwind(AssertUnwindSafe(move || {
                waiter(resource)
            }))
            .is_err()
            {
                tracing::warn!(%id, "waiter panicked during delivery");
            }
        }
    }
}

struct Inner {
    state: Mutex<State>,
    fetcher: DynFetcher,
    fetch_timeout: Option<Duration>,
    delivery_send: UnboundedSender<Delivery>,
    runtime: Handle,
}

impl Inner {
    // Waiters and the fetcher never run under this lock,
    // so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_wave(
        &self,
        id: &ResourceId,
        wave: Wave,
        resource: Option<LocalResource>,
    ) {
        let waiters = {
            let mut lock = self.lock();

            match lock.active.get(id) {
                Some(active) if active.wave == wave => (),
                _ => {
                    // The wave was cancelled or torn down already.
                    tracing::debug!(%id, wave, "ignoring stale fetch result");
                    return;
                }
            }

            lock.active.remove(id);
            if resource.is_some() {
                lock.stats.fetches_succeeded += 1;
            } else {
                lock.stats.fetches_failed += 1;
            }
            lock.waiters.remove(id).unwrap_or_default()
        };

        self.deliver(id.clone(), resource, waiters);
    }

    fn deliver(
        &self,
        id: ResourceId,
        resource: Option<LocalResource>,
        waiters: Vec<Completion>,
    ) {
        if waiters.is_empty() {
            return;
        }

        if let Err(mpsc::error::SendError(delivery)) =
            self.delivery_send.send(Delivery {
                id,
                resource,
                waiters,
            })
        {
            // Only possible once the runtime is shutting down.
            tracing::warn!(
                id = %delivery.id,
                "delivery task is gone, delivering in place"
            );
            delivery.run();
        }
    }
}

/// Finishes its wave with `None` if dropped before a result was reported,
/// so a fetch task that panics or is aborted still releases its waiters.
struct WaveGuard {
    inner: Arc<Inner>,
    id: ResourceId,
    wave: Wave,
    finished: bool,
}

impl WaveGuard {
    fn finish(mut self, resource: Option<LocalResource>) {
        self.finished = true;
        self.inner.finish_wave(&self.id, self.wave, resource);
    }
}

impl Drop for WaveGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                id = %self.id,
                wave = self.wave,
                "fetch task ended without a result"
            );
            self.inner.finish_wave(&self.id, self.wave, None);
        }
    }
}

async fn fetch_task(guard: WaveGuard) {
    let id = guard.id.clone();

    let result = {
        let fetch = guard.inner.fetcher.fetch(id.clone());
        match guard.inner.fetch_timeout {
            None => fetch.await,
            Some(timeout) => match tokio::time::timeout(timeout, fetch).await
            {
                Ok(result) => result,
                Err(_) => Err(LoaderError::fetch_src(
                    id.clone(),
                    std::io::Error::from(std::io::ErrorKind::TimedOut),
                )),
            },
        }
    };

    let resource = match result {
        Ok(resource) => Some(resource),
        Err(err) => {
            tracing::warn!(?err, %id, "fetch failed");
            None
        }
    };

    guard.finish(resource);
}

async fn delivery_task(mut delivery_recv: UnboundedReceiver<Delivery>) {
    while let Some(delivery) = delivery_recv.recv().await {
        delivery.run();
    }
}

/// A [Loader] that coalesces requests per resource id.
pub struct CoreLoader {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CoreLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreLoader")
            .field("stats", &self.inner.lock().stats)
            .finish()
    }
}

impl CoreLoader {
    /// Construct a new CoreLoader. Must be called from within a tokio
    /// runtime; fetches and deliveries run on that runtime even when
    /// requests are issued from other threads.
    pub fn new(
        config: CoreLoaderConfig,
        fetcher: DynFetcher,
    ) -> LoaderResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            LoaderError::other_src("CoreLoader requires a tokio runtime", e)
        })?;

        // The delivery task exits once the last sender, owned by
        // the shared state, is dropped.
        let (delivery_send, delivery_recv) = mpsc::unbounded_channel();
        runtime.spawn(delivery_task(delivery_recv));

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                fetcher,
                fetch_timeout: config.fetch_timeout(),
                delivery_send,
                runtime,
            }),
        })
    }
}

impl Loader for CoreLoader {
    fn request(&self, id: ResourceId, completion: Completion) {
        let wave = {
            let mut lock = self.inner.lock();
            lock.stats.requests += 1;

            if lock.active.contains_key(&id) {
                lock.stats.coalesced += 1;
                let waiters = lock.waiters.entry(id.clone()).or_default();
                waiters.push(completion);
                tracing::debug!(
                    %id,
                    waiter_count = waiters.len(),
                    "attached to running fetch"
                );
                return;
            }

            lock.last_wave += 1;
            let wave = lock.last_wave;
            lock.stats.fetches_started += 1;
            lock.active
                .insert(id.clone(), ActiveFetch { wave, abort: None });
            lock.waiters.insert(id.clone(), vec![completion]);
            wave
        };

        tracing::debug!(%id, wave, "starting fetch");

        // Spawned outside the lock: if the runtime is shutting down the
        // task is dropped right here and its guard finishes the wave.
        let task = self.inner.runtime.spawn(fetch_task(WaveGuard {
            inner: self.inner.clone(),
            id: id.clone(),
            wave,
            finished: false,
        }));

        let recorded = match self.inner.lock().active.get_mut(&id) {
            Some(active) if active.wave == wave => {
                active.abort = Some(task.abort_handle());
                true
            }
            _ => false,
        };

        if !recorded {
            // Finished or cancelled before we got here. Aborting
            // a finished task is a no-op.
            task.abort();
        }
    }

    fn cancel(&self, id: &ResourceId) -> bool {
        let (active, waiters) = {
            let mut lock = self.inner.lock();
            let active = match lock.active.remove(id) {
                Some(active) => active,
                None => return false,
            };
            lock.stats.cancelled += 1;
            (active, lock.waiters.remove(id).unwrap_or_default())
        };

        tracing::debug!(%id, wave = active.wave, "cancelling fetch");

        if let Some(abort) = active.abort {
            abort.abort();
        }

        self.inner.deliver(id.clone(), None, waiters);

        true
    }

    fn is_fetching(&self, id: &ResourceId) -> bool {
        self.inner.lock().active.contains_key(id)
    }

    fn stats(&self) -> LoaderStats {
        self.inner.lock().stats
    }
}

impl Drop for CoreLoader {
    fn drop(&mut self) {
        let (active, waiters) = {
            let mut lock = self.inner.lock();
            (
                std::mem::take(&mut lock.active),
                std::mem::take(&mut lock.waiters),
            )
        };

        for active in active.into_values() {
            if let Some(abort) = active.abort {
                abort.abort();
            }
        }

        for (id, waiters) in waiters {
            self.inner.deliver(id, None, waiters);
        }
    }
}

#[cfg(test)]
mod test;
