use super::*;
use std::path::PathBuf;
use talk_loader_test_utils::{
    enable_tracing, fetcher::ManualFetcher, id::random_resource_id, iter_check,
};

type Log = Arc<Mutex<Vec<(&'static str, Option<LocalResource>)>>>;

/// Collects what every waiter received, in invocation order.
#[derive(Clone, Default)]
struct Recorder(Log);

impl Recorder {
    fn waiter(&self, name: &'static str) -> Completion {
        let log = self.0.clone();
        Box::new(move |res| log.lock().unwrap().push((name, res)))
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn take(&self) -> Vec<(&'static str, Option<LocalResource>)> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    async fn wait_for(&self, count: usize) {
        iter_check!(1000, {
            if self.len() >= count {
                break;
            }
        });
    }
}

fn setup(config: CoreLoaderConfig) -> (CoreLoader, Arc<ManualFetcher>) {
    enable_tracing();
    let fetcher = ManualFetcher::create();
    let loader = CoreLoader::new(config, fetcher.clone()).unwrap();
    (loader, fetcher)
}

async fn wait_pending(fetcher: &ManualFetcher, id: &ResourceId, count: usize) {
    iter_check!(1000, {
        if fetcher.pending_count(id) == count {
            break;
        }
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn two_resources_three_waiters() {
    let (loader, fetcher) = setup(Default::default());
    let rec = Recorder::default();
    let f1 = ResourceId::from("f1");
    let f2 = ResourceId::from("f2");

    loader.request(f1.clone(), rec.waiter("cb1"));
    loader.request(f1.clone(), rec.waiter("cb2"));
    loader.request(f2.clone(), rec.waiter("cb3"));

    wait_pending(&fetcher, &f1, 1).await;
    wait_pending(&fetcher, &f2, 1).await;
    assert_eq!(2, fetcher.total_fetch_count());

    assert!(fetcher.succeed(&f1, "local/path/f1"));
    rec.wait_for(2).await;

    let got = rec.take();
    assert_eq!(
        vec!["cb1", "cb2"],
        got.iter().map(|(n, _)| *n).collect::<Vec<_>>()
    );
    for (_, res) in got {
        assert_eq!(PathBuf::from("local/path/f1"), res.unwrap().path);
    }
    assert!(!loader.is_fetching(&f1));
    assert!(loader.is_fetching(&f2));

    assert!(fetcher.fail(&f2));
    rec.wait_for(1).await;
    assert_eq!(vec![("cb3", None)], rec.take());
    assert!(!loader.is_fetching(&f2));

    assert_eq!(
        LoaderStats {
            requests: 3,
            coalesced: 1,
            fetches_started: 2,
            fetches_succeeded: 1,
            fetches_failed: 1,
            cancelled: 0,
        },
        loader.stats()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_loads_share_one_fetch() {
    let (loader, fetcher) = setup(Default::default());
    let loader = Arc::new(loader);
    let id = random_resource_id();

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let loader = loader.clone();
        let id = id.clone();
        tasks.push(tokio::task::spawn(async move { loader.load(id).await }));
    }

    iter_check!(1000, {
        if loader.stats().requests == 50 {
            break;
        }
    });
    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/shared"));

    for task in tasks {
        let res = task.await.unwrap().unwrap();
        assert_eq!(PathBuf::from("local/shared"), res.path);
    }
    assert_eq!(1, fetcher.fetch_count(&id));
    assert_eq!(49, loader.stats().coalesced);
}

#[tokio::test(flavor = "multi_thread")]
async fn waiters_are_notified_in_registration_order() {
    const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

    let (loader, fetcher) = setup(Default::default());
    let rec = Recorder::default();
    let id = random_resource_id();

    for name in NAMES {
        loader.request(id.clone(), rec.waiter(name));
    }

    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/ordered"));
    rec.wait_for(NAMES.len()).await;

    let got = rec.take();
    assert_eq!(
        NAMES.to_vec(),
        got.iter().map(|(n, _)| *n).collect::<Vec<_>>()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn distinct_ids_do_not_share_fetches() {
    let (loader, fetcher) = setup(Default::default());
    let rec = Recorder::default();
    let a = random_resource_id();
    let b = random_resource_id();

    loader.request(a.clone(), rec.waiter("a"));
    loader.request(b.clone(), rec.waiter("b"));

    wait_pending(&fetcher, &a, 1).await;
    wait_pending(&fetcher, &b, 1).await;

    assert!(fetcher.succeed(&b, "local/b"));
    rec.wait_for(1).await;

    // give a stray delivery for `a` a chance to show up
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let got = rec.take();
    assert_eq!(1, got.len());
    assert_eq!("b", got[0].0);
    assert!(loader.is_fetching(&a));

    assert_eq!(1, fetcher.fetch_count(&a));
    assert_eq!(1, fetcher.fetch_count(&b));
}

#[tokio::test(flavor = "multi_thread")]
async fn new_wave_after_success_and_after_failure() {
    let (loader, fetcher) = setup(Default::default());
    let id = random_resource_id();

    let load = loader.load(id.clone());
    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/first"));
    assert_eq!(PathBuf::from("local/first"), load.await.unwrap().path);

    let load = loader.load(id.clone());
    wait_pending(&fetcher, &id, 1).await;
    assert_eq!(2, fetcher.fetch_count(&id));
    assert!(fetcher.fail(&id));
    assert_eq!(None, load.await);

    // failure is terminal for its wave only, the next request retries
    let load = loader.load(id.clone());
    wait_pending(&fetcher, &id, 1).await;
    assert_eq!(3, fetcher.fetch_count(&id));
    assert!(fetcher.succeed(&id, "local/third"));
    assert_eq!(PathBuf::from("local/third"), load.await.unwrap().path);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_waiter_is_called_exactly_once() {
    let (loader, fetcher) = setup(Default::default());
    let id = random_resource_id();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    for _ in 0..10 {
        let calls = calls.clone();
        loader.request(
            id.clone(),
            Box::new(move |_| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );
    }

    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.fail(&id));

    iter_check!(1000, {
        if calls.load(std::sync::atomic::Ordering::SeqCst) == 10 {
            break;
        }
    });

    // a late cancel finds nothing to do and delivers nothing
    assert!(!loader.cancel(&id));
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(10, calls.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_delivers_none_and_ignores_the_stale_fetch() {
    let (loader, fetcher) = setup(Default::default());
    let rec = Recorder::default();
    let id = random_resource_id();

    loader.request(id.clone(), rec.waiter("a"));
    loader.request(id.clone(), rec.waiter("b"));
    wait_pending(&fetcher, &id, 1).await;

    assert!(loader.cancel(&id));
    assert!(!loader.is_fetching(&id));
    rec.wait_for(2).await;
    assert_eq!(vec![("a", None), ("b", None)], rec.take());

    // the aborted fetch can no longer deliver anything
    fetcher.succeed(&id, "local/stale");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(0, rec.len());

    // and a new request starts a new wave
    loader.request(id.clone(), rec.waiter("c"));
    wait_pending(&fetcher, &id, 1).await;
    assert_eq!(2, fetcher.fetch_count(&id));
    assert!(fetcher.succeed(&id, "local/fresh"));
    rec.wait_for(1).await;
    let got = rec.take();
    assert_eq!("c", got[0].0);
    assert_eq!(PathBuf::from("local/fresh"), got[0].1.as_ref().unwrap().path);

    assert_eq!(1, loader.stats().cancelled);
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_fails_the_wave() {
    let (loader, fetcher) = setup(CoreLoaderConfig {
        fetch_timeout_ms: 100,
    });
    let id = random_resource_id();

    let first = loader.load(id.clone());
    let second = loader.load(id.clone());

    // never resolved by the fetcher
    assert_eq!(None, first.await);
    assert_eq!(None, second.await);

    assert_eq!(1, fetcher.fetch_count(&id));
    assert!(!loader.is_fetching(&id));
    assert_eq!(1, loader.stats().fetches_failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn waiter_can_request_the_same_id_again() {
    let (loader, fetcher) = setup(Default::default());
    let loader = Arc::new(loader);
    let rec = Recorder::default();
    let id = random_resource_id();

    let inner_waiter = rec.waiter("again");
    let completion: Completion = Box::new({
        let loader = loader.clone();
        let id = id.clone();
        let log = rec.0.clone();
        move |res| {
            log.lock().unwrap().push(("first", res));
            loader.request(id, inner_waiter);
        }
    });
    loader.request(id.clone(), completion);

    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/one"));
    rec.wait_for(1).await;

    // the re-request started a second wave
    wait_pending(&fetcher, &id, 1).await;
    assert_eq!(2, fetcher.fetch_count(&id));
    assert!(fetcher.succeed(&id, "local/two"));
    rec.wait_for(2).await;

    let got = rec.take();
    assert_eq!("first", got[0].0);
    assert_eq!("again", got[1].0);
    assert_eq!(PathBuf::from("local/two"), got[1].1.as_ref().unwrap().path);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_waiter_does_not_starve_the_others() {
    let (loader, fetcher) = setup(Default::default());
    let rec = Recorder::default();
    let id = random_resource_id();

    loader.request(id.clone(), rec.waiter("before"));
    loader.request(id.clone(), Box::new(|_| panic!("waiter exploded")));
    loader.request(id.clone(), rec.waiter("after"));

    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/p"));
    rec.wait_for(2).await;

    let got = rec.take();
    assert_eq!("before", got[0].0);
    assert_eq!("after", got[1].0);

    // the delivery task survived
    let load = loader.load(id.clone());
    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/q"));
    assert!(load.await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn request_from_a_plain_thread() {
    let (loader, fetcher) = setup(Default::default());
    let loader = Arc::new(loader);
    let rec = Recorder::default();
    let id = random_resource_id();

    std::thread::spawn({
        let loader = loader.clone();
        let id = id.clone();
        let waiter = rec.waiter("ui");
        move || loader.request(id, waiter)
    })
    .join()
    .unwrap();

    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/ui"));
    rec.wait_for(1).await;
    assert_eq!("ui", rec.take()[0].0);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_loader_releases_pending_waiters() {
    let (loader, fetcher) = setup(Default::default());
    let rec = Recorder::default();
    let id = random_resource_id();

    loader.request(id.clone(), rec.waiter("a"));
    loader.request(id.clone(), rec.waiter("b"));
    wait_pending(&fetcher, &id, 1).await;

    drop(loader);
    rec.wait_for(2).await;
    assert_eq!(vec![("a", None), ("b", None)], rec.take());
}

#[tokio::test(flavor = "multi_thread")]
async fn factory_reads_module_config() {
    use talk_loader_test_utils::fetcher::ManualFetcherFactory;

    let fetcher = ManualFetcher::create();
    let mut builder = Builder {
        config: Config::default(),
        fetcher: ManualFetcherFactory::create(fetcher.clone()),
        loader: CoreLoaderFactory::create(),
    }
    .with_default_config()
    .unwrap();

    let defaults: CoreLoaderModConfig = builder.config.get_module_config().unwrap();
    assert_eq!(None, defaults.core_loader.fetch_timeout());

    builder
        .config
        .set_module_config(&CoreLoaderModConfig {
            core_loader: CoreLoaderConfig {
                fetch_timeout_ms: 5000,
            },
        })
        .unwrap();
    let loader = builder.build().await.unwrap();

    let id = random_resource_id();
    let load = loader.load(id.clone());
    wait_pending(&fetcher, &id, 1).await;
    assert!(fetcher.succeed(&id, "local/built"));
    assert_eq!(PathBuf::from("local/built"), load.await.unwrap().path);
}

#[test]
fn new_outside_a_runtime_is_an_error() {
    let res = CoreLoader::new(Default::default(), ManualFetcher::create());
    assert!(res.is_err());
}
