#![deny(missing_docs)]
//! Support code for the talk-loader-fetch binary.
//!
//! The binary loads every resource id given on the command line through one
//! coalescing loader. Ids may repeat; repeated ids share a single download.

use std::path::PathBuf;
use talk_loader_api::{config::Config, *};
use talk_loader_core::factories::{
    core_loader::{CoreLoaderConfig, CoreLoaderModConfig},
    http_fetcher::{HttpFetcherConfig, HttpFetcherModConfig},
};

/// Command line arguments.
#[derive(clap::Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Json config file to load module configuration from. Values given
    /// through other flags take precedence over the file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base url to download resources from, e.g. `https://files.example.com/dl`.
    #[arg(long)]
    pub server_url: Option<String>,

    /// Directory downloaded resources are written to.
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Abandon downloads that take longer than this many milliseconds.
    #[arg(long)]
    pub fetch_timeout_ms: Option<u64>,

    /// The resource ids to load.
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// The outcome of loading one id.
#[derive(Debug)]
pub struct Outcome {
    /// The requested id.
    pub id: ResourceId,
    /// Where it ended up, if the load succeeded.
    pub resource: Option<LocalResource>,
}

/// Everything the binary reports after a run.
#[derive(Debug)]
pub struct Report {
    /// One outcome per requested id, in request order.
    pub outcomes: Vec<Outcome>,
    /// The loader counters at the end of the run.
    pub stats: LoaderStats,
}

impl Report {
    /// Returns true if every load succeeded.
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.resource.is_some())
    }
}

/// Overlay the command line on top of `config`.
pub fn apply_args(config: &mut Config, args: &Args) -> LoaderResult<()> {
    if let Some(path) = &args.config {
        let data = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::other_src(
                format!("could not read config file {}", path.display()),
                e,
            )
        })?;
        let file: Config = serde_json::from_str(&data)
            .map_err(|e| LoaderError::other_src("invalid config file", e))?;
        config.merge(file);
    }

    let mut fetcher: HttpFetcherModConfig = config.get_module_config()?;
    if let Some(server_url) = &args.server_url {
        fetcher.http_fetcher.server_url = server_url.clone();
    }
    if let Some(download_dir) = &args.download_dir {
        fetcher.http_fetcher.download_dir =
            download_dir.to_string_lossy().into_owned();
    }
    config.set_module_config(&fetcher)?;

    if let Some(fetch_timeout_ms) = args.fetch_timeout_ms {
        let mut loader: CoreLoaderModConfig = config.get_module_config()?;
        loader.core_loader.fetch_timeout_ms = fetch_timeout_ms;
        config.set_module_config(&loader)?;
    }

    Ok(())
}

/// Build a loader from the arguments and load all requested ids
/// concurrently.
pub async fn run(args: Args) -> LoaderResult<Report> {
    let mut builder = talk_loader_core::default_builder().with_default_config()?;
    apply_args(&mut builder.config, &args)?;

    let fetcher: HttpFetcherConfig = builder
        .config
        .get_module_config::<HttpFetcherModConfig>()?
        .http_fetcher;
    let loader: CoreLoaderConfig = builder
        .config
        .get_module_config::<CoreLoaderModConfig>()?
        .core_loader;
    tracing::info!(?fetcher, ?loader, "starting loader");

    let loader = builder.build().await?;

    let ids = args
        .ids
        .into_iter()
        .map(ResourceId::from)
        .collect::<Vec<_>>();
    let loads = ids.iter().map(|id| loader.load(id.clone())).collect::<Vec<_>>();
    let results = futures::future::join_all(loads).await;

    let outcomes = ids
        .into_iter()
        .zip(results)
        .map(|(id, resource)| Outcome { id, resource })
        .collect();

    Ok(Report {
        outcomes,
        stats: loader.stats(),
    })
}
