#![deny(missing_docs)]
//! Talk loader core modules: the coalescing loader and the fetchers
//! it can delegate to.

use talk_loader_api::{builder::Builder, config::Config};

/// Construct a production-ready default builder.
///
/// - `fetcher` - The default fetcher is [factories::HttpFetcherFactory].
///   Note: you must set `httpFetcher.serverUrl` before building.
/// - `loader` - The default loader is [factories::CoreLoaderFactory].
pub fn default_builder() -> Builder {
    Builder {
        config: Config::default(),
        fetcher: factories::HttpFetcherFactory::create(),
        loader: factories::CoreLoaderFactory::create(),
    }
}

pub mod factories;
