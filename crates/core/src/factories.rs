//! Factories for generating instances of talk loader modules.

pub mod core_loader;
pub use core_loader::{CoreLoader, CoreLoaderFactory};

pub mod http_fetcher;
pub use http_fetcher::HttpFetcherFactory;
