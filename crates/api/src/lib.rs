#![deny(missing_docs)]
//! Talk loader API contains the loader module traits and the basic types
//! required to define the api of those traits.
//!
//! If you want a working loader, please see the talk_loader_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub mod builder;
pub mod config;

mod error;
pub use error::*;

pub mod id;
pub use id::ResourceId;

mod resource;
pub use resource::*;

pub mod fetcher;
pub use fetcher::*;

pub mod loader;
pub use loader::*;
