//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general loader builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before building.
    pub config: config::Config,

    /// The [fetcher::FetcherFactory] to be used for creating the
    /// [fetcher::Fetcher] the loader delegates to.
    pub fetcher: fetcher::DynFetcherFactory,

    /// The [loader::LoaderFactory] to be used for creating
    /// [loader::Loader] instances.
    pub loader: loader::DynLoaderFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Values already present in the config are replaced by the defaults,
    /// so call this before applying any overrides.
    pub fn with_default_config(mut self) -> LoaderResult<Self> {
        {
            let Self {
                config,
                fetcher,
                loader,
            } = &mut self;

            fetcher.default_config(config)?;
            loader.default_config(config)?;
        }

        Ok(self)
    }

    /// Ask every configured module factory to validate the config.
    pub fn validate_config(&self) -> LoaderResult<()> {
        self.fetcher.validate_config(&self.config)?;
        self.loader.validate_config(&self.config)?;
        Ok(())
    }

    /// Validate the config, then construct the fetcher and a loader
    /// around it.
    pub async fn build(self) -> LoaderResult<DynLoader> {
        self.validate_config()?;

        let builder = Arc::new(self);

        let fetcher = builder.fetcher.create(builder.clone()).await?;
        builder.loader.create(builder.clone(), fetcher).await
    }
}
