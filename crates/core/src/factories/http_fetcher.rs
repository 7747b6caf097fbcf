//! A fetcher that downloads resources over http into a local directory.

use std::{path::PathBuf, sync::Arc};
use talk_loader_api::{builder::Builder, config::Config, *};

/// HttpFetcher configuration types.
pub mod config {
    use std::path::PathBuf;

    /// Configuration parameters for [HttpFetcherFactory](super::HttpFetcherFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct HttpFetcherConfig {
        /// The base url resources are downloaded from. A resource `id` is
        /// fetched from `{server_url}/{id}`. E.g. `https://files.example.com/dl`.
        pub server_url: String,

        /// The directory downloaded resources are written to.
        /// Default: empty, meaning `talk-loader` in the system temp dir.
        pub download_dir: String,
    }

    impl Default for HttpFetcherConfig {
        fn default() -> Self {
            Self {
                server_url: "<https://your.file.server>".into(),
                download_dir: String::new(),
            }
        }
    }

    impl HttpFetcherConfig {
        /// Get the download directory.
        pub fn download_dir(&self) -> PathBuf {
            if self.download_dir.is_empty() {
                std::env::temp_dir().join("talk-loader")
            } else {
                PathBuf::from(&self.download_dir)
            }
        }
    }

    /// Module-level configuration for HttpFetcher.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct HttpFetcherModConfig {
        /// HttpFetcher configuration.
        pub http_fetcher: HttpFetcherConfig,
    }
}

pub use config::*;

/// The http fetcher implementation provided by talk loader.
#[derive(Debug)]
pub struct HttpFetcherFactory {}

impl HttpFetcherFactory {
    /// Construct a new HttpFetcherFactory.
    pub fn create() -> DynFetcherFactory {
        let out: DynFetcherFactory = Arc::new(HttpFetcherFactory {});
        out
    }
}

impl FetcherFactory for HttpFetcherFactory {
    fn default_config(&self, config: &mut Config) -> LoaderResult<()> {
        config.set_module_config(&HttpFetcherModConfig::default())
    }

    fn validate_config(&self, config: &Config) -> LoaderResult<()> {
        let config: HttpFetcherModConfig = config.get_module_config()?;
        parse_server_url(&config.http_fetcher.server_url).map(|_| ())
    }

    fn create(
        &self,
        builder: Arc<Builder>,
    ) -> BoxFut<'static, LoaderResult<DynFetcher>> {
        Box::pin(async move {
            let config: HttpFetcherModConfig =
                builder.config.get_module_config()?;
            let out: DynFetcher =
                Arc::new(HttpFetcher::new(config.http_fetcher)?);
            Ok(out)
        })
    }
}

fn parse_server_url(server_url: &str) -> LoaderResult<url::Url> {
    const ERR: &str = "invalid http fetcher server_url";

    let url = url::Url::parse(server_url)
        .map_err(|e| LoaderError::other_src(ERR, e))?;

    if url.cannot_be_a_base() {
        return Err(LoaderError::other(ERR));
    }

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(LoaderError::other(ERR)),
    }
}

/// Downloads `{server_url}/{id}` to `{download_dir}/{id}`.
#[derive(Debug)]
pub struct HttpFetcher {
    server_url: url::Url,
    download_dir: PathBuf,
}

impl HttpFetcher {
    /// Construct a new HttpFetcher.
    pub fn new(config: HttpFetcherConfig) -> LoaderResult<Self> {
        Ok(Self {
            server_url: parse_server_url(&config.server_url)?,
            download_dir: config.download_dir(),
        })
    }

    fn resource_url(&self, id: &ResourceId) -> LoaderResult<url::Url> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| LoaderError::fetch(id.clone()))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }
}

/// Note the `blocking_` prefix. This must run on the blocking thread pool.
fn blocking_download(
    id: ResourceId,
    url: url::Url,
    download_dir: PathBuf,
) -> LoaderResult<LocalResource> {
    let err = |e: std::io::Error| LoaderError::fetch_src(id.clone(), e);

    std::fs::create_dir_all(&download_dir).map_err(err)?;

    let response = ureq::get(url.as_str())
        .call()
        .map_err(|e| LoaderError::fetch_src(id.clone(), e))?;

    // Write next to the final path so the persist is a rename on the
    // same filesystem, and readers never observe a partial file.
    let mut tmp = tempfile::NamedTempFile::new_in(&download_dir).map_err(err)?;
    let size =
        std::io::copy(&mut response.into_reader(), &mut tmp).map_err(err)?;

    let path = download_dir.join(&*id);
    tmp.persist(&path)
        .map_err(|e| LoaderError::fetch_src(id.clone(), e))?;

    Ok(LocalResource::new(id, path, size))
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, id: ResourceId) -> BoxFut<'_, LoaderResult<LocalResource>> {
        Box::pin(async move {
            if !id.is_path_safe() {
                return Err(LoaderError::fetch_src(
                    id,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "resource id is not a valid file name",
                    ),
                ));
            }

            let url = self.resource_url(&id)?;
            let download_dir = self.download_dir.clone();

            tracing::debug!(%id, %url, "downloading");

            let task_id = id.clone();
            tokio::task::spawn_blocking(move || {
                blocking_download(task_id, url, download_dir)
            })
            .await
            .map_err(|e| LoaderError::fetch_src(id, e))?
        })
    }
}
