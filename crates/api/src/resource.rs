//! The result type produced by a successful fetch.

use crate::ResourceId;
use std::path::PathBuf;

/// A resource that has been made available locally.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalResource {
    /// The id the resource was fetched for.
    pub id: ResourceId,

    /// Where the resource can be read from.
    pub path: PathBuf,

    /// Size of the resource in bytes.
    pub size: u64,
}

impl LocalResource {
    /// Construct a new LocalResource.
    pub fn new(id: ResourceId, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            id,
            path: path.into(),
            size,
        }
    }
}
