//! Types dealing with resource identity.

use std::sync::Arc;

/// Identifies a resource to be loaded, for example a file id
/// handed out by the chat server.
///
/// The loader places no structural constraints on the contents,
/// it only relies on equality and hashing. Cloning is cheap.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct ResourceId(pub Arc<str>);

impl std::ops::Deref for ResourceId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s.into_boxed_str().into())
    }
}

impl std::fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResourceId(")?;
        f.write_str(&self.0)?;
        f.write_str(")")
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ResourceId {
    /// Returns true if this id can be used verbatim as a single
    /// file name component, i.e. it is not empty, is not `.` or `..`
    /// and contains no path separators or NUL bytes.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && &*self.0 != "."
            && &*self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}
