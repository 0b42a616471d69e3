//! Dependency catalog
//!
//! The catalog lists every runtime artifact the buildpack may install, each
//! with a download URI and SHA-256 checksum. It is loaded once per build and
//! never modified afterwards.

pub mod manifest;

pub use manifest::ManifestCatalog;

use crate::error::NodepackResult;
use serde::{Deserialize, Serialize};

/// One installable artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Component name (node, yarn, ...)
    pub name: String,

    /// Concrete version
    pub version: String,

    /// Download location (`https://` or `file://`)
    pub uri: String,

    /// Expected SHA-256 of the downloaded archive, hex encoded
    pub sha256: String,

    /// Stacks this artifact runs on; empty means any
    #[serde(default)]
    pub cf_stacks: Vec<String>,
}

impl CatalogEntry {
    /// Whether this artifact can be used on `stack`
    pub fn supports_stack(&self, stack: &str) -> bool {
        self.cf_stacks.is_empty() || self.cf_stacks.iter().any(|s| s == stack)
    }
}

/// Read-only view of available versions
pub trait Catalog: Send + Sync {
    /// Every version listed for a component
    fn all_versions(&self, name: &str) -> Vec<String>;

    /// The version installed when the application does not ask for one
    fn default_version(&self, name: &str) -> NodepackResult<CatalogEntry>;

    /// Look up one exact entry
    fn find(&self, name: &str, version: &str) -> Option<CatalogEntry>;
}
