//! Runtime installation
//!
//! Fetches catalog artifacts (checksum verified, cached by digest), unpacks
//! node and yarn into the dep dir and brings npm to the requested version.
//! The result is a `RuntimeEnvironment` describing what was installed; it is
//! handed explicitly to the package manager driver and the build cache.

mod archive;
mod runtime;

pub use archive::CatalogInstaller;
pub use runtime::{RuntimeEnvironment, RuntimeInstaller};

use crate::catalog::CatalogEntry;
use crate::error::NodepackResult;
use async_trait::async_trait;
use std::path::Path;

/// Places a catalog artifact's contents into a directory
#[async_trait]
pub trait Installer: Send + Sync {
    /// Download (or reuse), verify and unpack `entry` into `dest_dir`
    async fn install(&self, entry: &CatalogEntry, dest_dir: &Path) -> NodepackResult<()>;
}
