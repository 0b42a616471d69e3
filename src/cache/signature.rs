//! Runtime signature stored alongside the cache

use crate::error::{NodepackError, NodepackResult};
use crate::install::RuntimeEnvironment;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// File name of the signature under the cache root
pub const SIGNATURE_FILE: &str = "signature";

/// Identifies the runtime a cache was built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSignature(String);

impl CacheSignature {
    pub fn new(node: &str, npm: &str, yarn: &str) -> Self {
        Self(format!("{}; {}; {}", node, npm, yarn))
    }

    /// Signature of an installed runtime
    pub fn from_runtime(env: &RuntimeEnvironment) -> Self {
        Self::new(&env.node_version, &env.npm_version, &env.yarn_version)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether stored file content belongs to this signature
    pub fn matches(&self, stored: &str) -> bool {
        stored.trim() == self.0
    }

    /// Read the stored signature, `None` when there is no previous cache
    pub async fn read(cache_root: &Path) -> NodepackResult<Option<String>> {
        let path = cache_root.join(SIGNATURE_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NodepackError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Write this signature into `cache_root`, newline terminated
    pub async fn write(&self, cache_root: &Path) -> NodepackResult<()> {
        let path = cache_root.join(SIGNATURE_FILE);
        debug!("Writing cache signature '{}' to {}", self.0, path.display());
        tokio::fs::write(&path, format!("{}\n", self.0))
            .await
            .map_err(|e| NodepackError::io(format!("writing {}", path.display()), e))
    }
}

impl fmt::Display for CacheSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
