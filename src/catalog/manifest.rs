//! Buildpack `manifest.yml` catalog
//!
//! ```yaml
//! default_versions:
//!   - name: node
//!     version: 18.x
//! dependencies:
//!   - name: node
//!     version: 18.17.1
//!     uri: https://buildpacks.example.com/node-v18.17.1-linux-x64.tgz
//!     sha256: 3b5e1c...
//!     cf_stacks: [cflinuxfs4]
//! ```

use super::{Catalog, CatalogEntry};
use crate::error::{NodepackError, NodepackResult};
use crate::version::range::highest_match;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    default_versions: Vec<DefaultVersion>,
    #[serde(default)]
    dependencies: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct DefaultVersion {
    name: String,
    version: String,
}

/// Catalog backed by the buildpack manifest
#[derive(Debug, Clone, Default)]
pub struct ManifestCatalog {
    entries: Vec<CatalogEntry>,
    defaults: Vec<(String, String)>,
}

impl ManifestCatalog {
    /// Build a catalog from entries and `(name, range)` defaults
    pub fn new(entries: Vec<CatalogEntry>, defaults: Vec<(String, String)>) -> Self {
        Self { entries, defaults }
    }

    /// Load `manifest.yml`, keeping only entries usable on `stack`
    pub async fn load(path: &Path, stack: Option<&str>) -> NodepackResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            NodepackError::io(format!("reading buildpack manifest {}", path.display()), e)
        })?;

        Self::parse(&content, stack).map_err(|e| NodepackError::CatalogInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Parse manifest YAML
    pub fn parse(content: &str, stack: Option<&str>) -> NodepackResult<Self> {
        let manifest: ManifestFile = serde_yaml::from_str(content)?;

        let entries: Vec<CatalogEntry> = manifest
            .dependencies
            .into_iter()
            .filter(|e| stack.map_or(true, |s| e.supports_stack(s)))
            .collect();

        debug!("Loaded {} catalog entries (stack {:?})", entries.len(), stack);

        Ok(Self {
            entries,
            defaults: manifest
                .default_versions
                .into_iter()
                .map(|d| (d.name, d.version))
                .collect(),
        })
    }

    fn entries_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CatalogEntry> {
        self.entries.iter().filter(move |e| e.name == name)
    }
}

impl Catalog for ManifestCatalog {
    fn all_versions(&self, name: &str) -> Vec<String> {
        let mut versions: Vec<String> = Vec::new();
        for entry in self.entries_named(name) {
            if !versions.contains(&entry.version) {
                versions.push(entry.version.clone());
            }
        }
        versions
    }

    fn default_version(&self, name: &str) -> NodepackResult<CatalogEntry> {
        let versions = self.all_versions(name);

        let version = match self.defaults.iter().find(|(n, _)| n == name) {
            Some((_, range)) => highest_match(range, &versions)?,
            None if versions.len() == 1 => versions.first().cloned(),
            None => None,
        };

        version
            .and_then(|v| self.find(name, &v))
            .ok_or_else(|| NodepackError::NoDefaultVersion(name.to_string()))
    }

    fn find(&self, name: &str, version: &str) -> Option<CatalogEntry> {
        self.entries_named(name)
            .find(|e| e.version == version)
            .cloned()
    }
}
