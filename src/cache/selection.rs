//! Which directories to cache

use crate::package_json::PackageJson;
use std::fmt;

/// Cached when package.json declares nothing
pub const DEFAULT_CACHE_DIRS: &[&str] = &[".npm", ".cache/yarn", "bower_components"];

/// Package manager scratch caches; removed from the build dir after saving
pub const SCRATCH_CACHE_DIRS: &[&str] = &[".npm", ".cache/yarn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    PackageJson,
    Default,
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackageJson => write!(f, "package.json"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Directories to restore and save for one build
///
/// Exactly one source is used; declared and default lists are never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSelection {
    pub source: SelectionSource,
    pub dirs: Vec<String>,
}

impl CacheSelection {
    /// Declared directories when there are any, the defaults otherwise
    pub fn from_package(package: Option<&PackageJson>) -> Self {
        match package.map(PackageJson::declared_cache_dirs) {
            Some(declared) if !declared.is_empty() => Self {
                source: SelectionSource::PackageJson,
                dirs: declared.to_vec(),
            },
            _ => Self::defaults(),
        }
    }

    pub fn defaults() -> Self {
        Self {
            source: SelectionSource::Default,
            dirs: DEFAULT_CACHE_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }
}
