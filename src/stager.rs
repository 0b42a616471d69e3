//! Staging directory layout
//!
//! A supply run works on four locations handed over by the platform:
//!
//! | Path | Contents |
//! |------|----------|
//! | build dir | the application, where `node_modules` is materialized |
//! | cache dir | survives between builds; holds downloads and the directory cache |
//! | deps dir / idx | this buildpack's slot for installed runtimes |
//!
//! Runtime environment is exported to later buildpacks through
//! `<deps>/<idx>/env/<NAME>` files and to the running app through
//! `<deps>/<idx>/profile.d/*.sh`.

use crate::error::{NodepackError, NodepackResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories for one staging run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    pub build_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub deps_dir: PathBuf,
    pub deps_idx: String,
}

impl BuildLayout {
    pub fn new(
        build_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        deps_dir: impl Into<PathBuf>,
        deps_idx: impl Into<String>,
    ) -> Self {
        Self {
            build_dir: build_dir.into(),
            cache_dir: cache_dir.into(),
            deps_dir: deps_dir.into(),
            deps_idx: deps_idx.into(),
        }
    }

    /// `<deps>/<idx>`
    pub fn dep_dir(&self) -> PathBuf {
        self.deps_dir.join(&self.deps_idx)
    }

    /// `<deps>/<idx>/bin`
    pub fn bin_dir(&self) -> PathBuf {
        self.dep_dir().join("bin")
    }

    /// Create the dep dir and its `bin`, `env` and `profile.d` children
    pub async fn ensure_dirs(&self) -> NodepackResult<()> {
        for dir in [
            self.dep_dir(),
            self.bin_dir(),
            self.dep_dir().join("env"),
            self.dep_dir().join("profile.d"),
        ] {
            create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Link every entry of `src` into `<deps>/<idx>/<dest_subdir>`
    ///
    /// Links are relative to the dep dir so the tree can be relocated when
    /// the droplet is unpacked somewhere else.
    pub async fn link_directory_in_dep_dir(
        &self,
        src: &Path,
        dest_subdir: &str,
    ) -> NodepackResult<()> {
        let dest = self.dep_dir().join(dest_subdir);
        create_dir_all(&dest).await?;

        let mut entries = tokio::fs::read_dir(src)
            .await
            .map_err(|e| NodepackError::io(format!("reading {}", src.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| NodepackError::io(format!("reading {}", src.display()), e))?
        {
            let target = relative_target(&dest, &entry.path(), &self.dep_dir());
            let link = dest.join(entry.file_name());

            if tokio::fs::symlink_metadata(&link).await.is_ok() {
                remove_path(&link).await?;
            }

            debug!("Linking {} -> {}", link.display(), target.display());
            make_link(&target, &entry.path(), &link).await?;
        }

        Ok(())
    }

    /// Write `<deps>/<idx>/env/<name>`
    pub async fn write_env_file(&self, name: &str, value: &str) -> NodepackResult<()> {
        let dir = self.dep_dir().join("env");
        create_dir_all(&dir).await?;
        write_file(&dir.join(name), value).await
    }

    /// Write `<deps>/<idx>/profile.d/<name>`
    pub async fn write_profile_d(&self, name: &str, content: &str) -> NodepackResult<()> {
        let dir = self.dep_dir().join("profile.d");
        create_dir_all(&dir).await?;
        write_file(&dir.join(name), content).await
    }
}

/// Path to `target` as seen from inside `link_dir`, when both live under `root`
fn relative_target(link_dir: &Path, target: &Path, root: &Path) -> PathBuf {
    match (link_dir.strip_prefix(root), target.strip_prefix(root)) {
        (Ok(from), Ok(to)) => {
            let mut rel = PathBuf::new();
            for _ in from.components() {
                rel.push("..");
            }
            rel.join(to)
        }
        _ => target.to_path_buf(),
    }
}

#[cfg(unix)]
async fn make_link(target: &Path, _absolute: &Path, link: &Path) -> NodepackResult<()> {
    tokio::fs::symlink(target, link)
        .await
        .map_err(|e| NodepackError::io(format!("linking {}", link.display()), e))
}

#[cfg(not(unix))]
async fn make_link(_target: &Path, absolute: &Path, link: &Path) -> NodepackResult<()> {
    tokio::fs::copy(absolute, link)
        .await
        .map(|_| ())
        .map_err(|e| NodepackError::io(format!("copying {}", link.display()), e))
}

pub(crate) async fn create_dir_all(dir: &Path) -> NodepackResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| NodepackError::io(format!("creating {}", dir.display()), e))
}

pub(crate) async fn write_file(path: &Path, content: &str) -> NodepackResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| NodepackError::io(format!("writing {}", path.display()), e))
}

/// Remove a file, symlink or directory tree
pub(crate) async fn remove_path(path: &Path) -> NodepackResult<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(NodepackError::io(format!("inspecting {}", path.display()), e)),
    };

    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    result.map_err(|e| NodepackError::io(format!("removing {}", path.display()), e))
}

/// Whether `path` exists without following a trailing symlink
pub(crate) async fn path_exists(path: &Path) -> NodepackResult<bool> {
    stat(tokio::fs::symlink_metadata(path).await, path).map(|m| m.is_some())
}

/// Whether `path` is an existing directory
pub(crate) async fn is_dir(path: &Path) -> NodepackResult<bool> {
    stat(tokio::fs::metadata(path).await, path).map(|m| m.is_some_and(|m| m.is_dir()))
}

/// Whether `path` is an existing regular file
pub(crate) async fn is_file(path: &Path) -> NodepackResult<bool> {
    stat(tokio::fs::metadata(path).await, path).map(|m| m.is_some_and(|m| m.is_file()))
}

/// Only a missing path is absent; any other failure to stat is an error
fn stat(
    result: std::io::Result<std::fs::Metadata>,
    path: &Path,
) -> NodepackResult<Option<std::fs::Metadata>> {
    match result {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(NodepackError::io(format!("inspecting {}", path.display()), e)),
    }
}
