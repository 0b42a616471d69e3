//! Restore and save of cached directories

use super::selection::{CacheSelection, SCRATCH_CACHE_DIRS};
use super::signature::CacheSignature;
use super::CACHE_ROOT;
use crate::error::{NodepackError, NodepackResult};
use crate::stager::{self, BuildLayout};
use crate::ui::BuildLog;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Why a restore did or did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No signature file
    NoPreviousCache,
    /// Signature from a different runtime
    SignatureMismatch,
    /// NODE_MODULES_CACHE=false
    Disabled,
    /// Selected directories were processed
    Restored,
}

/// One selected directory and where it currently exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirectoryEntry {
    pub path: String,
    pub in_build: bool,
    pub in_cache: bool,
}

impl CacheDirectoryEntry {
    async fn inspect(path: &str, build_dir: &Path, cache_root: &Path) -> NodepackResult<Self> {
        Ok(Self {
            path: path.to_string(),
            in_build: stager::path_exists(&build_dir.join(path)).await?,
            in_cache: stager::path_exists(&cache_root.join(path)).await?,
        })
    }
}

/// Directory cache rooted at `<cache>/node`
pub struct DirectoryCache<'a> {
    build_dir: PathBuf,
    cache_dir: PathBuf,
    cache_root: PathBuf,
    enabled: bool,
    log: &'a BuildLog,
}

impl<'a> DirectoryCache<'a> {
    /// `enabled` is false when NODE_MODULES_CACHE=false
    pub fn new(layout: &BuildLayout, enabled: bool, log: &'a BuildLog) -> Self {
        Self {
            build_dir: layout.build_dir.clone(),
            cache_dir: layout.cache_dir.clone(),
            cache_root: layout.cache_dir.join(CACHE_ROOT),
            enabled,
            log,
        }
    }

    /// Move cached directories back into the build dir
    ///
    /// Nothing in the build dir is ever overwritten.
    pub async fn restore(
        &self,
        signature: &CacheSignature,
        selection: &CacheSelection,
    ) -> NodepackResult<RestoreOutcome> {
        self.log.begin_step("Restoring cache");

        let Some(stored) = CacheSignature::read(&self.cache_root).await? else {
            self.log.info("Skipping cache restore (no previous cache)");
            return Ok(RestoreOutcome::NoPreviousCache);
        };

        if !signature.matches(&stored) {
            self.log.debug(&format!(
                "Cache signature '{}' does not match '{}'",
                stored.trim(),
                signature
            ));
            self.log.info("Skipping cache restore (new runtime signature)");
            return Ok(RestoreOutcome::SignatureMismatch);
        }

        if !self.enabled {
            self.log.info("Skipping cache restore (disabled by config)");
            return Ok(RestoreOutcome::Disabled);
        }

        self.log.info(&format!(
            "Loading {} from cacheDirectories ({}):",
            selection.dirs.len(),
            selection.source
        ));

        for dir in &selection.dirs {
            if !is_safe_relative(dir) {
                self.log.info(&format!("- {} (invalid path - skipping)", dir));
                continue;
            }

            let entry =
                CacheDirectoryEntry::inspect(dir, &self.build_dir, &self.cache_root).await?;
            if entry.in_build {
                self.log.info(&format!("- {} (exists - skipping)", dir));
            } else if !entry.in_cache {
                self.log.info(&format!("- {} (not cached - skipping)", dir));
            } else {
                self.log.info(&format!("- {}", dir));
                move_dir(&self.cache_root.join(dir), &self.build_dir.join(dir)).await?;
            }
        }

        Ok(RestoreOutcome::Restored)
    }

    /// Replace the cache with the selected build directories
    ///
    /// The signature is always rewritten, even when caching is disabled, so
    /// the next build knows which runtime the (empty) cache belongs to.
    pub async fn save(
        &self,
        signature: &CacheSignature,
        selection: &CacheSelection,
    ) -> NodepackResult<()> {
        self.log.begin_step("Caching build");
        self.log.info("Clearing previous node cache");

        stager::remove_path(&self.cache_root).await?;
        stager::create_dir_all(&self.cache_root).await?;
        signature.write(&self.cache_root).await?;

        if self.enabled {
            self.log.info(&format!(
                "Saving {} cacheDirectories ({}):",
                selection.dirs.len(),
                selection.source
            ));

            for dir in &selection.dirs {
                let source = self.build_dir.join(dir);
                if !is_safe_relative(dir) || !stager::path_exists(&source).await? {
                    self.log.info(&format!("- {} (nothing to cache)", dir));
                    continue;
                }

                self.log.info(&format!("- {}", dir));
                copy_dir(&source, &self.cache_root.join(dir)).await?;
            }
        } else {
            self.log.info("Skipping cache save (disabled by config)");
        }

        for scratch in SCRATCH_CACHE_DIRS {
            stager::remove_path(&self.build_dir.join(scratch)).await?;
        }

        Ok(())
    }

    /// Let package manager caches shipped with the app replace the ones
    /// npm and yarn are pointed at under the cache dir
    pub async fn seed_from_app(&self) -> NodepackResult<()> {
        stager::remove_path(&self.cache_dir.join("bower_components")).await?;

        for dir in SCRATCH_CACHE_DIRS {
            let source = self.build_dir.join(dir);
            if !stager::is_dir(&source).await? {
                continue;
            }
            let dest = self.cache_dir.join(dir);
            debug!("Seeding {} from the app", dest.display());
            stager::remove_path(&dest).await?;
            copy_dir(&source, &dest).await?;
        }

        Ok(())
    }
}

/// Declared directories must stay inside the build and cache dirs
fn is_safe_relative(dir: &str) -> bool {
    let path = Path::new(dir);
    !dir.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Rename, falling back to copy and delete across filesystems
pub(crate) async fn move_dir(source: &Path, dest: &Path) -> NodepackResult<()> {
    if let Some(parent) = dest.parent() {
        stager::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(source, dest).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                "rename {} -> {} failed ({}), copying",
                source.display(),
                dest.display(),
                e
            );
            copy_dir(source, dest).await?;
            stager::remove_path(source).await
        }
    }
}

/// Recursively copy `source` to `dest`, keeping symlinks as symlinks
async fn copy_dir(source: &Path, dest: &Path) -> NodepackResult<()> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || copy_tree(&source, &dest))
        .await
        .map_err(|e| NodepackError::Internal(format!("copy task failed: {}", e)))?
}

fn copy_tree(source: &Path, dest: &Path) -> NodepackResult<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            NodepackError::io(
                format!("walking {}", source.display()),
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory loop")),
            )
        })?;

        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = if relative.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(relative)
        };
        let file_type = entry.file_type();

        let result = if file_type.is_dir() {
            fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| NodepackError::io(format!("creating {}", parent.display()), e))?;
            }
            fs::copy(entry.path(), &target).map(|_| ())
        };

        result.map_err(|e| NodepackError::io(format!("copying to {}", target.display()), e))?;
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    let points_to = fs::read_link(link)?;
    if fs::symlink_metadata(target).is_ok() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(points_to, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    fs::copy(link, target).map(|_| ())
}
