//! Artifact download, checksum verification and extraction

use super::Installer;
use crate::catalog::CatalogEntry;
use crate::error::{NodepackError, NodepackResult};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

/// Installs catalog entries, keeping verified downloads under
/// `<cache>/dependencies/<sha256>/` for later builds
#[derive(Debug, Clone)]
pub struct CatalogInstaller {
    download_dir: PathBuf,
}

impl CatalogInstaller {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            download_dir: cache_dir.join("dependencies"),
        }
    }
}

#[async_trait]
impl Installer for CatalogInstaller {
    async fn install(&self, entry: &CatalogEntry, dest_dir: &Path) -> NodepackResult<()> {
        let entry = entry.clone();
        let download_dir = self.download_dir.clone();
        let dest_dir = dest_dir.to_path_buf();

        // ureq, flate2 and tar are blocking
        tokio::task::spawn_blocking(move || {
            let archive = fetch_verified(&entry, &download_dir)?;
            unpack(&archive, &dest_dir)
        })
        .await
        .map_err(|e| NodepackError::Internal(format!("install task failed: {}", e)))?
    }
}

/// Return a local copy of the artifact whose digest matches the catalog
fn fetch_verified(entry: &CatalogEntry, download_dir: &Path) -> NodepackResult<PathBuf> {
    let expected = entry.sha256.to_lowercase();
    let dir = download_dir.join(&expected);
    let cached = dir.join(file_name(entry));

    if cached.is_file() {
        if sha256_file(&cached)? == expected {
            debug!("Reusing verified download {}", cached.display());
            return Ok(cached);
        }
        warn!("Discarding corrupt download {}", cached.display());
        remove_file(&cached)?;
    }

    fs::create_dir_all(&dir)
        .map_err(|e| NodepackError::io(format!("creating {}", dir.display()), e))?;

    let partial = dir.join(format!("{}.partial", file_name(entry)));
    download(&entry.uri, &partial)?;

    let actual = sha256_file(&partial)?;
    if actual != expected {
        remove_file(&partial)?;
        return Err(NodepackError::ChecksumMismatch { expected, actual });
    }

    fs::rename(&partial, &cached)
        .map_err(|e| NodepackError::io(format!("storing {}", cached.display()), e))?;
    Ok(cached)
}

/// Last path segment of the URI, without query string
fn file_name(entry: &CatalogEntry) -> String {
    entry
        .uri
        .split(['?', '#'])
        .next()
        .and_then(|uri| uri.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}.tgz", entry.name, entry.version))
}

fn download(uri: &str, dest: &Path) -> NodepackResult<()> {
    if let Some(path) = uri.strip_prefix("file://") {
        debug!("Copying {} to {}", path, dest.display());
        fs::copy(path, dest).map_err(|e| NodepackError::Download {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        return Ok(());
    }

    debug!("Downloading {}", uri);
    let response = ureq::get(uri).call().map_err(|e| NodepackError::Download {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;

    let mut reader = response.into_body().into_reader();
    let mut file =
        File::create(dest).map_err(|e| NodepackError::io(format!("creating {}", dest.display()), e))?;
    io::copy(&mut reader, &mut file).map_err(|e| NodepackError::Download {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Hex encoded SHA-256 of a file
pub(crate) fn sha256_file(path: &Path) -> NodepackResult<String> {
    let mut file =
        File::open(path).map_err(|e| NodepackError::io(format!("reading {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| NodepackError::io(format!("hashing {}", path.display()), e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Extract gzipped tarballs; any other artifact is copied as-is
fn unpack(archive: &Path, dest_dir: &Path) -> NodepackResult<()> {
    fs::create_dir_all(dest_dir)
        .map_err(|e| NodepackError::io(format!("creating {}", dest_dir.display()), e))?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        extract_tgz(archive, dest_dir)
    } else {
        let dest = dest_dir.join(&name);
        fs::copy(archive, &dest)
            .map(|_| ())
            .map_err(|e| NodepackError::io(format!("copying to {}", dest.display()), e))
    }
}

fn extract_tgz(archive: &Path, dest_dir: &Path) -> NodepackResult<()> {
    let extract_err = |reason: String| NodepackError::Extract {
        path: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive)
        .map_err(|e| NodepackError::io(format!("reading {}", archive.display()), e))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);

    for entry in tar.entries().map_err(|e| extract_err(e.to_string()))? {
        let mut entry = entry.map_err(|e| extract_err(e.to_string()))?;
        // unpack_in refuses entries that would land outside dest_dir
        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|e| extract_err(e.to_string()))?;
        if !unpacked {
            let path = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
            return Err(extract_err(format!("entry escapes destination: {}", path)));
        }
    }

    debug!("Extracted {} into {}", archive.display(), dest_dir.display());
    Ok(())
}

fn remove_file(path: &Path) -> NodepackResult<()> {
    fs::remove_file(path).map_err(|e| NodepackError::io(format!("removing {}", path.display()), e))
}
