//! `.nvmrc` pin file parsing
//!
//! The pin file holds a single token: a numeric version with one to three
//! components (optionally `v`-prefixed), `node`, `lts/*` or `lts/<codename>`.
//! Anything else is rejected before resolution starts.

use crate::error::{NodepackError, NodepackResult};
use std::path::Path;
use tracing::debug;

/// File name of the pin file at the application root
pub const NVMRC_FILE: &str = ".nvmrc";

/// LTS codenames and their node major versions
pub const LTS: &[(&str, u64)] = &[
    ("argon", 4),
    ("boron", 6),
    ("carbon", 8),
    ("dubnium", 10),
    ("erbium", 12),
    ("fermium", 14),
    ("gallium", 16),
    ("hydrogen", 18),
    ("iron", 20),
    ("jod", 22),
];

/// A validated `.nvmrc` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NvmrcVersion {
    /// `node`: newest version in the catalog
    Latest,
    /// `lts/*` (`None`) or `lts/<codename>`
    Lts(Option<String>),
    /// Numeric version with the `v` prefix stripped, e.g. `10.2`
    Numeric(String),
}

impl NvmrcVersion {
    /// Validate raw pin file content
    pub fn parse(content: &str) -> NodepackResult<Self> {
        let token = content.trim().to_lowercase();

        if token == "node" {
            return Ok(Self::Latest);
        }

        if let Some(name) = token.strip_prefix("lts/") {
            if name == "*" {
                return Ok(Self::Lts(None));
            }
            if lts_major(name).is_some() {
                return Ok(Self::Lts(Some(name.to_string())));
            }
            return Err(NodepackError::InvalidNvmrc { token });
        }

        let numeric = token.strip_prefix('v').unwrap_or(&token);
        if is_numeric_version(numeric) {
            return Ok(Self::Numeric(numeric.to_string()));
        }

        Err(NodepackError::InvalidNvmrc { token })
    }

    /// The semver range this token stands for
    pub fn to_range(&self) -> String {
        match self {
            Self::Latest => "*".to_string(),
            Self::Lts(None) => format!("{}.*.*", newest_lts_major()),
            Self::Lts(Some(name)) => {
                // Codename was checked in parse
                format!("{}.*.*", lts_major(name).unwrap_or_else(newest_lts_major))
            }
            Self::Numeric(version) => pad_range(version),
        }
    }

    /// Whether the token asks for the newest catalog version
    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }

    /// Whether the token is an LTS alias
    pub fn is_lts(&self) -> bool {
        matches!(self, Self::Lts(_))
    }
}

/// Major version for an LTS codename
pub fn lts_major(codename: &str) -> Option<u64> {
    LTS.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(codename))
        .map(|(_, major)| *major)
}

fn newest_lts_major() -> u64 {
    LTS.iter().map(|(_, major)| *major).max().unwrap_or(0)
}

/// One to three dot-separated runs of digits
fn is_numeric_version(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    (1..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Pad a partial numeric version into a three-component range
///
/// `10` becomes `10.*.*`, `10.2` becomes `10.2.*`. Anything that is not a
/// dotted run of numbers and wildcards is returned unchanged, so applying
/// this twice is the same as applying it once.
pub fn pad_range(range: &str) -> String {
    let range = range.trim();
    let parts: Vec<&str> = range.split('.').collect();
    let padable = (1..=3).contains(&parts.len())
        && parts.iter().all(|p| {
            *p == "*" || (!p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        });

    if !padable || range == "*" {
        return range.to_string();
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".*");
    }
    padded
}

/// Load and validate `<build_dir>/.nvmrc`, if present
pub async fn load(build_dir: &Path) -> NodepackResult<Option<NvmrcVersion>> {
    let path = build_dir.join(NVMRC_FILE);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No .nvmrc in {}", build_dir.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(NodepackError::io(
                format!("reading {}", path.display()),
                e,
            ))
        }
    };

    let version = NvmrcVersion::parse(&content)?;
    debug!("Loaded .nvmrc: {:?}", version);
    Ok(Some(version))
}
