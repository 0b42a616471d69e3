//! Error types for Nodepack
//!
//! All modules use `NodepackResult<T>` as their return type. Every variant
//! here aborts the build; advisory conditions are logged, never returned.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Nodepack operations
pub type NodepackResult<T> = Result<T, NodepackError>;

/// All errors that can abort a build
#[derive(Error, Debug)]
pub enum NodepackError {
    // Manifest errors
    #[error("io.js not supported by this buildpack")]
    IojsNotSupported,

    #[error("Unable to parse {path}: {reason}")]
    PackageJsonInvalid { path: PathBuf, reason: String },

    #[error("invalid version {token} specified in .nvmrc")]
    InvalidNvmrc { token: String },

    // Resolution errors
    #[error("no match found for {range} in {available:?}")]
    NoMatchingVersion {
        name: String,
        range: String,
        available: Vec<String>,
    },

    #[error("package.json requested {requested}, buildpack only includes yarn version {available}")]
    YarnVersionUnavailable {
        requested: String,
        available: String,
    },

    #[error("invalid semver range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    // Catalog errors
    #[error("Invalid buildpack manifest at {path}: {reason}")]
    CatalogInvalid { path: PathBuf, reason: String },

    #[error("no default version for {0} in the buildpack manifest")]
    NoDefaultVersion(String),

    #[error("dependency {name} {version} is not in the buildpack manifest")]
    DependencyMissing { name: String, version: String },

    // Install errors
    #[error("dependency sha256 mismatch: expected sha256 {expected}, actual sha256 {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Failed to download {uri}: {reason}")]
    Download { uri: String, reason: String },

    #[error("Failed to extract {path}: {reason}")]
    Extract { path: PathBuf, reason: String },

    #[error("Unable to find {name} distribution dir in {dir}")]
    DistributionMissing { name: String, dir: PathBuf },

    #[error("We're unable to download the version of npm you've provided ({requested})")]
    NpmSelfInstall { requested: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with status {code}: {command}")]
    CommandExit { command: String, code: i32 },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NodepackError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a non-zero exit error
    pub fn command_exit(command: impl Into<String>, code: i32) -> Self {
        Self::CommandExit {
            command: command.into(),
            code,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::IojsNotSupported => Some("Remove engines.iojs from package.json"),
            Self::InvalidNvmrc { .. } => {
                Some(".nvmrc accepts a version like 10, 10.2, v10.2.3, node or lts/<codename>")
            }
            Self::NpmSelfInstall { .. } => {
                Some("Please remove the npm version specification in package.json")
            }
            Self::NoMatchingVersion { .. } | Self::YarnVersionUnavailable { .. } => {
                Some("See: http://docs.cloudfoundry.org/buildpacks/node/node-tips.html")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = NodepackError::ChecksumMismatch {
            expected: "aaa".to_string(),
            actual: "bbb".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "dependency sha256 mismatch: expected sha256 aaa, actual sha256 bbb"
        );
    }

    #[test]
    fn no_match_names_range_and_versions() {
        let err = NodepackError::NoMatchingVersion {
            name: "node".to_string(),
            range: "~>9".to_string(),
            available: vec!["4.8.2".to_string(), "6.0.0".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("no match found for ~>9"));
        assert!(msg.contains("4.8.2"));
    }

    #[test]
    fn error_hint() {
        let err = NodepackError::NpmSelfInstall {
            requested: "99.0.0".to_string(),
        };
        assert_eq!(
            err.hint(),
            Some("Please remove the npm version specification in package.json")
        );
        assert_eq!(NodepackError::NoDefaultVersion("node".into()).hint(), None);
    }
}
