//! Runtime version selection
//!
//! - `nvmrc`: pin file validation and normalization
//! - `range`: npm range syntax on top of `semver`
//! - `resolver`: precedence rules and catalog lookup

pub mod nvmrc;
pub mod range;
pub mod resolver;

pub use nvmrc::{NvmrcVersion, LTS};
pub use range::{highest_match, satisfies, NpmRange};
pub use resolver::{
    resolve, HintSource, NpmRequest, Resolution, ResolvedVersions, VersionHint, VersionHints,
    VersionWarning,
};
