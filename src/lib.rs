//! nodepack - Node.js buildpack supply
//!
//! Resolves node, npm and yarn versions from the app's declarations,
//! installs them from a checksummed catalog, drives npm, yarn or pnpm to
//! build `node_modules`, and keeps expensive directories between builds
//! behind a runtime signature.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod install;
pub mod package_json;
pub mod stager;
pub mod supply;
pub mod ui;
pub mod version;

pub use error::{NodepackError, NodepackResult};
