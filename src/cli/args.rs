//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// nodepack - Node.js buildpack supply
///
/// Resolves and installs node, npm and yarn, builds the app's dependencies
/// and keeps package manager caches between builds.
#[derive(Parser, Debug)]
#[command(name = "nodepack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the runtime and build dependencies for an app
    Supply(SupplyArgs),
}

/// Arguments for the supply command
#[derive(Parser, Debug)]
pub struct SupplyArgs {
    /// Application source directory
    pub build_dir: PathBuf,

    /// Directory persisted between builds of the same app
    pub cache_dir: PathBuf,

    /// Directory shared by all buildpacks of this build
    pub deps_dir: PathBuf,

    /// Index of this buildpack under the deps directory
    pub deps_idx: String,

    /// Buildpack manifest listing the available dependencies
    #[arg(long, env = "NODEPACK_MANIFEST", default_value = "manifest.yml")]
    pub manifest: PathBuf,
}
