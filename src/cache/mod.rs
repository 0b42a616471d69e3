//! Build cache for expensive directories
//!
//! Package manager caches and vendored component directories are persisted
//! under `<cache>/node` between builds. A cache is only reused when the
//! runtime that produced it matches the current one.
//!
//! # Signature Gating
//!
//! - The signature is `"<node>; <npm>; <yarn>"` from the installed runtime
//! - Saved next to the cached directories as `<cache>/node/signature`
//! - A missing or different signature skips restore entirely, so native
//!   modules built for one node are never mixed into a build for another
//!
//! # Directory States at Restore
//!
//! | In build dir | In cache | Action |
//! |--------------|----------|--------|
//! | yes | any | skip (exists - skipping) |
//! | no | no | skip (not cached - skipping) |
//! | no | yes | move cache -> build dir |

pub mod directory;
pub mod selection;
pub mod signature;

pub use directory::{CacheDirectoryEntry, DirectoryCache, RestoreOutcome};
pub use selection::{CacheSelection, SelectionSource, DEFAULT_CACHE_DIRS, SCRATCH_CACHE_DIRS};
pub use signature::{CacheSignature, SIGNATURE_FILE};

/// Directory under the cache dir owned by this buildpack
pub const CACHE_ROOT: &str = "node";
