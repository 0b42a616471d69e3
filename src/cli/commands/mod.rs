//! CLI command implementations

pub mod supply;

pub use supply::execute as supply;
