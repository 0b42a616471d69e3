//! Build output for staging logs
//!
//! Staging output follows the buildpack log conventions: `-----> ` step
//! headers, seven-space indented detail lines, `**WARNING**` and `PRO TIP:`
//! callouts. Colors are only used when writing to an interactive terminal.
//!
//! # Example
//!
//! ```rust,ignore
//! use nodepack::ui::{BuildLog, UiContext};
//!
//! let log = BuildLog::stdout(UiContext::detect());
//! log.begin_step("Installing binaries");
//! log.info("engines.node (package.json): 18.x");
//! log.warning("Dangerous semver range (*) in engines.node");
//! ```

mod context;
mod log;

pub use context::UiContext;
pub use log::{BuildLog, LogBuffer};
