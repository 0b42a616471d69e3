//! UI context for detecting interactive vs CI environments

use std::io::IsTerminal;

/// UI context that determines output behavior
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    /// Whether running in an interactive terminal
    interactive: bool,
    /// Whether debug lines are written to the build log
    debug: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            interactive: std::io::stdout().is_terminal(),
            debug: false,
        }
    }

    /// Create a non-interactive context (for testing or explicit CI mode)
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            debug: false,
        }
    }

    /// Enable debug output (BP_DEBUG)
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Check if we should use colored output
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    /// Check if debug lines are shown
    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl Default for UiContext {
    fn default() -> Self {
        Self::detect()
    }
}
