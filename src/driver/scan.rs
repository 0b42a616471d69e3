//! Advisory scans over package manager output
//!
//! None of these change the outcome of a build.

use super::PackageManager;
use std::fmt;

/// Helper tools apps often run from build scripts without declaring them
const BUILD_TOOLS: [&str; 3] = ["grunt", "bower", "gulp"];

/// A hint found in the install transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputWarning {
    /// A build tool was invoked but is not installed
    Untracked(&'static str),
    /// The package manager reported unmet (peer) dependencies
    UnmetDependencies(PackageManager),
    /// Something failed to `require` a module
    MissingModule {
        /// Production install with devDependencies declared
        escalate: bool,
    },
}

impl fmt::Display for OutputWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untracked(tool) => {
                let mut chars = tool.chars();
                let title: String = chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect())
                    .unwrap_or_default();
                write!(f, "{} may not be tracked in package.json", title)
            }
            Self::UnmetDependencies(manager) => write!(
                f,
                "Unmet dependencies don't fail {} install but may cause runtime issues\n\
                 See: https://github.com/npm/npm/issues/7494",
                manager
            ),
            Self::MissingModule { escalate } => {
                write!(f, "A module may be missing from 'dependencies' in package.json")?;
                if *escalate {
                    write!(
                        f,
                        "\nThis module may be specified in 'devDependencies' instead of 'dependencies'\n\
                         See: https://devcenter.heroku.com/articles/nodejs-support#devdependencies"
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// Scan a transcript, case-insensitively, line by line
pub fn scan_output(text: &str, manager: PackageManager, escalate: bool) -> Vec<OutputWarning> {
    let lines: Vec<String> = text.lines().map(str::to_lowercase).collect();
    let contains_any =
        |patterns: &[&str]| lines.iter().any(|l| patterns.iter().any(|p| l.contains(p)));

    let mut warnings: Vec<OutputWarning> = BUILD_TOOLS
        .into_iter()
        .filter(|tool| {
            let not_found = format!("{}: not found", tool);
            let command_not_found = format!("{}: command not found", tool);
            contains_any(&[not_found.as_str(), command_not_found.as_str()])
        })
        .map(OutputWarning::Untracked)
        .collect();

    if contains_any(&["unmet dependency", "unmet peer dependency"]) {
        warnings.push(OutputWarning::UnmetDependencies(manager));
    }

    if contains_any(&["cannot find module"]) {
        warnings.push(OutputWarning::MissingModule { escalate });
    }

    warnings
}
