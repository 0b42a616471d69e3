//! npm-style semver ranges
//!
//! Application manifests use npm range syntax, which is looser than what
//! `semver::VersionReq` accepts: `||` alternatives, space separated
//! comparators, hyphen ranges, `x` wildcards, bare versions meaning exact
//! (or partial) matches and the Ruby-style `~>` operator. Each `||` clause is
//! translated into one `VersionReq`; a version matches the range when it
//! matches any clause.

use crate::error::{NodepackError, NodepackResult};
use semver::{Version, VersionReq};
use tracing::debug;

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '~', '^'];

/// A parsed npm-style range
#[derive(Debug, Clone)]
pub struct NpmRange {
    raw: String,
    clauses: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse an npm-style range expression
    pub fn parse(raw: &str) -> NodepackResult<Self> {
        let mut clauses = Vec::new();

        for clause in raw.split("||") {
            let translated = translate_clause(clause.trim())
                .map_err(|reason| invalid(raw, reason))?;
            let req = VersionReq::parse(&translated).map_err(|e| invalid(raw, e.to_string()))?;
            clauses.push(req);
        }

        Ok(Self {
            raw: raw.to_string(),
            clauses,
        })
    }

    /// Whether a version satisfies any clause of the range
    pub fn matches(&self, version: &Version) -> bool {
        self.clauses.iter().any(|req| req.matches(version))
    }

    /// The range as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn invalid(range: &str, reason: impl Into<String>) -> NodepackError {
    NodepackError::InvalidRange {
        range: range.to_string(),
        reason: reason.into(),
    }
}

/// Parse a concrete version string, tolerating a leading `v`
pub fn parse_version(s: &str) -> Option<Version> {
    let s = s.trim();
    Version::parse(s.strip_prefix('v').unwrap_or(s)).ok()
}

/// Whether `version` satisfies `range`
pub fn satisfies(range: &str, version: &str) -> NodepackResult<bool> {
    let range = NpmRange::parse(range)?;
    Ok(parse_version(version).is_some_and(|v| range.matches(&v)))
}

/// Highest version in `versions` satisfying `range`
///
/// Returns `Ok(None)` when nothing matches; only a malformed range is an
/// error. Unparseable catalog versions are skipped.
pub fn highest_match(range: &str, versions: &[String]) -> NodepackResult<Option<String>> {
    let parsed = NpmRange::parse(range)?;

    let best = versions
        .iter()
        .filter_map(|raw| match parse_version(raw) {
            Some(v) => Some((v, raw)),
            None => {
                debug!("Skipping unparseable version {}", raw);
                None
            }
        })
        .filter(|(v, _)| parsed.matches(v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.clone());

    debug!("Range {} resolved to {:?}", range, best);
    Ok(best)
}

/// Translate one `||` clause into `VersionReq` syntax
fn translate_clause(clause: &str) -> Result<String, String> {
    if let Some((low, high)) = split_hyphen(clause) {
        let low = comparator(">=", low)?;
        let high = comparator("<=", high)?;
        return Ok(join_comparators(vec![low, high]));
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in clause.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }

        // `>= 6.11.1` splits the operator from its version
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            pending_op = Some(token.to_string());
            continue;
        }

        let token = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None => token.to_string(),
        };

        let split = token
            .find(|c: char| !OPERATOR_CHARS.contains(&c))
            .unwrap_or(token.len());
        let (op, version) = token.split_at(split);
        comparators.push(comparator(op, version)?);
    }

    if let Some(op) = pending_op {
        return Err(format!("operator '{}' without a version", op));
    }

    Ok(join_comparators(comparators))
}

fn split_hyphen(clause: &str) -> Option<(&str, &str)> {
    let (low, high) = clause.split_once(" - ")?;
    Some((low.trim(), high.trim()))
}

/// Build a single comparator, dropping wildcard components
///
/// Returns `None`-equivalent `"*"` for a full wildcard.
fn comparator(op: &str, version: &str) -> Result<String, String> {
    let op = match op {
        "" | "=" | "==" => "=",
        "~>" | "~" => "~",
        "^" => "^",
        ">" | ">=" | "<" | "<=" => op,
        other => return Err(format!("unsupported operator '{}'", other)),
    };

    let version = version.trim_start_matches(['v', '=']);
    if version.is_empty() {
        return Err("missing version".to_string());
    }

    let (core, pre) = match version.split_once(['-', '+']) {
        Some((core, _)) => (core, &version[core.len()..]),
        None => (version, ""),
    };

    let mut parts = Vec::new();
    for part in core.split('.') {
        if matches!(part, "x" | "X" | "*") {
            break;
        }
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid version component '{}'", part));
        }
        parts.push(part);
    }

    if parts.len() > 3 {
        return Err(format!("too many version components in '{}'", version));
    }

    if parts.is_empty() {
        return Ok("*".to_string());
    }

    // Prerelease tags only make sense on a full version
    let pre = if parts.len() == 3 { pre } else { "" };
    Ok(format!("{}{}{}", op, parts.join("."), pre))
}

fn join_comparators(comparators: Vec<String>) -> String {
    let concrete: Vec<String> = comparators.into_iter().filter(|c| c != "*").collect();
    if concrete.is_empty() {
        "*".to_string()
    } else {
        concrete.join(", ")
    }
}
