//! Runtime version resolution
//!
//! Combines the `engines` section of package.json, the `.nvmrc` pin file and
//! the catalog defaults into one concrete version per component.
//!
//! | Component | Hint matches catalog | Hint matches nothing | No hint |
//! |-----------|----------------------|----------------------|---------|
//! | node | highest match | fatal | catalog default |
//! | npm | pinned to highest match | npm installs the range itself | bundled with node |
//! | yarn | highest match | fatal, lists catalog versions | catalog default |
//!
//! npm is the odd one out because it can install itself; node and yarn only
//! ever come from the catalog.

use crate::catalog::Catalog;
use crate::error::{NodepackError, NodepackResult};
use crate::package_json::PackageJson;
use crate::version::nvmrc::{pad_range, NvmrcVersion};
use crate::version::range::highest_match;
use std::fmt;
use tracing::debug;

/// Operational docs for choosing a node version
pub const NODE_TIPS_URL: &str = "http://docs.cloudfoundry.org/buildpacks/node/node-tips.html";

/// Where a version hint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintSource {
    /// `engines` in package.json
    ManifestEngines,
    /// `.nvmrc`
    PinFile,
    /// Nothing was declared
    Unspecified,
}

/// A requested range with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHint {
    /// Requested range, `None` when unspecified
    pub range: Option<String>,
    /// Where the range came from
    pub source: HintSource,
}

impl VersionHint {
    fn from_engines(range: Option<&str>) -> Self {
        match range {
            Some(range) => Self {
                range: Some(range.to_string()),
                source: HintSource::ManifestEngines,
            },
            None => Self::unspecified(),
        }
    }

    fn unspecified() -> Self {
        Self {
            range: None,
            source: HintSource::Unspecified,
        }
    }
}

/// Everything the application declared about runtime versions
#[derive(Debug, Clone, Default)]
pub struct VersionHints {
    /// `engines.node`
    pub node_engines: Option<String>,
    /// Validated `.nvmrc` token
    pub nvmrc: Option<NvmrcVersion>,
    /// `engines.npm`
    pub npm: Option<String>,
    /// `engines.yarn`
    pub yarn: Option<String>,
}

impl VersionHints {
    /// Collect hints from the loaded manifest and pin file
    pub fn new(package_json: Option<&PackageJson>, nvmrc: Option<NvmrcVersion>) -> Self {
        let engines = package_json.map(|p| &p.engines);
        Self {
            node_engines: engines.and_then(|e| e.node()).map(str::to_string),
            nvmrc,
            npm: engines.and_then(|e| e.npm()).map(str::to_string),
            yarn: engines.and_then(|e| e.yarn()).map(str::to_string),
        }
    }

    /// The effective node hint after precedence is applied
    pub fn node(&self) -> VersionHint {
        if let Some(range) = &self.node_engines {
            return VersionHint::from_engines(Some(range));
        }
        match &self.nvmrc {
            Some(nvmrc) => VersionHint {
                range: Some(nvmrc.to_range()),
                source: HintSource::PinFile,
            },
            None => VersionHint::unspecified(),
        }
    }

    /// The npm hint
    pub fn npm(&self) -> VersionHint {
        VersionHint::from_engines(self.npm.as_deref())
    }

    /// The yarn hint
    pub fn yarn(&self) -> VersionHint {
        VersionHint::from_engines(self.yarn.as_deref())
    }
}

/// How npm should be provided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NpmRequest {
    /// Use the npm that ships with node
    Bundled,
    /// A catalog version matched the request
    Pinned {
        /// What package.json asked for
        range: String,
        /// Highest catalog version within `range`
        version: String,
    },
    /// Nothing in the catalog matched; npm installs the range itself
    Unlisted(String),
}

impl NpmRequest {
    /// The version or range to hand to `npm install -g npm@...`
    pub fn requested(&self) -> Option<&str> {
        match self {
            Self::Bundled => None,
            Self::Pinned { version, .. } => Some(version),
            Self::Unlisted(range) => Some(range),
        }
    }

    /// The range from package.json the bundled npm is checked against
    pub fn range(&self) -> Option<&str> {
        match self {
            Self::Bundled => None,
            Self::Pinned { range, .. } | Self::Unlisted(range) => Some(range),
        }
    }
}

/// Resolved versions for one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersions {
    /// Concrete node version from the catalog
    pub node: String,
    /// npm policy
    pub npm: NpmRequest,
    /// Concrete yarn version from the catalog
    pub yarn: String,
}

/// Advisory findings about the declared versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionWarning {
    /// Neither engines.node nor .nvmrc
    NodeUnspecified,
    /// Only .nvmrc was given
    UsingNvmrc,
    /// engines.node and .nvmrc disagree
    NvmrcIgnored,
    /// engines.node is `*`
    DangerousWildcard,
    /// engines.node starts with `>`
    DangerousGreaterThan,
    /// .nvmrc says `node`
    NvmrcLatest,
    /// .nvmrc names an LTS line
    NvmrcLts,
}

impl fmt::Display for VersionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeUnspecified => write!(
                f,
                "Node version not specified in package.json or .nvmrc. See: {}",
                NODE_TIPS_URL
            ),
            Self::UsingNvmrc => write!(
                f,
                "Using the node version specified in your .nvmrc See: {}",
                NODE_TIPS_URL
            ),
            Self::NvmrcIgnored => write!(
                f,
                "Node version in .nvmrc ignored in favor of 'engines' field in package.json"
            ),
            Self::DangerousWildcard => write!(
                f,
                "Dangerous semver range (*) in engines.node. See: {}",
                NODE_TIPS_URL
            ),
            Self::DangerousGreaterThan => write!(
                f,
                "Dangerous semver range (>) in engines.node. See: {}",
                NODE_TIPS_URL
            ),
            Self::NvmrcLatest => write!(
                f,
                ".nvmrc specified latest node version, this will resolve to whatever is newest in the buildpack's manifest.yml"
            ),
            Self::NvmrcLts => write!(
                f,
                ".nvmrc specified an lts version, this will resolve to whatever the buildpack's manifest.yml lists for that major"
            ),
        }
    }
}

/// Outcome of resolution: versions plus advisory warnings
#[derive(Debug, Clone)]
pub struct Resolution {
    pub versions: ResolvedVersions,
    pub warnings: Vec<VersionWarning>,
}

/// Warnings implied by the declared hints alone
pub fn node_warnings(hints: &VersionHints) -> Vec<VersionWarning> {
    let mut warnings = Vec::new();
    let engines = hints.node_engines.as_deref();

    match (engines, &hints.nvmrc) {
        (None, None) => warnings.push(VersionWarning::NodeUnspecified),
        (None, Some(_)) => warnings.push(VersionWarning::UsingNvmrc),
        (Some(engines), Some(nvmrc)) => {
            if pad_range(engines) != nvmrc.to_range() {
                warnings.push(VersionWarning::NvmrcIgnored);
            }
        }
        (Some(_), None) => {}
    }

    if let Some(engines) = engines {
        let engines = engines.trim();
        if engines == "*" {
            warnings.push(VersionWarning::DangerousWildcard);
        }
        if engines.starts_with('>') {
            warnings.push(VersionWarning::DangerousGreaterThan);
        }
    }

    if engines.is_none() {
        match &hints.nvmrc {
            Some(nvmrc) if nvmrc.is_latest() => warnings.push(VersionWarning::NvmrcLatest),
            Some(nvmrc) if nvmrc.is_lts() => warnings.push(VersionWarning::NvmrcLts),
            _ => {}
        }
    }

    warnings
}

/// Resolve node, npm and yarn against the catalog
pub fn resolve(hints: &VersionHints, catalog: &dyn Catalog) -> NodepackResult<Resolution> {
    let warnings = node_warnings(hints);

    let versions = ResolvedVersions {
        node: resolve_node(hints, catalog)?,
        npm: resolve_npm(hints, catalog)?,
        yarn: resolve_yarn(hints, catalog)?,
    };

    debug!("Resolved versions: {:?}", versions);
    Ok(Resolution { versions, warnings })
}

fn resolve_node(hints: &VersionHints, catalog: &dyn Catalog) -> NodepackResult<String> {
    let hint = hints.node();
    let Some(range) = hint.range else {
        return Ok(catalog.default_version("node")?.version);
    };

    let available = catalog.all_versions("node");
    debug!("Resolving node {} ({:?}) against {:?}", range, hint.source, available);

    highest_match(&range, &available)?.ok_or(NodepackError::NoMatchingVersion {
        name: "node".to_string(),
        range,
        available,
    })
}

fn resolve_npm(hints: &VersionHints, catalog: &dyn Catalog) -> NodepackResult<NpmRequest> {
    let Some(range) = hints.npm().range else {
        return Ok(NpmRequest::Bundled);
    };

    let available = catalog.all_versions("npm");
    // npm accepts tags like `latest` that are not ranges at all
    Ok(match highest_match(&range, &available) {
        Ok(Some(version)) => NpmRequest::Pinned { range, version },
        Ok(None) | Err(_) => {
            debug!("npm {} not in catalog, npm will install it itself", range);
            NpmRequest::Unlisted(range)
        }
    })
}

fn resolve_yarn(hints: &VersionHints, catalog: &dyn Catalog) -> NodepackResult<String> {
    let Some(range) = hints.yarn().range else {
        return Ok(catalog.default_version("yarn")?.version);
    };

    let available = catalog.all_versions("yarn");
    highest_match(&range, &available)?.ok_or_else(|| NodepackError::YarnVersionUnavailable {
        requested: range,
        available: available.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, ManifestCatalog};

    fn entry(name: &str, version: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            version: version.to_string(),
            uri: format!("https://buildpacks.example.com/{}-{}.tgz", name, version),
            sha256: "0".repeat(64),
            cf_stacks: vec![],
        }
    }

    fn catalog(node: &[&str]) -> ManifestCatalog {
        let mut entries: Vec<CatalogEntry> = node.iter().map(|v| entry("node", v)).collect();
        entries.push(entry("yarn", "1.22.19"));
        ManifestCatalog::new(
            entries,
            vec![("node".to_string(), "6.x".to_string())],
        )
    }

    fn hints(engines: Option<&str>, nvmrc: Option<&str>) -> VersionHints {
        VersionHints {
            node_engines: engines.map(str::to_string),
            nvmrc: nvmrc.map(|t| NvmrcVersion::parse(t).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn manifest_wins_over_nvmrc() {
        let catalog = catalog(&["10.0.0", "10.2.3", "10.15.0"]);
        let resolution = resolve(&hints(Some("10.0.0"), Some("10.2.3")), &catalog).unwrap();

        assert_eq!(resolution.versions.node, "10.0.0");
        assert!(resolution.warnings.contains(&VersionWarning::NvmrcIgnored));
    }

    #[test]
    fn equal_hints_do_not_warn() {
        let catalog = catalog(&["10.2.3"]);
        let resolution = resolve(&hints(Some("10"), Some("v10")), &catalog).unwrap();

        assert_eq!(resolution.versions.node, "10.2.3");
        assert!(!resolution.warnings.contains(&VersionWarning::NvmrcIgnored));
    }

    #[test]
    fn nvmrc_alone_is_used() {
        let catalog = catalog(&["10.0.0", "10.2.3", "10.15.0"]);
        let resolution = resolve(&hints(None, Some("10.2.3")), &catalog).unwrap();

        assert_eq!(resolution.versions.node, "10.2.3");
        assert_eq!(resolution.warnings, vec![VersionWarning::UsingNvmrc]);
    }

    #[test]
    fn highest_matching_version_wins() {
        let catalog = catalog(&["4.0.0", "4.0.1", "4.2.3", "6.0.0", "11.2.3"]);
        let resolution = resolve(&hints(Some("~>4"), None), &catalog).unwrap();
        assert_eq!(resolution.versions.node, "4.2.3");
    }

    #[test]
    fn default_when_unspecified() {
        let catalog = catalog(&["4.8.3", "6.1.0", "6.9.1", "8.0.0"]);
        let resolution = resolve(&hints(None, None), &catalog).unwrap();

        assert_eq!(resolution.versions.node, "6.9.1");
        assert_eq!(resolution.warnings, vec![VersionWarning::NodeUnspecified]);
    }

    #[test]
    fn node_without_match_is_fatal() {
        let catalog = catalog(&["4.8.3", "6.1.0"]);
        let err = resolve(&hints(Some("~9"), None), &catalog).unwrap_err();

        match err {
            NodepackError::NoMatchingVersion { name, range, available } => {
                assert_eq!(name, "node");
                assert_eq!(range, "~9");
                assert_eq!(available, vec!["4.8.3", "6.1.0"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dangerous_ranges_warn() {
        let catalog = catalog(&["4.8.3", "6.1.0"]);

        let resolution = resolve(&hints(Some("*"), None), &catalog).unwrap();
        assert!(resolution.warnings.contains(&VersionWarning::DangerousWildcard));
        assert_eq!(resolution.versions.node, "6.1.0");

        let resolution = resolve(&hints(Some(">4"), None), &catalog).unwrap();
        assert!(resolution.warnings.contains(&VersionWarning::DangerousGreaterThan));

        let resolution = resolve(&hints(Some("~4"), None), &catalog).unwrap();
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn nvmrc_aliases_warn() {
        let catalog = catalog(&["8.0.0", "18.17.1", "20.5.0"]);

        let resolution = resolve(&hints(None, Some("node")), &catalog).unwrap();
        assert_eq!(resolution.versions.node, "20.5.0");
        assert!(resolution.warnings.contains(&VersionWarning::NvmrcLatest));

        let resolution = resolve(&hints(None, Some("lts/hydrogen")), &catalog).unwrap();
        assert_eq!(resolution.versions.node, "18.17.1");
        assert!(resolution.warnings.contains(&VersionWarning::NvmrcLts));
    }

    // npm and yarn differ on purpose: npm installs itself, yarn is catalog-only.
    #[test]
    fn npm_outside_catalog_falls_back_to_self_install() {
        let catalog = catalog(&["8.0.0"]);
        let hints = VersionHints {
            node_engines: Some("8".to_string()),
            npm: Some("99.0.0".to_string()),
            ..Default::default()
        };

        let resolution = resolve(&hints, &catalog).unwrap();
        assert_eq!(
            resolution.versions.npm,
            NpmRequest::Unlisted("99.0.0".to_string())
        );
    }

    #[test]
    fn npm_tag_is_left_to_npm() {
        let catalog = catalog(&["8.0.0"]);
        let hints = VersionHints {
            node_engines: Some("8".to_string()),
            npm: Some("latest".to_string()),
            ..Default::default()
        };

        let resolution = resolve(&hints, &catalog).unwrap();
        assert_eq!(resolution.versions.npm, NpmRequest::Unlisted("latest".to_string()));
    }

    #[test]
    fn npm_in_catalog_is_pinned() {
        let mut entries = vec![entry("node", "8.0.0"), entry("yarn", "1.22.19")];
        entries.push(entry("npm", "6.4.1"));
        entries.push(entry("npm", "6.9.0"));
        let catalog = ManifestCatalog::new(entries, vec![]);
        let hints = VersionHints {
            node_engines: Some("8".to_string()),
            npm: Some("6.x".to_string()),
            ..Default::default()
        };

        let resolution = resolve(&hints, &catalog).unwrap();
        assert_eq!(
            resolution.versions.npm,
            NpmRequest::Pinned {
                range: "6.x".to_string(),
                version: "6.9.0".to_string(),
            }
        );
        assert_eq!(resolution.versions.npm.requested(), Some("6.9.0"));
        assert_eq!(resolution.versions.npm.range(), Some("6.x"));
    }

    #[test]
    fn npm_unspecified_uses_bundled() {
        let catalog = catalog(&["8.0.0"]);
        let resolution = resolve(&hints(Some("8"), None), &catalog).unwrap();
        assert_eq!(resolution.versions.npm, NpmRequest::Bundled);
        assert_eq!(resolution.versions.npm.requested(), None);
        assert_eq!(resolution.versions.npm.range(), None);
    }

    #[test]
    fn yarn_outside_catalog_is_fatal() {
        let catalog = catalog(&["8.0.0"]);
        let hints = VersionHints {
            node_engines: Some("8".to_string()),
            yarn: Some("1.0.x".to_string()),
            ..Default::default()
        };

        let err = resolve(&hints, &catalog).unwrap_err();
        assert_eq!(
            err.to_string(),
            "package.json requested 1.0.x, buildpack only includes yarn version 1.22.19"
        );
    }

    #[test]
    fn yarn_defaults_to_only_catalog_version() {
        let catalog = catalog(&["8.0.0"]);
        let resolution = resolve(&hints(Some("8"), None), &catalog).unwrap();
        assert_eq!(resolution.versions.yarn, "1.22.19");
    }
}
