//! Application manifest (`package.json`) loading
//!
//! Only the fields the buildpack acts on are read: `engines`, the
//! `heroku-prebuild`/`heroku-postbuild` scripts, `devDependencies`,
//! `workspaces` and the two cache directory keys.

use crate::error::{NodepackError, NodepackResult};
use crate::ui::BuildLog;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// File name of the manifest at the application root
pub const PACKAGE_JSON: &str = "package.json";

/// Parsed package.json
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageJson {
    pub engines: Engines,

    pub scripts: Scripts,

    #[serde(rename = "devDependencies")]
    pub dev_dependencies: HashMap<String, serde_json::Value>,

    /// Array form or `{ "packages": [...] }` form
    pub workspaces: Option<serde_json::Value>,

    #[serde(rename = "cacheDirectories")]
    pub cache_directories: Vec<String>,

    #[serde(rename = "cache_directories")]
    pub cache_directories_legacy: Vec<String>,
}

/// `engines` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Engines {
    node: Option<String>,
    npm: Option<String>,
    yarn: Option<String>,
    iojs: Option<String>,
}

impl Engines {
    /// Create an engines section from explicit values
    pub fn new(node: Option<&str>, npm: Option<&str>, yarn: Option<&str>) -> Self {
        Self {
            node: node.map(str::to_string),
            npm: npm.map(str::to_string),
            yarn: yarn.map(str::to_string),
            iojs: None,
        }
    }

    pub fn node(&self) -> Option<&str> {
        non_empty(&self.node)
    }

    pub fn npm(&self) -> Option<&str> {
        non_empty(&self.npm)
    }

    pub fn yarn(&self) -> Option<&str> {
        non_empty(&self.yarn)
    }

    pub fn iojs(&self) -> Option<&str> {
        non_empty(&self.iojs)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `scripts` entries the buildpack runs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scripts {
    #[serde(rename = "heroku-prebuild")]
    pub prebuild: Option<String>,

    #[serde(rename = "heroku-postbuild")]
    pub postbuild: Option<String>,
}

impl PackageJson {
    /// Load `<build_dir>/package.json`
    ///
    /// A missing file is `Ok(None)`. An `engines.iojs` entry is rejected.
    pub async fn load(build_dir: &Path) -> NodepackResult<Option<Self>> {
        let path = build_dir.join(PACKAGE_JSON);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No package.json in {}", build_dir.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(NodepackError::io(
                    format!("reading {}", path.display()),
                    e,
                ))
            }
        };

        let package: Self =
            serde_json::from_str(&content).map_err(|e| NodepackError::PackageJsonInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if package.engines.iojs().is_some() {
            return Err(NodepackError::IojsNotSupported);
        }

        Ok(Some(package))
    }

    /// Log the declared engines the way the staging log reports them
    pub fn log_engines(package: Option<&Self>, log: &BuildLog) {
        let engines = package.map(|p| &p.engines);

        match engines.and_then(Engines::node) {
            Some(node) => log.info(&format!("engines.node (package.json): {}", node)),
            None => log.info("engines.node (package.json): unspecified"),
        }

        match engines.and_then(Engines::npm) {
            Some(npm) => log.info(&format!("engines.npm (package.json): {}", npm)),
            None => log.info("engines.npm (package.json): unspecified (use default)"),
        }
    }

    /// Cache directories declared by the app; `cacheDirectories` wins
    pub fn declared_cache_dirs(&self) -> &[String] {
        if !self.cache_directories.is_empty() {
            &self.cache_directories
        } else {
            &self.cache_directories_legacy
        }
    }

    /// Whether `devDependencies` lists anything
    pub fn has_dev_dependencies(&self) -> bool {
        !self.dev_dependencies.is_empty()
    }

    /// Whether yarn workspaces are declared
    pub fn uses_workspaces(&self) -> bool {
        match &self.workspaces {
            Some(serde_json::Value::Array(items)) => !items.is_empty(),
            Some(serde_json::Value::Object(map)) => map
                .get("packages")
                .and_then(|p| p.as_array())
                .is_some_and(|p| !p.is_empty()),
            _ => false,
        }
    }

    pub fn prebuild(&self) -> Option<&str> {
        non_empty(&self.scripts.prebuild)
    }

    pub fn postbuild(&self) -> Option<&str> {
        non_empty(&self.scripts.postbuild)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn load_str(content: &str) -> NodepackResult<Option<PackageJson>> {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PACKAGE_JSON), content).unwrap();
        PackageJson::load(dir.path()).await
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(PackageJson::load(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_json_is_error() {
        let err = load_str("{ not json").await.unwrap_err();
        assert!(matches!(err, NodepackError::PackageJsonInvalid { .. }));
    }

    #[tokio::test]
    async fn reads_engines() {
        let package = load_str(r#"{"engines": {"node": "node-y", "npm": "npm-x", "yarn": "*"}}"#)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(package.engines.node(), Some("node-y"));
        assert_eq!(package.engines.npm(), Some("npm-x"));
        assert_eq!(package.engines.yarn(), Some("*"));
    }

    #[tokio::test]
    async fn empty_engine_strings_are_unspecified() {
        let package = load_str(r#"{"engines": {"node": "", "npm": " "}}"#)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(package.engines.node(), None);
        assert_eq!(package.engines.npm(), None);
    }

    #[tokio::test]
    async fn iojs_is_rejected() {
        let err = load_str(r#"{"engines": {"iojs": "1.0.0"}}"#).await.unwrap_err();
        assert_eq!(err.to_string(), "io.js not supported by this buildpack");
    }

    #[tokio::test]
    async fn logs_unspecified_engines() {
        let (log, buffer) = BuildLog::buffered();
        PackageJson::log_engines(None, &log);

        let out = buffer.contents();
        assert!(out.contains("engines.node (package.json): unspecified"));
        assert!(out.contains("engines.npm (package.json): unspecified (use default)"));
    }

    #[tokio::test]
    async fn logs_declared_engines() {
        let package = load_str(r#"{"engines": {"node": "~>4", "npm": "6.x"}}"#)
            .await
            .unwrap();
        let (log, buffer) = BuildLog::buffered();
        PackageJson::log_engines(package.as_ref(), &log);

        let out = buffer.contents();
        assert!(out.contains("engines.node (package.json): ~>4"));
        assert!(out.contains("engines.npm (package.json): 6.x"));
    }

    #[tokio::test]
    async fn scripts_and_dev_dependencies() {
        let package = load_str(
            r#"{
                "scripts": {"heroku-prebuild": "makestuff", "heroku-postbuild": "logstuff", "start": "node app"},
                "devDependencies": {"mocha": "^5.0.0"}
            }"#,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(package.prebuild(), Some("makestuff"));
        assert_eq!(package.postbuild(), Some("logstuff"));
        assert!(package.has_dev_dependencies());
    }

    #[tokio::test]
    async fn cache_directories_first_key_wins() {
        let package = load_str(
            r#"{"cacheDirectories": ["a", "b"], "cache_directories": ["c"]}"#,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(package.declared_cache_dirs(), ["a", "b"]);

        let package = load_str(r#"{"cacheDirectories": [], "cache_directories": ["c"]}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(package.declared_cache_dirs(), ["c"]);
    }

    #[tokio::test]
    async fn workspaces_forms() {
        let package = load_str(r#"{"workspaces": ["packages/*"]}"#).await.unwrap().unwrap();
        assert!(package.uses_workspaces());

        let package = load_str(r#"{"workspaces": {"packages": ["apps/*"]}}"#)
            .await
            .unwrap()
            .unwrap();
        assert!(package.uses_workspaces());

        let package = load_str(r#"{}"#).await.unwrap().unwrap();
        assert!(!package.uses_workspaces());
    }
}
