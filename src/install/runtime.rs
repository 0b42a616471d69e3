//! node, npm and yarn installation into the dep dir

use super::Installer;
use crate::catalog::{Catalog, CatalogEntry};
use crate::command::{probe_version, CommandRunner, CommandSpec};
use crate::error::{NodepackError, NodepackResult};
use crate::stager::{self, BuildLayout};
use crate::ui::BuildLog;
use crate::version::range::{parse_version, satisfies};
use crate::version::resolver::{NpmRequest, ResolvedVersions};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Node majors from this one on ship without a compiled-in CA store path
const SSL_CERT_DIR_MIN_MAJOR: u64 = 18;
const SSL_CERT_DIR: &str = "/etc/ssl/certs";

/// What was installed and the environment needed to use it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    /// `<deps>/<idx>/node`
    pub node_home: PathBuf,
    /// `<deps>/<idx>/bin`, holding links to every installed binary
    pub bin_dir: PathBuf,
    pub node_version: String,
    /// Reported by `npm --version` after installation
    pub npm_version: String,
    /// Reported by `yarn --version` after installation
    pub yarn_version: String,
    base_path: Option<String>,
    vars: BTreeMap<String, String>,
    /// Defaults seen by build subprocesses but not exported again
    staging: BTreeMap<String, String>,
}

impl RuntimeEnvironment {
    /// Environment for a node installed into `layout`
    ///
    /// `base_path` is the staging PATH the dep bin dir is put in front of.
    pub fn new(layout: &BuildLayout, node_version: &str, base_path: Option<&str>) -> Self {
        let node_home = layout.dep_dir().join("node");
        let mut vars = BTreeMap::new();
        vars.insert(
            "NODE_HOME".to_string(),
            node_home.display().to_string(),
        );

        let major = parse_version(node_version).map(|v| v.major);
        if major.is_some_and(|m| m >= SSL_CERT_DIR_MIN_MAJOR) {
            vars.insert("SSL_CERT_DIR".to_string(), SSL_CERT_DIR.to_string());
        }

        Self {
            node_home,
            bin_dir: layout.bin_dir(),
            node_version: node_version.to_string(),
            npm_version: String::new(),
            yarn_version: String::new(),
            base_path: base_path.map(str::to_string),
            vars,
            staging: BTreeMap::new(),
        }
    }

    /// Set an exported variable
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.to_string(), value.into());
    }

    /// Set a variable only package manager subprocesses see
    pub fn set_staging(&mut self, key: &str, value: impl Into<String>) {
        self.staging.insert(key.to_string(), value.into());
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Variables exported to later buildpacks and the app, sorted by name
    pub fn exported_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// PATH with the dep bin dir in front
    pub fn path(&self) -> String {
        match self.base_path.as_deref().filter(|p| !p.is_empty()) {
            Some(base) => format!("{}:{}", self.bin_dir.display(), base),
            None => self.bin_dir.display().to_string(),
        }
    }

    /// Environment for package manager subprocesses
    pub fn command_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .staging
            .iter()
            .chain(self.vars.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.push(("PATH".to_string(), self.path()));
        env
    }
}

/// Installs the resolved runtimes
pub struct RuntimeInstaller<'a> {
    pub layout: &'a BuildLayout,
    pub catalog: &'a dyn Catalog,
    pub installer: &'a dyn Installer,
    pub runner: &'a dyn CommandRunner,
    pub log: &'a BuildLog,
}

impl RuntimeInstaller<'_> {
    /// Install node, then npm, then yarn
    pub async fn install_all(
        &self,
        versions: &ResolvedVersions,
        base_path: Option<&str>,
    ) -> NodepackResult<RuntimeEnvironment> {
        self.layout.ensure_dirs().await?;

        let mut env = self.install_node(&versions.node, base_path).await?;
        self.install_npm(&versions.npm, &mut env).await?;
        self.install_yarn(&versions.yarn, &mut env).await?;

        debug!(
            "Runtime: node {} npm {} yarn {}",
            env.node_version, env.npm_version, env.yarn_version
        );
        Ok(env)
    }

    /// Install node into `<deps>/<idx>/node` and link its binaries
    pub async fn install_node(
        &self,
        version: &str,
        base_path: Option<&str>,
    ) -> NodepackResult<RuntimeEnvironment> {
        let entry = self.entry("node", version)?;
        self.log.info(&format!("Installing node {}", version));

        let scratch = self.layout.dep_dir().join(".node-install");
        stager::remove_path(&scratch).await?;
        self.installer.install(&entry, &scratch).await?;

        let distribution = single_subdir(&scratch)
            .await?
            .ok_or_else(|| NodepackError::DistributionMissing {
                name: "node".to_string(),
                dir: scratch.clone(),
            })?;

        let env = RuntimeEnvironment::new(self.layout, version, base_path);
        stager::remove_path(&env.node_home).await?;
        tokio::fs::rename(&distribution, &env.node_home)
            .await
            .map_err(|e| {
                NodepackError::io(format!("moving node to {}", env.node_home.display()), e)
            })?;
        stager::remove_path(&scratch).await?;

        self.layout
            .link_directory_in_dep_dir(&env.node_home.join("bin"), "bin")
            .await?;

        Ok(env)
    }

    /// Bring npm to the requested version
    ///
    /// npm bundled with node is kept whenever it satisfies the range from
    /// package.json; otherwise npm upgrades itself in place.
    pub async fn install_npm(
        &self,
        request: &NpmRequest,
        env: &mut RuntimeEnvironment,
    ) -> NodepackResult<()> {
        let bundled = probe_version(self.runner, self.command("npm", env).arg("--version")).await?;

        let (Some(range), Some(requested)) = (request.range(), request.requested()) else {
            self.log
                .info(&format!("Using default npm version: {}", bundled));
            env.npm_version = bundled;
            return Ok(());
        };

        if satisfies(range, &bundled).unwrap_or(false) {
            self.log
                .info(&format!("npm {} already installed with node", bundled));
            env.npm_version = bundled;
            return Ok(());
        }

        self.log.info(&format!(
            "Downloading and installing npm {} (replacing version {})...",
            requested, bundled
        ));

        let install = self.command("npm", env).args([
            "install",
            "--unsafe-perm",
            "--quiet",
            "-g",
            &format!("npm@{}", requested),
        ]);
        let self_install_failed = || NodepackError::NpmSelfInstall {
            requested: requested.to_string(),
        };
        match self.runner.run(&install).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                debug!("npm self install exited {}: {}", output.code, output.combined());
                return Err(self_install_failed());
            }
            Err(e) => {
                debug!("npm self install failed: {}", e);
                return Err(self_install_failed());
            }
        }

        env.npm_version =
            probe_version(self.runner, self.command("npm", env).arg("--version")).await?;
        Ok(())
    }

    /// Install yarn into `<deps>/<idx>/yarn` and link its binaries
    pub async fn install_yarn(
        &self,
        version: &str,
        env: &mut RuntimeEnvironment,
    ) -> NodepackResult<()> {
        let entry = self.entry("yarn", version)?;
        let yarn_dir = self.layout.dep_dir().join("yarn");
        self.installer.install(&entry, &yarn_dir).await?;

        let distribution = find_yarn_distribution(&yarn_dir).await?;
        self.layout
            .link_directory_in_dep_dir(&distribution.join("bin"), "bin")
            .await?;

        let installed =
            probe_version(self.runner, self.command("yarn", env).arg("--version")).await?;
        self.log.info(&format!("Installed yarn {}", installed));
        env.yarn_version = installed;
        Ok(())
    }

    fn entry(&self, name: &str, version: &str) -> NodepackResult<CatalogEntry> {
        self.catalog
            .find(name, version)
            .ok_or_else(|| NodepackError::DependencyMissing {
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    fn command(&self, program: &str, env: &RuntimeEnvironment) -> CommandSpec {
        CommandSpec::new(program)
            .current_dir(&self.layout.build_dir)
            .envs(env.command_env())
    }
}

/// The only directory directly under `dir`, if there is exactly one
async fn single_subdir(dir: &Path) -> NodepackResult<Option<PathBuf>> {
    let dirs = subdirs(dir).await?;
    Ok(match dirs.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    })
}

/// The single `yarn-v*` directory yarn tarballs unpack to
async fn find_yarn_distribution(yarn_dir: &Path) -> NodepackResult<PathBuf> {
    let matches: Vec<PathBuf> = subdirs(yarn_dir)
        .await?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("yarn-v"))
        })
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(NodepackError::DistributionMissing {
            name: "yarn".to_string(),
            dir: yarn_dir.to_path_buf(),
        }),
    }
}

async fn subdirs(dir: &Path) -> NodepackResult<Vec<PathBuf>> {
    let read_err = |e: std::io::Error| NodepackError::io(format!("reading {}", dir.display()), e);
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
