//! The supply pipeline
//!
//! `load -> resolve -> install -> restore cache -> build dependencies -> save cache`
//!
//! Every collaborator is handed in explicitly; nothing here reads the process
//! environment or spawns processes on its own.

use crate::cache::{self, CacheSelection, CacheSignature, DirectoryCache, RestoreOutcome};
use crate::catalog::Catalog;
use crate::command::CommandRunner;
use crate::config::BuildConfig;
use crate::driver::{tips, Driver, DriverReport, Evidence, PackageManager};
use crate::error::NodepackResult;
use crate::install::{Installer, RuntimeEnvironment, RuntimeInstaller};
use crate::package_json::PackageJson;
use crate::stager::{self, BuildLayout};
use crate::ui::BuildLog;
use crate::version::{self, resolve, ResolvedVersions, VersionHints};
use tracing::{debug, info};

const PROFILE_SCRIPT: &str = "node.sh";

const PROFILE_TEMPLATE: &str = r#"export NODE_HOME=@NODE_HOME@
export NODE_ENV=${NODE_ENV:-production}
export MEMORY_AVAILABLE=$(echo $VCAP_APPLICATION | jq '.limits.mem')
export WEB_MEMORY=${WEB_MEMORY:-512}
export WEB_CONCURRENCY=${WEB_CONCURRENCY:-1}
if [ ! -d "$HOME/node_modules" ]; then
	export NODE_PATH=${NODE_PATH:-"@NODE_MODULES@"}
	ln -s "@NODE_MODULES@" "$HOME/node_modules"
else
	export NODE_PATH=${NODE_PATH:-"$HOME/node_modules"}
fi
export PATH=$PATH:"$HOME/bin":$NODE_PATH/.bin
"#;

/// What one supply run produced
#[derive(Debug, Clone)]
pub struct SupplyReport {
    pub versions: ResolvedVersions,
    pub runtime: RuntimeEnvironment,
    pub signature: CacheSignature,
    pub restore: RestoreOutcome,
    pub driver: DriverReport,
}

/// Wires the build components together for one build
pub struct Supplier<'a> {
    pub layout: &'a BuildLayout,
    pub config: &'a BuildConfig,
    pub catalog: &'a dyn Catalog,
    pub installer: &'a dyn Installer,
    pub runner: &'a dyn CommandRunner,
    pub log: &'a BuildLog,
}

impl Supplier<'_> {
    /// Run the whole pipeline; the first fatal error stops it
    pub async fn run(&self) -> NodepackResult<SupplyReport> {
        self.log.begin_step("Installing binaries");

        let package = PackageJson::load(&self.layout.build_dir)
            .await
            .inspect_err(|e| self.log.error(&format!("Unable to load package.json: {}", e)))?;
        if package.is_none() {
            self.log.warning("No package.json found");
        }

        let nvmrc = version::nvmrc::load(&self.layout.build_dir)
            .await
            .inspect_err(|e| self.log.error(&format!("Unable to load .nvmrc: {}", e)))?;

        PackageJson::log_engines(package.as_ref(), self.log);

        let hints = VersionHints::new(package.as_ref(), nvmrc);
        let resolution = resolve(&hints, self.catalog)
            .inspect_err(|e| self.log.error(&format!("Unable to install node: {}", e)))?;
        for warning in &resolution.warnings {
            self.log.warning(&warning.to_string());
        }
        let versions = resolution.versions;

        let installer = RuntimeInstaller {
            layout: self.layout,
            catalog: self.catalog,
            installer: self.installer,
            runner: self.runner,
            log: self.log,
        };
        let mut runtime = installer
            .install_all(&versions, self.config.var("PATH"))
            .await?;

        self.create_runtime_environment(&runtime)
            .await
            .inspect_err(|e| {
                self.log
                    .error(&format!("Unable to setup default environment: {}", e))
            })?;

        // From here on the defaults apply to this build as well
        let config = self.config.with_defaults();
        for (key, value) in self.config.missing_defaults() {
            runtime.set_staging(key, value);
        }

        let evidence = Evidence::detect(&self.layout.build_dir).await?;
        tips::no_lockfile_tip(&evidence, self.log);
        tips::list_node_config(&config, self.log);

        let cache = DirectoryCache::new(self.layout, config.node_modules_cache, self.log);
        cache
            .seed_from_app()
            .await
            .inspect_err(|e| self.log.error(&format!("Unable to copy cache directories: {}", e)))?;

        let signature = CacheSignature::from_runtime(&runtime);
        let selection = CacheSelection::from_package(package.as_ref());
        let restore = cache.restore(&signature, &selection).await?;

        let driver = Driver {
            layout: self.layout,
            config: &config,
            runtime: &runtime,
            runner: self.runner,
            log: self.log,
        };
        let report = driver
            .build(package.as_ref())
            .await
            .inspect_err(|e| self.log.error(&format!("Unable to build dependencies: {}", e)))?;

        let workspaces = report.plan.manager == PackageManager::Yarn
            && package.as_ref().is_some_and(PackageJson::uses_workspaces);
        if !workspaces {
            if let Some(node_path) = self
                .move_dependency_artifacts(&report.evidence)
                .await
                .inspect_err(|e| self.log.error(&format!("Unable to move dependencies: {}", e)))?
            {
                runtime.set("NODE_PATH", node_path);
            }
        }

        cache.save(&signature, &selection).await?;

        info!(
            "Supplied node {} npm {} yarn {}",
            runtime.node_version, runtime.npm_version, runtime.yarn_version
        );
        Ok(SupplyReport {
            versions,
            runtime,
            signature,
            restore,
            driver: report,
        })
    }

    /// Env files and the profile.d script later buildpacks and the app see
    async fn create_runtime_environment(&self, runtime: &RuntimeEnvironment) -> NodepackResult<()> {
        self.log.begin_step("Creating runtime environment");

        for (key, value) in self.config.missing_defaults() {
            self.layout.write_env_file(key, value).await?;
        }
        for (key, value) in runtime.exported_vars() {
            self.layout.write_env_file(key, value).await?;
        }

        let script = profile_script(&self.layout.deps_idx, runtime.var("SSL_CERT_DIR"));
        self.layout.write_profile_d(PROFILE_SCRIPT, &script).await
    }

    /// Move freshly installed `node_modules` into the dep dir
    ///
    /// Vendored modules stay where the app put them. Returns the new
    /// NODE_PATH when something was moved.
    async fn move_dependency_artifacts(
        &self,
        evidence: &Evidence,
    ) -> NodepackResult<Option<String>> {
        if evidence.vendored {
            return Ok(None);
        }

        let app_modules = self.layout.build_dir.join("node_modules");
        if !stager::path_exists(&app_modules).await? {
            return Ok(None);
        }

        let node_path = self.layout.dep_dir().join("node_modules");
        debug!(
            "Moving {} to {}",
            app_modules.display(),
            node_path.display()
        );
        stager::remove_path(&node_path).await?;
        cache::directory::move_dir(&app_modules, &node_path).await?;

        let node_path = node_path.display().to_string();
        self.layout.write_env_file("NODE_PATH", &node_path).await?;
        Ok(Some(node_path))
    }
}

/// `profile.d/node.sh`, relative to `$DEPS_DIR` so it works wherever the
/// droplet lands
fn profile_script(deps_idx: &str, ssl_cert_dir: Option<&str>) -> String {
    let mut script = PROFILE_TEMPLATE
        .replace("@NODE_HOME@", &format!("$DEPS_DIR/{}/node", deps_idx))
        .replace("@NODE_MODULES@", &format!("$DEPS_DIR/{}/node_modules", deps_idx));
    if let Some(dir) = ssl_cert_dir {
        script.push_str(&format!("export SSL_CERT_DIR=${{SSL_CERT_DIR:-{}}}\n", dir));
    }
    script
}
