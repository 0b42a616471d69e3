//! Advisory suggestions printed around the dependency build

use super::{Driver, Evidence, PackageManager};
use crate::config::BuildConfig;
use crate::ui::BuildLog;
use std::path::Path;
use tracing::debug;

const VENDORING_DOCS: &str = "http://docs.cloudfoundry.org/buildpacks/node/index.html#vendoring";
const OFFLINE_DOCS: &str =
    "https://docs.cloudfoundry.org/buildpacks/node/index.html#offline_environments";

/// Suggest vendoring when `node_modules` is missing or has no packages
pub async fn vendor_tip(build_dir: &Path, log: &BuildLog) {
    if !has_subdirs(&build_dir.join("node_modules")).await {
        log.protip(
            "It is recommended to vendor the application's Node.js dependencies",
            VENDORING_DOCS,
        );
    }
}

async fn has_subdirs(path: &Path) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir(path).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            return true;
        }
    }
    false
}

/// Vendored modules without a lockfile may still be refreshed from the registry
pub fn no_lockfile_tip(evidence: &Evidence, log: &BuildLog) {
    let manager = evidence.package_manager();
    if evidence.vendored && !evidence.has_lockfile_for(manager) {
        log.protip(
            "Warning: package-lock.json not found. The buildpack may reach out to the internet to download module updates, even if they are vendored.",
            OFFLINE_DOCS,
        );
    }
}

/// Echo the package manager related configuration
pub fn list_node_config(config: &BuildConfig, log: &BuildLog) {
    for line in config.node_config_lines() {
        log.info(&line);
    }

    if config.npm_config_production && config.node_env != "production" {
        log.info(&format!(
            "npm scripts will see NODE_ENV=production (not '{}')\nhttps://docs.npmjs.com/misc/config#production",
            config.node_env
        ));
    }
}

/// With NODE_VERBOSE, print the top-level dependency tree
pub async fn list_dependencies(driver: &Driver<'_>, manager: PackageManager) {
    if !driver.config.node_verbose {
        return;
    }

    let spec = match manager {
        PackageManager::Yarn => driver.command("yarn").args(["list", "--depth=0"]),
        PackageManager::Pnpm => driver.command("pnpm").args(["list", "--depth=0"]),
        PackageManager::Npm => driver.command("npm").args(["ls", "--depth=0"]),
    };

    match driver.runner.run(&spec).await {
        Ok(output) => {
            for line in output.stdout.lines() {
                driver.log.output(line);
            }
        }
        Err(e) => debug!("Listing dependencies failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Fixture;
    use super::*;
    use crate::command::testing::FakeRunner;

    #[tokio::test]
    async fn vendor_tip_without_packages() {
        let fixture = Fixture::new();
        vendor_tip(&fixture.layout.build_dir, &fixture.log).await;
        assert!(fixture
            .buffer
            .contents()
            .contains("PRO TIP: It is recommended to vendor the application's Node.js dependencies"));

        let fixture = Fixture::new();
        fixture.file("node_modules/.yarn-integrity", "");
        vendor_tip(&fixture.layout.build_dir, &fixture.log).await;
        assert!(fixture.buffer.contents().contains(VENDORING_DOCS));
    }

    #[tokio::test]
    async fn no_vendor_tip_with_packages() {
        let fixture = Fixture::new();
        fixture.file("node_modules/left-pad/index.js", "");
        vendor_tip(&fixture.layout.build_dir, &fixture.log).await;
        assert!(fixture.buffer.contents().is_empty());
    }

    #[test]
    fn lockfile_tip_only_for_vendored_apps() {
        let fixture = Fixture::new();
        let mut evidence = Evidence {
            package_json: true,
            vendored: true,
            ..Default::default()
        };
        no_lockfile_tip(&evidence, &fixture.log);
        assert!(fixture.buffer.contents().contains("package-lock.json not found"));

        let fixture = Fixture::new();
        evidence.lockfiles = vec!["npm-shrinkwrap.json"];
        no_lockfile_tip(&evidence, &fixture.log);
        assert!(fixture.buffer.contents().is_empty());

        let fixture = Fixture::new();
        evidence.vendored = false;
        evidence.lockfiles.clear();
        no_lockfile_tip(&evidence, &fixture.log);
        assert!(fixture.buffer.contents().is_empty());
    }

    #[test]
    fn node_config_listing() {
        let fixture = Fixture::new();
        let config = BuildConfig::from_vars([
            ("NPM_CONFIG_PRODUCTION", "true"),
            ("NODE_ENV", "staging"),
            ("HOME", "/home/vcap"),
        ]);

        list_node_config(&config, &fixture.log);

        let out = fixture.buffer.contents();
        assert!(out.contains("NODE_ENV=staging"));
        assert!(out.contains("NPM_CONFIG_PRODUCTION=true"));
        assert!(!out.contains("HOME="));
        assert!(out.contains("npm scripts will see NODE_ENV=production (not 'staging')"));
    }

    #[tokio::test]
    async fn dependencies_listed_only_when_verbose() {
        let fixture = Fixture::new();
        let runner = FakeRunner::new();
        list_dependencies(&fixture.driver(&runner), PackageManager::Npm).await;
        assert!(runner.calls().is_empty());

        let fixture = Fixture::with_config(BuildConfig::from_vars([("NODE_VERBOSE", "true")]));
        let runner = FakeRunner::new().respond("yarn list", "└─ left-pad@1.3.0\n");
        list_dependencies(&fixture.driver(&runner), PackageManager::Yarn).await;
        assert_eq!(runner.calls(), vec!["yarn list --depth=0"]);
        assert!(fixture.buffer.contents().contains("left-pad@1.3.0"));
    }
}
