//! npm install and rebuild

use super::{Driver, Evidence, PackageManager, Transcript};
use crate::error::NodepackResult;

impl Driver<'_> {
    /// `package.json + package-lock.json`, as reported in the log
    fn npm_sources(evidence: &Evidence) -> String {
        std::iter::once("package.json")
            .chain(
                PackageManager::Npm
                    .lockfile_patterns()
                    .iter()
                    .copied()
                    .filter(|l| evidence.has_lockfile(l)),
            )
            .collect::<Vec<_>>()
            .join(" + ")
    }

    fn npmrc(&self) -> String {
        self.layout.build_dir.join(".npmrc").display().to_string()
    }

    pub(super) async fn npm_install(
        &self,
        evidence: &Evidence,
        transcript: &mut Transcript,
    ) -> NodepackResult<()> {
        self.log.info(&format!(
            "Installing node modules ({})",
            Self::npm_sources(evidence)
        ));

        let spec = self.command("npm").args([
            "install".to_string(),
            "--unsafe-perm".to_string(),
            "--userconfig".to_string(),
            self.npmrc(),
            "--cache".to_string(),
            self.layout.cache_dir.join(".npm").display().to_string(),
        ]);
        self.exec(spec, transcript).await.map(|_| ())
    }

    /// Relink native addons of vendored modules against the installed node
    pub(super) async fn npm_rebuild(
        &self,
        evidence: &Evidence,
        transcript: &mut Transcript,
    ) -> NodepackResult<()> {
        self.log.info("Prebuild detected (node_modules already exists)");
        self.log.info("Rebuilding any native modules");

        let rebuild = self.command("npm").args([
            "rebuild".to_string(),
            format!("--nodedir={}", self.runtime.node_home.display()),
        ]);
        self.exec(rebuild, transcript).await?;

        self.log.info(&format!(
            "Installing any new modules ({})",
            Self::npm_sources(evidence)
        ));
        let install = self.command("npm").args([
            "install".to_string(),
            "--no-audit".to_string(),
            "--unsafe-perm".to_string(),
            "--userconfig".to_string(),
            self.npmrc(),
        ]);
        self.exec(install, transcript).await.map(|_| ())
    }
}
