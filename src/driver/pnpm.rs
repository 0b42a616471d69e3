//! pnpm install with a store under the cache dir

use super::{Driver, InstallMode, Transcript, PNPM_STORE};
use crate::error::NodepackResult;

impl Driver<'_> {
    pub(super) async fn pnpm_install(
        &self,
        mode: InstallMode,
        transcript: &mut Transcript,
    ) -> NodepackResult<()> {
        self.log.info("Installing node modules (pnpm-lock.yaml)");

        let store = self.layout.cache_dir.join(PNPM_STORE);
        self.log
            .info(&format!("Using pnpm store directory: {}", store.display()));
        self.exec_quiet(self.pnpm_store_dir(&store.display().to_string()))
            .await?;

        let mut install = self
            .command("pnpm")
            .args(["install", "--frozen-lockfile"]);

        if self.config.npm_config_production {
            self.log
                .info("NPM_CONFIG_PRODUCTION is true, installing only production dependencies");
            install = install.arg("--prod");
        }

        if mode == InstallMode::Offline {
            let vendored = self.layout.build_dir.join(PNPM_STORE);
            self.log
                .info(&format!("Found vendored pnpm store at {}", vendored.display()));
            self.log.info("Running pnpm in offline mode");
            install = install.arg("--offline");
            self.exec_quiet(self.pnpm_store_dir(&vendored.display().to_string()))
                .await?;
        }

        self.exec(install, transcript).await.map(|_| ())
    }

    fn pnpm_store_dir(&self, dir: &str) -> crate::command::CommandSpec {
        self.command("pnpm")
            .args(["config", "set", "store-dir", dir])
    }
}
