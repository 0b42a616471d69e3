//! yarn install, online or against a vendored offline mirror

use super::{Driver, InstallMode, Transcript, YARN_OFFLINE_MIRROR};
use crate::error::NodepackResult;
use tracing::debug;

const OFFLINE_MIRROR_DOCS: &str = "https://yarnpkg.com/blog/2016/11/24/offline-mirror";

impl Driver<'_> {
    pub(super) async fn yarn_install(
        &self,
        mode: InstallMode,
        transcript: &mut Transcript,
    ) -> NodepackResult<()> {
        self.log.info("Installing node modules (yarn.lock)");

        let build_dir = &self.layout.build_dir;
        let offline = mode == InstallMode::Offline;

        let (mirror, pruning) = if offline {
            let mirror = build_dir.join(YARN_OFFLINE_MIRROR);
            self.log
                .info(&format!("Found yarn mirror directory {}", mirror.display()));
            self.log.info("Running yarn in offline mode");
            (mirror, "false")
        } else {
            self.log.info("Running yarn in online mode");
            self.log.info(&format!(
                "To run yarn in offline mode, see: {}",
                OFFLINE_MIRROR_DOCS
            ));
            (self.layout.cache_dir.join(YARN_OFFLINE_MIRROR), "true")
        };

        for (key, value) in [
            ("yarn-offline-mirror", mirror.display().to_string()),
            ("yarn-offline-mirror-pruning", pruning.to_string()),
        ] {
            let spec = self
                .command("yarn")
                .args(["config", "set", key])
                .arg(value);
            self.exec_quiet(spec).await?;
        }

        let mut install = self
            .command("yarn")
            .args(["install", "--pure-lockfile", "--ignore-engines", "--cache-folder"])
            .arg(self.layout.cache_dir.join(".cache/yarn").display().to_string())
            .arg("--modules-folder")
            .arg(build_dir.join("node_modules").display().to_string())
            .envs([(
                "npm_config_nodedir",
                self.runtime.node_home.display().to_string(),
            )]);
        let mut check = self.command("yarn").arg("check");
        if offline {
            install = install.arg("--offline");
            check = check.arg("--offline");
        }

        self.exec(install, transcript).await?;

        // A stale lockfile is worth a warning, not a failed build
        match self.runner.run(&check).await {
            Ok(output) if output.success() => {
                self.log.info("yarn.lock and package.json match");
            }
            Ok(output) => {
                debug!("yarn check: {}", output.combined());
                self.log.warning("yarn.lock is outdated");
            }
            Err(e) => {
                debug!("yarn check failed to run: {}", e);
                self.log
                    .warning("Unable to check whether yarn.lock is up to date");
            }
        }

        Ok(())
    }
}
