//! Package manager driver
//!
//! Looks at what the application ships (manifest, lockfiles, vendored
//! `node_modules`, offline mirrors) and runs npm, yarn or pnpm once to
//! materialize `node_modules`. Output of every run is kept in a transcript
//! that is scanned afterwards for advisory warnings.
//!
//! | Evidence | Manager | Mode |
//! |----------|---------|------|
//! | no package.json | - | skip |
//! | yarn.lock + npm-packages-offline-cache | yarn | offline |
//! | yarn.lock | yarn | online |
//! | pnpm-lock.yaml + .pnpm-store | pnpm | offline |
//! | pnpm-lock.yaml | pnpm | online |
//! | node_modules present | npm | rebuild |
//! | otherwise | npm | fresh install |

mod npm;
mod pnpm;
pub mod scan;
pub mod tips;
mod yarn;

pub use scan::{scan_output, OutputWarning};

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::config::BuildConfig;
use crate::error::NodepackResult;
use crate::install::RuntimeEnvironment;
use crate::package_json::{PackageJson, PACKAGE_JSON};
use crate::stager::{self, BuildLayout};
use crate::ui::BuildLog;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Yarn offline mirror shipped with the app
pub const YARN_OFFLINE_MIRROR: &str = "npm-packages-offline-cache";

/// pnpm content store shipped with the app
pub const PNPM_STORE: &str = ".pnpm-store";

/// Supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// npm (package-lock.json, npm-shrinkwrap.json)
    Npm,
    /// Yarn (yarn.lock)
    Yarn,
    /// pnpm (pnpm-lock.yaml)
    Pnpm,
}

impl PackageManager {
    /// Executable name
    pub fn program(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }

    /// Lockfiles this manager reads
    pub fn lockfile_patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["package-lock.json", "npm-shrinkwrap.json"],
            Self::Yarn => &["yarn.lock"],
            Self::Pnpm => &["pnpm-lock.yaml"],
        }
    }

    /// Arguments for `<pm> run <script>`
    fn run_script_args(&self, script: &str) -> Vec<String> {
        let mut args = vec!["run".to_string(), script.to_string()];
        if *self == Self::Npm {
            args.push("--if-present".to_string());
        }
        args
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program())
    }
}

/// What the application directory contains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    pub package_json: bool,
    /// `node_modules` exists before install
    pub vendored: bool,
    /// Lockfiles found, in detection order
    pub lockfiles: Vec<&'static str>,
    pub yarn_offline_mirror: bool,
    pub pnpm_store: bool,
}

impl Evidence {
    /// Inspect the build directory
    pub async fn detect(build_dir: &Path) -> NodepackResult<Self> {
        let mut lockfiles = Vec::new();
        for manager in [PackageManager::Npm, PackageManager::Yarn, PackageManager::Pnpm] {
            for pattern in manager.lockfile_patterns() {
                if stager::is_file(&build_dir.join(pattern)).await? {
                    debug!("Found {} lockfile: {}", manager, pattern);
                    lockfiles.push(*pattern);
                }
            }
        }

        let evidence = Self {
            package_json: stager::is_file(&build_dir.join(PACKAGE_JSON)).await?,
            vendored: stager::is_dir(&build_dir.join("node_modules")).await?,
            lockfiles,
            yarn_offline_mirror: stager::path_exists(&build_dir.join(YARN_OFFLINE_MIRROR)).await?,
            pnpm_store: stager::path_exists(&build_dir.join(PNPM_STORE)).await?,
        };
        debug!("Build evidence: {:?}", evidence);
        Ok(evidence)
    }

    pub fn has_lockfile(&self, name: &str) -> bool {
        self.lockfiles.contains(&name)
    }

    /// Whether any lockfile for `manager` is present
    pub fn has_lockfile_for(&self, manager: PackageManager) -> bool {
        manager
            .lockfile_patterns()
            .iter()
            .any(|l| self.has_lockfile(l))
    }

    /// The package manager this app is built with
    pub fn package_manager(&self) -> PackageManager {
        if self.has_lockfile("yarn.lock") {
            PackageManager::Yarn
        } else if self.has_lockfile("pnpm-lock.yaml") {
            PackageManager::Pnpm
        } else {
            PackageManager::Npm
        }
    }
}

/// How the install step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// No package.json
    Skip,
    /// npm install from the registry
    Fresh,
    /// npm rebuild of vendored node_modules, then install what is missing
    Rebuild,
    /// yarn/pnpm against the registry
    Online,
    /// yarn/pnpm against a vendored mirror or store
    Offline,
}

/// One pass of the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPlan {
    pub manager: PackageManager,
    pub mode: InstallMode,
}

impl BuildPlan {
    pub fn decide(evidence: &Evidence) -> Self {
        let manager = evidence.package_manager();

        let mode = if !evidence.package_json {
            InstallMode::Skip
        } else {
            match manager {
                PackageManager::Npm if evidence.vendored => InstallMode::Rebuild,
                PackageManager::Npm => InstallMode::Fresh,
                PackageManager::Yarn if evidence.yarn_offline_mirror => InstallMode::Offline,
                PackageManager::Pnpm if evidence.pnpm_store => InstallMode::Offline,
                PackageManager::Yarn | PackageManager::Pnpm => InstallMode::Online,
            }
        };

        Self { manager, mode }
    }
}

/// Everything the package manager printed during the build
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn record(&mut self, output: &CommandOutput) {
        self.text.push_str(&output.combined());
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Result of the dependency build
#[derive(Debug, Clone)]
pub struct DriverReport {
    pub plan: BuildPlan,
    pub evidence: Evidence,
    pub transcript: Transcript,
}

/// Runs the package manager for one build
pub struct Driver<'a> {
    pub layout: &'a BuildLayout,
    pub config: &'a BuildConfig,
    pub runtime: &'a RuntimeEnvironment,
    pub runner: &'a dyn CommandRunner,
    pub log: &'a BuildLog,
}

impl Driver<'_> {
    /// Run prebuild, install and postbuild, then the output scans
    ///
    /// Scans run even when a step fails, so their hints accompany the error.
    pub async fn build(&self, package: Option<&PackageJson>) -> NodepackResult<DriverReport> {
        let evidence = Evidence::detect(&self.layout.build_dir).await?;
        let plan = BuildPlan::decide(&evidence);
        self.log.debug(&format!("Build plan: {:?}", plan));

        self.log.begin_step("Building dependencies");

        let mut transcript = Transcript::default();
        let result = self
            .run_plan(plan, &evidence, package, &mut transcript)
            .await;

        let has_dev_dependencies = package.is_some_and(PackageJson::has_dev_dependencies);
        let escalate = self.config.npm_config_production && has_dev_dependencies;
        for warning in scan_output(transcript.as_str(), plan.manager, escalate) {
            self.log.warning(&warning.to_string());
        }
        result?;

        if plan.mode != InstallMode::Skip {
            tips::vendor_tip(&self.layout.build_dir, self.log).await;
            tips::list_dependencies(self, plan.manager).await;
        }

        Ok(DriverReport {
            plan,
            evidence,
            transcript,
        })
    }

    async fn run_plan(
        &self,
        plan: BuildPlan,
        evidence: &Evidence,
        package: Option<&PackageJson>,
        transcript: &mut Transcript,
    ) -> NodepackResult<()> {
        if plan.mode == InstallMode::Skip {
            self.log.info("Skipping (no package.json)");
            return Ok(());
        }

        if package.and_then(PackageJson::prebuild).is_some() {
            self.run_script("heroku-prebuild", plan.manager, transcript)
                .await?;
        }

        match (plan.manager, plan.mode) {
            (PackageManager::Npm, InstallMode::Rebuild) => {
                self.npm_rebuild(evidence, transcript).await?
            }
            (PackageManager::Npm, _) => self.npm_install(evidence, transcript).await?,
            (PackageManager::Yarn, mode) => self.yarn_install(mode, transcript).await?,
            (PackageManager::Pnpm, mode) => self.pnpm_install(mode, transcript).await?,
        }

        if package.and_then(PackageJson::postbuild).is_some() {
            self.run_script("heroku-postbuild", plan.manager, transcript)
                .await?;
        }

        Ok(())
    }

    async fn run_script(
        &self,
        script: &str,
        manager: PackageManager,
        transcript: &mut Transcript,
    ) -> NodepackResult<()> {
        self.log
            .info(&format!("Running {} ({})", script, manager));
        let spec = self
            .command(manager.program())
            .args(manager.run_script_args(script));
        self.exec(spec, transcript).await.map(|_| ())
    }

    /// Command in the build dir with the runtime environment
    fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program)
            .current_dir(&self.layout.build_dir)
            .envs(self.runtime.command_env())
    }

    /// Run, echo output into the build log, record it, fail on non-zero exit
    async fn exec(
        &self,
        spec: CommandSpec,
        transcript: &mut Transcript,
    ) -> NodepackResult<CommandOutput> {
        let output = self
            .runner
            .run_streaming(&spec, &|line: &str| self.log.output(line))
            .await?;
        transcript.record(&output);
        output.check(&spec)
    }

    /// Run configuration commands whose output nobody needs to see
    async fn exec_quiet(&self, spec: CommandSpec) -> NodepackResult<CommandOutput> {
        let output = self.runner.run(&spec).await?;
        output.check(&spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::FakeRunner;
    use crate::ui::LogBuffer;
    use std::fs;
    use tempfile::TempDir;

    pub(super) struct Fixture {
        _dir: TempDir,
        pub layout: BuildLayout,
        pub config: BuildConfig,
        pub runtime: RuntimeEnvironment,
        pub log: BuildLog,
        pub buffer: LogBuffer,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self::with_config(BuildConfig::default())
        }

        pub fn with_config(config: BuildConfig) -> Self {
            let dir = TempDir::new().unwrap();
            let layout = BuildLayout::new(
                dir.path().join("build"),
                dir.path().join("cache"),
                dir.path().join("deps"),
                "0",
            );
            fs::create_dir_all(&layout.build_dir).unwrap();
            let runtime = RuntimeEnvironment::new(&layout, "10.15.0", Some("/usr/bin"));
            let (log, buffer) = BuildLog::buffered();
            Self {
                _dir: dir,
                layout,
                config,
                runtime,
                log,
                buffer,
            }
        }

        pub fn file(&self, rel: &str, content: &str) {
            let path = self.layout.build_dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        pub fn driver<'a>(&'a self, runner: &'a FakeRunner) -> Driver<'a> {
            Driver {
                layout: &self.layout,
                config: &self.config,
                runtime: &self.runtime,
                runner,
                log: &self.log,
            }
        }

        pub fn build_path(&self, rel: &str) -> String {
            self.layout.build_dir.join(rel).display().to_string()
        }

        pub fn cache_path(&self, rel: &str) -> String {
            self.layout.cache_dir.join(rel).display().to_string()
        }
    }

    fn evidence(f: impl FnOnce(&mut Evidence)) -> Evidence {
        let mut evidence = Evidence {
            package_json: true,
            ..Default::default()
        };
        f(&mut evidence);
        evidence
    }

    #[test]
    fn decision_table() {
        let plan = BuildPlan::decide(&Evidence::default());
        assert_eq!(plan.mode, InstallMode::Skip);

        let plan = BuildPlan::decide(&evidence(|_| {}));
        assert_eq!((plan.manager, plan.mode), (PackageManager::Npm, InstallMode::Fresh));

        let plan = BuildPlan::decide(&evidence(|e| e.vendored = true));
        assert_eq!((plan.manager, plan.mode), (PackageManager::Npm, InstallMode::Rebuild));

        let plan = BuildPlan::decide(&evidence(|e| e.lockfiles = vec!["yarn.lock"]));
        assert_eq!((plan.manager, plan.mode), (PackageManager::Yarn, InstallMode::Online));

        let plan = BuildPlan::decide(&evidence(|e| {
            e.lockfiles = vec!["yarn.lock"];
            e.yarn_offline_mirror = true;
        }));
        assert_eq!((plan.manager, plan.mode), (PackageManager::Yarn, InstallMode::Offline));

        let plan = BuildPlan::decide(&evidence(|e| e.lockfiles = vec!["pnpm-lock.yaml"]));
        assert_eq!((plan.manager, plan.mode), (PackageManager::Pnpm, InstallMode::Online));

        let plan = BuildPlan::decide(&evidence(|e| {
            e.lockfiles = vec!["pnpm-lock.yaml"];
            e.pnpm_store = true;
        }));
        assert_eq!((plan.manager, plan.mode), (PackageManager::Pnpm, InstallMode::Offline));
    }

    #[test]
    fn yarn_lock_wins_over_vendored_node_modules() {
        let plan = BuildPlan::decide(&evidence(|e| {
            e.lockfiles = vec!["yarn.lock"];
            e.vendored = true;
        }));
        assert_eq!((plan.manager, plan.mode), (PackageManager::Yarn, InstallMode::Online));
    }

    #[tokio::test]
    async fn detects_evidence() {
        let fixture = Fixture::new();
        fixture.file("package.json", "{}");
        fixture.file("package-lock.json", "{}");
        fixture.file("node_modules/left-pad/index.js", "");
        fixture.file("npm-packages-offline-cache/a.tgz", "");

        let evidence = Evidence::detect(&fixture.layout.build_dir).await.unwrap();
        assert!(evidence.package_json);
        assert!(evidence.vendored);
        assert!(evidence.yarn_offline_mirror);
        assert!(!evidence.pnpm_store);
        assert_eq!(evidence.lockfiles, vec!["package-lock.json"]);
        assert!(evidence.has_lockfile_for(PackageManager::Npm));
        assert!(!evidence.has_lockfile_for(PackageManager::Yarn));
    }

    #[tokio::test]
    async fn skips_without_package_json() {
        let fixture = Fixture::new();
        let runner = FakeRunner::new();

        let report = fixture.driver(&runner).build(None).await.unwrap();

        assert_eq!(report.plan.mode, InstallMode::Skip);
        assert!(runner.calls().is_empty());
        let out = fixture.buffer.contents();
        assert!(out.contains("-----> Building dependencies"));
        assert!(out.contains("Skipping (no package.json)"));
    }

    #[tokio::test]
    async fn runs_build_scripts_around_install() {
        let fixture = Fixture::new();
        fixture.file(
            "package.json",
            r#"{"scripts": {"heroku-prebuild": "a", "heroku-postbuild": "b"}}"#,
        );
        let package = PackageJson::load(&fixture.layout.build_dir).await.unwrap();
        let runner = FakeRunner::new();

        fixture.driver(&runner).build(package.as_ref()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0], "npm run heroku-prebuild --if-present");
        assert!(calls[1].starts_with("npm install"));
        assert_eq!(calls[2], "npm run heroku-postbuild --if-present");
        assert!(fixture
            .buffer
            .contents()
            .contains("Running heroku-prebuild (npm)"));
    }

    #[tokio::test]
    async fn yarn_scripts_have_no_if_present() {
        let fixture = Fixture::new();
        fixture.file("package.json", r#"{"scripts": {"heroku-postbuild": "b"}}"#);
        fixture.file("yarn.lock", "");
        let package = PackageJson::load(&fixture.layout.build_dir).await.unwrap();
        let runner = FakeRunner::new();

        fixture.driver(&runner).build(package.as_ref()).await.unwrap();

        assert_eq!(runner.calls().last().unwrap(), "yarn run heroku-postbuild");
    }

    #[tokio::test]
    async fn failed_install_still_scans_output() {
        let fixture = Fixture::new();
        fixture.file("package.json", "{}");
        let runner = FakeRunner::new().respond_with(
            "npm install",
            CommandOutput {
                code: 1,
                stdout: "sh: 1: gulp: not found\n".to_string(),
                stderr: String::new(),
            },
        );

        let err = fixture.driver(&runner).build(None).await.unwrap_err();

        assert!(matches!(err, crate::error::NodepackError::CommandExit { code: 1, .. }));
        let out = fixture.buffer.contents();
        assert!(out.contains("gulp: not found"));
        assert!(out.contains("**WARNING** Gulp may not be tracked in package.json"));
    }

    #[tokio::test]
    async fn subprocesses_get_runtime_environment() {
        let fixture = Fixture::new();
        fixture.file("package.json", "{}");
        let runner = FakeRunner::new();

        fixture.driver(&runner).build(None).await.unwrap();

        let spec = &runner.specs()[0];
        assert_eq!(spec.dir.as_deref(), Some(fixture.layout.build_dir.as_path()));
        assert!(spec
            .env
            .contains(&("NODE_HOME".to_string(), fixture.runtime.node_home.display().to_string())));
        assert!(spec.env.iter().any(|(k, v)| k == "PATH" && v.ends_with(":/usr/bin")));
    }
}
