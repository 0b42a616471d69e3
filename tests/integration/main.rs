//! Integration tests for nodepack

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
default_versions:
  - name: node
    version: 10.x
dependencies:
  - name: node
    version: 10.15.0
    uri: https://buildpacks.example.com/node-v10.15.0-linux-x64.tgz
    sha256: 0000000000000000000000000000000000000000000000000000000000000000
    cf_stacks: [cflinuxfs4]
  - name: yarn
    version: 1.22.19
    uri: https://buildpacks.example.com/yarn-v1.22.19.tar.gz
    sha256: 0000000000000000000000000000000000000000000000000000000000000000
    cf_stacks: [cflinuxfs4]
"#;

    fn nodepack() -> Command {
        cargo_bin_cmd!("nodepack")
    }

    /// A staging layout with an app containing `files`
    fn stage(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for sub in ["build", "cache", "deps"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        fs::write(dir.path().join("manifest.yml"), MANIFEST).unwrap();
        for (name, content) in files {
            fs::write(dir.path().join("build").join(name), content).unwrap();
        }
        dir
    }

    fn supply(dir: &Path) -> Command {
        let mut cmd = nodepack();
        cmd.arg("supply")
            .arg(dir.join("build"))
            .arg(dir.join("cache"))
            .arg(dir.join("deps"))
            .arg("0")
            .arg("--manifest")
            .arg(dir.join("manifest.yml"))
            .env_remove("CF_STACK")
            .env_remove("BP_DEBUG");
        cmd
    }

    #[test]
    fn help_displays() {
        nodepack()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Node.js buildpack supply"));
    }

    #[test]
    fn version_displays() {
        nodepack()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("nodepack"));
    }

    #[test]
    fn supply_requires_layout_arguments() {
        nodepack()
            .args(["supply", "/tmp/build"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("CACHE_DIR"));
    }

    #[test]
    fn missing_manifest_fails() {
        let dir = stage(&[]);
        fs::remove_file(dir.path().join("manifest.yml")).unwrap();

        supply(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("reading buildpack manifest"));
    }

    #[test]
    fn iojs_is_rejected() {
        let dir = stage(&[("package.json", r#"{"engines": {"iojs": "3.x"}}"#)]);

        supply(dir.path())
            .assert()
            .failure()
            .stdout(predicate::str::contains("-----> Installing binaries"))
            .stderr(predicate::str::contains("io.js not supported by this buildpack"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_nvmrc_is_rejected() {
        let dir = stage(&[("package.json", "{}"), (".nvmrc", "^10.0")]);

        supply(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid version ^10.0 specified in .nvmrc"));
    }

    #[test]
    fn unmatched_node_version_lists_available() {
        let dir = stage(&[("package.json", r#"{"engines": {"node": "99.x"}}"#)]);

        supply(dir.path())
            .assert()
            .failure()
            .stdout(predicate::str::contains("engines.node (package.json): 99.x"))
            .stderr(predicate::str::contains("no match found for 99.x"))
            .stderr(predicate::str::contains("10.15.0"));
    }

    #[test]
    fn unavailable_yarn_version_lists_catalog() {
        let dir = stage(&[(
            "package.json",
            r#"{"engines": {"node": "10.x", "yarn": "2.x"}}"#,
        )]);

        supply(dir.path()).assert().failure().stderr(predicate::str::contains(
            "package.json requested 2.x, buildpack only includes yarn version 1.22.19",
        ));
    }

    #[test]
    fn stack_filter_hides_other_stacks() {
        let dir = stage(&[("package.json", r#"{"engines": {"node": "10.x"}}"#)]);

        supply(dir.path())
            .env("CF_STACK", "cflinuxfs3")
            .assert()
            .failure()
            .stderr(predicate::str::contains("no match found for 10.x"));
    }
}
