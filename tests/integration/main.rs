//! Integration tests for resfetch

mod fakes;
mod fetch_source_tests;
mod orchestrator_tests;

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Binary with config and state isolated in `home`
    fn resfetch(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("resfetch");
        cmd.env("RESFETCH_CONFIG", home.path().join("config.toml"))
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        resfetch(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("fetch and cache CI resources"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        resfetch(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("resfetch"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        resfetch(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        resfetch(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[worker]"));
    }

    #[test]
    fn invalid_config_fails() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("config.toml"), "[worker\nname = ").unwrap();
        resfetch(&home)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_list_empty() {
        let home = TempDir::new().unwrap();
        let store = home.path().join("caches.json");
        std::fs::write(
            home.path().join("config.toml"),
            format!("[store]\npath = {:?}\n", store.display().to_string()),
        )
        .unwrap();

        resfetch(&home)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No resource caches found"));
    }

    #[test]
    fn cache_list_json_empty() {
        let home = TempDir::new().unwrap();
        let store = home.path().join("caches.json");
        std::fs::write(
            home.path().join("config.toml"),
            format!("[store]\npath = {:?}\n", store.display().to_string()),
        )
        .unwrap();

        resfetch(&home)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn fetch_rejects_invalid_source() {
        let home = TempDir::new().unwrap();
        resfetch(&home)
            .args(["fetch", "--type", "git", "--source", "{not json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid JSON"));
    }

    #[test]
    fn task_requires_file() {
        let home = TempDir::new().unwrap();
        resfetch(&home).arg("task").assert().failure();
    }
}
