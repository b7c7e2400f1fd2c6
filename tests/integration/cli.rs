use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write a config pointing `install_dir` at `dir` and the remote at an unroutable host.
fn write_config(temp: &Path, install_dir: &Path) -> std::path::PathBuf {
    let config_path = temp.join("config.toml");
    let content = format!(
        r#"
[product]
name = "tool"
extension = ""
install_dir = '{}'

[remote]
owner = "acme"
repo = "tool"
api_base = "http://127.0.0.1:9"
raw_base = "http://127.0.0.1:9"
commit_timeout_secs = 1
metadata_timeout_secs = 1
raw_timeout_secs = 1
"#,
        install_dir.display()
    );
    fs::write(&config_path, content).unwrap();
    config_path
}

fn binswap() -> Command {
    let mut cmd = Command::cargo_bin("binswap").unwrap();
    cmd.env("BINSWAP_NO_PROGRESS", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    binswap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("prune"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_config_path_honors_flag_and_env() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom.toml");

    binswap()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));

    binswap()
        .env("BINSWAP_CONFIG", &path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_and_show() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");

    binswap().args(["config", "init", "--config"]).arg(&path).assert().success();
    assert!(path.exists());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[remote]"));
    assert!(written.contains("commit_count = 10"));

    binswap()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    binswap()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("max_wait_secs = 30"));
}

#[test]
fn test_invalid_config_reports_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[product\n").unwrap();

    binswap()
        .args(["status", "--offline", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}

#[test]
fn test_status_offline_json() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    fs::create_dir_all(&install).unwrap();
    fs::write(install.join("tool_v3"), b"three").unwrap();
    fs::write(install.join("tool_v8"), b"eight").unwrap();
    fs::write(install.join(".tool_v9.part"), b"partial").unwrap();
    let config = write_config(temp.path(), &install);

    let output = binswap()
        .args(["status", "--offline", "--json", "--config"])
        .arg(&config)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let builds: Vec<u64> =
        json["local"].as_array().unwrap().iter().map(|r| r["build"].as_u64().unwrap()).collect();
    assert_eq!(builds, vec![8, 3]);
    assert!(json.get("remote").is_none());
}

#[test]
fn test_prune_removes_older_builds() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    fs::create_dir_all(&install).unwrap();
    for build in [2, 4, 5, 9] {
        fs::write(install.join(format!("tool_v{build}")), b"bin").unwrap();
    }
    let config = write_config(temp.path(), &install);

    binswap()
        .args(["prune", "--current", "5", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));

    assert!(!install.join("tool_v2").exists());
    assert!(!install.join("tool_v4").exists());
    assert!(install.join("tool_v5").exists());
    assert!(install.join("tool_v9").exists());
}

#[test]
fn test_check_dry_run_prefers_local_build() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    fs::create_dir_all(&install).unwrap();
    fs::write(install.join("tool_v7"), b"seven").unwrap();
    let config = write_config(temp.path(), &install);

    binswap()
        .args(["check", "--current", "5", "--dry-run", "--plan-format", "json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Would switch from build 5 to 7"))
        .stdout(predicate::str::contains("\"step\": \"launch\""));

    assert!(install.join("tool_v7").exists());
}

#[test]
fn test_check_offline_is_no_update() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    fs::create_dir_all(&install).unwrap();
    let config = write_config(temp.path(), &install);

    binswap()
        .args(["check", "--current", "5", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[test]
fn test_check_rejects_zero_build() {
    binswap().args(["check", "--current", "0"]).assert().failure();
}
