//! CLI integration tests.

use std::path::{Path, PathBuf};
use std::process::Command;

fn csync() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_csync"));
    scrub_scoped_env(&mut command);
    command
}

fn run_cli(args: &[&str]) -> std::io::Result<std::process::Output> {
    csync().args(args).output()
}

fn scrub_scoped_env(command: &mut Command) {
    for (key, _) in std::env::vars() {
        if key.starts_with("CSY_") {
            command.env_remove(key);
        }
    }
}

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map_or_else(|| manifest_dir.to_path_buf(), Path::to_path_buf)
}

fn fixture_path(relative: &str) -> PathBuf {
    workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative)
}

fn parse_json(stdout: &[u8]) -> std::io::Result<serde_json::Value> {
    serde_json::from_slice(stdout).map_err(std::io::Error::other)
}

#[test]
fn cli_version_runs() -> std::io::Result<()> {
    let output = run_cli(&["--version"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "--version failed: {stderr}");
    assert!(stdout.starts_with("csync "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));

    Ok(())
}

#[test]
fn cli_info_lists_layers() -> std::io::Result<()> {
    let output = run_cli(&["info", "--output", "json"])?;
    assert!(output.status.success());

    let value = parse_json(&output.stdout)?;
    assert_eq!(value.get("status").and_then(|v| v.as_str()), Some("ok"));
    let layers = value
        .get("build")
        .and_then(|build| build.get("layers"))
        .and_then(|layers| layers.as_object())
        .ok_or_else(|| std::io::Error::other("missing build.layers"))?;
    for layer in ["shared", "domain", "ports", "config", "adapters", "app", "infra"] {
        assert!(layers.contains_key(layer), "missing {layer}");
    }
    Ok(())
}

#[test]
fn cli_config_check_runs_on_valid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/sync-config.valid.json");
    let output = csync().args(["config", "check", "--config"]).arg(&path).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "config check failed: {stderr}");
    assert!(stdout.contains("status: ok"));

    Ok(())
}

#[test]
fn cli_config_check_runs_on_toml_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/sync-config.default.toml");
    let output = csync().args(["config", "check", "--config"]).arg(&path).output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "config check failed: {stderr}");
    Ok(())
}

#[test]
fn cli_config_check_fails_on_invalid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/sync-config.invalid.json");
    let output = csync().args(["config", "check", "--config"]).arg(&path).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(2));
    assert!(stdout.contains("status: error"));
    assert!(stdout.contains("code: config:"));

    Ok(())
}

#[test]
fn cli_config_check_env_overrides_win() -> std::io::Result<()> {
    let path = fixture_path("config/sync-config.valid.json");
    let output = csync()
        .args(["--output", "json", "config", "check", "--config"])
        .arg(&path)
        .env("CSY_SCHEDULER_INTERVAL_MS", "90000")
        .output()?;
    assert!(output.status.success());

    let value = parse_json(&output.stdout)?;
    let interval = value
        .get("effectiveConfig")
        .and_then(|config| config.get("scheduler"))
        .and_then(|scheduler| scheduler.get("intervalMs"))
        .and_then(serde_json::Value::as_u64);
    assert_eq!(interval, Some(90_000));
    Ok(())
}

#[test]
fn cli_config_show_never_prints_the_notifier_token() -> std::io::Result<()> {
    let path = fixture_path("config/sync-config.valid.json");
    let output = csync()
        .args(["config", "show", "--format", "toml", "--config"])
        .arg(&path)
        .env("CSY_NOTIFIER_TOKEN", "very-secret-token")
        .output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("[scheduler]"));
    assert!(!stdout.contains("very-secret-token"));
    Ok(())
}

#[test]
fn cli_invalid_env_is_invalid_input() -> std::io::Result<()> {
    let path = fixture_path("config/sync-config.valid.json");
    let output = csync()
        .args(["--output", "ndjson", "config", "check", "--config"])
        .arg(&path)
        .env("CSY_SCHEDULER_INTERVAL_MS", "soon")
        .output()?;

    assert_eq!(output.status.code(), Some(2));
    let value = parse_json(&output.stdout)?;
    assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("error"));
    Ok(())
}

#[test]
fn cli_run_without_changelog_path_is_invalid_input() -> std::io::Result<()> {
    let output = run_cli(&["run", "--output", "json"])?;

    assert_eq!(output.status.code(), Some(2));
    let value = parse_json(&output.stdout)?;
    assert_eq!(value.get("status").and_then(|v| v.as_str()), Some("error"));
    Ok(())
}
