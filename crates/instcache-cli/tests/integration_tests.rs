//! Integration tests for the instcache binary.
//!
//! These run the built executable against a dpkg status fixture and
//! throwaway cache and lock directories.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const STATUS_FIXTURE: &str = "\
Package: git
Status: install ok installed
Priority: optional
Section: vcs
Architecture: amd64
Version: 1:2.43.0-1ubuntu7
Description: fast, scalable, distributed revision control system
 Git is popular.

Package: curl
Status: install ok installed
Section: web
Architecture: amd64
Version: 8.5.0-2ubuntu10

Package: old-tool
Status: deinstall ok config-files
Architecture: amd64
Version: 0.1
";

/// Create a temporary environment with a dpkg status file.
fn create_test_env() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(temp_dir.path().join("status"), STATUS_FIXTURE).unwrap();
    temp_dir
}

fn run(env: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_instcache"))
        .args(args)
        .arg("--cache-dir")
        .arg(env.join("SysInstCache"))
        .arg("--lock-dir")
        .arg(env.join("locks"))
        .arg("--dpkg-status")
        .arg(env.join("status"))
        .output()
        .expect("Failed to run instcache")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "instcache failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_list_json_reports_installed_packages() {
    let env = create_test_env();

    let out = stdout(&run(env.path(), &["list", "--json"]));
    let json: Value = serde_json::from_str(&out).unwrap();

    assert_eq!(json["totalCount"], 2);
    let identities: Vec<&str> = json["matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["identity"].as_str().unwrap())
        .collect();
    assert_eq!(identities, vec!["curl:amd64", "git:amd64"]);
}

#[test]
fn test_status_refresh_clear_cycle() {
    let env = create_test_env();

    assert!(stdout(&run(env.path(), &["status"])).contains("absent"));
    assert!(stdout(&run(env.path(), &["refresh"])).starts_with("Rebuilt cache"));
    assert!(env.path().join("SysInstCache").join("cache.db").exists());

    let status: Value = serde_json::from_str(&stdout(&run(env.path(), &["status", "--json"]))).unwrap();
    assert_eq!(status["state"]["state"], "fresh");

    let refreshed: Value =
        serde_json::from_str(&stdout(&run(env.path(), &["refresh", "--json"]))).unwrap();
    assert_eq!(refreshed["tier"], "reused");
    assert_eq!(refreshed["refresh"]["unchanged"], 2);

    assert!(stdout(&run(env.path(), &["clear"])).starts_with("Removed"));
    assert!(!env.path().join("SysInstCache").exists());
}

#[test]
fn test_list_filters_by_tag() {
    let env = create_test_env();

    let out = stdout(&run(env.path(), &["list", "--tag", "vcs"]));
    assert!(out.contains("git:amd64"));
    assert!(!out.contains("curl:amd64"));
}
