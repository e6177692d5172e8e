//! CLI surface tests.
//!
//! These run the built binary, so they also catch bin-target-only breakage
//! (imports, argument wiring) that library tests never compile.

use std::process::Command;

fn sitesync_bin() -> String {
    env!("CARGO_BIN_EXE_sitesync").to_string()
}

#[test]
fn test_help_lists_all_commands() {
    let output = Command::new(sitesync_bin())
        .arg("--help")
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "--help failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["list-buckets", "list-objects", "setup-bucket", "sync"] {
        assert!(stdout.contains(command), "help is missing {command}");
    }
}

#[test]
fn test_no_arguments_is_a_usage_error() {
    let output = Command::new(sitesync_bin()).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_sync_requires_path_and_bucket() {
    let output = Command::new(sitesync_bin()).arg("sync").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PATH") || stderr.contains("required"));
}
