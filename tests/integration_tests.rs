//! Integration tests for qcrun
//!
//! These drive the binary against a temporary station directory.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a qcrun Command
fn qcrun() -> Command {
    cargo_bin_cmd!("qcrun")
}

/// Helper to create a temporary station directory
fn create_temp_station() -> TempDir {
    TempDir::new().unwrap()
}

fn write_config(dir: &TempDir, content: &str) {
    let qcrun_dir = dir.path().join(".qcrun");
    fs::create_dir_all(&qcrun_dir).unwrap();
    fs::write(qcrun_dir.join("station.toml"), content).unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_qcrun_help() {
        qcrun()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("sessions"));
    }

    #[test]
    fn test_qcrun_version() {
        qcrun().arg("--version").assert().success();
    }

    #[test]
    fn test_run_help_lists_selection_flags() {
        qcrun()
            .args(["run", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--only"))
            .stdout(predicate::str::contains("--skip"))
            .stdout(predicate::str::contains("--device-id"))
            .stdout(predicate::str::contains("--device-version"))
            .stdout(predicate::str::contains("--manufacture-id"));
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        qcrun().arg("calibrate").assert().failure();
    }
}

// =============================================================================
// Catalog
// =============================================================================

mod catalog {
    use super::*;

    #[test]
    fn test_list_shows_builtin_catalog() {
        let dir = create_temp_station();

        qcrun()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("Built-in catalog"))
            .stdout(predicate::str::contains("T01"))
            .stdout(predicate::str::contains("Firmware Upload"))
            .stdout(predicate::str::contains("T14"))
            .stdout(predicate::str::contains("AUTOMATED_REMOTE"))
            .stdout(predicate::str::contains("13 tests"));
    }

    #[test]
    fn test_list_uses_configured_attempt_budget() {
        let dir = create_temp_station();
        write_config(&dir, "[retry]\nremote_max_attempts = 3\n");

        let output = qcrun()
            .args(["--station-dir", dir.path().to_str().unwrap(), "list"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let t09 = stdout
            .lines()
            .find(|l| l.starts_with("T09"))
            .expect("T09 row");
        assert!(t09.contains(" 3 "), "unexpected row: {}", t09);
    }

    #[test]
    fn test_list_with_custom_catalog_file() {
        let dir = create_temp_station();
        fs::write(
            dir.path().join("catalog.json"),
            r#"{"tests": [{"id": "A1", "name": "Power LED", "check": {"kind": "visual", "question": "Is the LED on?"}}]}"#,
        )
        .unwrap();
        write_config(&dir, "catalog_file = \"catalog.json\"\n");

        qcrun()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("Catalog loaded from"))
            .stdout(predicate::str::contains("Power LED"))
            .stdout(predicate::str::contains("1 tests"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_station_toml() {
        let dir = create_temp_station();

        qcrun()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created station.toml"));

        let content = fs::read_to_string(dir.path().join(".qcrun/station.toml")).unwrap();
        assert!(content.contains("[remote]"));
        assert!(content.contains("192.168.0.30"));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_station();
        write_config(&dir, "[remote]\nhost = \"10.1.1.1\"\n");

        qcrun()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join(".qcrun/station.toml")).unwrap();
        assert!(content.contains("10.1.1.1"));
    }

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_station();

        qcrun()
            .current_dir(dir.path())
            .env_remove("QCRUN_REMOTE_HOST")
            .env_remove("QCRUN_REMOTE_USER")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No station.toml found"))
            .stdout(predicate::str::contains("distiller@192.168.0.30"));
    }

    #[test]
    fn test_config_show_reads_file() {
        let dir = create_temp_station();
        write_config(&dir, "[remote]\nhost = \"10.0.0.7\"\nuser = \"pi\"\n");

        qcrun()
            .current_dir(dir.path())
            .env_remove("QCRUN_REMOTE_HOST")
            .env_remove("QCRUN_REMOTE_USER")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pi@10.0.0.7"));
    }

    #[test]
    fn test_config_env_overrides_host() {
        let dir = create_temp_station();
        write_config(&dir, "[remote]\nhost = \"10.0.0.7\"\n");

        qcrun()
            .current_dir(dir.path())
            .env("QCRUN_REMOTE_HOST", "10.9.9.9")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("10.9.9.9"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_station();
        write_config(&dir, "[remote]\ncommand_timeout_secs = 0\n");

        qcrun()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("command_timeout_secs"));
    }

    #[test]
    fn test_config_invalid_toml_fails() {
        let dir = create_temp_station();
        write_config(&dir, "[remote\nhost = ");

        qcrun()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("station.toml"));
    }
}

// =============================================================================
// Archived sessions
// =============================================================================

mod sessions {
    use super::*;

    #[test]
    fn test_sessions_empty_station() {
        let dir = create_temp_station();

        qcrun()
            .current_dir(dir.path())
            .arg("sessions")
            .assert()
            .success()
            .stdout(predicate::str::contains("No sessions recorded"));
    }

    #[test]
    fn test_show_missing_file_fails() {
        let dir = create_temp_station();

        qcrun()
            .current_dir(dir.path())
            .args(["show", "nope.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read session record"));
    }
}

// =============================================================================
// Unattended runs against a fake ssh
// =============================================================================

#[cfg(unix)]
mod unattended_run {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Station whose ssh binary prints `stdout` for every command.
    fn station_with_fake_ssh(stdout: &str) -> TempDir {
        let dir = create_temp_station();
        let script = dir.path().join("fake-ssh");
        fs::write(
            &script,
            format!("#!/bin/sh\ncat > /dev/null\nprintf '%s\\n' '{}'\n", stdout),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        write_config(
            &dir,
            &format!(
                "[remote]\nssh_cmd = \"{}\"\ncommand_timeout_secs = 5\n\n[retry]\nremote_max_attempts = 2\n",
                script.display()
            ),
        );
        dir
    }

    fn run_t09(dir: &Path) -> assert_cmd::assert::Assert {
        qcrun()
            .current_dir(dir)
            .env_remove("QCRUN_REMOTE_HOST")
            .env_remove("QCRUN_REMOTE_USER")
            .args(["run", "--yes", "--only", "T09", "--device-id", "42"])
            .assert()
    }

    fn session_files(dir: &Path) -> Vec<std::path::PathBuf> {
        fs::read_dir(dir.join("sessions"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect()
    }

    #[test]
    fn test_passing_run_writes_results() {
        let dir = station_with_fake_ssh("Bus 001 Device 004: MicroPython Board in FS mode");

        run_t09(dir.path())
            .success()
            .stdout(predicate::str::contains("OVERALL: PASS"));

        let csv = fs::read_to_string(dir.path().join("hardware_test_results.csv")).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Device ID,"));
        assert!(header.contains("T09: USB MicroPython Detection"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("42,"));
        assert!(row.contains("True"));
        assert!(row.contains("SKIPPED"));

        let workbook = fs::metadata(dir.path().join("hardware_test_results.xlsx")).unwrap();
        assert!(workbook.len() > 0);

        let sessions = session_files(dir.path());
        assert_eq!(sessions.len(), 1);

        let logs: Vec<_> = fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("device_42_log_"))
            .collect();
        assert_eq!(logs.len(), 1);
        let log = fs::read_to_string(logs[0].path()).unwrap();
        assert!(log.contains("T09: USB MicroPython Detection - PASS"));

        qcrun()
            .current_dir(dir.path())
            .arg("sessions")
            .assert()
            .success()
            .stdout(predicate::str::contains("42"))
            .stdout(predicate::str::contains("PASS"));

        qcrun()
            .current_dir(dir.path())
            .args(["show", sessions[0].to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("USB MicroPython Detection"))
            .stdout(predicate::str::contains("OVERALL: PASS"));
    }

    #[test]
    fn test_failing_run_records_failure() {
        let dir = station_with_fake_ssh("Bus 001 Device 001: Linux Foundation root hub");

        run_t09(dir.path())
            .success()
            .stdout(predicate::str::contains("OVERALL: FAIL"))
            .stdout(predicate::str::contains("T09"));

        let csv = fs::read_to_string(dir.path().join("hardware_test_results.csv")).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("42,"));
        assert!(row.contains("False"));
        assert!(row.contains("FAIL"));
    }

    #[test]
    fn test_second_run_appends_to_results() {
        let dir = station_with_fake_ssh("MicroPython Board in FS mode");

        run_t09(dir.path()).success();
        run_t09(dir.path()).success();

        let csv = fs::read_to_string(dir.path().join("hardware_test_results.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert_eq!(
            csv.lines().filter(|l| l.starts_with("Device ID,")).count(),
            1
        );
    }

    #[test]
    fn test_device_details_are_recorded() {
        let dir = station_with_fake_ssh("MicroPython Board in FS mode");

        qcrun()
            .current_dir(dir.path())
            .env_remove("QCRUN_REMOTE_HOST")
            .env_remove("QCRUN_REMOTE_USER")
            .args(["run", "--yes", "--only", "T09", "--device-id", "42"])
            .args(["--device-version", "v2", "--manufacture-id", "M7"])
            .assert()
            .success();

        let csv = fs::read_to_string(dir.path().join("hardware_test_results.csv")).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("42,v2,M7,"), "unexpected row: {}", row);
    }

    #[test]
    fn test_unknown_test_id_is_rejected() {
        let dir = station_with_fake_ssh("");

        qcrun()
            .current_dir(dir.path())
            .args(["run", "--yes", "--only", "T08", "--device-id", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown test id 'T08'"));
    }
}
