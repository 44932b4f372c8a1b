//! CLI integration tests for mssql-snowflake-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mssql-snowflake-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("mssql-snowflake-migrate").unwrap()
}

/// A complete config whose endpoints refuse connections.
fn unreachable_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
source:
  connection_string: "Server=tcp:127.0.0.1,1;Database=Data_Lab_NCL;User Id=etl;Password=pw;TrustServerCertificate=true"
  connect_timeout_secs: 2
destination:
  account: xy12345
  user: etl_user
  database: ANALYTICS
  schema: RAW
  warehouse: LOAD_WH
  authenticator: snowflake
  password: hunter2
  host: "http://127.0.0.1:1"
  request_timeout_secs: 2
migration:
  tables:
    - source: dbo.Customers
      destination: CUSTOMERS
"#
    )
    .unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"));
}

#[test]
fn test_plan_subcommand_help() {
    cmd()
        .args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE"))
        .stdout(predicate::str::contains("--table"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mssql-snowflake-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_unknown_verbosity_exits_with_code_1() {
    cmd()
        .args(["--verbosity", "loud", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown verbosity"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  connection_string: \"Server=tcp:localhost,1433\"").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_table_list_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
source:
  connection_string: "Server=tcp:localhost,1433;User Id=etl;Password=pw"
destination:
  account: xy12345
  user: etl_user
  database: ANALYTICS
  schema: RAW
  warehouse: LOAD_WH
migration:
  tables: []
"#
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tables"));
}

#[test]
fn test_unknown_table_filter_exits_with_code_1() {
    let file = unreachable_config();

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--table",
            "dbo.Nope",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no configured table matches"));
}

// =============================================================================
// Exit Code Tests - Connection Errors
// =============================================================================

#[test]
fn test_unreachable_destination_fails_run_with_code_3() {
    let file = unreachable_config();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "--output-json", "run"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"status\": \"failed\""));
}

#[test]
fn test_unreadable_source_is_reported_per_table_by_plan() {
    let file = unreachable_config();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("-- dbo.Customers -> CUSTOMERS"))
        .stdout(predicate::str::contains("-- FAILED: Source connection failed"));
}

#[test]
fn test_unreachable_health_check_reports_unhealthy() {
    let file = unreachable_config();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Source (MSSQL): FAILED"))
        .stdout(predicate::str::contains("Destination (Snowflake): FAILED"))
        .stdout(predicate::str::contains("Overall: UNHEALTHY"))
        .stderr(predicate::str::contains("Source connection failed"))
        .stderr(predicate::str::contains("Source connection failed: Source connection failed").not());
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

// =============================================================================
// Config Path Tests
// =============================================================================

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    // -c should work as short for --config
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
