use assert_cmd::{cargo, prelude::*};
use predicates::prelude::*;
use std::{path::PathBuf, process::Command};
use tempfile::TempDir;

const LEDGER_CSV: &str = "tests/data/ledger.csv";

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

/// CLI command isolated to a temp HOME (ledger and config both live there)
fn carteira(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("carteira"));
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("RUST_LOG")
        .arg("--no-color");
    cmd
}

fn import_ledger(home: &TempDir) {
    carteira(home)
        .arg("import")
        .arg(LEDGER_CSV)
        .assert()
        .success();
}

fn write_targets(home: &TempDir) -> PathBuf {
    let path = home.path().join("targets.toml");
    std::fs::write(
        &path,
        "[targets]\nstock = 50\nfii = 30\ntreasury = 20\n",
    )
    .expect("failed to write targets");
    path
}

#[test]
fn positions_empty_db_no_color_when_piped() {
    let home = setup_temp_home();

    carteira(&home)
        .arg("positions")
        .assert()
        .success()
        .stdout(predicate::str::contains("No positions found"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn import_dry_run_does_not_create_db() {
    let home = setup_temp_home();
    let db_path = home.path().join(".carteira").join("ledger.db");
    assert!(!db_path.exists(), "db should start absent");

    carteira(&home)
        .arg("import")
        .arg(LEDGER_CSV)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 6 operation(s)"))
        .stdout(predicate::str::contains("Skipped 1 row(s)"))
        .stdout(predicate::str::contains("Rejected 1 invalid operation(s)"))
        .stdout(predicate::str::contains("Dry run"));

    assert!(!db_path.exists(), "dry-run should not create db");
}

#[test]
fn import_then_positions_shows_holdings() {
    let home = setup_temp_home();

    carteira(&home)
        .arg("import")
        .arg(LEDGER_CSV)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 5 operation(s)"));

    carteira(&home)
        .arg("positions")
        .assert()
        .success()
        .stdout(predicate::str::contains("PETR4"))
        .stdout(predicate::str::contains("R$ 4900.00"))
        .stdout(predicate::str::contains("HGLG11"))
        .stdout(predicate::str::contains("TESOURO-SELIC-2029"))
        .stdout(predicate::str::contains("WEGE3").not())
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn explicit_db_path_is_used() {
    let home = setup_temp_home();
    let db_path = home.path().join("custom.db");

    carteira(&home)
        .arg("--db")
        .arg(&db_path)
        .arg("import")
        .arg(LEDGER_CSV)
        .assert()
        .success();

    assert!(db_path.exists());
    assert!(!home.path().join(".carteira").join("ledger.db").exists());
}

#[test]
fn consolidate_removes_duplicate_lots() {
    let home = setup_temp_home();
    import_ledger(&home);

    carteira(&home)
        .arg("duplicates")
        .assert()
        .success()
        .stdout(predicate::str::contains("PETR4"))
        .stdout(predicate::str::contains("HGLG11").not());

    carteira(&home)
        .arg("consolidate")
        .arg("PETR4")
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would merge 2 lot(s)"));

    carteira(&home)
        .arg("consolidate")
        .arg("--all")
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 2 lot(s)"))
        .stdout(predicate::str::contains("R$ 35.00"));

    carteira(&home)
        .arg("duplicates")
        .assert()
        .success()
        .stdout(predicate::str::contains("No duplicate lots found"));

    // Totals are unchanged by consolidation
    carteira(&home)
        .arg("positions")
        .assert()
        .success()
        .stdout(predicate::str::contains("R$ 4900.00"));
}

#[test]
fn rebalance_without_targets_explains_setup() {
    let home = setup_temp_home();
    import_ledger(&home);

    carteira(&home)
        .arg("rebalance")
        .assert()
        .success()
        .stdout(predicate::str::contains("No allocation targets configured"));
}

#[test]
fn rebalance_with_targets_suggests_selling_stock() {
    let home = setup_temp_home();
    import_ledger(&home);
    let targets = write_targets(&home);

    carteira(&home)
        .arg("rebalance")
        .arg("--targets")
        .arg(&targets)
        .assert()
        .success()
        .stdout(predicate::str::contains("STOCK"))
        .stdout(predicate::str::contains("SELL"))
        .stdout(predicate::str::contains("R$ -900.00"));
}

#[test]
fn rebalance_reads_default_config_file() {
    let home = setup_temp_home();
    import_ledger(&home);

    let config_dir = home.path().join(".config").join("carteira");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[targets]\nstock = 100\n").unwrap();

    carteira(&home)
        .arg("rebalance")
        .assert()
        .success()
        .stdout(predicate::str::contains("No target set for: fii, treasury"));
}

#[test]
fn rebalance_json_output() {
    let home = setup_temp_home();
    import_ledger(&home);
    let targets = write_targets(&home);

    let output = carteira(&home)
        .arg("--json")
        .arg("rebalance")
        .arg("--targets")
        .arg(&targets)
        .arg("--add")
        .arg("2000")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let suggestions = report["suggestions"].as_array().unwrap();
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0]["subject"]["kind"], "asset_class");
    assert!(report["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn positions_json_includes_anomaly_free_report() {
    let home = setup_temp_home();
    import_ledger(&home);

    let output = carteira(&home)
        .arg("--json")
        .arg("positions")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["positions"].as_array().unwrap().len(), 3);
    assert!(report["anomalies"].as_array().unwrap().is_empty());
}
