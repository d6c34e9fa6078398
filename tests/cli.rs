#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::path::Path;

fn gastown(database_url: &str, dir: &Path) -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("gastown"));
    command
        .current_dir(dir)
        .env("GASTOWN_DATABASE_URL", database_url)
        .env("RUST_LOG", "warn");
    command
}

fn parse_json_stdout(output: &[u8]) -> Result<Value, String> {
    let raw = String::from_utf8_lossy(output).trim().to_string();
    serde_json::from_str::<Value>(&raw)
        .map_err(|err| format!("expected JSON on stdout, got '{raw}': {err}"))
}

#[test]
fn given_help_flag_when_invoked_then_subcommands_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    gastown("sqlite::memory:", dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("serve"))
        .stdout(contains("create-rig"))
        .stdout(contains("patrol"));
}

#[test]
fn given_file_database_when_town_and_rig_created_then_they_list_back() -> Result<(), String> {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("data").join("gastown.db").display());

    let init = gastown(&url, dir.path()).arg("init-db").assert().success();
    let init = parse_json_stdout(&init.get_output().stdout)?;
    if init["initialized"] != Value::Bool(true) {
        return Err(format!("init-db should report initialized: {init}"));
    }

    let town = gastown(&url, dir.path())
        .args(["create-town", "--name", "acme", "--owner", "lewis"])
        .assert()
        .success();
    let town = parse_json_stdout(&town.get_output().stdout)?;
    let town_id = town["id"].as_str().ok_or("town id missing")?.to_string();

    let rig = gastown(&url, dir.path())
        .args([
            "create-rig",
            "--town",
            &town_id,
            "--name",
            "widgets",
            "--git-url",
            "https://example.com/widgets.git",
        ])
        .assert()
        .success();
    let rig = parse_json_stdout(&rig.get_output().stdout)?;
    if rig["default_branch"] != Value::String("main".to_string()) {
        return Err(format!("rig should default to main: {rig}"));
    }

    let rigs = gastown(&url, dir.path())
        .args(["list-rigs", "--town", &town_id])
        .assert()
        .success();
    let rigs = parse_json_stdout(&rigs.get_output().stdout)?;
    if rigs.as_array().map(Vec::len) != Some(1) {
        return Err(format!("expected one rig: {rigs}"));
    }

    let rig_id = rig["id"].as_str().ok_or("rig id missing")?;
    let patrol = gastown(&url, dir.path())
        .args(["patrol", rig_id])
        .assert()
        .success();
    let patrol = parse_json_stdout(&patrol.get_output().stdout)?;
    if patrol["dead_agents"] != Value::Array(Vec::new()) {
        return Err(format!("empty rig has no dead agents: {patrol}"));
    }
    Ok(())
}

#[test]
fn given_unknown_town_when_listing_rigs_then_not_found_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("gastown.db").display());
    gastown(&url, dir.path())
        .args(["list-rigs", "--town", "town-missing"])
        .assert()
        .code(5)
        .stderr(contains("town"));
}
