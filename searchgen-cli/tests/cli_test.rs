#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use predicates::str::contains;
use std::io::Write;
use tempfile::TempDir;

fn searchgen_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("searchgen").unwrap();
    cmd.env_remove("SEARCHGEN_DATA_DIR")
        .env("RUST_LOG", "warn")
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

const SCOPE: [&str; 6] = [
    "--tenant",
    "acme",
    "--environment",
    "dev",
    "--entity",
    "quote",
];

fn write_models(dir: &TempDir, name: &str, lines: &[serde_json::Value]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path
}

fn quote_json(id: &str, number: &str, state: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "tenant_id": "00000000-0000-0000-0000-000000000000",
        "quote_number": number,
        "state": state,
        "last_modified_ticks": 1,
    })
}

#[test]
fn empty_scope_has_no_index() {
    let data = TempDir::new().unwrap();
    searchgen_cmd(&data)
        .arg("latest")
        .args(SCOPE)
        .assert()
        .success()
        .stdout("none\n");
    searchgen_cmd(&data)
        .arg("state")
        .args(SCOPE)
        .assert()
        .success()
        .stdout(contains("no_index"));
}

#[test]
fn regenerate_then_search() {
    let data = TempDir::new().unwrap();
    let input = TempDir::new().unwrap();
    let file = write_models(
        &input,
        "quotes.jsonl",
        &[
            quote_json("6f1c1a52-1d1e-4a5b-9d7e-3c2b1a000001", "Q-1001", "complete"),
            quote_json("6f1c1a52-1d1e-4a5b-9d7e-3c2b1a000002", "Q-2002", "incomplete"),
        ],
    );

    searchgen_cmd(&data)
        .arg("regenerate")
        .args(SCOPE)
        .arg("--file")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("completed"));

    let output = searchgen_cmd(&data)
        .arg("search")
        .args(SCOPE)
        .args(["--term", "q-100"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let page: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(page["total_count"], 1);
    assert_eq!(page["items"][0]["number"], "Q-1001");

    searchgen_cmd(&data)
        .arg("latest")
        .args(SCOPE)
        .assert()
        .success()
        .stdout(predicates::str::is_match(r"^\d{20}\n$").unwrap());
}

#[test]
fn upsert_reports_the_task() {
    let data = TempDir::new().unwrap();
    let input = TempDir::new().unwrap();
    let file = write_models(
        &input,
        "quotes.jsonl",
        &[quote_json("6f1c1a52-1d1e-4a5b-9d7e-3c2b1a000003", "Q-3003", "approved")],
    );

    searchgen_cmd(&data)
        .arg("upsert")
        .args(SCOPE)
        .arg("--file")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("\"succeeded\""));
    searchgen_cmd(&data)
        .arg("state")
        .args(SCOPE)
        .assert()
        .success()
        .stdout(contains("live_only"));
}

#[test]
fn search_without_index_fails() {
    let data = TempDir::new().unwrap();
    searchgen_cmd(&data)
        .arg("search")
        .args(SCOPE)
        .assert()
        .failure();
}

#[test]
fn malformed_input_names_the_line() {
    let data = TempDir::new().unwrap();
    let input = TempDir::new().unwrap();
    let path = input.path().join("bad.jsonl");
    std::fs::write(&path, "{\"state\": \"complete\"}\nnot json\n").unwrap();

    searchgen_cmd(&data)
        .arg("regenerate")
        .args(SCOPE)
        .arg("--file")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("bad.jsonl:2"));
}

#[test]
fn unknown_entity_is_rejected() {
    let data = TempDir::new().unwrap();
    searchgen_cmd(&data)
        .args(["state", "--tenant", "acme", "--environment", "dev", "--entity", "claim"])
        .assert()
        .failure()
        .stderr(contains("unknown entity type"));
}
