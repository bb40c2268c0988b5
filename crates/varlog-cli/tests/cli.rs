// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn varlog(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("varlog").expect("binary built");
    cmd.arg("--config-dir").arg(config_dir);
    cmd
}

fn write_transcript(dir: &Path, messages: &Value) -> std::path::PathBuf {
    let path = dir.join("transcript.json");
    fs::write(&path, serde_json::to_vec(messages).unwrap()).unwrap();
    path
}

fn run_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("json output")
}

#[test]
fn apply_reports_atoms_and_final_state() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(
        dir.path(),
        &json!([
            {"floor": 3, "text": "<state>\nhp: 50\n</state>"},
            {"floor": 7, "text": "The hero drinks.\n<state>\nhp: +10\n</state>"}
        ]),
    );

    let doc = run_json(varlog(dir.path()).arg("--json").arg("apply").arg(&transcript));

    assert_eq!(doc["state"], json!({"hp": 60}));
    assert_eq!(doc["wal"], json!([3, 7]));
    assert_eq!(doc["floors"][1]["floor"], json!(7));
    assert_eq!(
        doc["floors"][1]["outcome"]["atoms"][0]["semantic"],
        json!("hp: 50 -> 60 (+10)")
    );
    assert_eq!(doc["digest"].as_str().map(str::len), Some(64));
}

#[test]
fn restore_and_trim_flags_rewind_state() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(
        dir.path(),
        &json!([
            {"floor": 3, "text": "<state>\nhp: 50\n</state>"},
            {"floor": 7, "text": "<state>\nhp: +10\n</state>"}
        ]),
    );

    let doc = run_json(
        varlog(dir.path())
            .arg("--json")
            .arg("apply")
            .arg(&transcript)
            .arg("--trim-from")
            .arg("5")
            .arg("--restore-to")
            .arg("5"),
    );

    assert_eq!(doc["trim"]["wal_removed"], json!(1));
    assert_eq!(doc["restore"]["ok"], json!(true));
    assert_eq!(doc["state"], json!({"hp": 50}));
    assert_eq!(doc["wal"], json!([3]));
}

#[test]
fn negative_restore_clears_everything() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(dir.path(), &json!(["<state>\nhp: 5\n</state>"]));

    let doc = run_json(
        varlog(dir.path())
            .arg("--json")
            .arg("apply")
            .arg(&transcript)
            .arg("--restore-to")
            .arg("-1"),
    );

    assert_eq!(doc["state"], json!({}));
}

#[test]
fn state_file_carries_history_between_runs() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");
    let first = write_transcript(
        dir.path(),
        &json!([{"floor": 0, "text": "<state>\ngold: 10\n</state>"}]),
    );
    varlog(dir.path())
        .arg("apply")
        .arg(&first)
        .arg("--state")
        .arg(&state)
        .assert()
        .success();
    assert!(state.exists());

    let second = dir.path().join("second.json");
    fs::write(
        &second,
        serde_json::to_vec(&json!([{"floor": 1, "text": "<state>\ngold: +5\n</state>"}])).unwrap(),
    )
    .unwrap();
    let doc = run_json(
        varlog(dir.path())
            .arg("--json")
            .arg("apply")
            .arg(&second)
            .arg("--state")
            .arg(&state),
    );

    assert_eq!(doc["state"], json!({"gold": 15}));
    assert_eq!(doc["wal"], json!([0, 1]));
}

#[test]
fn custom_tag_from_flag() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(
        dir.path(),
        &json!(["<vars>\nmood: calm\n</vars>\n<state>\nmood: angry\n</state>"]),
    );

    let doc = run_json(
        varlog(dir.path())
            .arg("--json")
            .arg("--tag")
            .arg("vars")
            .arg("apply")
            .arg(&transcript),
    );

    assert_eq!(doc["state"], json!({"mood": "calm"}));
}

#[test]
fn parse_prints_ops_table() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("message.txt");
    fs::write(&input, "prose\n<state>\nhp: +10\nbag: +[\"rope\"]\n</state>").unwrap();

    varlog(dir.path())
        .arg("parse")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("block 0"))
        .stdout(predicate::str::contains("hp"))
        .stdout(predicate::str::contains("push"));
}

#[test]
fn parse_reports_missing_blocks() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("message.txt");
    fs::write(&input, "no blocks here").unwrap();

    varlog(dir.path())
        .arg("parse")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("no <state> blocks found"));
}

#[test]
fn config_save_round_trips_through_config_dir() {
    let dir = TempDir::new().unwrap();
    varlog(dir.path())
        .arg("--tag")
        .arg("vars")
        .arg("config")
        .arg("--save")
        .assert()
        .success();
    assert!(dir.path().join("engine.json").exists());

    let doc = run_json(varlog(dir.path()).arg("config"));
    assert_eq!(doc["block_tag"], json!("vars"));
}

#[test]
fn missing_transcript_fails() {
    let dir = TempDir::new().unwrap();
    varlog(dir.path())
        .arg("apply")
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
}

#[test]
fn parse_surfaces_schema_warnings() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("message.txt");
    fs::write(&input, "<state>\n$schema stats\n  {hp: 0\n</state>").unwrap();

    let doc = run_json(varlog(dir.path()).arg("--json").arg("parse").arg(&input));
    let warning = doc[0]["warnings"][0].as_str().unwrap();
    assert!(warning.starts_with("stats: could not parse $schema body"));
}
