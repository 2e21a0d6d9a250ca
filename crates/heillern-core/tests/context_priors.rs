//! Integration test for the `context_priors` example.
//!
//! Expectation: one output line per data point, a conflict flag for the low
//! ILI rate and a final JSON line with the derived priors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn write_temp_jsonl() -> std::path::PathBuf {
    let tmp = std::env::temp_dir().join(format!(
        "heillern_context_test_{}.jsonl",
        std::process::id()
    ));
    fs::write(
        &tmp,
        r#"{"type":"ili_rate","source":"kdca.go.kr","value":2.0,"quality":"verified"}
{"type":"outbreak_alert","source":"who.int","value":1.0,"features":{"disease":"measles"}}"#,
    )
    .unwrap_or_else(|e| panic!("failed to write temporary JSONL file: {e}"));
    tmp
}

#[test]
fn example_context_priors_flags_conflict_and_prints_priors() {
    let path = write_temp_jsonl();
    let mut cmd = Command::new("cargo");
    cmd.args([
        "run",
        "--package",
        "heillern-core",
        "--example",
        "context_priors",
        "--",
        path.to_str()
            .unwrap_or_else(|| panic!("temporary path is not valid UTF-8: {path:?}")),
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ili_rate\t2.00\tconflict"))
        .stdout(predicate::str::contains("outbreak_alert\t1.00\tok"))
        .stdout(predicate::str::contains("\"measles\":0.15"))
        .stdout(predicate::str::contains("\"influenza\":0.06"));
}

#[test]
fn example_context_priors_accepts_stdin() {
    let input = r#"{"type":"ili_rate","source":"stdin","value":5.0}"#;

    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--package", "heillern-core", "--example", "context_priors"]);
    cmd.env("HEILLERN_ASSESSMENT", "normal");
    cmd.write_stdin(input);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ili_rate\t5.00\tok"))
        .stdout(predicate::str::contains("influenza"));
}
