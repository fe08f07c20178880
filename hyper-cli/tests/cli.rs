use std::fs;

use assert_cmd::Command;
use hyper_core::{InMemoryTranspiler, ProcessBridge, TranspileOutput, TranspilePort};
use predicates::prelude::*;
use tempfile::tempdir;

const CARD: &str = "user: User\n\n<ul>\nif user.active:\n<li>{user.name}</li>\nend\n</ul>\n";

fn hyper() -> Command {
    Command::cargo_bin("hyper").expect("binary exists")
}

fn bridge() -> ProcessBridge {
    ProcessBridge::new(env!("CARGO_BIN_EXE_hyper"))
}

#[test]
fn generates_python_from_stdin() {
    hyper()
        .args(["generate", "--stdin"])
        .write_stdin("name: str\n\n<p>Hello {name}</p>\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("def __hyper_template__(name: str):\n"))
        .stdout(predicate::str::contains("    t\"\"\"<p>Hello {name}</p>\"\"\"\n"));
}

#[test]
fn await_makes_the_function_async() {
    hyper()
        .args(["generate", "--stdin"])
        .write_stdin("feed: Feed\n\nitems = await feed.load()\n<p>{len(items)}</p>\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("async def __hyper_template__("));
}

#[test]
fn json_payload_includes_pieces_on_request() {
    let output = hyper()
        .args(["generate", "--stdin", "--json", "--injection"])
        .write_stdin(CARD)
        .output()
        .expect("run hyper");
    assert!(output.status.success());

    let payload = TranspileOutput::from_json(&output.stdout).expect("decode payload");
    assert!(payload.generated_code.starts_with("def __hyper_template__(user: User):"));
    assert_eq!(payload.pieces.map(|pieces| pieces.len()), Some(6));
}

#[test]
fn pieces_require_json() {
    hyper()
        .args(["generate", "--stdin", "--pieces"])
        .write_stdin("<p/>\n")
        .assert()
        .failure();
}

#[test]
fn honours_function_name() {
    hyper()
        .args(["generate", "--stdin", "--function-name", "card"])
        .write_stdin("<p/>\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("def card():\n"));
}

#[test]
fn reports_structure_errors() {
    hyper()
        .args(["generate", "--stdin"])
        .write_stdin("<ul>\nfor x in xs:\n<li>{x}</li>\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("structure error on line 2"));
}

#[test]
fn compiles_a_directory_and_isolates_failures() {
    let dir = tempdir().expect("tempdir");
    let nested = dir.path().join("partials");
    fs::create_dir_all(&nested).expect("create nested dir");
    fs::write(dir.path().join("card.hyper"), CARD).expect("write card");
    fs::write(nested.join("item.hyper"), "<li>{item}</li>\n").expect("write item");
    fs::write(dir.path().join("broken.hyper"), "end\n").expect("write broken");
    fs::write(dir.path().join("notes.txt"), "not a template").expect("write notes");

    hyper()
        .arg("generate")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.hyper"))
        .stderr(predicate::str::contains("1 of 3 templates failed"));

    let card = fs::read_to_string(dir.path().join("card.py")).expect("card.py written");
    assert!(card.contains("    if user.active:\n        t\"\"\"<li>{user.name}</li>\"\"\"\n    pass\n"));
    assert!(nested.join("item.py").exists());
    assert!(!dir.path().join("broken.py").exists());
    assert!(!dir.path().join("notes.py").exists());
}

#[test]
fn missing_path_fails_only_itself() {
    let dir = tempdir().expect("tempdir");
    let good = dir.path().join("good.hyper");
    fs::write(&good, "<p/>\n").expect("write template");

    hyper()
        .arg("generate")
        .arg(&good)
        .arg(dir.path().join("missing.hyper"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"))
        .stderr(predicate::str::contains("missing.hyper"))
        .stderr(predicate::str::contains("1 of 2 templates failed"));

    assert!(dir.path().join("good.py").exists());
}

#[test]
fn explicit_file_must_be_a_template() {
    let dir = tempdir().expect("tempdir");
    let page = dir.path().join("page.html");
    fs::write(&page, "<p/>\n").expect("write file");

    hyper()
        .arg("generate")
        .arg(&page)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a .hyper template"));
    assert!(!dir.path().join("page.py").exists());
}

#[test]
fn directory_without_templates_is_an_error() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("notes.txt"), "nothing here").expect("write notes");

    hyper()
        .arg("generate")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no .hyper templates found"));
}

#[test]
fn explicit_file_with_json_prints_instead_of_writing() {
    let dir = tempdir().expect("tempdir");
    let template = dir.path().join("page.hyper");
    fs::write(&template, "<main/>\n").expect("write template");

    hyper()
        .args(["generate", "--json"])
        .arg(&template)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"generated_code\""));
    assert!(!dir.path().join("page.py").exists());
}

#[test]
fn dumps_placements() {
    let dir = tempdir().expect("tempdir");
    let template = dir.path().join("card.hyper");
    fs::write(&template, CARD).expect("write template");

    let output = hyper()
        .arg("placements")
        .arg(&template)
        .output()
        .expect("run hyper");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["host"].as_array().map(Vec::len), Some(6));
    assert_eq!(json["markup"].as_array().map(Vec::len), Some(4));
    assert_eq!(json["markup"][0]["language"], "markup");
    assert_eq!(json["markup"][0]["source_range"]["start"], 12);
}

#[test]
fn process_bridge_matches_in_memory_transpiler() {
    let remote = bridge().transpile(CARD, true).expect("bridge transpile");
    let local = InMemoryTranspiler::default()
        .transpile(CARD, true)
        .expect("in-memory transpile");
    assert_eq!(remote, local);
}

#[test]
fn process_bridge_surfaces_compiler_errors() {
    let err = bridge().transpile("if x:\n", false).unwrap_err();
    assert!(err.to_string().contains("structure error"));
}
