use assert_cmd::Command;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const INVOICES: &str = "export function formatInvoice(invoice) {\n  return invoice.total.toFixed(2)\n}\n";
const MAIN: &str = "import { formatInvoice } from './invoices'\n\nexport function render(invoice) {\n  const text = formatInvoice(invoice)\n  \n}\n";

fn session(steps: Value) -> Value {
    json!({
        "root": "/workspace",
        "documents": [
            { "path": "src/invoices.ts", "language_id": "typescript", "text": INVOICES },
            { "path": "src/main.ts", "language_id": "typescript", "text": MAIN },
            { "path": "src/util.ts", "language_id": "typescript", "text": "export const VERSION = 1\n" }
        ],
        "visible": ["src/invoices.ts", "src/main.ts"],
        "symbols": [
            { "path": "src/invoices.ts", "symbol": "formatInvoice",
              "content": "function formatInvoice(invoice: Invoice): string" }
        ],
        "steps": steps
    })
}

fn write_session(dir: &Path, session: &Value) -> std::path::PathBuf {
    let path = dir.join("session.json");
    fs::write(&path, serde_json::to_string_pretty(session).unwrap()).unwrap();
    path
}

#[allow(deprecated)]
fn replay(dir: &Path, session: &Value) -> Vec<Value> {
    let path = write_session(dir, session);
    let output = Command::cargo_bin("context-replay")
        .expect("binary")
        .env_remove("CONTEXT_CONFIG")
        .arg("--quiet")
        .arg(&path)
        .output()
        .expect("replay run");

    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

fn file_names(output: &Value) -> Vec<String> {
    output["snippets"]
        .as_array()
        .expect("snippets")
        .iter()
        .map(|s| s["file_name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn context_mixes_similar_files_and_graph_definitions() {
    let temp = tempdir().unwrap();
    let out = replay(
        temp.path(),
        &session(json!([
            { "type": "select", "path": "src/main.ts", "line": 3 },
            { "type": "context", "path": "src/main.ts", "line": 4, "character": 2 }
        ])),
    );

    assert_eq!(out.len(), 1);
    let context = &out[0];
    assert_eq!(context["type"], "context");
    assert_eq!(file_names(context), vec!["src/invoices.ts", "src/invoices.ts"]);
    assert_eq!(context["snippets"][1]["symbol"], "formatInvoice");
    assert_eq!(context["snippets"][1]["identifier"], "graph-section");
    assert_eq!(
        context["summary"]["strategy"],
        "jaccard-similarity+recent-edits+graph-section"
    );
    assert_eq!(context["summary"]["local"], 1);
    assert_eq!(context["summary"]["graph"], 1);
}

#[test]
fn recent_edits_show_up_as_diffs() {
    let temp = tempdir().unwrap();
    let out = replay(
        temp.path(),
        &session(json!([
            { "type": "change", "path": "src/util.ts",
              "range": { "start": { "line": 0, "character": 23 }, "end": { "line": 0, "character": 24 } },
              "text": "2" },
            { "type": "context", "path": "src/main.ts", "line": 4, "character": 2 }
        ])),
    );

    let diff = out[0]["snippets"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["file_name"] == "src/util.ts")
        .expect("recent edit snippet");
    assert_eq!(diff["identifier"], "recent-edits");
    let content = diff["content"].as_str().unwrap();
    assert!(content.contains("-export const VERSION = 1"), "{content}");
    assert!(content.contains("+export const VERSION = 2"), "{content}");
}

#[test]
fn zero_budget_context_is_empty() {
    let temp = tempdir().unwrap();
    let out = replay(
        temp.path(),
        &session(json!([
            { "type": "context", "path": "src/main.ts", "line": 4, "character": 2, "max_chars": 0 }
        ])),
    );
    assert_eq!(out[0]["snippets"], json!([]));
}

#[test]
fn completions_cache_follows_typing() {
    let temp = tempdir().unwrap();
    let out = replay(
        temp.path(),
        &session(json!([
            { "type": "cache_add", "path": "src/main.ts", "line": 4, "character": 2,
              "log_id": "log-1", "completions": ["return text"] },
            { "type": "cache_get", "path": "src/main.ts", "line": 4, "character": 2 },
            { "type": "change", "path": "src/main.ts",
              "range": { "start": { "line": 4, "character": 2 }, "end": { "line": 4, "character": 2 } },
              "text": "re" },
            { "type": "cache_get", "path": "src/main.ts", "line": 4, "character": 4 },
            { "type": "cache_get", "path": "src/util.ts", "line": 0, "character": 0 }
        ])),
    );

    assert_eq!(out.len(), 3);
    assert_eq!(out[0]["hit"]["log_id"], "log-1");
    assert_eq!(out[0]["hit"]["completions"][0]["content"], "return text");
    assert_eq!(out[1]["hit"]["completions"][0]["content"], "turn text");
    assert_eq!(out[2]["hit"], Value::Null);
}

#[test]
fn sections_step_prints_the_observer_tree() {
    let temp = tempdir().unwrap();
    let out = replay(
        temp.path(),
        &session(json!([
            { "type": "select", "path": "src/main.ts", "line": 3 },
            { "type": "sections" }
        ])),
    );

    let tree = out[0]["tree"].as_str().unwrap();
    assert!(tree.contains("src/main.ts\n  └─ render (1 snippets)"), "{tree}");
    assert!(tree.contains("src/invoices.ts\n  └─ formatInvoice"), "{tree}");
    assert!(tree.ends_with("Last visited sections:\n  └ src/main.ts render"), "{tree}");
}

#[test]
#[allow(deprecated)]
fn config_from_environment_selects_retrievers() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("context.toml");
    fs::write(&config, "retrievers = [\"graph-section\"]\n").unwrap();
    let path = write_session(
        temp.path(),
        &session(json!([
            { "type": "select", "path": "src/main.ts", "line": 3 },
            { "type": "context", "path": "src/main.ts", "line": 4, "character": 2 }
        ])),
    );

    let output = Command::cargo_bin("context-replay")
        .expect("binary")
        .env("CONTEXT_CONFIG", &config)
        .arg(&path)
        .output()
        .expect("replay run");
    assert!(output.status.success());
    let line: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(line["summary"]["strategy"], "graph-section");
    assert_eq!(line["summary"]["local"], Value::Null);
}

#[test]
#[allow(deprecated)]
fn session_can_be_read_from_stdin() {
    let session = session(json!([{ "type": "sections" }]));
    let output = Command::cargo_bin("context-replay")
        .expect("binary")
        .env_remove("CONTEXT_CONFIG")
        .arg("-")
        .write_stdin(serde_json::to_string(&session).unwrap())
        .output()
        .expect("replay run");
    assert!(output.status.success());
    let line: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(line["type"], "sections");
}

#[test]
#[allow(deprecated)]
fn invalid_config_fails_before_replaying() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("context.toml");
    fs::write(&config, "[mixer]\nkeyword_share = 3.0\n").unwrap();
    let path = write_session(temp.path(), &session(json!([])));

    Command::cargo_bin("context-replay")
        .expect("binary")
        .arg("--config")
        .arg(&config)
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("keyword_share"));
}

#[test]
#[allow(deprecated)]
fn unknown_documents_are_reported() {
    let temp = tempdir().unwrap();
    let path = write_session(
        temp.path(),
        &session(json!([{ "type": "cache_get", "path": "src/missing.ts", "line": 0 }])),
    );

    Command::cargo_bin("context-replay")
        .expect("binary")
        .env_remove("CONTEXT_CONFIG")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("Unknown document src/missing.ts"));
}
