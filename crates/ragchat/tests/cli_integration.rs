//! CLI integration tests for the ragchat command-line interface.
//!
//! These tests cover argument parsing, help output, and the config commands.
//! None of them need a running server: commands that would connect either
//! fail validation first or point at a closed port.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the ragchat binary with an isolated config directory.
fn ragchat(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ragchat").unwrap();
    cmd.env("RAGCHAT_CONFIG_DIR", config_dir.path())
        .env_remove("RAGCHAT_SERVER_URL")
        .env_remove("RAGCHAT_EMAIL")
        .env_remove("RAGCHAT_PASSWORD");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("health"))
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("conversations"))
        .stdout(predicate::str::contains("documents"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ragchat"));
}

#[test]
fn test_global_flags_accepted() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["--verbose", "--json", "--server", "http://localhost:9", "--help"])
        .assert()
        .success();
}

#[test]
fn test_ask_help() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--top-k"))
        .stdout(predicate::str::contains("--conversation"))
        .stdout(predicate::str::contains("--email"));
}

#[test]
fn test_conversations_subcommands_listed() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["conversations", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("rename"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_documents_subcommands_listed() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["documents", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_config_subcommands_listed() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("set-context"))
        .stdout(predicate::str::contains("use-context"))
        .stdout(predicate::str::contains("delete-context"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Invalid Input Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .arg("nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_ask_requires_question() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir).arg("ask").assert().failure();
}

#[test]
fn test_ask_rejects_top_k_out_of_range() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["ask", "what is in my notes?", "--top-k", "50"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("top_k must be between 1 and 20"));
}

#[test]
fn test_ask_rejects_blank_question() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["ask", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("question must not be empty"));
}

#[test]
fn test_documents_upload_requires_files() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["documents", "upload"])
        .assert()
        .failure();
}

#[test]
fn test_health_unreachable_server_fails() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["--server", "http://127.0.0.1:9", "health"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Context Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_set_context_creates_and_selects_first() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["config", "set-context", "local", "--server", "http://localhost:8000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Context \"local\" created."))
        .stdout(predicate::str::contains("set as current context"));

    ragchat(&dir)
        .args(["config", "current-context"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local"));

    let written = std::fs::read_to_string(dir.path().join("client.yaml")).unwrap();
    assert!(written.contains("http://localhost:8000"));
}

#[test]
fn test_set_context_requires_server_for_new_context() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["config", "set-context", "local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--server is required"));
}

#[test]
fn test_set_context_rejects_invalid_top_k() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args([
            "config",
            "set-context",
            "local",
            "--server",
            "http://localhost:8000",
            "--top-k",
            "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("top-k"));
    assert!(!dir.path().join("client.yaml").exists());
}

#[test]
fn test_use_context_switches_current() {
    let dir = TempDir::new().unwrap();
    for (name, url) in [("local", "http://localhost:8000"), ("prod", "https://rag.example.com")] {
        ragchat(&dir)
            .args(["config", "set-context", name, "--server", url])
            .assert()
            .success();
    }

    ragchat(&dir)
        .args(["config", "use-context", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Switched to context \"prod\"."));

    ragchat(&dir)
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"current_context\": \"prod\""))
        .stdout(predicate::str::contains("https://rag.example.com"));
}

#[test]
fn test_use_unknown_context_fails() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["config", "use-context", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_unknown_context_flag_fails() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["--context", "missing", "ask", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_delete_context() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["config", "set-context", "local", "--server", "http://localhost:8000"])
        .assert()
        .success();

    ragchat(&dir)
        .args(["config", "delete-context", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Context \"local\" deleted."));

    ragchat(&dir)
        .args(["config", "delete-context", "local"])
        .assert()
        .failure();
}

#[test]
fn test_config_show_defaults() {
    let dir = TempDir::new().unwrap();
    ragchat(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No contexts configured."))
        .stdout(predicate::str::contains("http://localhost:8000"));
}
