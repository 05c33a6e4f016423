//! Drives the questctl binary against a throwaway SQLite file.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("quest.db");
        let config = format!(
            "[storage]\ntype = \"sqlite\"\nurl = \"sqlite://{}\"\n",
            db.display()
        );
        std::fs::write(dir.path().join("questctl.toml"), config).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> &Path {
        self.dir.path()
    }

    fn run(&self, user: i64, args: &[&str]) -> assert_cmd::assert::Assert {
        Command::cargo_bin("questctl")
            .unwrap()
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.config_path().join("questctl.toml"))
            .arg("--user")
            .arg(user.to_string())
            .args(args)
            .assert()
    }
}

#[test]
fn earn_spend_and_undo_through_the_cli() {
    let ws = Workspace::new();

    ws.run(1, &["group", "create", "Flat"])
        .success()
        .stdout(predicate::str::contains("Created group Flat (1)"));
    ws.run(1, &["task", "create", "1", "Dishes", "--reward", "10"])
        .success();
    ws.run(1, &["task", "complete", "1"]).success();
    ws.run(1, &["ledger", "balance", "1"])
        .success()
        .stdout(predicate::str::contains("Balance: 10"));

    ws.run(1, &["shop", "create", "1", "Movie night", "--cost", "15"])
        .success();
    ws.run(1, &["shop", "buy", "1"])
        .failure()
        .stderr(predicate::str::contains("insufficient funds: have 10, need 15"));

    ws.run(1, &["ledger", "adjust", "1", "5", "--description", "birthday"])
        .success();
    ws.run(1, &["shop", "buy", "1"]).success();
    ws.run(1, &["ledger", "balance", "1"])
        .success()
        .stdout(predicate::str::contains("Balance: 0"));

    ws.run(1, &["ledger", "undo", "3"]).success();
    ws.run(1, &["--output", "json", "purchase", "show", "1"])
        .success()
        .stdout(predicate::str::contains("\"cancelled_at\": \"").and(
            predicate::str::contains("\"fulfilled\": false"),
        ));
    ws.run(1, &["ledger", "balance", "1"])
        .success()
        .stdout(predicate::str::contains("Balance: 15"));
}

#[test]
fn outsiders_and_missing_users_are_rejected() {
    let ws = Workspace::new();
    ws.run(1, &["group", "create", "Flat"]).success();
    ws.run(1, &["task", "create", "1", "Walk", "--reward", "2"])
        .success();

    ws.run(2, &["task", "complete", "1"])
        .failure()
        .stderr(predicate::str::contains("forbidden"));

    Command::cargo_bin("questctl")
        .unwrap()
        .env_remove("QUEST_USER")
        .arg("--config")
        .arg(ws.config_path().join("questctl.toml"))
        .args(["ledger", "balance", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No acting user"));
}

#[test]
fn config_command_prints_effective_configuration() {
    let ws = Workspace::new();
    ws.run(1, &["config"])
        .success()
        .stdout(predicate::str::contains("\"type\": \"sqlite\""));
}
