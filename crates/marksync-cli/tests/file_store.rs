//! CLI tests against a local file store.

mod common;

use common::{file_store_url, run_cli_with_env, run_cli_with_env_success};
use serde_json::Value;
use tempfile::TempDir;

struct Env {
    home: TempDir,
    store: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
            store: TempDir::new().unwrap(),
        }
    }

    fn login(&self, owner: &str) {
        let url = file_store_url(self.store.path());
        run_cli_with_env_success(&["login", "--owner", owner, "--store", &url], self.home.path());
    }

    fn run(&self, args: &[&str]) -> String {
        run_cli_with_env_success(args, self.home.path())
    }

    fn list(&self) -> Vec<Value> {
        self.run(&["list", "--json"])
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

#[test]
fn test_add_list_delete() {
    let env = Env::new();
    env.login("u1");

    let added = env.run(&["add", "Google", "https://google.com", "--json"]);
    let first: Value = serde_json::from_str(added.trim()).unwrap();
    assert_eq!(first["title"], "Google");
    assert_eq!(first["user_id"], "u1");

    env.run(&["add", "  Rust  ", " https://rust-lang.org "]);

    let rows = env.list();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["title"], "Rust");
    assert_eq!(rows[0]["url"], "https://rust-lang.org");
    assert_eq!(rows[1]["title"], "Google");

    let id = first["id"].as_str().unwrap();
    env.run(&["delete", id]);

    let rows = env.list();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "Rust");
}

#[test]
fn test_owners_see_only_their_rows() {
    let env = Env::new();
    env.login("u1");
    env.run(&["add", "Mine", "https://a.example"]);

    env.login("u2");
    assert!(env.list().is_empty());
    env.run(&["add", "Theirs", "https://b.example"]);

    env.login("u1");
    let rows = env.list();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "Mine");
}

#[test]
fn test_empty_list_prints_nothing_on_stdout() {
    let env = Env::new();
    env.login("u1");

    let output = run_cli_with_env(&["list"], env.home.path());
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No bookmarks."));
}

#[test]
fn test_blank_title_is_rejected() {
    let env = Env::new();
    env.login("u1");

    let output = run_cli_with_env(&["add", "   ", "https://google.com"], env.home.path());
    assert!(!output.status.success());
    assert!(env.list().is_empty());
}

#[test]
fn test_whoami_and_logout() {
    let env = Env::new();
    env.login("u1");

    let who: Value = serde_json::from_str(&env.run(&["whoami", "--json"])).unwrap();
    assert_eq!(who["owner"], "u1");
    assert_eq!(who["backend"], "file");

    env.run(&["logout"]);

    let output = run_cli_with_env(&["whoami"], env.home.path());
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Not logged in"));
}

#[test]
fn test_hosted_store_requires_api_key() {
    let env = Env::new();

    let output = run_cli_with_env(
        &["login", "--owner", "u1", "--store", "https://abc.supabase.co"],
        env.home.path(),
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("API key"));
}

#[test]
fn test_watch_applies_piped_commands() {
    let env = Env::new();
    env.login("u1");
    env.run(&["add", "Existing", "https://a.example"]);

    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_marks"))
        .args(["watch", "--json"])
        .env("HOME", env.home.path())
        .env("XDG_DATA_HOME", env.home.path().join("data"))
        .env("NO_COLOR", "1")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();

    {
        use std::io::Write;
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, "add New One https://b.example").unwrap();
        writeln!(stdin, "quit").unwrap();
    }

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first: Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(first.as_array().unwrap().len(), 1);

    let rows = env.list();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["title"], "New One");
}
