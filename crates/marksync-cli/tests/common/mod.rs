#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

/// Run the CLI with a custom HOME directory for isolated profile storage.
pub fn run_cli_with_env(args: &[&str], home: &Path) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_marks"));
    cmd.args(args);
    cmd.env("HOME", home);
    cmd.env("XDG_DATA_HOME", home.join("data"));
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("MARKS_STORE");
    cmd.env_remove("MARKS_API_KEY");
    cmd.env_remove("MARKS_ACCESS_TOKEN");
    cmd.output().expect("Failed to execute CLI")
}

/// Run the CLI with a custom HOME and expect success.
pub fn run_cli_with_env_success(args: &[&str], home: &Path) -> String {
    let output = run_cli_with_env(args, home);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// A `file://` store URL for a directory.
pub fn file_store_url(dir: &Path) -> String {
    url::Url::from_directory_path(dir)
        .expect("absolute path")
        .to_string()
}
