#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run the binary with `args`, feed it `stdin`, and return
/// (exit code, stdout, stderr).
pub fn run_cli_with(args: &[&str], stdin: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_pi-sessions"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

pub fn run_cli(stdin: &str) -> (i32, String, String) {
    run_cli_with(&[], stdin)
}

/// Like `run_cli_with`, pointing `--data-dir` at `dir`.
pub fn run_in(dir: &Path, stdin: &str) -> (i32, String, String) {
    let dir = dir.to_str().unwrap();
    run_cli_with(&["--data-dir", dir], stdin)
}

/// One parsed JSON value per stdout line.
pub fn responses(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("response line is JSON"))
        .collect()
}

/// Join JSON values into JSONL transcript text.
pub fn jsonl(lines: &[serde_json::Value]) -> String {
    lines
        .iter()
        .map(|v| serde_json::to_string(v).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenate requests into one stdin stream.
pub fn stream(requests: &[serde_json::Value]) -> String {
    requests
        .iter()
        .map(|v| serde_json::to_string(v).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}
