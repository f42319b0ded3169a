//! Drives the `consolemon` binary against a temporary state directory.

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const READY_HASH: &str = "8dddffbdda1a1a0e1f08ef39081abefc4f6f81e9";

fn registry_json() -> String {
    r#"[
  {"pid": 42, "title": "deploy", "path": "C:\\Windows\\cmd.exe", "text": "ready>",
   "hash": "8dddffbdda1a1a0e1f08ef39081abefc4f6f81e9", "time": "2024-05-01T09:00:00Z", "status": "hanging"},
  {"pid": 7, "title": "build", "path": null, "text": "compiling",
   "hash": "f60ecfd7d9aef08416b1e0bdb965185c4792b2fa", "time": "2024-05-01T09:10:00Z", "status": "watching"}
]"#
    .to_string()
}

fn seeded() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("consoles.json"), registry_json()).unwrap();
    dir
}

fn consolemon(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("consolemon").unwrap();
    cmd.env_remove("HANG_MINUTES")
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--state-dir")
        .arg(dir);
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn stored(dir: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(dir.join("consoles.json")).unwrap()).unwrap()
}

#[test]
fn read_filters_by_status() {
    let dir = seeded();
    let output = consolemon(dir.path())
        .args(["read", "--status", "hanging", "--status", "nonsense"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["sessions"]["hanging"].as_array().unwrap().len(), 1);
    assert_eq!(json["sessions"]["hanging"][0]["pid"], 42);
    assert!(json["sessions"]["nonsense"].as_array().unwrap().is_empty());
}

#[test]
fn read_exports_one_file_per_status() {
    let dir = seeded();
    let out = dir.path().join("export");
    let output = consolemon(dir.path())
        .args(["read", "--status", "hanging", "--status", "watching", "--out-dir"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());

    let hanging: Value = serde_json::from_slice(&std::fs::read(out.join("hanging.json")).unwrap()).unwrap();
    assert_eq!(hanging[0]["title"], "deploy");
    assert!(out.join("watching.json").exists());
    assert_eq!(stdout_json(&output)["counts"]["watching"], 1);
}

#[test]
fn blank_status_filters_select_nothing() {
    let dir = seeded();
    let out = dir.path().join("export");
    let output = consolemon(dir.path())
        .args(["read", "--status", "", "--status", " hanging ", "--out-dir"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    assert_eq!(json["files"].as_array().unwrap().len(), 1);
    assert_eq!(json["counts"]["hanging"], 1);
    assert!(out.join("hanging.json").exists());

    let only_blank = consolemon(dir.path())
        .args(["read", "--status", "", "--out-dir"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(only_blank.status.success());
    assert!(stdout_json(&only_blank)["files"].as_array().unwrap().is_empty());
}

#[test]
fn handle_acknowledges_session() {
    let dir = seeded();
    let output = consolemon(dir.path()).args(["handle", "42"]).output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["found"], true);
    assert_eq!(json["status"], "handled");

    let reg = stored(dir.path());
    let rec = reg.as_array().unwrap().iter().find(|r| r["pid"] == 42).unwrap();
    assert_eq!(rec["status"], "handled");
    // On-disk field names survive a rewrite.
    assert_eq!(rec["time"], "2024-05-01T09:00:00Z");
    assert_eq!(rec["hash"], READY_HASH);
}

#[test]
fn handle_unknown_pid_is_not_an_error() {
    let dir = seeded();
    let output = consolemon(dir.path()).args(["handle", "999"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["found"], false);
}

#[test]
fn ignore_and_unignore() {
    let dir = seeded();
    consolemon(dir.path()).args(["ignore", "7"]).assert().success();
    let reg = stored(dir.path());
    assert_eq!(reg.as_array().unwrap().iter().find(|r| r["pid"] == 7).unwrap()["status"], "ignored");

    consolemon(dir.path()).args(["unignore", "7"]).assert().success();
    let reg = stored(dir.path());
    let rec = reg.as_array().unwrap().iter().find(|r| r["pid"] == 7).unwrap();
    assert_eq!(rec["status"], "watching");
    assert_ne!(rec["time"], "2024-05-01T09:10:00Z");
}

#[test]
fn list_prints_a_table() {
    let dir = seeded();
    let output = consolemon(dir.path()).arg("list").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("PID"));
    assert!(text.contains("deploy"));
    assert!(text.contains("hanging"));
    assert!(text.contains("2 session(s)."));
}

#[test]
fn corrupt_registry_reads_as_empty() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("consoles.json"), "{ this is not json").unwrap();

    let output = consolemon(dir.path())
        .args(["read", "--status", "hanging"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout_json(&output)["sessions"]["hanging"].as_array().unwrap().is_empty());

    // A mutation replaces the corrupt file with a valid (empty) registry.
    consolemon(dir.path()).args(["handle", "1"]).assert().success();
    assert_eq!(stored(dir.path()), serde_json::json!([]));
}

#[test]
fn invalid_key_is_rejected_before_anything_runs() {
    let dir = seeded();
    let before = std::fs::read(dir.path().join("consoles.json")).unwrap();
    let output = consolemon(dir.path())
        .args(["poke", "42", "--text", "y", "--keys", "NOTAKEY"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let err: Value = serde_json::from_slice(&output.stderr[stderr_json_start(&output.stderr)..]).unwrap();
    assert_eq!(err["ok"], false);
    assert_eq!(err["error"], "INVALID_ACTION");
    assert_eq!(std::fs::read(dir.path().join("consoles.json")).unwrap(), before);
}

/// Skip any log lines preceding the JSON envelope on stderr.
fn stderr_json_start(stderr: &[u8]) -> usize {
    let text = String::from_utf8_lossy(stderr);
    text.find("{\n").unwrap_or(0)
}

#[cfg(unix)]
mod with_helpers {
    use super::*;

    /// Helper scripts standing in for the console tools.
    fn install_tools(dir: &Path, screen: &str) {
        let log = dir.join("injected.log");
        std::fs::write(
            dir.join("list.sh"),
            "printf '%s' '[{\"pid\":42,\"title\":\"deploy\",\"path\":null}]' > \"$1\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("sniff.sh"), format!("printf '%s' '{screen}' > \"$2\"\n")).unwrap();
        std::fs::write(dir.join("foreground.sh"), "exit 0\n").unwrap();
        std::fs::write(
            dir.join("inject.sh"),
            format!("printf '%s %s\\n' \"$1\" \"$2\" >> \"{}\"\n", log.display()),
        )
        .unwrap();

        let script = |name: &str| format!("[\"sh\", \"{}\"]", dir.join(name).display());
        let config = format!(
            "[tools]\nlist = {}\nsniff = {}\nforeground = {}\ninject = {}\ntimeout_secs = 10\n",
            script("list.sh"),
            script("sniff.sh"),
            script("foreground.sh"),
            script("inject.sh"),
        );
        std::fs::write(dir.join("config.toml"), config).unwrap();
    }

    #[test]
    fn refresh_records_live_sessions() {
        let dir = TempDir::new().unwrap();
        install_tools(dir.path(), "ready>");

        let output = consolemon(dir.path()).arg("refresh").output().unwrap();
        assert!(output.status.success());
        let json = stdout_json(&output);
        assert_eq!(json["report"]["sessions"], 1);
        assert_eq!(json["report"]["new"][0], 42);
        assert_eq!(json["partial"], false);

        let reg = stored(dir.path());
        assert_eq!(reg[0]["hash"], READY_HASH);
        assert_eq!(reg[0]["status"], "watching");
    }

    #[test]
    fn poke_delivers_actions_in_order() {
        let dir = seeded();
        install_tools(dir.path(), "ready>");

        let output = consolemon(dir.path())
            .args(["poke", "42", "--hash", READY_HASH, "--text", "y", "--keys", "enter"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert_eq!(stdout_json(&output)["found"], true);

        let log = std::fs::read_to_string(dir.path().join("injected.log")).unwrap();
        assert_eq!(log, "--text y\n--keys {ENTER}\n");
        let reg = stored(dir.path());
        let rec = reg.as_array().unwrap().iter().find(|r| r["pid"] == 42).unwrap();
        assert_eq!(rec["status"], "poked");
    }

    #[test]
    fn stale_hash_refuses_to_poke() {
        let dir = seeded();
        install_tools(dir.path(), "Overwrite? [y/N]");
        let before = std::fs::read(dir.path().join("consoles.json")).unwrap();

        let output = consolemon(dir.path())
            .args(["poke", "42", "--hash", READY_HASH, "--text", "y"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(3));

        let err: Value = serde_json::from_slice(&output.stderr[stderr_json_start(&output.stderr)..]).unwrap();
        assert_eq!(err["error"], "PRECONDITION_MISMATCH");
        assert_eq!(err["expected"], READY_HASH);
        assert!(!dir.path().join("injected.log").exists());
        assert_eq!(std::fs::read(dir.path().join("consoles.json")).unwrap(), before);
    }
}
