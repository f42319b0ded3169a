//! Service adapters backed by external helper executables.
//!
//! Each capability is one configured command line. The tool contracts are
//! file-based because the console helpers attach to foreign consoles and
//! cannot rely on their own stdout:
//!
//! - list:       `<list...> <outPath>` writes `[{pid, title, path}]` as JSON
//! - sniff:      `<sniff...> <pid> <outPath>` writes the console text
//! - foreground: `<foreground...> <pid>`, exit status 0 on success
//! - inject:     `<inject...> --text <value>` or `--keys <{KEY}>`

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::*;
use crate::config::ToolsConfig;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

static OUTPUT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Failure to run a helper at all (as opposed to the helper reporting failure).
#[derive(Debug)]
enum RunError {
    NotConfigured(&'static str),
    Io(std::io::Error),
    Timeout(u64),
}

/// The four services, implemented by spawning the configured helpers.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    list: Vec<String>,
    sniff: Vec<String>,
    foreground: Vec<String>,
    inject: Vec<String>,
    timeout: Duration,
    state_dir: PathBuf,
}

impl ExternalTools {
    pub fn new(tools: &ToolsConfig, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            list: tools.list.clone(),
            sniff: tools.sniff.clone(),
            foreground: tools.foreground.clone(),
            inject: tools.inject.clone(),
            timeout: Duration::from_secs(tools.timeout_secs),
            state_dir: state_dir.into(),
        }
    }

    /// Each call gets its own output file, so overlapping calls (a poke's
    /// precondition capture during a poll cycle, or a CLI refresh while the
    /// daemon polls) never read or delete each other's output.
    fn list_path(&self) -> PathBuf {
        self.state_dir
            .join(format!("list.{}.{}.json", std::process::id(), next_seq()))
    }

    fn capture_path(&self, pid: SessionId) -> PathBuf {
        self.state_dir
            .join("captures")
            .join(format!("pid-{pid}.{}.{}.txt", std::process::id(), next_seq()))
    }

    async fn run(
        &self,
        tool: &'static str,
        argv: &[String],
        extra: &[String],
    ) -> Result<Output, RunError> {
        let (program, args) = argv.split_first().ok_or(RunError::NotConfigured(tool))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        debug!(tool, program = %program, "running helper");
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(RunError::Io),
            Err(_) => {
                warn!(tool, timeout_secs = self.timeout.as_secs(), "helper timed out");
                Err(RunError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim_end().to_string()
}

fn next_seq() -> u64 {
    OUTPUT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Read a helper's output file and delete it.
async fn take_output(path: &Path) -> std::io::Result<Vec<u8>> {
    let raw = tokio::fs::read(path).await;
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove helper output");
        }
    }
    raw
}

impl EnumerationService for ExternalTools {
    async fn enumerate(&self) -> Result<Vec<LiveSession>, EnumerationError> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let out = self.list_path();

        let output = self
            .run("list", &self.list, &[out.to_string_lossy().into_owned()])
            .await;
        // Collected even after a timeout, so a killed helper leaves nothing behind.
        let raw = take_output(&out).await;
        let output = output.map_err(|e| match e {
            RunError::NotConfigured(t) => EnumerationError::Other(format!("tool '{t}' is not configured")),
            RunError::Io(e) => EnumerationError::Io(e),
            RunError::Timeout(s) => EnumerationError::Timeout(s),
        })?;
        if !output.status.success() {
            return Err(EnumerationError::ToolFailed {
                code: output.status.code(),
                stderr: stderr_of(&output),
            });
        }

        let raw = raw?;
        let sessions: Vec<LiveSession> = serde_json::from_slice(strip_bom(&raw))
            .map_err(|e| EnumerationError::Malformed(e.to_string()))?;
        Ok(sessions.into_iter().filter(|s| s.pid > 0).collect())
    }
}

impl SnapshotService for ExternalTools {
    async fn capture(&self, pid: SessionId) -> Result<String, CaptureError> {
        let out = self.capture_path(pid);
        if let Some(dir) = out.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        // The sniffer's exit code is not meaningful; the file is.
        let output = self
            .run("sniff", &self.sniff, &[pid.to_string(), out.to_string_lossy().into_owned()])
            .await;
        let raw = take_output(&out).await;
        let output = output.map_err(|e| match e {
            RunError::NotConfigured(t) => CaptureError::Other(format!("tool '{t}' is not configured")),
            RunError::Io(e) => CaptureError::Io(e),
            RunError::Timeout(s) => CaptureError::Timeout(s),
        })?;
        if !output.status.success() {
            debug!(pid, code = ?output.status.code(), "sniffer exited non-zero");
        }

        match raw {
            Ok(raw) => Ok(String::from_utf8_lossy(strip_bom(&raw)).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CaptureError::NoOutput(pid)),
            Err(e) => Err(CaptureError::Io(e)),
        }
    }
}

impl ForegroundService for ExternalTools {
    async fn activate(&self, pid: SessionId) -> Result<(), ActivationError> {
        let output = self
            .run("foreground", &self.foreground, &[pid.to_string()])
            .await
            .map_err(|e| match e {
                RunError::NotConfigured(t) => ActivationError::Other(format!("tool '{t}' is not configured")),
                RunError::Io(e) => ActivationError::Io(e),
                RunError::Timeout(s) => ActivationError::Timeout(s),
            })?;
        if !output.status.success() {
            return Err(ActivationError::ToolFailed {
                code: output.status.code(),
                stderr: stderr_of(&output),
            });
        }
        Ok(())
    }
}

impl InputInjector for ExternalTools {
    async fn inject(&self, action: &Action) -> Result<(), InjectionError> {
        let extra = match action {
            Action::Text(text) => vec!["--text".to_string(), text.clone()],
            Action::Keys(chord) => vec!["--keys".to_string(), chord.to_string()],
        };
        let output = self
            .run("inject", &self.inject, &extra)
            .await
            .map_err(|e| match e {
                RunError::NotConfigured(t) => InjectionError::Other(format!("tool '{t}' is not configured")),
                RunError::Io(e) => InjectionError::Io(e),
                RunError::Timeout(s) => InjectionError::Timeout(s),
            })?;
        if !output.status.success() {
            return Err(InjectionError::ToolFailed {
                code: output.status.code(),
                stderr: stderr_of(&output),
            });
        }
        Ok(())
    }
}

fn strip_bom(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw)
}
