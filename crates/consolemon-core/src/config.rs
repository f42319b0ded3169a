//! Configuration at `~/.consolemon/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Binaries apply their CLI flags on top of what is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{MonitorError, MonitorResult};

/// Upper bound for minute-valued settings (one year).
const MAX_MINUTES: u64 = 525_600;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// `[monitor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Holds `consoles.json`, `list.json` and `captures/`.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Unchanged content for this long marks a session as hanging.
    /// Fractions are allowed.
    #[serde(default = "default_hang_minutes")]
    pub hang_minutes: f64,

    /// Sleep between daemon poll cycles.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            hang_minutes: default_hang_minutes(),
            interval_minutes: default_interval_minutes(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// `[tools]` section: argv of each helper executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_list_tool")]
    pub list: Vec<String>,
    #[serde(default = "default_sniff_tool")]
    pub sniff: Vec<String>,
    #[serde(default = "default_foreground_tool")]
    pub foreground: Vec<String>,
    #[serde(default = "default_inject_tool")]
    pub inject: Vec<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            list: default_list_tool(),
            sniff: default_sniff_tool(),
            foreground: default_foreground_tool(),
            inject: default_inject_tool(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_state_dir() -> String {
    "~/.consolemon".to_string()
}
fn default_hang_minutes() -> f64 {
    15.0
}
fn default_interval_minutes() -> u64 {
    10
}
fn default_lock_timeout_ms() -> u64 {
    10_000
}
fn default_list_tool() -> Vec<String> {
    vec!["List.exe".to_string()]
}
fn default_sniff_tool() -> Vec<String> {
    vec!["Sniffer.exe".to_string()]
}
fn default_foreground_tool() -> Vec<String> {
    vec!["Foreground.exe".to_string()]
}
fn default_inject_tool() -> Vec<String> {
    vec!["python".to_string(), "poke.py".to_string()]
}
fn default_tool_timeout_secs() -> u64 {
    30
}

/// Values given on the command line (or via environment) that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub state_dir: Option<String>,
    pub hang_minutes: Option<f64>,
    pub interval_minutes: Option<u64>,
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        expand_tilde("~/.consolemon/config.toml")
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> MonitorResult<Self> {
        let path = expand_tilde(&path.to_string_lossy());
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| MonitorError::Config(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load from `path` (or the default location) and apply command-line
    /// overrides on top.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> MonitorResult<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = Self::load(&path)?;

        if let Some(dir) = &overrides.state_dir {
            config.monitor.state_dir = dir.clone();
        }
        if let Some(minutes) = overrides.hang_minutes {
            config.monitor.hang_minutes = minutes;
        }
        if let Some(minutes) = overrides.interval_minutes {
            config.monitor.interval_minutes = minutes;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> MonitorResult<()> {
        let hang = self.monitor.hang_minutes;
        if !(hang > 0.0 && hang <= MAX_MINUTES as f64) {
            return Err(MonitorError::Config(format!(
                "hang_minutes must be greater than 0 and at most {MAX_MINUTES}, got {hang}"
            )));
        }
        if !(1..=MAX_MINUTES).contains(&self.monitor.interval_minutes) {
            return Err(MonitorError::Config(format!(
                "interval_minutes must be between 1 and {MAX_MINUTES}"
            )));
        }
        if self.tools.timeout_secs == 0 {
            return Err(MonitorError::Config("tools.timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn state_dir(&self) -> PathBuf {
        expand_tilde(&self.monitor.state_dir)
    }

    /// Path of the persisted registry snapshot.
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir().join("consoles.json")
    }

    /// Falls back to the default threshold for values `resolve` would reject.
    pub fn hang_threshold(&self) -> Duration {
        Duration::try_from_secs_f64(self.monitor.hang_minutes * 60.0)
            .unwrap_or(Duration::from_secs(default_hang_minutes() as u64 * 60))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_minutes.saturating_mul(60))
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
