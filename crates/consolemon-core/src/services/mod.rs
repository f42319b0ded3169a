//! Capability providers the core consumes.
//!
//! Each OS-facing capability is a trait returning an explicit error type.
//! Whether a failure is fatal is decided by the caller: enumeration failures
//! abort a poll cycle, capture failures become empty text, activation
//! failures are logged and ignored, injection failures abort a poke.

pub mod mock;
pub mod process;

pub use mock::MockConsoles;
pub use process::ExternalTools;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ActivationError, CaptureError, EnumerationError, InjectionError};
use crate::session::SessionId;

/// A capturable session reported by the enumeration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSession {
    pub pid: SessionId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default)]
    pub path: Option<String>,
}

impl LiveSession {
    pub fn new(pid: SessionId, title: impl Into<String>, path: Option<String>) -> Self {
        Self {
            pid,
            title: title.into(),
            path,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lists the console sessions that exist right now. All-or-nothing.
#[allow(async_fn_in_trait)]
pub trait EnumerationService {
    async fn enumerate(&self) -> Result<Vec<LiveSession>, EnumerationError>;
}

/// Reads the current text content of one session.
#[allow(async_fn_in_trait)]
pub trait SnapshotService {
    async fn capture(&self, pid: SessionId) -> Result<String, CaptureError>;
}

/// Brings a session's window to the foreground.
#[allow(async_fn_in_trait)]
pub trait ForegroundService {
    async fn activate(&self, pid: SessionId) -> Result<(), ActivationError>;
}

/// Delivers one input action to whatever currently has focus.
#[allow(async_fn_in_trait)]
pub trait InputInjector {
    async fn inject(&self, action: &Action) -> Result<(), InjectionError>;
}

impl<T: EnumerationService> EnumerationService for &T {
    async fn enumerate(&self) -> Result<Vec<LiveSession>, EnumerationError> {
        (**self).enumerate().await
    }
}

impl<T: SnapshotService> SnapshotService for &T {
    async fn capture(&self, pid: SessionId) -> Result<String, CaptureError> {
        (**self).capture(pid).await
    }
}

impl<T: ForegroundService> ForegroundService for &T {
    async fn activate(&self, pid: SessionId) -> Result<(), ActivationError> {
        (**self).activate(pid).await
    }
}

impl<T: InputInjector> InputInjector for &T {
    async fn inject(&self, action: &Action) -> Result<(), InjectionError> {
        (**self).inject(action).await
    }
}

/// One step of a poke: literal text or a named key chord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Action {
    Text(String),
    Keys(KeyChord),
}

impl Action {
    pub fn text(value: impl Into<String>) -> Self {
        Action::Text(value.into())
    }

    /// Parse a key name such as `{ENTER}`, `esc` or `ctrl+c`.
    pub fn keys(name: &str) -> Result<Self, String> {
        name.parse().map(Action::Keys)
    }
}

/// Named keys the injector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Backspace,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Space,
    Char(char),
}

impl Key {
    fn parse(name: &str) -> Option<Self> {
        let key = match name {
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "backspace" | "bs" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            "space" => Key::Space,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_whitespace() => Key::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }

    fn name(&self) -> String {
        match self {
            Key::Enter => "ENTER".into(),
            Key::Tab => "TAB".into(),
            Key::Escape => "ESC".into(),
            Key::Up => "UP".into(),
            Key::Down => "DOWN".into(),
            Key::Left => "LEFT".into(),
            Key::Right => "RIGHT".into(),
            Key::Backspace => "BACKSPACE".into(),
            Key::Delete => "DELETE".into(),
            Key::Home => "HOME".into(),
            Key::End => "END".into(),
            Key::PageUp => "PAGEUP".into(),
            Key::PageDown => "PAGEDOWN".into(),
            Key::Space => "SPACE".into(),
            Key::Char(c) => c.to_ascii_uppercase().to_string(),
        }
    }
}

/// A key plus optional modifiers, rendered as `{CTRL+C}` / `{ENTER}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyChord {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub key: Key,
}

impl KeyChord {
    pub fn plain(key: Key) -> Self {
        Self {
            ctrl: false,
            alt: false,
            shift: false,
            key,
        }
    }
}

impl FromStr for KeyChord {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let trimmed = name.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed)
            .to_ascii_lowercase();
        if inner.is_empty() {
            return Err("empty key".to_string());
        }

        let mut parts: Vec<&str> = inner.split('+').map(str::trim).collect();
        let key_name = parts.pop().unwrap_or_default();
        let key = Key::parse(key_name).ok_or_else(|| format!("unsupported key: {name}"))?;

        let mut chord = KeyChord::plain(key);
        for modifier in parts {
            match modifier {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" => chord.alt = true,
                "shift" => chord.shift = true,
                other => return Err(format!("unsupported modifier '{other}' in {name}")),
            }
        }
        Ok(chord)
    }
}

impl TryFrom<String> for KeyChord {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<KeyChord> for String {
    fn from(chord: KeyChord) -> Self {
        chord.to_string()
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        if self.ctrl {
            f.write_str("CTRL+")?;
        }
        if self.alt {
            f.write_str("ALT+")?;
        }
        if self.shift {
            f.write_str("SHIFT+")?;
        }
        write!(f, "{}}}", self.key.name())
    }
}
