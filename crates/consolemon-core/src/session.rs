//! Session records and the registry snapshot they live in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fingerprint::Fingerprint;

/// OS process identity of a console session.
pub type SessionId = u32;

/// Ordered snapshot of every known session, keyed by `pid`.
pub type Registry = Vec<SessionRecord>;

/// Where a session sits in the watch state machine.
///
/// Unknown strings found in a persisted registry are kept as `Other` so they
/// survive a round trip; they sort last and are never treated as acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    Watching,
    Hanging,
    Handled,
    Poked,
    Ignored,
    Other(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Watching => "watching",
            SessionStatus::Hanging => "hanging",
            SessionStatus::Handled => "handled",
            SessionStatus::Poked => "poked",
            SessionStatus::Ignored => "ignored",
            SessionStatus::Other(s) => s,
        }
    }

    /// Presentation order: hanging, handled, poked, watching, then the rest.
    pub fn priority(&self) -> u8 {
        match self {
            SessionStatus::Hanging => 0,
            SessionStatus::Handled => 1,
            SessionStatus::Poked => 2,
            SessionStatus::Watching => 3,
            SessionStatus::Ignored | SessionStatus::Other(_) => 4,
        }
    }

    /// An operator has acted on the session; elapsed time alone must not
    /// escalate it to hanging.
    pub fn suppresses_hang(&self) -> bool {
        matches!(self, SessionStatus::Handled | SessionStatus::Poked)
    }
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "watching" => SessionStatus::Watching,
            "hanging" => SessionStatus::Hanging,
            "handled" => SessionStatus::Handled,
            "poked" => SessionStatus::Poked,
            "ignored" => SessionStatus::Ignored,
            _ => SessionStatus::Other(s),
        }
    }
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        SessionStatus::from(s.to_string())
    }
}

impl From<SessionStatus> for String {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One watched console session.
///
/// Field names on disk (`pid`, `time`) match registry files written by the
/// older refresh scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "pid")]
    pub id: SessionId,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub text: String,
    pub hash: Fingerprint,
    /// Last time `hash` was observed to change.
    #[serde(rename = "time")]
    pub last_changed_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl SessionRecord {
    /// A freshly observed session.
    pub fn new(
        id: SessionId,
        title: impl Into<String>,
        path: Option<String>,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let text = text.into();
        Self {
            id,
            title: title.into(),
            path,
            hash: Fingerprint::of(&text),
            text,
            last_changed_at: now,
            status: SessionStatus::Watching,
        }
    }

    /// Minutes since the content last changed. Negative under clock skew.
    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_changed_at).num_minutes()
    }
}

fn empty_path_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path = Option::<String>::deserialize(deserializer)?;
    Ok(path.filter(|p| !p.is_empty()))
}

/// Look up a record by process identity.
pub fn find_by_identity(registry: &[SessionRecord], id: SessionId) -> Option<&SessionRecord> {
    registry.iter().find(|r| r.id == id)
}

/// Sort by status priority, then title (byte-wise, case-sensitive), then pid.
pub fn sort_registry(registry: &mut Registry) {
    registry.sort_by(|a, b| {
        a.status
            .priority()
            .cmp(&b.status.priority())
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
}
