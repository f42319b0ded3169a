//! The per-session state machine, as a pure function.
//!
//! ```text
//!            new pid                 content changed (from any state but ignored)
//!   (none) ─────────▶ watching ◀──────────────────────────────────────────┐
//!                       │  unchanged ≥ threshold                          │
//!                       ▼                                                 │
//!                    hanging ── handle ──▶ handled ── poke ──▶ poked ─────┘
//! ```
//!
//! `handled` and `poked` never escalate on elapsed time alone. `ignored` is
//! carried forward untouched until the pid disappears.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::fingerprint::Fingerprint;
use crate::services::LiveSession;
use crate::session::{SessionRecord, SessionStatus};

/// What the poll cycle learned about a session's content this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture<'a> {
    Text(&'a str),
    /// The snapshot service failed; treated as empty text.
    Failed,
    /// No capture was attempted (the session was ignored when the cycle began).
    Skipped,
}

/// How a record moved during one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Changed,
    Unchanged,
    /// Unchanged long enough to become hanging on this transition.
    Escalated,
    CarriedForward,
}

/// Compute the next record for one enumerated session.
pub fn advance(
    prev: Option<&SessionRecord>,
    live: &LiveSession,
    capture: Capture<'_>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> (SessionRecord, Change) {
    if let Some(prev) = prev {
        if prev.status == SessionStatus::Ignored || capture == Capture::Skipped {
            return (carry_forward(prev, live), Change::CarriedForward);
        }
    }

    let text = match capture {
        Capture::Text(text) => text,
        Capture::Failed | Capture::Skipped => "",
    };
    let hash = Fingerprint::of(text);

    let Some(prev) = prev else {
        let record = SessionRecord::new(live.pid, live.title.clone(), live.path.clone(), text, now);
        return (record, Change::New);
    };

    let mut next = SessionRecord {
        id: live.pid,
        title: live.title.clone(),
        path: live.path.clone(),
        text: text.to_string(),
        hash,
        last_changed_at: prev.last_changed_at,
        status: prev.status.clone(),
    };

    if next.hash != prev.hash {
        next.last_changed_at = now;
        next.status = SessionStatus::Watching;
        return (next, Change::Changed);
    }

    let elapsed = (now - prev.last_changed_at).to_std().unwrap_or(Duration::ZERO);
    if elapsed >= threshold && !prev.status.suppresses_hang() {
        let change = if prev.status == SessionStatus::Hanging {
            Change::Unchanged
        } else {
            Change::Escalated
        };
        next.status = SessionStatus::Hanging;
        return (next, change);
    }

    (next, Change::Unchanged)
}

/// Keep content, hash, timestamp and status; refresh the display fields.
fn carry_forward(prev: &SessionRecord, live: &LiveSession) -> SessionRecord {
    SessionRecord {
        title: live.title.clone(),
        path: live.path.clone(),
        ..prev.clone()
    }
}
