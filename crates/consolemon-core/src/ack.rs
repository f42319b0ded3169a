//! Status-only mutations: acknowledge, ignore, unignore.
//!
//! No precondition: these apply whatever the current content is. Every
//! record with the pid is updated, though pids are expected to be unique.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::MonitorResult;
use crate::session::{SessionId, SessionStatus};
use crate::store::RegistryStore;

/// Result of a status mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckReport {
    pub pid: SessionId,
    pub found: bool,
    pub status: SessionStatus,
}

/// Mark a session as handled by an operator.
pub async fn handle(store: &RegistryStore, pid: SessionId) -> MonitorResult<AckReport> {
    set_status(store, pid, SessionStatus::Handled, None).await
}

/// Stop watching a session: no more captures until unignored.
pub async fn ignore(store: &RegistryStore, pid: SessionId) -> MonitorResult<AckReport> {
    set_status(store, pid, SessionStatus::Ignored, None).await
}

/// Resume watching; the hang clock restarts at `now`.
pub async fn unignore(
    store: &RegistryStore,
    pid: SessionId,
    now: DateTime<Utc>,
) -> MonitorResult<AckReport> {
    set_status(store, pid, SessionStatus::Watching, Some(now)).await
}

async fn set_status(
    store: &RegistryStore,
    pid: SessionId,
    status: SessionStatus,
    reset_clock: Option<DateTime<Utc>>,
) -> MonitorResult<AckReport> {
    let new_status = status.clone();
    let found = store
        .update(move |registry| {
            let mut found = false;
            for record in registry.iter_mut().filter(|r| r.id == pid) {
                record.status = new_status.clone();
                if let Some(now) = reset_clock {
                    record.last_changed_at = now;
                }
                found = true;
            }
            found
        })
        .await?;

    info!(pid, %status, found, "status updated");
    Ok(AckReport { pid, found, status })
}
