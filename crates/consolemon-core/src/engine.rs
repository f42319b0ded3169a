//! Poll cycle: enumerate, capture, transition, persist.
//!
//! Enumeration and capture happen outside the registry lock (they can be
//! slow). The fresh captures are then merged into the snapshot reloaded under
//! the lock, so a poke or acknowledgement that lands mid-cycle is seen by the
//! transition instead of being overwritten.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::MonitorResult;
use crate::services::{EnumerationService, SnapshotService};
use crate::session::{find_by_identity, sort_registry, SessionId, SessionStatus};
use crate::store::RegistryStore;
use crate::transition::{advance, Capture, Change};

/// Summary of one completed poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub sessions: usize,
    pub new: Vec<SessionId>,
    pub changed: Vec<SessionId>,
    /// Became hanging during this cycle.
    pub hanging: Vec<SessionId>,
    /// Ignored sessions carried forward without capture.
    pub skipped: Vec<SessionId>,
    pub dropped: Vec<SessionId>,
    /// Captures that failed and were treated as empty text.
    pub capture_failures: Vec<SessionId>,
}

impl CycleReport {
    /// Ran, but some sessions could not be captured.
    pub fn is_partial(&self) -> bool {
        !self.capture_failures.is_empty()
    }
}

/// Runs poll cycles against one registry.
pub struct PollEngine<E, S> {
    enumerator: E,
    snapshots: S,
    store: RegistryStore,
    threshold: Duration,
}

impl<E, S> PollEngine<E, S>
where
    E: EnumerationService,
    S: SnapshotService,
{
    pub fn new(enumerator: E, snapshots: S, store: RegistryStore, threshold: Duration) -> Self {
        Self {
            enumerator,
            snapshots,
            store,
            threshold,
        }
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Run one cycle as of `now`.
    ///
    /// An enumeration failure returns an error and leaves the persisted
    /// registry untouched. Capture failures do not fail the cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> MonitorResult<CycleReport> {
        let live = self.enumerator.enumerate().await?;
        debug!(count = live.len(), "enumerated sessions");

        // Ignored sessions are not captured. Decided from the snapshot as it
        // was before capture; re-checked under the lock below.
        let before = self.store.load().await;
        let ignored: Vec<SessionId> = before
            .iter()
            .filter(|r| r.status == SessionStatus::Ignored)
            .map(|r| r.id)
            .collect();

        let mut to_capture: Vec<SessionId> = live
            .iter()
            .map(|s| s.pid)
            .filter(|pid| !ignored.contains(pid))
            .collect();
        to_capture.sort_unstable();
        to_capture.dedup();

        let results = join_all(to_capture.iter().map(|&pid| async move {
            let result = self.snapshots.capture(pid).await;
            (pid, result)
        }))
        .await;

        let mut captures: HashMap<SessionId, Option<String>> = HashMap::new();
        let mut capture_failures = Vec::new();
        for (pid, result) in results {
            match result {
                Ok(text) => {
                    captures.insert(pid, Some(text));
                }
                Err(e) => {
                    warn!(pid, error = %e, "capture failed, treating as empty");
                    capture_failures.push(pid);
                    captures.insert(pid, None);
                }
            }
        }

        let threshold = self.threshold;
        let report = self
            .store
            .update(move |registry| {
                let previous: HashMap<SessionId, _> =
                    registry.drain(..).map(|r| (r.id, r)).collect();

                let mut report = CycleReport {
                    capture_failures,
                    ..CycleReport::default()
                };

                for session in &live {
                    // One record per pid even if the enumeration repeats one.
                    if registry.iter().any(|r| r.id == session.pid) {
                        continue;
                    }
                    let capture = match captures.get(&session.pid) {
                        Some(Some(text)) => Capture::Text(text),
                        Some(None) => Capture::Failed,
                        None => Capture::Skipped,
                    };
                    let prev = previous
                        .get(&session.pid)
                        .or_else(|| find_by_identity(&before, session.pid));
                    let (record, change) = advance(prev, session, capture, now, threshold);

                    match change {
                        Change::New => report.new.push(record.id),
                        Change::Changed => report.changed.push(record.id),
                        Change::Escalated => report.hanging.push(record.id),
                        Change::CarriedForward => report.skipped.push(record.id),
                        Change::Unchanged => {}
                    }
                    registry.push(record);
                }

                let mut dropped: Vec<SessionId> = previous
                    .keys()
                    .copied()
                    .filter(|pid| !registry.iter().any(|r| r.id == *pid))
                    .collect();
                dropped.sort_unstable();
                report.dropped = dropped;

                sort_registry(registry);
                report.sessions = registry.len();
                report
            })
            .await?;

        info!(
            sessions = report.sessions,
            new = report.new.len(),
            changed = report.changed.len(),
            hanging = report.hanging.len(),
            dropped = report.dropped.len(),
            capture_failures = report.capture_failures.len(),
            "poll cycle complete"
        );
        Ok(report)
    }
}
