//! Input injection ("poke") with an optimistic-concurrency guard.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::fingerprint::Fingerprint;
use crate::services::{Action, ForegroundService, InputInjector, SnapshotService};
use crate::session::{SessionId, SessionStatus};
use crate::store::RegistryStore;

/// A request to type into a session.
#[derive(Debug, Clone)]
pub struct PokeRequest {
    pub pid: SessionId,
    pub actions: Vec<Action>,
    /// Refuse to act unless the live content still hashes to this.
    pub expected: Option<Fingerprint>,
}

/// Outcome of a completed poke.
#[derive(Debug, Clone, Serialize)]
pub struct PokeReport {
    pub pid: SessionId,
    /// The registry had a record for `pid` and it is now `poked`.
    pub found: bool,
    pub status: SessionStatus,
    pub delivered: usize,
    pub activated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_error: Option<String>,
}

/// Executes pokes: precondition, focus, inject, bookkeeping.
pub struct CommandExecutor<S, F, I> {
    snapshots: S,
    foreground: F,
    injector: I,
    store: RegistryStore,
}

impl<S, F, I> CommandExecutor<S, F, I>
where
    S: SnapshotService,
    F: ForegroundService,
    I: InputInjector,
{
    pub fn new(snapshots: S, foreground: F, injector: I, store: RegistryStore) -> Self {
        Self {
            snapshots,
            foreground,
            injector,
            store,
        }
    }

    /// Run a poke.
    ///
    /// On `PreconditionMismatch` nothing was injected and the registry was
    /// not touched. On `InjectionFailed` the actions before the failing one
    /// were delivered and the registry was not touched.
    pub async fn poke(&self, request: PokeRequest) -> MonitorResult<PokeReport> {
        let pid = request.pid;

        if let Some(expected) = request.expected {
            // A failed capture hashes as empty text, same as in a poll cycle.
            let text = match self.snapshots.capture(pid).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(pid, error = %e, "precondition capture failed, treating as empty");
                    String::new()
                }
            };
            let actual = Fingerprint::of(&text);
            if actual != expected {
                info!(pid, %expected, %actual, "poke refused: content changed");
                return Err(MonitorError::PreconditionMismatch {
                    pid,
                    expected,
                    actual,
                });
            }
            debug!(pid, "precondition holds");
        }

        let activation_error = match self.foreground.activate(pid).await {
            Ok(()) => None,
            Err(e) => {
                warn!(pid, error = %e, "foreground activation failed, injecting anyway");
                Some(e.to_string())
            }
        };

        for (delivered, action) in request.actions.iter().enumerate() {
            if let Err(source) = self.injector.inject(action).await {
                return Err(MonitorError::InjectionFailed {
                    pid,
                    delivered,
                    source,
                });
            }
        }

        let found = self
            .store
            .update(|registry| {
                let mut found = false;
                for record in registry.iter_mut().filter(|r| r.id == pid) {
                    record.status = SessionStatus::Poked;
                    found = true;
                }
                found
            })
            .await?;

        if !found {
            info!(pid, "poked a session the registry does not know; no status recorded");
        }

        Ok(PokeReport {
            pid,
            found,
            status: SessionStatus::Poked,
            delivered: request.actions.len(),
            activated: activation_error.is_none(),
            activation_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockConsoles;
    use crate::session::SessionRecord;
    use chrono::Utc;
    use tempfile::TempDir;

    type MockExecutor<'a> = CommandExecutor<&'a MockConsoles, &'a MockConsoles, &'a MockConsoles>;

    fn executor<'a>(mock: &'a MockConsoles, dir: &TempDir) -> MockExecutor<'a> {
        let store = RegistryStore::new(dir.path().join("consoles.json"));
        CommandExecutor::new(mock, mock, mock, store)
    }

    async fn seed(exec: &MockExecutor<'_>, pid: SessionId, text: &str, status: SessionStatus) {
        let mut r = SessionRecord::new(pid, "shell", None, text, Utc::now());
        r.status = status;
        exec.store.save(&vec![r]).await.unwrap();
    }

    fn request(pid: SessionId, expected: Option<Fingerprint>) -> PokeRequest {
        PokeRequest {
            pid,
            actions: vec![
                Action::text("a"),
                Action::keys("ENTER").unwrap(),
                Action::text("b"),
            ],
            expected,
        }
    }

    #[tokio::test]
    async fn actions_are_delivered_in_order_and_status_becomes_poked() {
        let dir = TempDir::new().unwrap();
        let mock = MockConsoles::new().with_session(42, "shell", "ready>");
        let exec = executor(&mock, &dir);
        seed(&exec, 42, "ready>", SessionStatus::Hanging).await;

        let report = exec
            .poke(request(42, Some(Fingerprint::of("ready>"))))
            .await
            .unwrap();
        assert!(report.found);
        assert!(report.activated);
        assert_eq!(report.delivered, 3);
        assert_eq!(
            mock.injected(),
            vec![
                Action::text("a"),
                Action::keys("{ENTER}").unwrap(),
                Action::text("b"),
            ]
        );
        assert_eq!(mock.activations(), vec![42]);
        assert_eq!(exec.store.load().await[0].status, SessionStatus::Poked);
    }

    #[tokio::test]
    async fn mismatch_does_nothing() {
        let dir = TempDir::new().unwrap();
        let mock = MockConsoles::new().with_session(42, "shell", "moved on");
        let exec = executor(&mock, &dir);
        seed(&exec, 42, "ready>", SessionStatus::Hanging).await;
        let before = std::fs::read(exec.store.path()).unwrap();

        let expected = Fingerprint::of("ready>");
        let err = exec.poke(request(42, Some(expected.clone()))).await.unwrap_err();
        match err {
            MonitorError::PreconditionMismatch {
                pid,
                expected: e,
                actual,
            } => {
                assert_eq!(pid, 42);
                assert_eq!(e, expected);
                assert_eq!(actual, Fingerprint::of("moved on"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(mock.injected().is_empty());
        assert!(mock.activations().is_empty());
        assert_eq!(std::fs::read(exec.store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn no_precondition_means_no_capture() {
        let dir = TempDir::new().unwrap();
        let mock = MockConsoles::new().with_session(42, "shell", "x");
        let exec = executor(&mock, &dir);

        exec.poke(request(42, None)).await.unwrap();
        assert!(mock.captures().is_empty());
    }

    #[tokio::test]
    async fn activation_failure_does_not_abort() {
        let dir = TempDir::new().unwrap();
        let mock = MockConsoles::new().with_session(42, "shell", "x");
        mock.fail_activation(true);
        let exec = executor(&mock, &dir);
        seed(&exec, 42, "x", SessionStatus::Watching).await;

        let report = exec.poke(request(42, None)).await.unwrap();
        assert!(!report.activated);
        assert!(report.activation_error.is_some());
        assert_eq!(mock.injected().len(), 3);
        assert!(report.found);
    }

    #[tokio::test]
    async fn unknown_session_still_receives_input() {
        let dir = TempDir::new().unwrap();
        let mock = MockConsoles::new();
        let exec = executor(&mock, &dir);

        let report = exec.poke(request(99, None)).await.unwrap();
        assert!(!report.found);
        assert_eq!(mock.injected().len(), 3);
        assert!(exec.store.load().await.is_empty());
    }

    #[tokio::test]
    async fn injection_failure_stops_and_skips_bookkeeping() {
        let dir = TempDir::new().unwrap();
        let mock = MockConsoles::new().with_session(42, "shell", "x");
        mock.fail_injection_at(Some(1));
        let exec = executor(&mock, &dir);
        seed(&exec, 42, "x", SessionStatus::Hanging).await;

        let err = exec.poke(request(42, None)).await.unwrap_err();
        assert!(matches!(err, MonitorError::InjectionFailed { delivered: 1, .. }));
        assert_eq!(mock.injected(), vec![Action::text("a")]);
        assert_eq!(exec.store.load().await[0].status, SessionStatus::Hanging);
    }

    #[tokio::test]
    async fn failed_precondition_capture_compares_as_empty() {
        let dir = TempDir::new().unwrap();
        let mock = MockConsoles::new();
        mock.add_uncapturable(42, "shell");
        let exec = executor(&mock, &dir);

        exec.poke(request(42, Some(Fingerprint::of("")))).await.unwrap();
        assert_eq!(mock.injected().len(), 3);
    }
}
