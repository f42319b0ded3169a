use std::collections::HashMap;
use std::sync::Mutex;

use super::*;

#[derive(Default)]
struct MockState {
    sessions: Vec<LiveSession>,
    screens: HashMap<SessionId, String>,
    enumeration_fails: bool,
    activation_fails: bool,
    inject_fail_at: Option<usize>,
    captures: Vec<SessionId>,
    activations: Vec<SessionId>,
    injected: Vec<Action>,
}

/// In-memory consoles for tests. Implements every service trait and records
/// each call so tests can assert on what the core asked for.
///
/// A session listed without a screen fails capture.
#[derive(Default)]
pub struct MockConsoles {
    state: Mutex<MockState>,
}

impl MockConsoles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a live session with the given screen text.
    pub fn with_session(self, pid: SessionId, title: &str, text: &str) -> Self {
        self.add_session(pid, title, text);
        self
    }

    pub fn add_session(&self, pid: SessionId, title: &str, text: &str) {
        let mut state = self.lock();
        state.sessions.retain(|s| s.pid != pid);
        state.sessions.push(LiveSession::new(pid, title, None));
        state.screens.insert(pid, text.to_string());
    }

    /// List a session whose capture always fails.
    pub fn add_uncapturable(&self, pid: SessionId, title: &str) {
        let mut state = self.lock();
        state.sessions.retain(|s| s.pid != pid);
        state.sessions.push(LiveSession::new(pid, title, None));
        state.screens.remove(&pid);
    }

    pub fn remove_session(&self, pid: SessionId) {
        let mut state = self.lock();
        state.sessions.retain(|s| s.pid != pid);
        state.screens.remove(&pid);
    }

    pub fn set_screen(&self, pid: SessionId, text: &str) {
        self.lock().screens.insert(pid, text.to_string());
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.lock().enumeration_fails = fail;
    }

    pub fn fail_activation(&self, fail: bool) {
        self.lock().activation_fails = fail;
    }

    /// Make the n-th injected action (0-based, counted across calls) fail.
    pub fn fail_injection_at(&self, index: Option<usize>) {
        self.lock().inject_fail_at = index;
    }

    pub fn captures(&self) -> Vec<SessionId> {
        self.lock().captures.clone()
    }

    pub fn activations(&self) -> Vec<SessionId> {
        self.lock().activations.clone()
    }

    pub fn injected(&self) -> Vec<Action> {
        self.lock().injected.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test poisons the mutex; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EnumerationService for MockConsoles {
    async fn enumerate(&self) -> Result<Vec<LiveSession>, EnumerationError> {
        let state = self.lock();
        if state.enumeration_fails {
            return Err(EnumerationError::Other("mock enumeration failure".into()));
        }
        Ok(state.sessions.clone())
    }
}

impl SnapshotService for MockConsoles {
    async fn capture(&self, pid: SessionId) -> Result<String, CaptureError> {
        let mut state = self.lock();
        state.captures.push(pid);
        state
            .screens
            .get(&pid)
            .cloned()
            .ok_or(CaptureError::NoOutput(pid))
    }
}

impl ForegroundService for MockConsoles {
    async fn activate(&self, pid: SessionId) -> Result<(), ActivationError> {
        let mut state = self.lock();
        state.activations.push(pid);
        if state.activation_fails {
            return Err(ActivationError::Other("mock activation failure".into()));
        }
        Ok(())
    }
}

impl InputInjector for MockConsoles {
    async fn inject(&self, action: &Action) -> Result<(), InjectionError> {
        let mut state = self.lock();
        if state.inject_fail_at == Some(state.injected.len()) {
            return Err(InjectionError::Other("mock injection failure".into()));
        }
        state.injected.push(action.clone());
        Ok(())
    }
}
