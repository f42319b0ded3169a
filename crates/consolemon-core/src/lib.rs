//! consolemon-core: watch interactive console sessions and flag the hung ones.
//!
//! Provides the session registry and its persisted store, the per-session
//! state machine, the poll engine, the poke/acknowledge command protocol and
//! the service traits (with process-backed and mock implementations) through
//! which consoles are enumerated, captured, focused and typed into.

pub mod ack;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod poke;
pub mod query;
pub mod services;
pub mod session;
pub mod store;
pub mod transition;

// Re-export commonly used items at crate root.
pub use ack::AckReport;
pub use config::{expand_tilde, Config, Overrides};
pub use engine::{CycleReport, PollEngine};
pub use error::{MonitorError, MonitorResult};
pub use fingerprint::Fingerprint;
pub use poke::{CommandExecutor, PokeReport, PokeRequest};
pub use query::StatusView;
pub use services::{Action, ExternalTools, KeyChord, LiveSession, MockConsoles};
pub use session::{Registry, SessionId, SessionRecord, SessionStatus};
pub use store::RegistryStore;
