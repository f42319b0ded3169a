//! JSON result envelopes and exit codes.

use anyhow::Result;
use consolemon_core::MonitorError;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Exit code for malformed requests (same as clap's usage errors).
pub const EXIT_USAGE: i32 = 2;
/// Exit code when a poke's fingerprint guard refused to act.
pub const EXIT_PRECONDITION: i32 = 3;
pub const EXIT_FAILURE: i32 = 1;

/// Print `{"ok": true, ...body}` to stdout. `body` must serialize to an object.
pub fn print_ok<T: Serialize>(body: &T) -> Result<()> {
    let mut envelope = Map::new();
    envelope.insert("ok".to_string(), Value::Bool(true));
    match serde_json::to_value(body)? {
        Value::Object(fields) => envelope.extend(fields),
        other => {
            envelope.insert("result".to_string(), other);
        }
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(envelope))?);
    Ok(())
}

/// Build the failure envelope and pick the exit code for `err`.
pub fn error_envelope(err: &anyhow::Error) -> (Value, i32) {
    let message = format!("{err:#}");
    let Some(monitor) = err.downcast_ref::<MonitorError>() else {
        return (
            json!({ "ok": false, "error": "ERROR", "message": message }),
            EXIT_FAILURE,
        );
    };

    let mut envelope = json!({ "ok": false, "error": monitor.kind(), "message": message });
    let code = match monitor {
        MonitorError::PreconditionMismatch {
            pid,
            expected,
            actual,
        } => {
            envelope["pid"] = json!(pid);
            envelope["expected"] = json!(expected);
            envelope["actual"] = json!(actual);
            EXIT_PRECONDITION
        }
        MonitorError::InjectionFailed { pid, delivered, .. } => {
            envelope["pid"] = json!(pid);
            envelope["delivered"] = json!(delivered);
            EXIT_FAILURE
        }
        MonitorError::LockTimeout { path, waited_ms } => {
            envelope["path"] = json!(path);
            envelope["waited_ms"] = json!(waited_ms);
            EXIT_FAILURE
        }
        MonitorError::InvalidAction(_) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    };
    (envelope, code)
}

/// Print the failure envelope to stderr and return the exit code.
pub fn report_error(err: &anyhow::Error) -> i32 {
    let (envelope, code) = error_envelope(err);
    match serde_json::to_string_pretty(&envelope) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{err:#}"),
    }
    code
}
