//! Read-only views of the registry, filtered by status.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MonitorError, MonitorResult};
use crate::session::{SessionRecord, SessionStatus};

/// Records per requested status, keyed by the status name.
pub type StatusView = BTreeMap<String, Vec<SessionRecord>>;

/// Filter `registry` once per requested status, preserving registry order.
///
/// An unknown or empty status simply matches nothing.
pub fn read(registry: &[SessionRecord], statuses: &[SessionStatus]) -> StatusView {
    statuses
        .iter()
        .map(|status| {
            let matching = registry
                .iter()
                .filter(|r| &r.status == status)
                .cloned()
                .collect();
            (status.to_string(), matching)
        })
        .collect()
}

/// Write one `<status>.json` per entry of `view` into `dir`.
///
/// Returns the files written. Every status name is checked before anything
/// is written: names that are not plain file names are rejected rather than
/// written outside `dir`, and an empty name is skipped.
pub async fn export(view: &StatusView, dir: &Path) -> MonitorResult<Vec<PathBuf>> {
    if let Some(bad) = view.keys().find(|status| !is_exportable(status)) {
        return Err(MonitorError::Persistence(format!(
            "refusing to export status '{bad}' as a file name"
        )));
    }

    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::with_capacity(view.len());
    for (status, records) in view.iter().filter(|(status, _)| !status.is_empty()) {
        let path = dir.join(format!("{status}.json"));
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| MonitorError::Persistence(e.to_string()))?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), count = records.len(), "exported status view");
        written.push(path);
    }
    Ok(written)
}

fn is_exportable(status: &str) -> bool {
    status.is_empty() || !(status.contains(['/', '\\', '\0']) || status == "." || status == "..")
}
