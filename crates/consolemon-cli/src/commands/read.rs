//! `consolemon read`: sessions by status, printed or exported per file.

use anyhow::{Context, Result};
use consolemon_core::{query, Config, RegistryStore, SessionStatus};
use std::path::Path;

use crate::output;

pub async fn run(config: &Config, statuses: &[String], out_dir: Option<&Path>) -> Result<()> {
    // Blank filters select nothing.
    let statuses: Vec<SessionStatus> = statuses
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(SessionStatus::from)
        .collect();
    let registry = RegistryStore::from_config(config).load().await;
    let view = query::read(&registry, &statuses);

    match out_dir {
        Some(dir) => {
            let files = query::export(&view, dir)
                .await
                .with_context(|| format!("exporting to {}", dir.display()))?;
            let counts: serde_json::Map<String, serde_json::Value> = view
                .iter()
                .map(|(status, records)| (status.clone(), records.len().into()))
                .collect();
            output::print_ok(&serde_json::json!({ "files": files, "counts": counts }))
        }
        None => output::print_ok(&serde_json::json!({ "sessions": view })),
    }
}
