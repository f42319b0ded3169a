//! `consolemon refresh`: run one poll cycle against the real consoles.

use anyhow::Result;
use chrono::Utc;
use consolemon_core::{Config, ExternalTools, PollEngine, RegistryStore};

use crate::output;

pub async fn run(config: &Config) -> Result<()> {
    let tools = ExternalTools::new(&config.tools, config.state_dir());
    let engine = PollEngine::new(
        &tools,
        &tools,
        RegistryStore::from_config(config),
        config.hang_threshold(),
    );

    let report = engine.run_cycle(Utc::now()).await?;
    output::print_ok(&serde_json::json!({
        "partial": report.is_partial(),
        "report": report,
    }))
}
