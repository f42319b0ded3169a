//! `consolemon poke`: type into a session.

use anyhow::Result;
use clap::ArgMatches;
use consolemon_core::{
    Action, CommandExecutor, Config, ExternalTools, Fingerprint, MonitorError, PokeRequest,
    RegistryStore, SessionId,
};

use crate::output;

/// Collect `--text` and `--keys` values in the order they appeared on the
/// command line. Every key name is validated before anything is sent.
pub fn ordered_actions(matches: &ArgMatches) -> Result<Vec<Action>, MonitorError> {
    let mut indexed: Vec<(usize, Action)> = Vec::new();

    if let (Some(indices), Some(values)) =
        (matches.indices_of("text"), matches.get_many::<String>("text"))
    {
        for (index, value) in indices.zip(values) {
            indexed.push((index, Action::text(value.clone())));
        }
    }

    if let (Some(indices), Some(values)) =
        (matches.indices_of("keys"), matches.get_many::<String>("keys"))
    {
        for (index, value) in indices.zip(values) {
            let action = Action::keys(value).map_err(MonitorError::InvalidAction)?;
            indexed.push((index, action));
        }
    }

    if indexed.is_empty() {
        return Err(MonitorError::InvalidAction(
            "nothing to send: give at least one --text or --keys".to_string(),
        ));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, action)| action).collect())
}

pub async fn run(
    config: &Config,
    pid: SessionId,
    actions: Vec<Action>,
    expected: Option<Fingerprint>,
) -> Result<()> {
    let tools = ExternalTools::new(&config.tools, config.state_dir());
    let executor = CommandExecutor::new(&tools, &tools, &tools, RegistryStore::from_config(config));

    let report = executor
        .poke(PokeRequest {
            pid,
            actions,
            expected,
        })
        .await?;
    output::print_ok(&report)
}
