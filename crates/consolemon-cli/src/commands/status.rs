//! `consolemon handle | ignore | unignore`: status-only changes.

use anyhow::Result;
use chrono::Utc;
use consolemon_core::{ack, Config, RegistryStore, SessionId};

use crate::output;

pub async fn run_handle(config: &Config, pid: SessionId) -> Result<()> {
    let report = ack::handle(&RegistryStore::from_config(config), pid).await?;
    output::print_ok(&report)
}

pub async fn run_ignore(config: &Config, pid: SessionId) -> Result<()> {
    let report = ack::ignore(&RegistryStore::from_config(config), pid).await?;
    output::print_ok(&report)
}

pub async fn run_unignore(config: &Config, pid: SessionId) -> Result<()> {
    let report = ack::unignore(&RegistryStore::from_config(config), pid, Utc::now()).await?;
    output::print_ok(&report)
}
