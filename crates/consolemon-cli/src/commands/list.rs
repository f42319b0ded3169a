//! `consolemon list`: human-readable registry table.

use anyhow::Result;
use chrono::Utc;
use consolemon_core::{Config, RegistryStore};

pub async fn run(config: &Config) -> Result<()> {
    let registry = RegistryStore::from_config(config).load().await;

    if registry.is_empty() {
        println!("No sessions recorded. Run `consolemon refresh` first.");
        return Ok(());
    }

    let now = Utc::now();
    println!("{:<8} {:<10} {:>6}  {}", "PID", "STATUS", "IDLE", "TITLE");
    println!(
        "{:<8} {:<10} {:>6}  {}",
        "\u{2500}\u{2500}\u{2500}",
        "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}",
        "\u{2500}\u{2500}\u{2500}\u{2500}",
        "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}"
    );

    for record in &registry {
        let idle = format!("{}m", record.idle_minutes(now).max(0));
        let title = if record.title.chars().count() > 60 {
            let short: String = record.title.chars().take(60).collect();
            format!("{short}...")
        } else {
            record.title.clone()
        };
        println!("{:<8} {:<10} {:>6}  {}", record.id, record.status.as_str(), idle, title);
    }

    println!("\n{} session(s).", registry.len());
    Ok(())
}
