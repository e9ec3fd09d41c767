//! `check`: validate the config file and summarize it.

use std::path::Path;

use super::{load_config, CommandResult};
use lightstream::LedStrip;

pub fn check(path: &Path) -> CommandResult {
    let config = load_config(path)?;

    println!("Config OK: {}", path.display());
    println!();
    println!(
        "Server: {} fps, triggers every {}ms, time sync every {}s",
        config.server.fps, config.server.trigger_interval_ms, config.server.time_sync_interval_secs
    );

    println!();
    println!("Strips ({}):", config.strips.len());
    for strip in &config.strips {
        let kind = match strip {
            LedStrip::Single(_) => "single",
            LedStrip::Group(_) => "group",
            LedStrip::Pool(_) => "pool",
        };
        let limit = strip
            .power_limit_ma()
            .map(|ma| format!("{ma}mA"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<7} {:>5} px  {:>3}%  {}",
            strip.name(),
            kind,
            strip.length(),
            strip.brightness(),
            limit
        );
    }

    println!();
    println!("Clients ({}):", config.clients.len());
    for client in &config.clients {
        println!(
            "  {:<20} {:<13} {:<20} {} strip(s)",
            client.name,
            client.kind.to_string(),
            client.address,
            client.strips.len()
        );
    }

    println!();
    println!(
        "Effects: {}  Triggers: {}  Solar: {}",
        config.effects.len(),
        config.triggers.len(),
        config
            .solar
            .as_ref()
            .map(|d| d.date.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    Ok(())
}
