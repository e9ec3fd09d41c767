//! CLI command handlers for effects.

use std::path::Path;

use anyhow::Context;

use super::{load_config, CommandResult};
use lightstream::effect::preview::{self, PreviewOptions};

/// Preview length when the effect's strip is not in the config.
const DEFAULT_PREVIEW_LENGTH: usize = 60;

/// List configured effects.
pub fn list(path: &Path) -> CommandResult {
    let config = load_config(path)?;

    println!("Effects (from {}):", path.display());
    println!();
    println!(
        "{:<20} {:<11} {:<20} {:<6} {:<10} Filters",
        "Name", "Type", "Strip", "Prio", "Status"
    );
    println!("{}", "-".repeat(78));

    for def in &config.effects {
        let strip = config
            .strip(def.strip)
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| def.strip.to_string());
        println!(
            "{:<20} {:<11} {:<20} {:<6} {:<10} {}",
            def.name,
            def.generator.kind(),
            strip,
            def.priority,
            format!("{:?}", def.status).to_lowercase(),
            def.filters.len()
        );
    }

    Ok(())
}

/// Preview an effect in the terminal.
pub fn preview(path: &Path, name: &str, length: Option<usize>, fps: Option<u32>) -> CommandResult {
    let config = load_config(path)?;
    let def = config
        .effect_by_name(name)
        .with_context(|| format!("unknown effect: {name}"))?;
    let strip = config.strip(def.strip);

    let fps = fps.unwrap_or(config.server.fps).clamp(1, 60);
    let opts = PreviewOptions {
        length: length
            .or_else(|| strip.map(|s| s.length()))
            .unwrap_or(DEFAULT_PREVIEW_LENGTH)
            .max(1),
        fps,
        power_limit_ma: strip.and_then(|s| s.power_limit_ma()),
    };

    let mut effect = def.build(fps);
    preview::run(&mut effect, opts)
}
