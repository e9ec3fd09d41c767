//! lightstream CLI
//!
//! Streams rendered LED effects to Pi and NightDriver strip controllers.

use anyhow::Context;
use clap::Parser;

mod cli;
use cli::{Cli, Commands};

mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(lightstream::default_config_path);

    match cli.command {
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive("lightstream=info".parse().context("log directive")?),
                )
                .init();
            commands::serve::run(&path).await?;
        }
        Commands::Check => commands::config::check(&path)?,
        Commands::Effects => commands::effect::list(&path)?,
        Commands::Preview {
            effect,
            length,
            fps,
        } => commands::effect::preview(&path, &effect, length, fps)?,
    }

    Ok(())
}
