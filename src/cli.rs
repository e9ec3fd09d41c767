// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lightstream")]
#[command(author, version, about = "LED strip frame streaming server")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/lightstream/server.toml)
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream effects to all configured clients until Ctrl-C
    #[command(visible_aliases = ["run", "s"])]
    Serve,

    /// Parse and validate the config file
    Check,

    /// List configured effects
    #[command(visible_aliases = ["ls"])]
    Effects,

    /// Preview an effect in the terminal
    Preview {
        /// Effect name
        effect: String,

        /// Pixels to draw (default: the effect's strip length)
        #[arg(long)]
        length: Option<usize>,

        /// Frames per second (default: server.fps)
        #[arg(long)]
        fps: Option<u32>,
    },
}
