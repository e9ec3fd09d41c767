//! Command handlers for the CLI application.
//!
//! - `serve`: run the streaming server
//! - `config`: config validation (check)
//! - `effect`: effect listing and terminal preview

pub mod config;
pub mod effect;
pub mod serve;

use std::path::Path;

use anyhow::Context;
use lightstream::ServerConfig;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Load the config file, with the path in any error.
pub fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
    ServerConfig::load(path).with_context(|| format!("load config {}", path.display()))
}
