//! Server configuration file.
//!
//! ```toml
//! [server]
//! fps = 30
//!
//! [[strips]]
//! type = "single"
//! uuid = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59"
//! name = "desk"
//! pin = "18"
//! length = 60
//!
//! [[clients]]
//! uuid = "5b0c7a52-8a43-4f0e-b1c2-3d4e5f607182"
//! name = "office pi"
//! address = "192.168.1.40"
//! kind = "pi"
//! strips = [{ strip = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59", pin = "18" }]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::client::ClientConfig;
use crate::effect::EffectDefinition;
use crate::strip::LedStrip;
use crate::trigger::{SolarDay, TriggerDefinition};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_fps() -> u32 {
    30
}
fn default_trigger_interval_ms() -> u64 {
    1000
}
fn default_time_sync_interval_secs() -> u64 {
    60
}
fn default_ack_timeout_ms() -> u64 {
    5000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_trigger_interval_ms")]
    pub trigger_interval_ms: u64,
    #[serde(default = "default_time_sync_interval_secs")]
    pub time_sync_interval_secs: u64,
    /// Bound on waiting for a frame acknowledgment
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Schedule frames this far ahead on the client clock (0 = show on arrival)
    #[serde(default)]
    pub frame_delay_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            trigger_interval_ms: default_trigger_interval_ms(),
            time_sync_interval_secs: default_time_sync_interval_secs(),
            ack_timeout_ms: default_ack_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            frame_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub strips: Vec<LedStrip>,
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
    #[serde(default)]
    pub effects: Vec<EffectDefinition>,
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
    #[serde(default)]
    pub solar: Option<SolarDay>,
}

impl ServerConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=120).contains(&self.server.fps) {
            return Err(ConfigError::Invalid(format!(
                "server.fps must be 1-120, got {}",
                self.server.fps
            )));
        }

        let mut strips = HashSet::new();
        for strip in &self.strips {
            if !strips.insert(strip.uuid()) {
                return Err(ConfigError::Invalid(format!("duplicate strip {}", strip.uuid())));
            }
            if strip.length() == 0 {
                return Err(ConfigError::Invalid(format!("strip {:?} has no pixels", strip.name())));
            }
        }

        // Each render advances the strip's effects, so a strip feeds one binding
        let mut bound: HashMap<Uuid, &str> = HashMap::new();
        let mut clients = HashSet::new();
        for client in &self.clients {
            if !clients.insert(client.uuid) {
                return Err(ConfigError::Invalid(format!("duplicate client {}", client.uuid)));
            }
            for binding in &client.strips {
                if !strips.contains(&binding.strip) {
                    return Err(ConfigError::Invalid(format!(
                        "client {:?} references unknown strip {}",
                        client.name, binding.strip
                    )));
                }
                if let Some(owner) = bound.insert(binding.strip, &client.name) {
                    return Err(ConfigError::Invalid(format!(
                        "strip {} is bound by both {:?} and {:?}",
                        binding.strip, owner, client.name
                    )));
                }
            }
        }

        let mut effects = HashSet::new();
        for effect in &self.effects {
            if !effects.insert(effect.uuid) {
                return Err(ConfigError::Invalid(format!("duplicate effect {}", effect.uuid)));
            }
            if !strips.contains(&effect.strip) {
                return Err(ConfigError::Invalid(format!(
                    "effect {:?} references unknown strip {}",
                    effect.name, effect.strip
                )));
            }
        }

        for trigger in &self.triggers {
            if !effects.contains(&trigger.effect) {
                return Err(ConfigError::Invalid(format!(
                    "trigger {} references unknown effect {}",
                    trigger.uuid, trigger.effect
                )));
            }
            if trigger.settings.activation_duration_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "trigger {} has a zero activation duration",
                    trigger.uuid
                )));
            }
        }
        Ok(())
    }

    pub fn effect_by_name(&self, name: &str) -> Option<&EffectDefinition> {
        self.effects.iter().find(|e| e.name == name)
    }

    pub fn strip(&self, uuid: Uuid) -> Option<&LedStrip> {
        self.strips.iter().find(|s| s.uuid() == uuid)
    }
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    config_dir().join("server.toml")
}

fn config_dir() -> PathBuf {
    if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config).join("lightstream")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config/lightstream")
    } else {
        PathBuf::from("/tmp/lightstream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientKind;
    use crate::effect::EffectStatus;
    use crate::trigger::TriggerType;

    const SAMPLE: &str = r##"
[server]
fps = 25
frame_delay_ms = 150

[[strips]]
type = "single"
uuid = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59"
name = "desk"
pin = "18"
length = 60
power_limit_ma = 2000

[[clients]]
uuid = "5b0c7a52-8a43-4f0e-b1c2-3d4e5f607182"
name = "office pi"
address = "192.168.1.40"
kind = "pi"
color_order = "grb"
strips = [{ strip = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59", pin = "18" }]

[[effects]]
uuid = "6f1c2b9e-6d55-4c1e-9a55-0b9d7e1f3a10"
name = "evening"
strip = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59"
priority = 3
generator = { type = "color_fade", palette = ["#FF8800", "purple"], cycle_secs = 30 }

[[triggers]]
uuid = "a6f0c3de-1b7e-4c44-9d0a-2f6b8e4c7a11"
effect = "6f1c2b9e-6d55-4c1e-9a55-0b9d7e1f3a10"
settings = { trigger_type = "start_effect", activation_duration_secs = 7200 }
kind = { type = "sunrise_sunset", event = "sunset", offset_minutes = -30 }

[solar]
date = "2024-06-01"
sunrise = "2024-06-01T05:10:00+02:00"
sunset = "2024-06-01T21:20:00+02:00"
"##;

    #[test]
    fn test_parse_sample() {
        let config = ServerConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.server.fps, 25);
        assert_eq!(config.server.ack_timeout_ms, 5000);
        assert_eq!(config.server.frame_delay_ms, 150);
        assert_eq!(config.strips[0].length(), 60);
        assert_eq!(config.clients[0].kind, ClientKind::Pi);
        assert_eq!(config.effects[0].status, EffectStatus::Created);
        assert_eq!(config.effects[0].priority, 3);
        assert_eq!(config.triggers[0].settings.trigger_type, TriggerType::StartEffect);
        assert!(config.solar.is_some());
        assert!(config.effect_by_name("evening").is_some());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.server, ServerSettings::default());
        assert!(config.clients.is_empty());
    }

    #[test]
    fn test_unknown_strip_rejected() {
        let broken = SAMPLE.replace(
            "strip = \"0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59\"\npriority",
            "strip = \"00000000-0000-0000-0000-000000000000\"\npriority",
        );
        assert!(matches!(
            ServerConfig::from_toml(&broken),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_strip_bound_twice_rejected() {
        let second = r#"
[[clients]]
uuid = "8c3e4f61-2d71-4a9b-b0c4-7f1a3d2e9c55"
name = "hall pi"
address = "192.168.1.41"
kind = "pi"
strips = [{ strip = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59", pin = "12" }]
"#;
        let err = ServerConfig::from_toml(&format!("{SAMPLE}{second}")).unwrap_err();
        assert!(err.to_string().contains("bound by both"));
    }

    #[test]
    fn test_fps_range() {
        assert!(ServerConfig::from_toml("[server]\nfps = 0").is_err());
        assert!(ServerConfig::from_toml("[server]\nfps = 500").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.clients.len(), 1);

        let missing = ServerConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
