//! Streaming client definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::ColorOrder;

/// Firmware family of a client; selects protocol and transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// Raspberry Pi client, WebSocket
    Pi,
    /// ESP32 NightDriver firmware, raw TCP socket
    NightDriver,
    /// Anything else; rejected when a job is started
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientKind::Pi => write!(f, "pi"),
            ClientKind::NightDriver => write!(f, "night_driver"),
            ClientKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A strip driven by a client, and the pin it hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripBinding {
    pub strip: Uuid,
    pub pin: String,
}

fn default_ws_port() -> u16 {
    8765
}

fn default_socket_port() -> u16 {
    49152
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub uuid: Uuid,
    pub name: String,
    /// Host name or IP address
    pub address: String,
    pub kind: ClientKind,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,
    #[serde(default)]
    pub color_order: ColorOrder,
    #[serde(default)]
    pub power_limit_ma: Option<u32>,
    #[serde(default)]
    pub strips: Vec<StripBinding>,
}

impl ClientConfig {
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}", self.address, self.ws_port)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.socket_port)
    }
}
