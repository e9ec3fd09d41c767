//! Transport abstraction layer for LED strip clients
//!
//! This crate provides a unified interface for pushing frame payloads to
//! strip controllers and reading their replies, regardless of the wire:
//!
//! - WebSocket (Raspberry Pi clients)
//! - Raw TCP socket (NightDriver ESP32 firmware)
//! - Loopback (in-memory pair, for tests and dry runs)
//!
//! `AckGate` adds the one-in-flight send discipline on top of any transport.

pub mod error;
pub mod flow_control;
pub mod loopback;
pub mod socket;
pub mod websocket;

pub use error::TransportError;
pub use flow_control::AckGate;
pub use loopback::{LoopbackPeer, LoopbackTransport};
pub use socket::SocketTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use std::sync::Arc;

/// A message sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Binary payload (encoded frames)
    Binary(Vec<u8>),
    /// Text payload (control messages)
    Text(String),
}

impl Outbound {
    pub fn len(&self) -> usize {
        match self {
            Outbound::Binary(b) => b.len(),
            Outbound::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A message received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Binary(Vec<u8>),
    Text(String),
}

/// The core transport trait - all backends implement this
///
/// `send` may be called concurrently from several tasks; implementations
/// serialize writes internally. `recv` is meant for a single reader task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message to the client
    async fn send(&self, message: Outbound) -> Result<(), TransportError>;

    /// Wait for the next message from the client
    ///
    /// Returns `TransportError::Disconnected` once the peer has gone away.
    async fn recv(&self) -> Result<Inbound, TransportError>;

    /// Check if transport is still connected
    fn is_connected(&self) -> bool;

    /// Close the transport gracefully. Safe to call more than once.
    async fn close(&self) -> Result<(), TransportError>;

    /// Human readable peer address (for logs)
    fn peer(&self) -> &str;
}

/// Type alias for a shared transport
pub type BoxedTransport = Arc<dyn Transport>;
