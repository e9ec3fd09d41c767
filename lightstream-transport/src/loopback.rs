//! In-memory transport pair
//!
//! `LoopbackTransport` is the server end; `LoopbackPeer` plays the client.
//! Used by tests and by `--dry-run` style tooling that has no hardware.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::TransportError;
use crate::{Inbound, Outbound, Transport};

pub struct LoopbackTransport {
    name: String,
    to_peer: mpsc::UnboundedSender<Outbound>,
    from_peer: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    open: Arc<watch::Sender<bool>>,
}

/// Client side of a loopback pair
pub struct LoopbackPeer {
    received: mpsc::UnboundedReceiver<Outbound>,
    reply: mpsc::UnboundedSender<Inbound>,
    open: Arc<watch::Sender<bool>>,
}

impl LoopbackTransport {
    /// Create a connected transport/peer pair.
    pub fn pair(name: &str) -> (LoopbackTransport, LoopbackPeer) {
        let (to_peer, received) = mpsc::unbounded_channel();
        let (reply, from_peer) = mpsc::unbounded_channel();
        let (open, _) = watch::channel(true);
        let open = Arc::new(open);

        let transport = LoopbackTransport {
            name: name.to_string(),
            to_peer,
            from_peer: Mutex::new(from_peer),
            open: Arc::clone(&open),
        };
        let peer = LoopbackPeer {
            received,
            reply,
            open,
        };
        (transport, peer)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: Outbound) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.to_peer
            .send(message)
            .map_err(|_| TransportError::Disconnected)
    }

    async fn recv(&self) -> Result<Inbound, TransportError> {
        let mut closed = self.open.subscribe();
        let mut rx = self.from_peer.lock().await;
        tokio::select! {
            msg = rx.recv() => msg.ok_or(TransportError::Disconnected),
            _ = async { closed.wait_for(|open| !*open).await.is_ok() } => {
                Err(TransportError::Disconnected)
            }
        }
    }

    fn is_connected(&self) -> bool {
        *self.open.borrow() && !self.to_peer.is_closed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.send_replace(false);
        Ok(())
    }

    fn peer(&self) -> &str {
        &self.name
    }
}

impl LoopbackPeer {
    /// Next message the server sent, or `None` once the server side is gone.
    pub async fn next_message(&mut self) -> Option<Outbound> {
        self.received.recv().await
    }

    /// Non-blocking variant of `next_message`.
    pub fn try_next_message(&mut self) -> Option<Outbound> {
        self.received.try_recv().ok()
    }

    /// Send a reply to the server. Returns false if the server closed.
    pub fn reply(&self, message: Inbound) -> bool {
        *self.open.borrow() && self.reply.send(message).is_ok()
    }

    /// True while the server side has not closed the connection.
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Simulate the client dropping off the network.
    pub fn disconnect(self) {
        self.open.send_replace(false);
    }
}
