//! Raw TCP socket transport (NightDriver clients)
//!
//! NightDriver firmware accepts frame payloads on a plain TCP port and
//! answers each one with a fixed-size little-endian status packet, so reads
//! are framed by a known response size.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{is_disconnect_kind, TransportError};
use crate::{Inbound, Outbound, Transport};

pub struct SocketTransport {
    peer: String,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    response_size: usize,
    connected: AtomicBool,
}

impl SocketTransport {
    /// Connect to `addr` (`host:port`); every reply is `response_size` bytes.
    pub async fn connect(addr: &str, response_size: usize) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectFailed(addr.to_string(), e.to_string()))?;
        stream.set_nodelay(true)?;
        debug!(addr, "socket connected");
        Ok(Self::from_stream(addr.to_string(), stream, response_size))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(peer: String, stream: TcpStream, response_size: usize) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            response_size: response_size.max(1),
            connected: AtomicBool::new(true),
        }
    }

    fn fail(&self, e: std::io::Error) -> TransportError {
        let err = TransportError::Io(e);
        if err.is_disconnect() {
            self.connected.store(false, Ordering::SeqCst);
            TransportError::Disconnected
        } else {
            err
        }
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn send(&self, message: Outbound) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let bytes = match message {
            Outbound::Binary(bytes) => bytes,
            Outbound::Text(text) => text.into_bytes(),
        };
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await.map_err(|e| self.fail(e))?;
        writer.flush().await.map_err(|e| self.fail(e))
    }

    async fn recv(&self) -> Result<Inbound, TransportError> {
        let mut reader = self.reader.lock().await;
        let mut buf = vec![0u8; self.response_size];
        reader.read_exact(&mut buf).await.map_err(|e| self.fail(e))?;
        Ok(Inbound::Binary(buf))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect_kind(e.kind()) => Ok(()),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_and_fixed_size_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(&[9, 8, 7, 6, 5, 4]).await.unwrap();
            buf
        });

        let transport = SocketTransport::connect(&addr, 3).await.unwrap();
        transport
            .send(Outbound::Binary(vec![1, 2, 3, 4]))
            .await
            .unwrap();

        assert_eq!(transport.recv().await.unwrap(), Inbound::Binary(vec![9, 8, 7]));
        assert_eq!(transport.recv().await.unwrap(), Inbound::Binary(vec![6, 5, 4]));
        assert_eq!(server.await.unwrap(), [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_peer_hangup_is_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let transport = SocketTransport::connect(&addr, 8).await.unwrap();
        server.await.unwrap();

        let err = transport.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = SocketTransport::connect(&addr, 8).await.err().unwrap();
        assert!(matches!(err, TransportError::ConnectFailed(_, _)));
    }
}
