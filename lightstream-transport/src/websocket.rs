//! WebSocket transport (Raspberry Pi clients)
//!
//! The server dials the client's WebSocket endpoint and keeps the connection
//! open. Frames go out as binary messages, control traffic as text.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::{Inbound, Outbound, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    url: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    connected: AtomicBool,
}

impl WebSocketTransport {
    /// Dial `url` (e.g. `ws://10.0.0.12:8765/`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(url.to_string(), e.to_string()))?;
        debug!(url, "websocket connected");

        let (sink, stream) = ws.split();
        Ok(Self {
            url: url.to_string(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            connected: AtomicBool::new(true),
        })
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, message: Outbound) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let message = match message {
            Outbound::Binary(bytes) => Message::binary(bytes),
            Outbound::Text(text) => Message::text(text),
        };
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(|e| {
            self.mark_disconnected();
            TransportError::from(e)
        })
    }

    async fn recv(&self) -> Result<Inbound, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(Inbound::Binary(bytes.to_vec())),
                Some(Ok(Message::Text(text))) => return Ok(Inbound::Text(text.to_string())),
                Some(Ok(Message::Close(frame))) => {
                    debug!(url = %self.url, ?frame, "websocket closed by peer");
                    self.mark_disconnected();
                    return Err(TransportError::Disconnected);
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(other)) => trace!(url = %self.url, ?other, "ignoring control message"),
                Some(Err(e)) => {
                    self.mark_disconnected();
                    return Err(e.into());
                }
                None => {
                    self.mark_disconnected();
                    return Err(TransportError::Disconnected);
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) => Ok(()),
            Err(e) => match TransportError::from(e) {
                TransportError::Disconnected => Ok(()),
                other => Err(other),
            },
        }
    }

    fn peer(&self) -> &str {
        &self.url
    }
}
