//! Raspberry Pi client protocol.
//!
//! Frames go out as binary WebSocket messages in the per-pin wire variant.
//! Control traffic is JSON text:
//!
//! ```text
//! server → client   {"type":"time_request"}
//! client → server   {"type":"ack","sequence":12}
//!                   {"type":"time","millis":1718000000000}
//!                   {"type":"status","fps":29.8,"queued":1}
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use lightstream_transport::{BoxedTransport, Inbound, Outbound, TransportError, WebSocketTransport};
use serde::{Deserialize, Serialize};

use super::state::ClientResponse;
use super::{ClientLink, ClientReply, Connector, JobError};
use crate::client::{ClientConfig, ClientKind, StripBinding};
use crate::codec::{self, CodecError, FrameEncodeOptions};
use crate::render::RenderedFrame;

/// Last status report from a Pi client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiResponse {
    pub fps: f32,
    pub queued: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PiMessage {
    TimeRequest,
    Ack { sequence: i16 },
    Time { millis: i64 },
    Status { fps: f32, queued: u32 },
}

/// Opens WebSocket connections to `ws://address:ws_port`.
#[derive(Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, client: &ClientConfig) -> Result<BoxedTransport, TransportError> {
        let transport = WebSocketTransport::connect(&client.websocket_url()).await?;
        Ok(Arc::new(transport))
    }
}

pub struct PiLink {
    connector: Arc<dyn Connector>,
}

impl PiLink {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(WebSocketConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

impl Default for PiLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientLink for PiLink {
    fn kind(&self) -> ClientKind {
        ClientKind::Pi
    }

    async fn connect(&self, client: &ClientConfig) -> Result<BoxedTransport, TransportError> {
        self.connector.connect(client).await
    }

    fn encode_frame(
        &self,
        frame: &RenderedFrame,
        binding: &StripBinding,
    ) -> Result<Outbound, CodecError> {
        let options = FrameEncodeOptions {
            clear_buffer: false,
            pin: Some(binding.pin.clone()),
        };
        codec::encode(frame, &options).map(Outbound::Binary)
    }

    fn time_request(&self) -> Option<Outbound> {
        serde_json::to_string(&PiMessage::TimeRequest)
            .ok()
            .map(Outbound::Text)
    }

    fn parse_reply(&self, message: Inbound) -> Result<ClientReply, JobError> {
        let Inbound::Text(text) = message else {
            return Ok(ClientReply::default());
        };
        let message: PiMessage = serde_json::from_str(&text)
            .map_err(|e| JobError::Protocol(format!("bad pi message {text:?}: {e}")))?;
        Ok(match message {
            PiMessage::Ack { .. } => ClientReply {
                ack: true,
                ..Default::default()
            },
            PiMessage::Time { millis } => ClientReply {
                clock_millis: Some(millis),
                ..Default::default()
            },
            PiMessage::Status { fps, queued } => ClientReply {
                response: Some(ClientResponse::Pi(PiResponse { fps, queued })),
                ..Default::default()
            },
            PiMessage::TimeRequest => ClientReply::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RgbColor;
    use uuid::Uuid;

    #[test]
    fn test_time_request_json() {
        let link = PiLink::new();
        assert_eq!(
            link.time_request(),
            Some(Outbound::Text(r#"{"type":"time_request"}"#.to_string()))
        );
    }

    #[test]
    fn test_parse_replies() {
        let link = PiLink::new();
        let ack = link
            .parse_reply(Inbound::Text(r#"{"type":"ack","sequence":3}"#.into()))
            .unwrap();
        assert!(ack.ack);

        let time = link
            .parse_reply(Inbound::Text(r#"{"type":"time","millis":1700000000000}"#.into()))
            .unwrap();
        assert_eq!(time.clock_millis, Some(1700000000000));
        assert!(!time.ack);

        let status = link
            .parse_reply(Inbound::Text(r#"{"type":"status","fps":30.0,"queued":4}"#.into()))
            .unwrap();
        assert_eq!(
            status.response,
            Some(ClientResponse::Pi(PiResponse { fps: 30.0, queued: 4 }))
        );

        assert!(link.parse_reply(Inbound::Text("nope".into())).is_err());
    }

    #[test]
    fn test_frames_carry_pin() {
        let link = PiLink::new();
        let frame = RenderedFrame {
            timestamp_ms: 0,
            strip_uuid: Uuid::new_v4(),
            pixels: vec![RgbColor::new(1, 2, 3)],
            sequence_number: 1,
        };
        let binding = StripBinding {
            strip: frame.strip_uuid,
            pin: "D4".into(),
        };
        let Outbound::Binary(bytes) = link.encode_frame(&frame, &binding).unwrap() else {
            panic!("expected binary frame");
        };
        assert_eq!(&bytes[1..5], b"D4  ");
        assert_eq!(bytes.len(), 1 + 4 + 8 + 3);

        let bad = StripBinding {
            strip: frame.strip_uuid,
            pin: "GPIO18".into(),
        };
        assert!(link.encode_frame(&frame, &bad).is_err());
    }
}
