//! NightDriver (ESP32) client protocol.
//!
//! Frames are written raw to a TCP socket without the pin field. The
//! firmware answers every frame with a fixed 64-byte little-endian status
//! packet, which doubles as the acknowledgment and carries its clock.
//!
//! ```text
//! off  type  field
//!   0  u32   size (64)
//!   4  u32   flash_version
//!   8  f64   current_clock   (seconds since epoch)
//!  16  f64   oldest_packet
//!  24  f64   newest_packet
//!  32  f64   brightness
//!  40  f64   wifi_signal
//!  48  u32   buffer_size
//!  52  u32   buffer_pos
//!  56  u32   fps_drawing
//!  60  u32   watts
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use lightstream_transport::{BoxedTransport, Inbound, Outbound, SocketTransport, TransportError};

use super::state::ClientResponse;
use super::{ClientLink, ClientReply, Connector, JobError};
use crate::client::{ClientConfig, ClientKind, StripBinding};
use crate::codec::{self, CodecError, FrameEncodeOptions};
use crate::render::RenderedFrame;

pub const RESPONSE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct NightDriverResponse {
    pub size: u32,
    pub flash_version: u32,
    pub current_clock: f64,
    pub oldest_packet: f64,
    pub newest_packet: f64,
    pub brightness: f64,
    pub wifi_signal: f64,
    pub buffer_size: u32,
    pub buffer_pos: u32,
    pub fps_drawing: u32,
    pub watts: u32,
}

impl NightDriverResponse {
    pub fn parse(bytes: &[u8]) -> Result<Self, JobError> {
        if bytes.len() < RESPONSE_SIZE {
            return Err(JobError::Protocol(format!(
                "nightdriver response is {} bytes, expected {}",
                bytes.len(),
                RESPONSE_SIZE
            )));
        }
        let u32_at = |off: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[off..off + 4]);
            u32::from_le_bytes(b)
        };
        let f64_at = |off: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[off..off + 8]);
            f64::from_le_bytes(b)
        };
        Ok(Self {
            size: u32_at(0),
            flash_version: u32_at(4),
            current_clock: f64_at(8),
            oldest_packet: f64_at(16),
            newest_packet: f64_at(24),
            brightness: f64_at(32),
            wifi_signal: f64_at(40),
            buffer_size: u32_at(48),
            buffer_pos: u32_at(52),
            fps_drawing: u32_at(56),
            watts: u32_at(60),
        })
    }

    /// Client clock in epoch milliseconds, if the firmware reported one.
    pub fn clock_millis(&self) -> Option<i64> {
        (self.current_clock.is_finite() && self.current_clock > 0.0)
            .then(|| (self.current_clock * 1000.0) as i64)
    }

    pub fn to_bytes(&self) -> [u8; RESPONSE_SIZE] {
        let mut out = [0u8; RESPONSE_SIZE];
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.flash_version.to_le_bytes());
        out[8..16].copy_from_slice(&self.current_clock.to_le_bytes());
        out[16..24].copy_from_slice(&self.oldest_packet.to_le_bytes());
        out[24..32].copy_from_slice(&self.newest_packet.to_le_bytes());
        out[32..40].copy_from_slice(&self.brightness.to_le_bytes());
        out[40..48].copy_from_slice(&self.wifi_signal.to_le_bytes());
        out[48..52].copy_from_slice(&self.buffer_size.to_le_bytes());
        out[52..56].copy_from_slice(&self.buffer_pos.to_le_bytes());
        out[56..60].copy_from_slice(&self.fps_drawing.to_le_bytes());
        out[60..64].copy_from_slice(&self.watts.to_le_bytes());
        out
    }
}

/// Opens TCP connections to `address:socket_port`.
#[derive(Debug, Default)]
pub struct SocketConnector;

#[async_trait]
impl Connector for SocketConnector {
    async fn connect(&self, client: &ClientConfig) -> Result<BoxedTransport, TransportError> {
        let transport = SocketTransport::connect(&client.socket_addr(), RESPONSE_SIZE).await?;
        Ok(Arc::new(transport))
    }
}

pub struct NightDriverLink {
    connector: Arc<dyn Connector>,
}

impl NightDriverLink {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(SocketConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

impl Default for NightDriverLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientLink for NightDriverLink {
    fn kind(&self) -> ClientKind {
        ClientKind::NightDriver
    }

    async fn connect(&self, client: &ClientConfig) -> Result<BoxedTransport, TransportError> {
        self.connector.connect(client).await
    }

    fn encode_frame(
        &self,
        frame: &RenderedFrame,
        _binding: &StripBinding,
    ) -> Result<Outbound, CodecError> {
        codec::encode(frame, &FrameEncodeOptions::default()).map(Outbound::Binary)
    }

    /// The clock arrives with every response; nothing to ask for.
    fn time_request(&self) -> Option<Outbound> {
        None
    }

    fn parse_reply(&self, message: Inbound) -> Result<ClientReply, JobError> {
        let Inbound::Binary(bytes) = message else {
            return Ok(ClientReply::default());
        };
        let response = NightDriverResponse::parse(&bytes)?;
        Ok(ClientReply {
            ack: true,
            clock_millis: response.clock_millis(),
            response: Some(ClientResponse::NightDriver(response)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NightDriverResponse {
        NightDriverResponse {
            size: RESPONSE_SIZE as u32,
            flash_version: 40,
            current_clock: 1_718_000_000.25,
            oldest_packet: 0.1,
            newest_packet: 0.9,
            brightness: 255.0,
            wifi_signal: -61.0,
            buffer_size: 500,
            buffer_pos: 12,
            fps_drawing: 30,
            watts: 7,
        }
    }

    #[test]
    fn test_parse_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..4], &64u32.to_le_bytes());
        assert_eq!(&bytes[60..64], &7u32.to_le_bytes());
        assert_eq!(NightDriverResponse::parse(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_short_response_rejected() {
        assert!(NightDriverResponse::parse(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_every_response_acks_with_clock() {
        let link = NightDriverLink::new();
        let reply = link
            .parse_reply(Inbound::Binary(sample().to_bytes().to_vec()))
            .unwrap();
        assert!(reply.ack);
        assert_eq!(reply.clock_millis, Some(1_718_000_000_250));
        assert!(matches!(reply.response, Some(ClientResponse::NightDriver(_))));
    }

    #[test]
    fn test_zero_clock_is_unavailable() {
        let mut r = sample();
        r.current_clock = 0.0;
        assert_eq!(r.clock_millis(), None);
    }
}
