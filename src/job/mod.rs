//! Per-client streaming jobs.
//!
//! Every client gets one background job that renders its bound strips at
//! the configured frame rate, encodes the frames for the client's protocol
//! and pushes them over a persistent connection. `StreamingJobManager` owns
//! the jobs; `ClientLink` adapts a job to one client protocol.
//!
//! ```text
//!   SetupIncomplete ──strips bound──► WaitingForConnection ──fail──► Offline
//!                                         │    ▲                      │
//!                                   connected  └──── retry delay ─────┘
//!                                         ▼
//!                     ConnectedIdle ◄──all blank── RenderingEffect
//!                          │  ▲                          ▲
//!                          │  └──────────────────────────┘ frames sent
//!                          └── transport error ──► WaitingForConnection
//! ```

pub mod manager;
pub mod nightdriver;
pub mod pi;
pub mod runner;
pub mod state;

pub use manager::StreamingJobManager;
pub use nightdriver::{NightDriverLink, NightDriverResponse, SocketConnector};
pub use pi::{PiLink, PiMessage, PiResponse, WebSocketConnector};
pub use runner::StreamingJob;
pub use state::{ClientResponse, JobStatus, StreamingJobState};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lightstream_transport::{BoxedTransport, Inbound, Outbound, TransportError};
use thiserror::Error;
use uuid::Uuid;

use crate::client::{ClientConfig, ClientKind, StripBinding};
use crate::codec::CodecError;
use crate::config::ServerSettings;
use crate::power::PowerLimiter;
use crate::render::{RenderedFrame, Renderer};
use crate::time_sync::{Clock, SystemClock};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("client {client} has unsupported type {kind}")]
    UnsupportedClient { client: Uuid, kind: ClientKind },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What one inbound client message means to the job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientReply {
    /// Acknowledges the frame in flight
    pub ack: bool,
    /// Client clock in epoch ms
    pub clock_millis: Option<i64>,
    pub response: Option<ClientResponse>,
}

/// Opens a transport to a client.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, client: &ClientConfig) -> Result<BoxedTransport, TransportError>;
}

/// Protocol adapter for one client type.
#[async_trait]
pub trait ClientLink: Send + Sync {
    fn kind(&self) -> ClientKind;

    async fn connect(&self, client: &ClientConfig) -> Result<BoxedTransport, TransportError>;

    fn encode_frame(
        &self,
        frame: &RenderedFrame,
        binding: &StripBinding,
    ) -> Result<Outbound, CodecError>;

    /// Message asking the client for its clock, if the protocol has one.
    fn time_request(&self) -> Option<Outbound>;

    fn parse_reply(&self, message: Inbound) -> Result<ClientReply, JobError>;
}

/// Timing knobs shared by all jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub fps: u32,
    pub ack_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub time_sync_interval: Duration,
    /// Added to the client clock when stamping frames; 0 = display on arrival
    pub frame_delay_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for StreamSettings {
    fn from(s: &ServerSettings) -> Self {
        Self {
            fps: s.fps.max(1),
            ack_timeout: Duration::from_millis(s.ack_timeout_ms),
            connect_timeout: Duration::from_millis(s.connect_timeout_ms),
            reconnect_delay: Duration::from_millis(s.reconnect_delay_ms),
            time_sync_interval: Duration::from_secs(s.time_sync_interval_secs.max(1)),
            frame_delay_ms: s.frame_delay_ms,
        }
    }
}

impl StreamSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Called with the client uuid whenever a job loses its connection.
pub type DisconnectCallback = Arc<dyn Fn(Uuid) + Send + Sync>;

/// Shared services every job needs.
#[derive(Clone)]
pub struct JobContext {
    pub renderer: Renderer,
    pub power: Arc<PowerLimiter>,
    pub settings: StreamSettings,
    pub clock: Arc<dyn Clock>,
    pub on_disconnect: Option<DisconnectCallback>,
}

impl JobContext {
    pub fn new(renderer: Renderer, power: Arc<PowerLimiter>, settings: StreamSettings) -> Self {
        Self {
            renderer,
            power,
            settings,
            clock: Arc::new(SystemClock),
            on_disconnect: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_disconnect_callback(mut self, callback: DisconnectCallback) -> Self {
        self.on_disconnect = Some(callback);
        self
    }
}

/// Builds the job for a client.
pub trait JobFactory: Send + Sync {
    fn create(&self, client: &ClientConfig, ctx: &JobContext) -> Result<Arc<StreamingJob>, JobError>;
}

/// Picks the protocol by client kind: Pi over WebSocket, NightDriver over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultJobFactory;

impl JobFactory for DefaultJobFactory {
    fn create(&self, client: &ClientConfig, ctx: &JobContext) -> Result<Arc<StreamingJob>, JobError> {
        let link: Arc<dyn ClientLink> = match client.kind {
            ClientKind::Pi => Arc::new(PiLink::new()),
            ClientKind::NightDriver => Arc::new(NightDriverLink::new()),
            ClientKind::Unknown => {
                return Err(JobError::UnsupportedClient {
                    client: client.uuid,
                    kind: client.kind,
                })
            }
        };
        StreamingJob::new(client.clone(), link, ctx.clone()).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::ActiveEffectRegistry;
    use crate::strip::StripStore;

    fn context() -> JobContext {
        let renderer = Renderer::new(Arc::new(ActiveEffectRegistry::new()), Arc::new(StripStore::new()));
        JobContext::new(renderer, Arc::new(PowerLimiter::new()), StreamSettings::default())
    }

    fn client(kind: ClientKind) -> ClientConfig {
        ClientConfig {
            uuid: Uuid::new_v4(),
            name: "c".into(),
            address: "127.0.0.1".into(),
            kind,
            ws_port: 8765,
            socket_port: 49152,
            color_order: Default::default(),
            power_limit_ma: None,
            strips: vec![],
        }
    }

    #[test]
    fn test_factory_selects_by_kind() {
        let ctx = context();
        let pi = DefaultJobFactory.create(&client(ClientKind::Pi), &ctx).unwrap();
        assert_eq!(pi.state().kind(), ClientKind::Pi);
        let nd = DefaultJobFactory
            .create(&client(ClientKind::NightDriver), &ctx)
            .unwrap();
        assert_eq!(nd.state().kind(), ClientKind::NightDriver);
        assert!(matches!(
            DefaultJobFactory.create(&client(ClientKind::Unknown), &ctx),
            Err(JobError::UnsupportedClient { .. })
        ));
    }

    #[test]
    fn test_settings_defaults() {
        let s = StreamSettings::default();
        assert_eq!(s.fps, 30);
        assert_eq!(s.ack_timeout, Duration::from_secs(5));
        assert_eq!(s.time_sync_interval, Duration::from_secs(60));
        assert_eq!(s.frame_delay_ms, 0);
    }
}
