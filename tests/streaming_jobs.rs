//! Integration tests for per-client streaming jobs.
//!
//! Jobs run against in-memory loopback transports; the test plays the
//! client: it decodes frames, acknowledges them and answers clock requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lightstream::codec::{self, DecodedFrame};
use lightstream::job::{
    ClientLink, Connector, JobContext, JobError, JobFactory, NightDriverLink, NightDriverResponse,
    PiLink, StreamingJob,
};
use lightstream::time_sync::{Clock, SystemClock};
use lightstream::{
    ClientConfig, ClientKind, EffectStatus, JobStatus, LightServer, RgbColor, ServerConfig,
    StreamingJobState,
};
use lightstream_transport::{
    BoxedTransport, Inbound, LoopbackPeer, LoopbackTransport, Outbound, TransportError,
};
use parking_lot::Mutex;
use uuid::Uuid;

const STRIP: &str = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59";
const CLIENT: &str = "5b0c7a52-8a43-4f0e-b1c2-3d4e5f607182";
const EFFECT: &str = "6f1c2b9e-6d55-4c1e-9a55-0b9d7e1f3a10";

/// Hands out pre-made loopback transports, one per connect.
#[derive(Default)]
struct QueueConnector {
    transports: Mutex<VecDeque<LoopbackTransport>>,
}

impl QueueConnector {
    fn push(&self, name: &str) -> LoopbackPeer {
        let (transport, peer) = LoopbackTransport::pair(name);
        self.transports.lock().push_back(transport);
        peer
    }
}

#[async_trait]
impl Connector for QueueConnector {
    async fn connect(&self, client: &ClientConfig) -> Result<BoxedTransport, TransportError> {
        let next = self.transports.lock().pop_front();
        match next {
            Some(transport) => Ok(Arc::new(transport)),
            None => Err(TransportError::ConnectFailed(
                client.address.clone(),
                "no loopback peer queued".into(),
            )),
        }
    }
}

struct LoopbackFactory {
    connector: Arc<QueueConnector>,
}

impl JobFactory for LoopbackFactory {
    fn create(&self, client: &ClientConfig, ctx: &JobContext) -> Result<Arc<StreamingJob>, JobError> {
        let link: Arc<dyn ClientLink> = match client.kind {
            ClientKind::Pi => Arc::new(PiLink::with_connector(self.connector.clone())),
            ClientKind::NightDriver => {
                Arc::new(NightDriverLink::with_connector(self.connector.clone()))
            }
            ClientKind::Unknown => {
                return Err(JobError::UnsupportedClient {
                    client: client.uuid,
                    kind: client.kind,
                })
            }
        };
        Ok(Arc::new(StreamingJob::new(client.clone(), link, ctx.clone())?))
    }
}

fn config(kind: &str, extra_server: &str, strip_extra: &str, effect_status: &str) -> ServerConfig {
    let toml = format!(
        r##"
[server]
fps = 50
time_sync_interval_secs = 1
reconnect_delay_ms = 50
{extra_server}

[[strips]]
type = "single"
uuid = "{STRIP}"
name = "desk"
pin = "18"
length = 3
{strip_extra}

[[clients]]
uuid = "{CLIENT}"
name = "desk client"
address = "127.0.0.1"
kind = "{kind}"
color_order = "grb"
strips = [{{ strip = "{STRIP}", pin = "18" }}]

[[effects]]
uuid = "{EFFECT}"
name = "solid"
strip = "{STRIP}"
status = "{effect_status}"
generator = {{ type = "solid", color = "#102030" }}
"##
    );
    ServerConfig::from_toml(&toml).unwrap()
}

fn server(config: ServerConfig) -> (LightServer, Arc<QueueConnector>) {
    let connector = Arc::new(QueueConnector::default());
    let factory = Arc::new(LoopbackFactory {
        connector: connector.clone(),
    });
    (LightServer::with_factory(config, factory), connector)
}

fn client_uuid() -> Uuid {
    CLIENT.parse().unwrap()
}

fn ack() -> Inbound {
    Inbound::Text(r#"{"type":"ack","sequence":0}"#.to_string())
}

/// Next binary frame from a Pi job, acknowledged. Clock requests are
/// answered with `clock_offset` added to the real time.
async fn next_pi_frame(peer: &mut LoopbackPeer, clock_offset: i64) -> DecodedFrame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(3), peer.next_message())
            .await
            .expect("timed out waiting for a message")
            .expect("server closed the connection");
        match message {
            Outbound::Binary(bytes) => {
                peer.reply(ack());
                return codec::decode(&bytes, true).unwrap();
            }
            Outbound::Text(text) => {
                assert_eq!(text, r#"{"type":"time_request"}"#);
                let millis = SystemClock.now_millis() + clock_offset;
                peer.reply(Inbound::Text(format!(r#"{{"type":"time","millis":{millis}}}"#)));
            }
        }
    }
}

async fn wait_status(server: &LightServer, status: JobStatus) {
    let mut rx = server.jobs().subscribe(client_uuid()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|s| s.status() == status))
        .await
        .expect("status not reached")
        .unwrap();
}

#[tokio::test]
async fn pi_job_streams_reordered_frames() {
    let cfg = config("pi", "", "", "playing");
    let (server, connector) = server(cfg.clone());
    let mut peer = connector.push("pi");

    server.start_job(&cfg.clients[0]).await;
    let frame = next_pi_frame(&mut peer, 0).await;

    assert_eq!(frame.pin.as_deref(), Some("18"));
    assert_eq!(frame.timestamp_ms, 0);
    assert!(!frame.clear_buffer);
    // #102030 in GRB order
    assert_eq!(frame.pixels, vec![RgbColor::new(0x20, 0x10, 0x30); 3]);

    next_pi_frame(&mut peer, 0).await;
    wait_status(&server, JobStatus::RenderingEffect).await;

    server.stop_job(client_uuid()).await;
    assert!(!peer.is_open());
    assert!(server.jobs().running_jobs().await.is_empty());
}

#[tokio::test]
async fn idle_until_an_effect_starts() {
    let cfg = config("pi", "", "", "paused");
    let (server, connector) = server(cfg.clone());
    let mut peer = connector.push("pi");

    server.start_job(&cfg.clients[0]).await;
    wait_status(&server, JobStatus::ConnectedIdle).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Some(message) = peer.try_next_message() {
        assert!(matches!(message, Outbound::Text(_)), "blank frames must not be sent");
    }

    server
        .effects()
        .set_status(EFFECT.parse().unwrap(), EffectStatus::Activated);
    let frame = next_pi_frame(&mut peer, 0).await;
    assert_eq!(frame.pixels.len(), 3);
    wait_status(&server, JobStatus::RenderingEffect).await;

    server.shutdown().await;
}

#[tokio::test]
async fn power_limit_scales_frames() {
    let cfg = config("pi", "", "power_limit_ma = 10", "playing");
    let (server, connector) = server(cfg.clone());
    let mut peer = connector.push("pi");

    server.start_job(&cfg.clients[0]).await;
    let frame = next_pi_frame(&mut peer, 0).await;
    let draw = lightstream::power::estimate_draw_ma(&frame.pixels);
    assert!(draw <= 10.0, "draw {draw}mA over budget");
    assert!(frame.pixels[0].channel_sum() > 0);

    server.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_client_drops() {
    let cfg = config("pi", "", "", "playing");
    let connector = Arc::new(QueueConnector::default());
    let factory = Arc::new(LoopbackFactory {
        connector: connector.clone(),
    });
    let drops = Arc::new(AtomicUsize::new(0));
    let counter = drops.clone();
    let server = LightServer::with_context(cfg.clone(), factory, move |ctx| {
        ctx.with_disconnect_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    });

    let mut first = connector.push("first");
    let mut second = connector.push("second");
    server.start_job(&cfg.clients[0]).await;

    next_pi_frame(&mut first, 0).await;
    first.disconnect();

    let frame = next_pi_frame(&mut second, 0).await;
    assert_eq!(frame.pixels.len(), 3);
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_client_goes_offline() {
    let cfg = config("pi", "", "", "playing");
    let (server, _connector) = server(cfg.clone());
    server.start_job(&cfg.clients[0]).await;
    wait_status(&server, JobStatus::Offline).await;
    server.shutdown().await;
}

#[tokio::test]
async fn time_sync_schedules_frames_ahead() {
    let cfg = config("pi", "frame_delay_ms = 500", "", "playing");
    let (server, connector) = server(cfg.clone());
    let mut peer = connector.push("pi");
    server.start_job(&cfg.clients[0]).await;

    let started = SystemClock.now_millis();
    let mut stamped = None;
    for _ in 0..200 {
        let frame = next_pi_frame(&mut peer, 10_000).await;
        if frame.timestamp_ms > 0 {
            stamped = Some(frame.timestamp_ms as i64);
            break;
        }
    }
    let stamped = stamped.expect("no frame was scheduled");
    assert!(stamped >= started + 10_000, "timestamp {stamped} not on client clock");

    let job = server.jobs().job(client_uuid()).await.unwrap();
    let sync = job.time_sync();
    assert!(sync.is_synced());
    assert!((9_000..=10_000).contains(&sync.client_time_offset));

    server.shutdown().await;
}

#[tokio::test]
async fn nightdriver_responses_ack_and_update_state() {
    let cfg = config("night_driver", "", "", "playing");
    let (server, connector) = server(cfg.clone());
    let mut peer = connector.push("nightdriver");
    server.start_job(&cfg.clients[0]).await;

    let response = NightDriverResponse {
        size: 64,
        flash_version: 40,
        current_clock: SystemClock.now_millis() as f64 / 1000.0,
        oldest_packet: 0.0,
        newest_packet: 0.0,
        brightness: 255.0,
        wifi_signal: -55.0,
        buffer_size: 100,
        buffer_pos: 1,
        fps_drawing: 50,
        watts: 3,
    };

    for _ in 0..3 {
        let message = tokio::time::timeout(Duration::from_secs(3), peer.next_message())
            .await
            .unwrap()
            .unwrap();
        let Outbound::Binary(bytes) = message else {
            panic!("nightdriver clients only get binary frames");
        };
        let frame = codec::decode(&bytes, false).unwrap();
        assert_eq!(frame.pin, None);
        assert_eq!(frame.pixels.len(), 3);
        peer.reply(Inbound::Binary(response.to_bytes().to_vec()));
    }

    let mut rx = server.jobs().subscribe(client_uuid()).await.unwrap();
    let state = tokio::time::timeout(
        Duration::from_secs(3),
        rx.wait_for(|s| {
            matches!(
                s,
                StreamingJobState::NightDriver {
                    last_response: Some(_),
                    ..
                }
            )
        }),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(state.kind(), ClientKind::NightDriver);

    server.shutdown().await;
}

#[tokio::test]
async fn unsupported_client_is_not_started() {
    let cfg = config("esp8266", "", "", "playing");
    let (server, _connector) = server(cfg.clone());
    server.start_job(&cfg.clients[0]).await;
    assert!(server.jobs().running_jobs().await.is_empty());
}

#[tokio::test]
async fn update_job_rebinds_strips() {
    let cfg = config("pi", "", "", "playing");
    let (server, connector) = server(cfg.clone());
    let mut peer = connector.push("pi");

    let mut unbound = cfg.clients[0].clone();
    unbound.strips.clear();
    server.start_job(&unbound).await;
    wait_status(&server, JobStatus::SetupIncomplete).await;

    server.update_job(&cfg.clients[0]).await;
    let frame = next_pi_frame(&mut peer, 0).await;
    assert_eq!(frame.pixels.len(), 3);

    server.shutdown().await;
}

#[tokio::test]
async fn client_power_limit_follows_client_updates() {
    let cfg = config("pi", "", "", "playing");
    let (server, _connector) = server(cfg.clone());
    let strip: Uuid = STRIP.parse().unwrap();

    let mut client = cfg.clients[0].clone();
    client.power_limit_ma = Some(50);
    server.start_job(&client).await;
    assert_eq!(server.power().get_limit(strip), Some(50));

    client.power_limit_ma = Some(80);
    server.update_job(&client).await;
    assert_eq!(server.power().get_limit(strip), Some(80));

    client.power_limit_ma = None;
    server.update_job(&client).await;
    assert_eq!(server.power().get_limit(strip), None);

    client.power_limit_ma = Some(60);
    server.update_job(&client).await;
    client.strips.clear();
    server.update_job(&client).await;
    assert_eq!(server.power().get_limit(strip), None);

    client.strips = cfg.clients[0].strips.clone();
    server.update_job(&client).await;
    assert_eq!(server.power().get_limit(strip), Some(60));
    server.stop_job(client.uuid).await;
    assert_eq!(server.power().get_limit(strip), None);

    server.shutdown().await;
}

#[tokio::test]
async fn strip_power_limit_outlives_client_limit() {
    let cfg = config("pi", "", "power_limit_ma = 10", "playing");
    let (server, _connector) = server(cfg.clone());
    let strip: Uuid = STRIP.parse().unwrap();

    let mut client = cfg.clients[0].clone();
    client.power_limit_ma = Some(500);
    server.start_job(&client).await;
    assert_eq!(server.power().get_limit(strip), Some(10));
    server.stop_job(client.uuid).await;
    assert_eq!(server.power().get_limit(strip), Some(10));

    server.shutdown().await;
}

#[tokio::test]
async fn time_request_waits_for_frame_ack() {
    let cfg = config("pi", "ack_timeout_ms = 4000", "", "playing");
    let (server, connector) = server(cfg.clone());
    let mut peer = connector.push("pi");
    server.start_job(&cfg.clients[0]).await;

    // Answer clock requests until the first frame, then leave it unacknowledged
    loop {
        let message = tokio::time::timeout(Duration::from_secs(3), peer.next_message())
            .await
            .expect("timed out waiting for a message")
            .expect("server closed the connection");
        match message {
            Outbound::Binary(_) => break,
            Outbound::Text(_) => {
                let millis = SystemClock.now_millis();
                peer.reply(Inbound::Text(format!(r#"{{"type":"time","millis":{millis}}}"#)));
            }
        }
    }

    // A clock sync tick falls inside this window; nothing may be sent
    let quiet = tokio::time::timeout(Duration::from_secs(2), peer.next_message()).await;
    assert!(quiet.is_err(), "sent while a frame was unacknowledged");

    peer.reply(ack());
    let next = tokio::time::timeout(Duration::from_secs(3), peer.next_message()).await;
    assert!(matches!(next, Ok(Some(_))));

    server.shutdown().await;
}
