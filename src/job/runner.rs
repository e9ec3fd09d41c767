//! The per-client streaming loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lightstream_transport::{AckGate, BoxedTransport, TransportError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::state::{JobStatus, StreamingJobState};
use super::{ClientLink, ClientReply, JobContext, JobError};
use crate::client::ClientConfig;
use crate::render::{RenderedFrame, SequenceCounter};
use crate::time_sync::ClientTimeSync;

/// One client's streaming job. Driven by `run`, controlled by the manager.
pub struct StreamingJob {
    uuid: Uuid,
    client: RwLock<ClientConfig>,
    link: Arc<dyn ClientLink>,
    ctx: JobContext,
    state: watch::Sender<StreamingJobState>,
    config_changed: Notify,
    transport: Mutex<Option<BoxedTransport>>,
    gate: AckGate,
    /// Latest clock value reported by the client
    clock_readings: watch::Sender<Option<i64>>,
    time_sync: Mutex<ClientTimeSync>,
    disposed: AtomicBool,
}

impl StreamingJob {
    pub fn new(
        client: ClientConfig,
        link: Arc<dyn ClientLink>,
        ctx: JobContext,
    ) -> Result<Self, JobError> {
        let initial = StreamingJobState::for_kind(link.kind(), JobStatus::SetupIncomplete).ok_or(
            JobError::UnsupportedClient {
                client: client.uuid,
                kind: link.kind(),
            },
        )?;
        let (state, _) = watch::channel(initial);
        let (clock_readings, _) = watch::channel(None);
        Ok(Self {
            uuid: client.uuid,
            client: RwLock::new(client),
            link,
            gate: AckGate::new(ctx.settings.ack_timeout),
            ctx,
            state,
            config_changed: Notify::new(),
            transport: Mutex::new(None),
            clock_readings,
            time_sync: Mutex::new(ClientTimeSync::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn client(&self) -> ClientConfig {
        self.client.read().clone()
    }

    pub fn state(&self) -> StreamingJobState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamingJobState> {
        self.state.subscribe()
    }

    pub fn time_sync(&self) -> ClientTimeSync {
        *self.time_sync.lock()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Apply new client settings. Strip bindings take effect on the next
    /// tick; address and port changes on the next connect.
    pub fn on_client_updated(&self, client: ClientConfig) {
        info!(client = %self.uuid, strips = client.strips.len(), "client settings updated");
        *self.client.write() = client;
        self.config_changed.notify_one();
    }

    /// Close the transport and stop sending. The task itself is cancelled
    /// separately by the owner.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                warn!(client = %self.uuid, error = %e, "closing transport failed");
            }
        }
        self.config_changed.notify_one();
    }

    fn set_status(&self, status: JobStatus) {
        self.state.send_if_modified(|state| {
            if state.status() == status {
                return false;
            }
            info!(client = %self.uuid, from = ?state.status(), to = ?status, "job status");
            *state = state.with_status(status);
            true
        });
    }

    /// Job main loop. Returns when cancelled or disposed.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(client = %self.uuid, kind = %self.link.kind(), "streaming job started");
        let mut counters: HashMap<Uuid, SequenceCounter> = HashMap::new();

        while !cancel.is_cancelled() && !self.is_disposed() {
            let client = self.client();
            if client.strips.is_empty() {
                self.set_status(JobStatus::SetupIncomplete);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.config_changed.notified() => continue,
                }
            }

            self.set_status(JobStatus::WaitingForConnection);
            let attempt =
                tokio::time::timeout(self.ctx.settings.connect_timeout, self.link.connect(&client));
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = attempt => result,
            };
            let transport = match connected {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    warn!(client = %self.uuid, error = %e, "connect failed");
                    self.wait_offline(&cancel).await;
                    continue;
                }
                Err(_) => {
                    warn!(
                        client = %self.uuid,
                        timeout_ms = self.ctx.settings.connect_timeout.as_millis() as u64,
                        "connect timed out"
                    );
                    self.wait_offline(&cancel).await;
                    continue;
                }
            };

            let result = self.serve_connection(transport, &cancel, &mut counters).await;
            if cancel.is_cancelled() || self.is_disposed() {
                break;
            }
            if let Err(e) = result {
                warn!(client = %self.uuid, error = %e, "connection lost");
                if let Some(callback) = &self.ctx.on_disconnect {
                    callback(self.uuid);
                }
            }
        }

        self.close_transport().await;
        info!(client = %self.uuid, "streaming job stopped");
    }

    async fn wait_offline(&self, cancel: &CancellationToken) {
        self.set_status(JobStatus::Offline);
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.ctx.settings.reconnect_delay) => {}
            _ = self.config_changed.notified() => {}
        }
    }

    async fn close_transport(&self) {
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            let _ = transport.close().await;
        }
        self.gate.reset();
    }

    /// Stream over one connection until it fails or `cancel` fires.
    async fn serve_connection(
        self: &Arc<Self>,
        transport: BoxedTransport,
        cancel: &CancellationToken,
        counters: &mut HashMap<Uuid, SequenceCounter>,
    ) -> Result<(), TransportError> {
        *self.transport.lock() = Some(Arc::clone(&transport));
        self.gate.reset();
        self.set_status(JobStatus::ConnectedIdle);
        info!(client = %self.uuid, peer = transport.peer(), "client connected");

        let conn = cancel.child_token();
        let reader = tokio::spawn(Arc::clone(self).read_replies(Arc::clone(&transport), conn.clone()));
        let syncer = tokio::spawn(Arc::clone(self).sync_clock(Arc::clone(&transport), conn.clone()));

        let result = self.stream_frames(&transport, &conn, counters).await;

        conn.cancel();
        let _ = reader.await;
        let _ = syncer.await;
        let _ = transport.close().await;
        {
            let mut current = self.transport.lock();
            if current.as_ref().is_some_and(|t| Arc::ptr_eq(t, &transport)) {
                *current = None;
            }
        }
        self.gate.reset();
        result
    }

    async fn stream_frames(
        &self,
        transport: &BoxedTransport,
        conn: &CancellationToken,
        counters: &mut HashMap<Uuid, SequenceCounter>,
    ) -> Result<(), TransportError> {
        let mut ticker = tokio::time::interval(self.ctx.settings.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = conn.cancelled() => return Err(TransportError::Disconnected),
                _ = ticker.tick() => {}
            }

            let client = self.client();
            let mut sent = 0usize;
            for binding in &client.strips {
                let counter = counters.entry(binding.strip).or_default();
                let frame = self.ctx.renderer.render_frame(binding.strip, counter.peek());
                if frame.is_blank() {
                    continue;
                }
                counter.next();

                let frame = self.prepare_frame(frame, &client);
                let payload = match self.link.encode_frame(&frame, binding) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(client = %self.uuid, strip = %binding.strip, error = %e, "frame encode failed");
                        continue;
                    }
                };

                tokio::select! {
                    _ = conn.cancelled() => return Err(TransportError::Disconnected),
                    acquired = self.gate.acquire() => acquired?,
                }
                if let Err(e) = transport.send(payload).await {
                    self.gate.reset();
                    return Err(e);
                }
                trace!(
                    client = %self.uuid,
                    strip = %binding.strip,
                    seq = frame.sequence_number,
                    "frame sent"
                );
                sent += 1;
            }

            self.set_status(if sent > 0 {
                JobStatus::RenderingEffect
            } else {
                JobStatus::ConnectedIdle
            });
        }
    }

    /// Power limit, channel order and display timestamp.
    fn prepare_frame(&self, frame: RenderedFrame, client: &ClientConfig) -> RenderedFrame {
        let mut pixels = self.ctx.power.apply_limit(frame.pixels, frame.strip_uuid);
        client.color_order.apply(&mut pixels);

        let delay = self.ctx.settings.frame_delay_ms;
        let sync = self.time_sync();
        let timestamp_ms = if delay > 0 && sync.is_synced() {
            let client_now = sync.to_client_time(self.ctx.clock.now_millis()).max(0) as u64;
            client_now + delay
        } else {
            0
        };

        RenderedFrame {
            timestamp_ms,
            pixels,
            ..frame
        }
    }

    async fn read_replies(self: Arc<Self>, transport: BoxedTransport, conn: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = conn.cancelled() => break,
                message = transport.recv() => message,
            };
            match message {
                Ok(message) => match self.link.parse_reply(message) {
                    Ok(reply) => self.handle_reply(reply),
                    Err(e) => debug!(client = %self.uuid, error = %e, "ignoring client message"),
                },
                Err(e) => {
                    debug!(client = %self.uuid, error = %e, "reader stopped");
                    conn.cancel();
                    break;
                }
            }
        }
    }

    fn handle_reply(&self, reply: ClientReply) {
        if reply.ack {
            self.gate.acknowledge();
        }
        if let Some(millis) = reply.clock_millis {
            self.clock_readings.send_replace(Some(millis));
        }
        if let Some(response) = reply.response {
            self.state.send_modify(|state| *state = state.with_response(response));
        }
    }

    async fn sync_clock(self: Arc<Self>, transport: BoxedTransport, conn: CancellationToken) {
        let mut ticker = tokio::time::interval(self.ctx.settings.time_sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = conn.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let mut sync = self.time_sync();
            let clock = Arc::clone(&self.ctx.clock);
            let synced = tokio::select! {
                _ = conn.cancelled() => break,
                synced = sync.do_time_sync(clock.as_ref(), || self.request_client_time(&transport)) => synced,
            };
            if synced {
                *self.time_sync.lock() = sync;
            }
        }
    }

    /// Ask the client for its clock. Returns -1 when no answer arrives.
    ///
    /// An explicit request occupies the ack gate like a frame does, and the
    /// clock answer releases it. Clients that report their clock in every
    /// reply are only listened to.
    async fn request_client_time(&self, transport: &BoxedTransport) -> i64 {
        let mut readings = self.clock_readings.subscribe();
        let Some(request) = self.link.time_request() else {
            return self.await_clock(&mut readings, self.ctx.settings.ack_timeout).await;
        };

        if let Err(e) = self.gate.acquire().await {
            debug!(client = %self.uuid, error = %e, "time request not sent");
            return -1;
        }
        if let Err(e) = transport.send(request).await {
            debug!(client = %self.uuid, error = %e, "time request failed");
            self.gate.acknowledge();
            return -1;
        }
        // Release in time for a frame already waiting on the gate
        let reading = self.await_clock(&mut readings, self.ctx.settings.ack_timeout / 2).await;
        self.gate.acknowledge();
        reading
    }

    async fn await_clock(&self, readings: &mut watch::Receiver<Option<i64>>, wait: Duration) -> i64 {
        let answered = matches!(
            tokio::time::timeout(wait, readings.changed()).await,
            Ok(Ok(()))
        );
        if !answered {
            return -1;
        }
        let reading = *readings.borrow_and_update();
        reading.unwrap_or(-1)
    }
}
