//! Client clock offset estimation.
//!
//! One round trip: server time before (T0) and after (T1) asking the client
//! for its clock. Latency is assumed symmetric, so the client reading is
//! corrected by half the round trip. A positive offset means the client
//! clock runs ahead of the server.

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Source of server wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientTimeSync {
    /// Server time (ms) of the last successful sync; 0 = never
    pub last_time_sync_performed_at: i64,
    /// Client clock minus server clock, in ms
    pub client_time_offset: i64,
}

impl ClientTimeSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_synced(&self) -> bool {
        self.last_time_sync_performed_at > 0
    }

    /// Server time translated to the client's clock.
    pub fn to_client_time(&self, server_millis: i64) -> i64 {
        server_millis + self.client_time_offset
    }

    /// Perform one sync round trip.
    ///
    /// `request` resolves to the client's clock in ms; a negative value means
    /// the client declined, and the previous state is kept. Returns whether
    /// the state was updated.
    pub async fn do_time_sync<F, Fut>(&mut self, clock: &dyn Clock, request: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = i64>,
    {
        let t0 = clock.now_millis();
        let client_time = request().await;
        if client_time < 0 {
            debug!(client_time, "time sync skipped");
            return false;
        }
        let t1 = clock.now_millis();
        let latency = (t1 - t0) / 2;
        let adjusted = client_time - latency;
        self.client_time_offset = adjusted - t1;
        self.last_time_sync_performed_at = t1;
        debug!(offset_ms = self.client_time_offset, latency_ms = latency, "time synced");
        true
    }
}
