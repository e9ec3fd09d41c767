//! Send flow control
//!
//! Clients acknowledge every frame they receive. `AckGate` enforces that a
//! connection never has two frames outstanding: `acquire` waits (bounded)
//! until the previous send was acknowledged, then marks a new send in flight.
//!
//! ```text
//!   frame loop ── acquire() ──► send ──► client
//!                    ▲                     │
//!                    └──── acknowledge() ◄─┘  (reader task)
//! ```

use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

use crate::error::TransportError;

/// Default bound on how long a send waits for the previous acknowledgment
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Single-slot in-flight tracker shared by the sender and the reader task
#[derive(Debug)]
pub struct AckGate {
    in_flight: watch::Sender<bool>,
    timeout: Duration,
}

impl Default for AckGate {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_TIMEOUT)
    }
}

impl AckGate {
    pub fn new(timeout: Duration) -> Self {
        let (in_flight, _) = watch::channel(false);
        Self { in_flight, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until no send is outstanding, then claim the slot.
    ///
    /// Fails with `TransportError::Timeout` if the previous send is not
    /// acknowledged within the gate's timeout.
    pub async fn acquire(&self) -> Result<(), TransportError> {
        let mut rx = self.in_flight.subscribe();
        let claim = async {
            loop {
                if rx.wait_for(|busy| !*busy).await.is_err() {
                    return Err(TransportError::Disconnected);
                }
                let claimed = self.in_flight.send_if_modified(|busy| {
                    if *busy {
                        false
                    } else {
                        *busy = true;
                        true
                    }
                });
                if claimed {
                    return Ok(());
                }
            }
        };

        match tokio::time::timeout(self.timeout, claim).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Mark the outstanding send as acknowledged.
    pub fn acknowledge(&self) {
        if self.in_flight.send_replace(false) {
            trace!("send acknowledged");
        }
    }

    /// Forget any outstanding send (used after a reconnect).
    pub fn reset(&self) {
        self.in_flight.send_replace(false);
    }

    pub fn is_in_flight(&self) -> bool {
        *self.in_flight.borrow()
    }
}
