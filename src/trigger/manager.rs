//! Trigger evaluation loop.
//!
//! Holds registered triggers and, on each evaluation, applies new
//! activations to the effect registry. Activation bookkeeping (which firing
//! was applied, how many were allowed) lives here, not in the triggers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::{SolarSchedule, Trigger, TriggerContext, TriggerType};
use crate::effect::{ActiveEffectRegistry, EffectStatus};

/// A status change applied to an effect by a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub trigger: Uuid,
    pub effect: Uuid,
    pub sequence: u64,
    pub status: EffectStatus,
}

struct TriggerEntry {
    trigger: Box<dyn Trigger>,
    /// Sequence of the activation currently applied
    active: Option<u64>,
    activations: u32,
}

pub struct TriggerManager {
    effects: Arc<ActiveEffectRegistry>,
    solar: Arc<SolarSchedule>,
    triggers: Mutex<Vec<TriggerEntry>>,
}

impl TriggerManager {
    pub fn new(effects: Arc<ActiveEffectRegistry>, solar: Arc<SolarSchedule>) -> Self {
        Self {
            effects,
            solar,
            triggers: Mutex::new(Vec::new()),
        }
    }

    /// Register a trigger, replacing one with the same uuid.
    pub fn add(&self, trigger: Box<dyn Trigger>) {
        let mut triggers = self.triggers.lock();
        triggers.retain(|e| e.trigger.uuid() != trigger.uuid());
        debug!(trigger = %trigger.uuid(), effect = %trigger.effect_uuid(), "trigger registered");
        triggers.push(TriggerEntry {
            trigger,
            active: None,
            activations: 0,
        });
    }

    pub fn remove(&self, uuid: Uuid) -> bool {
        let mut triggers = self.triggers.lock();
        let before = triggers.len();
        triggers.retain(|e| e.trigger.uuid() != uuid);
        triggers.len() != before
    }

    pub fn len(&self) -> usize {
        self.triggers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.lock().is_empty()
    }

    /// Evaluate every trigger at `now` and apply resulting status changes.
    pub fn evaluate(&self, now: DateTime<Local>) -> Vec<TriggerEvent> {
        let iterations: HashMap<Uuid, u64> = self.effects.iteration_counts().into_iter().collect();
        let solar = self.solar.current();
        let ctx = TriggerContext {
            now,
            solar: solar.as_ref(),
            iterations: &iterations,
        };

        let mut events = Vec::new();
        {
            let mut triggers = self.triggers.lock();
            for entry in triggers.iter_mut() {
                let trigger_uuid = entry.trigger.uuid();
                let effect = entry.trigger.effect_uuid();
                match entry.trigger.last_activation(&ctx) {
                    Some(activation) if entry.active == Some(activation.sequence) => {}
                    Some(activation) => {
                        let settings = &activation.settings;
                        if settings
                            .max_activations
                            .is_some_and(|max| entry.activations >= max)
                        {
                            trace!(trigger = %trigger_uuid, "activation suppressed, limit reached");
                            continue;
                        }
                        entry.activations += 1;
                        entry.active = Some(activation.sequence);
                        let status = match settings.trigger_type {
                            TriggerType::StartEffect => EffectStatus::Activated,
                            TriggerType::StopEffect => EffectStatus::Stopping,
                        };
                        events.push(TriggerEvent {
                            trigger: trigger_uuid,
                            effect,
                            sequence: activation.sequence,
                            status,
                        });
                    }
                    None => {
                        // Window closed on a start trigger: wind the effect down
                        if let Some(sequence) = entry.active.take() {
                            if entry.trigger.settings().trigger_type == TriggerType::StartEffect {
                                events.push(TriggerEvent {
                                    trigger: trigger_uuid,
                                    effect,
                                    sequence,
                                    status: EffectStatus::Stopping,
                                });
                            }
                        }
                    }
                }
            }
        }

        // Applied after releasing the trigger lock
        events.retain(|event| match self.effects.set_status(event.effect, event.status) {
            Some(previous) => {
                info!(
                    trigger = %event.trigger,
                    effect = %event.effect,
                    from = ?previous,
                    to = ?event.status,
                    "trigger applied"
                );
                true
            }
            None => {
                debug!(trigger = %event.trigger, effect = %event.effect, "trigger target missing");
                false
            }
        });
        events
    }

    /// Evaluate on a fixed interval until cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis() as u64, triggers = self.len(), "trigger loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("trigger loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.evaluate(Local::now());
                }
            }
        }
    }
}
