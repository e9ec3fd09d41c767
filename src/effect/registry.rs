//! Active effect registry: every effect instance, keyed by uuid.
//!
//! A single lock guards the whole list. Queries return `EffectSummary`
//! snapshots; generators are only touched through `render_strip`, which runs
//! the caller's closure while the lock is held.

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{ActiveLightEffect, EffectStatus, EffectSummary};

#[derive(Debug, Default)]
pub struct ActiveEffectRegistry {
    effects: Mutex<Vec<ActiveLightEffect>>,
}

impl ActiveEffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or replace the entry with the same uuid in place.
    pub fn add_or_update(&self, effect: ActiveLightEffect) {
        let mut effects = self.effects.lock();
        match effects.iter_mut().find(|e| e.uuid == effect.uuid) {
            Some(existing) => {
                debug!(effect = %effect.uuid, name = %effect.name, "effect updated");
                *existing = effect;
            }
            None => {
                debug!(effect = %effect.uuid, name = %effect.name, "effect added");
                effects.push(effect);
            }
        }
    }

    /// Remove an effect. Returns its last snapshot, or `None` if unknown.
    pub fn remove(&self, uuid: Uuid) -> Option<EffectSummary> {
        let mut effects = self.effects.lock();
        let idx = effects.iter().position(|e| e.uuid == uuid)?;
        let removed = effects.remove(idx);
        debug!(effect = %uuid, "effect removed");
        Some(removed.summary())
    }

    pub fn find_by_status(&self, status: EffectStatus) -> Vec<EffectSummary> {
        self.effects
            .lock()
            .iter()
            .filter(|e| e.status == status)
            .map(ActiveLightEffect::summary)
            .collect()
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<EffectSummary> {
        self.effects
            .lock()
            .iter()
            .find(|e| e.uuid == uuid)
            .map(ActiveLightEffect::summary)
    }

    pub fn find_all_for_strip(&self, strip: Uuid) -> Vec<EffectSummary> {
        self.effects
            .lock()
            .iter()
            .filter(|e| e.strip_uuid == strip)
            .map(ActiveLightEffect::summary)
            .collect()
    }

    /// Change an effect's status. Returns the previous status.
    pub fn set_status(&self, uuid: Uuid, status: EffectStatus) -> Option<EffectStatus> {
        let mut effects = self.effects.lock();
        let effect = effects.iter_mut().find(|e| e.uuid == uuid)?;
        let previous = effect.status;
        if previous != status {
            debug!(effect = %uuid, from = ?previous, to = ?status, "effect status");
        }
        effect.status = status;
        Some(previous)
    }

    /// Completed generator iterations per effect.
    pub fn iteration_counts(&self) -> Vec<(Uuid, u64)> {
        self.effects
            .lock()
            .iter()
            .map(|e| (e.uuid, e.generator.iterations()))
            .collect()
    }

    pub fn reset(&self) {
        let mut effects = self.effects.lock();
        debug!(count = effects.len(), "registry reset");
        effects.clear();
    }

    pub fn len(&self) -> usize {
        self.effects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.lock().is_empty()
    }

    /// Run `f` over the strip's active effects, ascending by priority.
    ///
    /// Effects left in `Stopping` on this strip are finalized to `Stopped`
    /// first. Effects rendered while `Activated` move to `Playing` afterwards.
    pub fn render_strip<R>(&self, strip: Uuid, f: impl FnOnce(&mut [&mut ActiveLightEffect]) -> R) -> R {
        let mut effects = self.effects.lock();
        let mut selected: Vec<&mut ActiveLightEffect> = Vec::new();
        for effect in effects.iter_mut().filter(|e| e.strip_uuid == strip) {
            if effect.status == EffectStatus::Stopping {
                debug!(effect = %effect.uuid, "effect stopped");
                effect.status = EffectStatus::Stopped;
            }
            if effect.status.is_active() {
                selected.push(effect);
            }
        }
        // Stable: equal priorities keep insertion order
        selected.sort_by_key(|e| e.priority);

        let result = f(&mut selected);

        for effect in selected {
            if effect.status == EffectStatus::Activated {
                effect.status = EffectStatus::Playing;
            }
        }
        result
    }
}
