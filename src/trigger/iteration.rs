//! Fires each time a source effect completes another N iterations.

use chrono::{DateTime, Local};
use uuid::Uuid;

use super::{Trigger, TriggerContext, TriggerSettings};

#[derive(Debug, Clone)]
pub struct EffectIterationTrigger {
    uuid: Uuid,
    effect: Uuid,
    settings: TriggerSettings,
    source: Uuid,
    every: u64,
    /// Last observed firing: (when it was seen, firing number)
    seen: Option<(DateTime<Local>, u64)>,
    /// Firings completed by the current source generator
    run_firings: u64,
    /// Firings carried over from earlier source generators
    offset: u64,
}

impl EffectIterationTrigger {
    pub fn new(
        uuid: Uuid,
        effect: Uuid,
        settings: TriggerSettings,
        source: Uuid,
        every: u64,
    ) -> Self {
        Self {
            uuid,
            effect,
            settings,
            source,
            every: every.max(1),
            seen: None,
            run_firings: 0,
            offset: 0,
        }
    }
}

impl Trigger for EffectIterationTrigger {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn effect_uuid(&self) -> Uuid {
        self.effect
    }

    fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    fn last_fired(&mut self, ctx: &TriggerContext<'_>) -> Option<(DateTime<Local>, u64)> {
        let completed = ctx.iterations.get(&self.source).copied().unwrap_or(0);
        let firing = completed / self.every;
        if firing < self.run_firings {
            // Source was reloaded and its count restarted
            self.offset = self.seen.map_or(self.offset, |(_, seq)| seq);
        }
        self.run_firings = firing;
        if firing == 0 {
            return self.seen;
        }
        let sequence = self.offset + firing;
        match self.seen {
            Some((_, seen)) if seen >= sequence => {}
            _ => self.seen = Some((ctx.now, sequence)),
        }
        self.seen
    }
}
