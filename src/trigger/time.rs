//! Fires at a fixed instant, optionally repeating at a fixed interval.

use chrono::{DateTime, Local};
use uuid::Uuid;

use super::{Trigger, TriggerContext, TriggerSettings};

#[derive(Debug, Clone)]
pub struct TimeTrigger {
    uuid: Uuid,
    effect: Uuid,
    settings: TriggerSettings,
    start: DateTime<Local>,
    repeat_secs: Option<u64>,
}

impl TimeTrigger {
    pub fn new(
        uuid: Uuid,
        effect: Uuid,
        settings: TriggerSettings,
        start: DateTime<Local>,
        repeat_secs: Option<u64>,
    ) -> Self {
        Self {
            uuid,
            effect,
            settings,
            start,
            repeat_secs: repeat_secs.filter(|s| *s > 0),
        }
    }
}

impl Trigger for TimeTrigger {
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
        if ctx.now < self.start {
            return None;
        }
        let Some(repeat) = self.repeat_secs else {
            return Some((self.start, 1));
        };
        let elapsed = (ctx.now - self.start).num_seconds().max(0) as u64;
        let n = elapsed / repeat;
        let offset = i64::try_from(n.saturating_mul(repeat)).ok()?;
        Some((self.start + chrono::Duration::seconds(offset), n + 1))
    }
}
