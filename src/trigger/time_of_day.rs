//! Fires every day at a fixed local time.

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime};
use uuid::Uuid;

use super::{local_instant, Trigger, TriggerContext, TriggerSettings};

#[derive(Debug, Clone)]
pub struct TimeOfDayTrigger {
    uuid: Uuid,
    effect: Uuid,
    settings: TriggerSettings,
    at: NaiveTime,
}

impl TimeOfDayTrigger {
    pub fn new(uuid: Uuid, effect: Uuid, settings: TriggerSettings, at: NaiveTime) -> Self {
        Self {
            uuid,
            effect,
            settings,
            at,
        }
    }
}

impl Trigger for TimeOfDayTrigger {
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
        let today = ctx.now.date_naive();
        let date = if ctx.now.time() >= self.at {
            today
        } else {
            today - Duration::days(1)
        };
        let fired = local_instant(date.and_time(self.at))?;
        // One firing per calendar day
        Some((fired, date.num_days_from_ce().max(0) as u64))
    }
}
