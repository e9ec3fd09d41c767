//! Sunrise/sunset schedule and the trigger that follows it.
//!
//! The schedule is pushed from outside (daily fetch, or `[solar]` in the
//! config); triggers read whichever day is current at evaluation time.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{Trigger, TriggerContext, TriggerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarEvent {
    Sunrise,
    Sunset,
}

/// Sunrise and sunset for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarDay {
    pub date: NaiveDate,
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
}

impl SolarDay {
    pub fn event(&self, event: SolarEvent) -> DateTime<Local> {
        match event {
            SolarEvent::Sunrise => self.sunrise,
            SolarEvent::Sunset => self.sunset,
        }
    }
}

/// Latest known solar day.
#[derive(Debug, Default)]
pub struct SolarSchedule {
    current: RwLock<Option<SolarDay>>,
}

impl SolarSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, day: SolarDay) {
        info!(date = %day.date, sunrise = %day.sunrise, sunset = %day.sunset, "solar schedule updated");
        *self.current.write() = Some(day);
    }

    pub fn current(&self) -> Option<SolarDay> {
        self.current.read().clone()
    }
}

#[derive(Debug, Clone)]
pub struct SunriseSunsetTrigger {
    uuid: Uuid,
    effect: Uuid,
    settings: TriggerSettings,
    event: SolarEvent,
    offset_minutes: i64,
}

impl SunriseSunsetTrigger {
    pub fn new(
        uuid: Uuid,
        effect: Uuid,
        settings: TriggerSettings,
        event: SolarEvent,
        offset_minutes: i64,
    ) -> Self {
        Self {
            uuid,
            effect,
            settings,
            event,
            offset_minutes,
        }
    }
}

impl Trigger for SunriseSunsetTrigger {
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
        let day = ctx.solar?;
        let fired = day.event(self.event) + Duration::minutes(self.offset_minutes);
        if ctx.now < fired {
            return None;
        }
        Some((fired, day.date.num_days_from_ce().max(0) as u64))
    }
}
