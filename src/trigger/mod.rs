//! Triggers: time and solar rules that start or stop effects.
//!
//! Each trigger reports its most recent firing. An activation is valid while
//! `now` lies in `[fired_at, fired_at + activation_duration)`; the manager
//! turns new activations into effect status changes.

pub mod iteration;
pub mod manager;
pub mod solar;
pub mod time;
pub mod time_of_day;

pub use iteration::EffectIterationTrigger;
pub use manager::{TriggerEvent, TriggerManager};
pub use solar::{SolarDay, SolarEvent, SolarSchedule, SunriseSunsetTrigger};
pub use time::TimeTrigger;
pub use time_of_day::TimeOfDayTrigger;

use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    StartEffect,
    StopEffect,
}

fn default_activation_duration() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Validity window after each firing, in seconds
    #[serde(default = "default_activation_duration")]
    pub activation_duration_secs: u64,
    /// Total activations allowed; unlimited when absent
    #[serde(default)]
    pub max_activations: Option<u32>,
    pub trigger_type: TriggerType,
}

impl TriggerSettings {
    pub fn new(trigger_type: TriggerType, activation_duration_secs: u64) -> Self {
        Self {
            activation_duration_secs,
            max_activations: None,
            trigger_type,
        }
    }

    pub fn with_max_activations(mut self, max: u32) -> Self {
        self.max_activations = Some(max);
        self
    }

    pub fn activation_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.activation_duration_secs.min(i64::MAX as u64) as i64)
    }
}

/// A valid activation, derived on each evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerActivation {
    pub timestamp: DateTime<Local>,
    pub settings: TriggerSettings,
    /// Distinguishes successive firings of the same trigger
    pub sequence: u64,
}

/// Inputs available to triggers during one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub now: DateTime<Local>,
    pub solar: Option<&'a SolarDay>,
    pub iterations: &'a HashMap<Uuid, u64>,
}

pub trait Trigger: Send {
    fn uuid(&self) -> Uuid;

    /// Effect whose status this trigger controls.
    fn effect_uuid(&self) -> Uuid;

    fn settings(&self) -> &TriggerSettings;

    /// Most recent firing at or before `ctx.now`, with its sequence number.
    fn last_fired(&mut self, ctx: &TriggerContext<'_>) -> Option<(DateTime<Local>, u64)>;

    /// The current activation, if `ctx.now` is inside its window.
    fn last_activation(&mut self, ctx: &TriggerContext<'_>) -> Option<TriggerActivation> {
        let (fired_at, sequence) = self.last_fired(ctx)?;
        let settings = self.settings();
        if ctx.now < fired_at || ctx.now >= fired_at + settings.activation_duration() {
            return None;
        }
        Some(TriggerActivation {
            timestamp: fired_at,
            settings: settings.clone(),
            sequence,
        })
    }
}

/// Trigger variant settings, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    Time {
        start: DateTime<Local>,
        #[serde(default)]
        repeat_secs: Option<u64>,
    },
    TimeOfDay {
        at: NaiveTime,
    },
    SunriseSunset {
        event: SolarEvent,
        #[serde(default)]
        offset_minutes: i64,
    },
    EffectIteration {
        source: Uuid,
        iterations: u64,
    },
}

/// A configured trigger.
///
/// ```toml
/// [[triggers]]
/// uuid = "a6f0c3de-1b7e-4c44-9d0a-2f6b8e4c7a11"
/// effect = "6f1c2b9e-6d55-4c1e-9a55-0b9d7e1f3a10"
/// settings = { trigger_type = "start_effect", activation_duration_secs = 3600 }
/// kind = { type = "sunrise_sunset", event = "sunset", offset_minutes = -15 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub uuid: Uuid,
    pub effect: Uuid,
    pub settings: TriggerSettings,
    pub kind: TriggerKind,
}

impl TriggerDefinition {
    pub fn build(&self) -> Box<dyn Trigger> {
        let uuid = self.uuid;
        let effect = self.effect;
        let settings = self.settings.clone();
        match &self.kind {
            TriggerKind::Time { start, repeat_secs } => {
                Box::new(TimeTrigger::new(uuid, effect, settings, *start, *repeat_secs))
            }
            TriggerKind::TimeOfDay { at } => {
                Box::new(TimeOfDayTrigger::new(uuid, effect, settings, *at))
            }
            TriggerKind::SunriseSunset {
                event,
                offset_minutes,
            } => Box::new(SunriseSunsetTrigger::new(
                uuid,
                effect,
                settings,
                *event,
                *offset_minutes,
            )),
            TriggerKind::EffectIteration { source, iterations } => Box::new(
                EffectIterationTrigger::new(uuid, effect, settings, *source, *iterations),
            ),
        }
    }
}

/// Local wall time to an instant. Gaps resolve to `None`, folds to the earlier.
pub(crate) fn local_instant(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&naive).earliest()
}
