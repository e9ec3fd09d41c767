//! LED strip model: single strips plus groups and pools of strips.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How several effects on one strip are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Highest-priority effect wins
    #[default]
    Priority,
    /// Per-channel mean of all effects
    Average,
    /// Mean weighted by effect priority
    Layer,
}

fn default_height() -> u32 {
    1
}

fn default_brightness() -> u8 {
    100
}

/// A physical strip attached to one controller pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripInfo {
    pub uuid: Uuid,
    pub name: String,
    /// Controller pin / channel id (at most 4 ASCII characters on the wire)
    pub pin: String,
    pub length: usize,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub blend_mode: BlendMode,
    /// Output brightness, percent (0-100)
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default)]
    pub power_limit_ma: Option<u32>,
}

/// Several strips addressed as one logical strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripSet {
    pub uuid: Uuid,
    pub name: String,
    /// Members in pixel order
    pub members: Vec<StripInfo>,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default = "default_brightness")]
    pub brightness: u8,
}

impl StripSet {
    pub fn length(&self) -> usize {
        self.members.iter().map(|m| m.length).sum()
    }

    /// Index of the first pixel of `member` within the set.
    pub fn start_index_of(&self, member: Uuid) -> Option<usize> {
        let mut offset = 0;
        for m in &self.members {
            if m.uuid == member {
                return Some(offset);
            }
            offset += m.length;
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedStrip {
    Single(StripInfo),
    Group(StripSet),
    Pool(StripSet),
}

impl LedStrip {
    pub fn uuid(&self) -> Uuid {
        match self {
            LedStrip::Single(s) => s.uuid,
            LedStrip::Group(g) | LedStrip::Pool(g) => g.uuid,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LedStrip::Single(s) => &s.name,
            LedStrip::Group(g) | LedStrip::Pool(g) => &g.name,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            LedStrip::Single(s) => s.length,
            LedStrip::Group(g) | LedStrip::Pool(g) => g.length(),
        }
    }

    pub fn blend_mode(&self) -> BlendMode {
        match self {
            LedStrip::Single(s) => s.blend_mode,
            LedStrip::Group(g) | LedStrip::Pool(g) => g.blend_mode,
        }
    }

    pub fn brightness(&self) -> u8 {
        match self {
            LedStrip::Single(s) => s.brightness,
            LedStrip::Group(g) | LedStrip::Pool(g) => g.brightness,
        }
    }

    pub fn power_limit_ma(&self) -> Option<u32> {
        match self {
            LedStrip::Single(s) => s.power_limit_ma,
            LedStrip::Group(_) | LedStrip::Pool(_) => None,
        }
    }
}

/// Shared lookup of configured strips.
#[derive(Debug, Default)]
pub struct StripStore {
    strips: RwLock<HashMap<Uuid, LedStrip>>,
}

impl StripStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, strip: LedStrip) {
        self.strips.write().insert(strip.uuid(), strip);
    }

    pub fn remove(&self, uuid: Uuid) -> Option<LedStrip> {
        self.strips.write().remove(&uuid)
    }

    pub fn get(&self, uuid: Uuid) -> Option<LedStrip> {
        self.strips.read().get(&uuid).cloned()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.strips.read().contains_key(&uuid)
    }

    pub fn len(&self) -> usize {
        self.strips.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strips.read().is_empty()
    }
}
