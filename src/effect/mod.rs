//! Light effects: generators, filters and the active-effect registry.
//!
//! An effect instance couples a stateful generator (produces the next pixel
//! list each frame) with an ordered filter chain, and is bound to one strip.
//! Instances live in the `ActiveEffectRegistry`; the renderer advances them.
//!
//! # Example TOML
//!
//! ```toml
//! [[effects]]
//! uuid = "6f1c2b9e-6d55-4c1e-9a55-0b9d7e1f3a10"
//! name = "evening spectrum"
//! strip = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59"
//! priority = 10
//! status = "playing"
//! generator = { type = "spectrum", palette = ["orange", "purple"], speed = 0.2 }
//! filters = [{ type = "intensity", factor = 0.6 }, { type = "reflect" }]
//! ```

pub mod filter;
pub mod generators;
pub mod keyframe;
pub mod preview;
pub mod registry;

pub use filter::LightEffectFilter;
pub use generators::{ColorFade, SolidColor, Spectrum};
pub use keyframe::{Easing, KeyframeDef, KeyframeEffect, TimelineDef, TimelineMode};
pub use registry::ActiveEffectRegistry;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::{PaletteSource, RgbColor};

/// Stateful producer of animation frames for one effect instance.
pub trait EffectGenerator: Send {
    fn name(&self) -> &'static str;

    /// Produce the next frame (`length` pixels) and advance the animation.
    fn next_frame(&mut self, length: usize) -> Vec<RgbColor>;

    /// Number of completed animation cycles so far.
    fn iterations(&self) -> u64;
}

/// Lifecycle of an effect instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    #[default]
    Created,
    Activated,
    Playing,
    Paused,
    Stopping,
    Stopped,
}

impl EffectStatus {
    /// Whether the renderer should produce frames for this status.
    pub fn is_active(self) -> bool {
        matches!(self, EffectStatus::Activated | EffectStatus::Playing)
    }
}

/// An effect instance bound to a strip.
pub struct ActiveLightEffect {
    pub uuid: Uuid,
    pub name: String,
    pub priority: i32,
    pub status: EffectStatus,
    pub strip_uuid: Uuid,
    pub generator: Box<dyn EffectGenerator>,
    pub filters: Vec<LightEffectFilter>,
}

impl std::fmt::Debug for ActiveLightEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveLightEffect")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("strip_uuid", &self.strip_uuid)
            .field("generator", &self.generator.name())
            .field("filters", &self.filters)
            .finish()
    }
}

impl ActiveLightEffect {
    pub fn new(
        uuid: Uuid,
        name: impl Into<String>,
        strip_uuid: Uuid,
        priority: i32,
        generator: Box<dyn EffectGenerator>,
    ) -> Self {
        Self {
            uuid,
            name: name.into(),
            priority,
            status: EffectStatus::Created,
            strip_uuid,
            generator,
            filters: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: EffectStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_filters(mut self, filters: Vec<LightEffectFilter>) -> Self {
        self.filters = filters;
        self
    }

    /// Advance the generator one frame and run the filter chain.
    ///
    /// Always returns exactly `length` pixels.
    pub fn render(&mut self, length: usize) -> Vec<RgbColor> {
        let mut pixels = self.generator.next_frame(length);
        pixels.resize(length, RgbColor::BLACK);
        for filter in &mut self.filters {
            pixels = filter.apply(pixels);
            pixels.resize(length, RgbColor::BLACK);
        }
        pixels
    }

    pub fn summary(&self) -> EffectSummary {
        EffectSummary {
            uuid: self.uuid,
            name: self.name.clone(),
            priority: self.priority,
            status: self.status,
            strip_uuid: self.strip_uuid,
            generator: self.generator.name(),
            iterations: self.generator.iterations(),
        }
    }
}

/// Cloneable snapshot of an effect instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectSummary {
    pub uuid: Uuid,
    pub name: String,
    pub priority: i32,
    pub status: EffectStatus,
    pub strip_uuid: Uuid,
    pub generator: &'static str,
    pub iterations: u64,
}

// ── Definitions (config) ─────────────────────────────────────────────

fn default_speed() -> f32 {
    0.25
}

fn default_spread() -> f32 {
    1.0
}

fn default_cycle_secs() -> f32 {
    10.0
}

/// Generator settings, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorDef {
    Solid {
        color: RgbColor,
    },
    Spectrum {
        palette: PaletteSource,
        #[serde(default = "default_spread")]
        spread: f32,
        /// Palette cycles per second
        #[serde(default = "default_speed")]
        speed: f32,
    },
    ColorFade {
        palette: PaletteSource,
        #[serde(default = "default_cycle_secs")]
        cycle_secs: f32,
    },
    Keyframe(TimelineDef),
}

impl GeneratorDef {
    pub fn kind(&self) -> &'static str {
        match self {
            GeneratorDef::Solid { .. } => "solid",
            GeneratorDef::Spectrum { .. } => "spectrum",
            GeneratorDef::ColorFade { .. } => "color_fade",
            GeneratorDef::Keyframe(_) => "keyframe",
        }
    }

    /// Build a fresh generator; `fps` sets how far one frame advances time.
    pub fn build(&self, fps: u32) -> Box<dyn EffectGenerator> {
        match self {
            GeneratorDef::Solid { color } => Box::new(SolidColor::new(*color)),
            GeneratorDef::Spectrum {
                palette,
                spread,
                speed,
            } => Box::new(Spectrum::new(palette.clone(), *spread, *speed, fps)),
            GeneratorDef::ColorFade {
                palette,
                cycle_secs,
            } => Box::new(ColorFade::new(palette.clone(), *cycle_secs, fps)),
            GeneratorDef::Keyframe(def) => Box::new(KeyframeEffect::new(def, fps)),
        }
    }
}

/// A configured effect, as loaded at startup or pushed by the CRUD layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    pub uuid: Uuid,
    pub name: String,
    /// Strip (or group/pool) the effect renders onto
    pub strip: Uuid,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub status: EffectStatus,
    pub generator: GeneratorDef,
    #[serde(default)]
    pub filters: Vec<LightEffectFilter>,
}

impl EffectDefinition {
    pub fn build(&self, fps: u32) -> ActiveLightEffect {
        ActiveLightEffect::new(
            self.uuid,
            self.name.clone(),
            self.strip,
            self.priority,
            self.generator.build(fps),
        )
        .with_status(self.status)
        .with_filters(self.filters.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_statuses() {
        assert!(EffectStatus::Activated.is_active());
        assert!(EffectStatus::Playing.is_active());
        assert!(!EffectStatus::Paused.is_active());
        assert!(!EffectStatus::Stopping.is_active());
        assert!(!EffectStatus::Created.is_active());
    }

    #[test]
    fn test_render_applies_filters_in_order() {
        let mut fx = ActiveLightEffect::new(
            Uuid::new_v4(),
            "ramp",
            Uuid::new_v4(),
            0,
            Box::new(SolidColor::new(RgbColor::new(200, 0, 0))),
        )
        .with_filters(vec![
            LightEffectFilter::Intensity { factor: 0.5 },
            LightEffectFilter::Intensity { factor: 0.5 },
        ]);
        assert_eq!(fx.render(2), vec![RgbColor::new(50, 0, 0); 2]);
    }

    #[test]
    fn test_definition_from_toml() {
        let def: EffectDefinition = toml::from_str(
            r#"
            uuid = "6f1c2b9e-6d55-4c1e-9a55-0b9d7e1f3a10"
            name = "evening"
            strip = "0d4f5b0e-2c3a-4e6b-8a8e-7c1d2f3b4a59"
            priority = 10
            status = "playing"
            generator = { type = "spectrum", palette = ["orange", "purple"], speed = 0.5 }
            filters = [{ type = "reflect" }]
            "#,
        )
        .unwrap();
        assert_eq!(def.priority, 10);
        assert_eq!(def.status, EffectStatus::Playing);
        assert_eq!(def.generator.kind(), "spectrum");

        let fx = def.build(30);
        assert_eq!(fx.summary().generator, "spectrum");
        assert_eq!(fx.filters.len(), 1);
    }

    #[test]
    fn test_keyframe_definition_from_toml() {
        let def: GeneratorDef = toml::from_str(
            r#"
            type = "keyframe"
            color = "red"
            keyframes = [{ t = 0, v = 1.0 }, { t = 500, v = 0.0 }]
            "#,
        )
        .unwrap();
        let mut generator = def.build(2);
        assert_eq!(generator.next_frame(1), vec![RgbColor::new(255, 0, 0)]);
    }
}
