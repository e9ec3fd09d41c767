//! Keyframe timeline generator.
//!
//! Brightness keyframes with per-segment easing, tinted by the timeline color
//! or per-keyframe overrides. `mode = "rainbow"` sweeps the hue across the
//! cycle instead. Every pixel of the strip gets the same color.
//!
//! ```toml
//! generator = { type = "keyframe", color = "orange", keyframes = [
//!     { t = 0,    v = 0.0, easing = "ease-in-out" },
//!     { t = 1000, v = 1.0, easing = "ease-in-out" },
//!     { t = 2000, v = 0.0 },
//! ] }
//! ```

use keyframe::functions::{
    EaseIn, EaseInCubic, EaseInOut, EaseInOutCubic, EaseInOutQuart, EaseInOutQuint, EaseInQuart,
    EaseInQuint, EaseOut, EaseOutCubic, EaseOutQuart, EaseOutQuint,
};
use keyframe::EasingFunction;
use serde::{Deserialize, Serialize};

use super::EffectGenerator;
use crate::color::RgbColor;

/// Curve used between a keyframe and the one after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    /// Keep the current value until the next keyframe.
    #[serde(alias = "step")]
    Hold,
    #[serde(alias = "ease-in-quad")]
    EaseIn,
    #[serde(alias = "ease-out-quad")]
    EaseOut,
    EaseInOut,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInQuint,
    EaseOutQuint,
    EaseInOutQuint,
    #[default]
    #[serde(other)]
    Linear,
}

impl Easing {
    /// Map linear progress `x` in 0..=1 onto the curve.
    pub fn apply(self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Easing::Linear => x,
            Easing::Hold => 0.0,
            Easing::EaseIn => EaseIn.y(x),
            Easing::EaseOut => EaseOut.y(x),
            Easing::EaseInOut => EaseInOut.y(x),
            Easing::EaseInCubic => EaseInCubic.y(x),
            Easing::EaseOutCubic => EaseOutCubic.y(x),
            Easing::EaseInOutCubic => EaseInOutCubic.y(x),
            Easing::EaseInQuart => EaseInQuart.y(x),
            Easing::EaseOutQuart => EaseOutQuart.y(x),
            Easing::EaseInOutQuart => EaseInOutQuart.y(x),
            Easing::EaseInQuint => EaseInQuint.y(x),
            Easing::EaseOutQuint => EaseOutQuint.y(x),
            Easing::EaseInOutQuint => EaseInOutQuint.y(x),
        }
    }
}

/// One point on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeDef {
    /// Offset from cycle start, in ms.
    pub t: f64,
    /// Brightness, clamped to 0.0..=1.0.
    pub v: f64,
    pub color: Option<RgbColor>,
    #[serde(default)]
    pub easing: Easing,
}

impl KeyframeDef {
    pub fn new(t: f64, v: f64) -> Self {
        Self {
            t,
            v,
            color: None,
            easing: Easing::Linear,
        }
    }

    pub fn eased(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineMode {
    #[default]
    Tint,
    Rainbow,
}

/// Timeline definition as it appears in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineDef {
    /// Color for keyframes without their own.
    pub color: Option<RgbColor>,
    #[serde(default)]
    pub keyframes: Vec<KeyframeDef>,
    #[serde(default)]
    pub mode: TimelineMode,
    /// Hue rotations per cycle in rainbow mode.
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Point {
    at_ms: f64,
    color: RgbColor,
    level: f64,
    easing: Easing,
}

/// Position between two timeline points.
struct Span<'a> {
    from: &'a Point,
    to: &'a Point,
    progress: f64,
}

/// Keyframe timeline stepped forward one frame period per rendered frame.
#[derive(Debug, Clone)]
pub struct KeyframeEffect {
    points: Vec<Point>,
    cycle_ms: f64,
    mode: TimelineMode,
    hue_turns: f32,
    step_ms: f64,
    clock_ms: f64,
}

impl KeyframeEffect {
    pub fn new(def: &TimelineDef, fps: u32) -> Self {
        let tint = def.color.unwrap_or(RgbColor::WHITE);
        let mut points: Vec<Point> = def
            .keyframes
            .iter()
            .map(|k| Point {
                at_ms: k.t,
                color: k.color.unwrap_or(tint),
                level: k.v.clamp(0.0, 1.0),
                easing: k.easing,
            })
            .collect();
        points.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        if points.is_empty() {
            points.push(Point {
                at_ms: 0.0,
                color: tint,
                level: 1.0,
                easing: Easing::Linear,
            });
        }

        let cycle_ms = points.last().map_or(0.0, |p| p.at_ms.max(0.0));
        Self {
            points,
            cycle_ms,
            mode: def.mode,
            hue_turns: def.speed.unwrap_or(1.0),
            step_ms: 1000.0 / f64::from(fps.max(1)),
            clock_ms: 0.0,
        }
    }

    /// Length of one pass through the timeline.
    pub fn duration_ms(&self) -> f64 {
        self.cycle_ms
    }

    /// Color at `elapsed_ms` since the timeline started.
    pub fn evaluate(&self, elapsed_ms: f64) -> RgbColor {
        let span = self.span_at(elapsed_ms);
        let eased = span.from.easing.apply(span.progress);
        let level = span.from.level + (span.to.level - span.from.level) * eased;

        match self.mode {
            TimelineMode::Rainbow => {
                let phase = if self.cycle_ms > 0.0 {
                    elapsed_ms.rem_euclid(self.cycle_ms) / self.cycle_ms
                } else {
                    0.0
                };
                let hue = (phase * 360.0 * f64::from(self.hue_turns)).rem_euclid(360.0);
                RgbColor::from_hsv(hue as f32, 1.0, level as f32)
            }
            TimelineMode::Tint => span
                .from
                .color
                .interpolate(span.to.color, eased as f32)
                .scale(level as f32),
        }
    }

    fn span_at(&self, elapsed_ms: f64) -> Span<'_> {
        let first = &self.points[0];
        if self.cycle_ms <= 0.0 || self.points.len() == 1 {
            return Span {
                from: first,
                to: first,
                progress: 0.0,
            };
        }
        let t = elapsed_ms.rem_euclid(self.cycle_ms);
        let next = self.points.partition_point(|p| p.at_ms <= t);
        if next == 0 {
            return Span {
                from: first,
                to: first,
                progress: 0.0,
            };
        }
        let from = &self.points[next - 1];
        let Some(to) = self.points.get(next) else {
            return Span {
                from,
                to: from,
                progress: 0.0,
            };
        };
        let width = to.at_ms - from.at_ms;
        let progress = if width > 0.0 {
            ((t - from.at_ms) / width).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Span { from, to, progress }
    }
}

impl EffectGenerator for KeyframeEffect {
    fn name(&self) -> &'static str {
        "keyframe"
    }

    fn next_frame(&mut self, length: usize) -> Vec<RgbColor> {
        let color = self.evaluate(self.clock_ms);
        self.clock_ms += self.step_ms;
        vec![color; length]
    }

    fn iterations(&self) -> u64 {
        let period = if self.cycle_ms > 0.0 {
            self.cycle_ms
        } else {
            self.step_ms
        };
        (self.clock_ms / period) as u64
    }
}
