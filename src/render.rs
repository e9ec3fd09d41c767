//! Per-strip frame rendering: effect selection, filter chains and blending.

use std::sync::Arc;

use tracing::trace;
use uuid::Uuid;

use crate::color::RgbColor;
use crate::effect::ActiveEffectRegistry;
use crate::strip::{BlendMode, StripStore};

/// Sequence number carried by blank frames.
pub const INVALID_SEQUENCE: i16 = -1;

/// One strip's pixels for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    /// Client display time in ms (0 = display immediately)
    pub timestamp_ms: u64,
    pub strip_uuid: Uuid,
    pub pixels: Vec<RgbColor>,
    pub sequence_number: i16,
}

impl RenderedFrame {
    /// Frame meaning "nothing active, do not transmit".
    pub fn blank(strip_uuid: Uuid) -> Self {
        Self {
            timestamp_ms: 0,
            strip_uuid,
            pixels: Vec::new(),
            sequence_number: INVALID_SEQUENCE,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.is_empty() || self.sequence_number <= 0
    }
}

/// Per-strip frame counter: 1, 2, ..., 32767, 1, ...
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    last: i16,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value the next call to `next` will return, without consuming it.
    pub fn peek(&self) -> i16 {
        if self.last <= 0 || self.last == i16::MAX {
            1
        } else {
            self.last + 1
        }
    }

    pub fn next(&mut self) -> i16 {
        self.last = self.peek();
        self.last
    }
}

/// Produces frames from the registry's effects for a given strip.
#[derive(Debug, Clone)]
pub struct Renderer {
    effects: Arc<ActiveEffectRegistry>,
    strips: Arc<StripStore>,
}

impl Renderer {
    pub fn new(effects: Arc<ActiveEffectRegistry>, strips: Arc<StripStore>) -> Self {
        Self { effects, strips }
    }

    pub fn effects(&self) -> &Arc<ActiveEffectRegistry> {
        &self.effects
    }

    pub fn strips(&self) -> &Arc<StripStore> {
        &self.strips
    }

    /// Render one frame for `strip_uuid`.
    ///
    /// Returns the blank frame when the strip is unknown or has no active
    /// effect. Every active effect's generator advances by one frame.
    pub fn render_frame(&self, strip_uuid: Uuid, sequence_number: i16) -> RenderedFrame {
        let Some(strip) = self.strips.get(strip_uuid) else {
            return RenderedFrame::blank(strip_uuid);
        };
        let length = strip.length();
        let blend_mode = strip.blend_mode();

        let layers = self.effects.render_strip(strip_uuid, |effects| {
            effects
                .iter_mut()
                .map(|e| (e.priority, e.render(length)))
                .collect::<Vec<_>>()
        });
        if layers.is_empty() {
            return RenderedFrame::blank(strip_uuid);
        }

        let mut pixels = blend(blend_mode, layers, length);
        let brightness = strip.brightness().min(100);
        if brightness < 100 {
            let factor = brightness as f32 / 100.0;
            pixels.iter_mut().for_each(|p| *p = p.scale(factor));
        }
        trace!(strip = %strip_uuid, seq = sequence_number, len = pixels.len(), "frame rendered");

        RenderedFrame {
            timestamp_ms: 0,
            strip_uuid,
            pixels,
            sequence_number,
        }
    }
}

/// Combine per-effect pixel lists (ascending priority) into one.
pub fn blend(mode: BlendMode, layers: Vec<(i32, Vec<RgbColor>)>, length: usize) -> Vec<RgbColor> {
    match mode {
        BlendMode::Priority => layers
            .into_iter()
            .last()
            .map(|(_, pixels)| pixels)
            .unwrap_or_else(|| vec![RgbColor::BLACK; length]),
        BlendMode::Average => weighted_mean(layers.iter().map(|(_, p)| (1.0, p)), length),
        BlendMode::Layer => weighted_mean(
            layers
                .iter()
                .map(|(priority, p)| ((*priority).max(0) as f32 + 1.0, p)),
            length,
        ),
    }
}

fn weighted_mean<'a>(
    layers: impl Iterator<Item = (f32, &'a Vec<RgbColor>)>,
    length: usize,
) -> Vec<RgbColor> {
    let mut acc = vec![[0f32; 3]; length];
    let mut total = 0f32;
    for (weight, pixels) in layers {
        total += weight;
        for (sum, p) in acc.iter_mut().zip(pixels) {
            sum[0] += p.r as f32 * weight;
            sum[1] += p.g as f32 * weight;
            sum[2] += p.b as f32 * weight;
        }
    }
    if total <= 0.0 {
        return vec![RgbColor::BLACK; length];
    }
    acc.into_iter()
        .map(|[r, g, b]| {
            RgbColor::new(
                (r / total).round().clamp(0.0, 255.0) as u8,
                (g / total).round().clamp(0.0, 255.0) as u8,
                (b / total).round().clamp(0.0, 255.0) as u8,
            )
        })
        .collect()
}
