//! Per-strip power budget limiting.
//!
//! WS2812 model: each channel draws `PER_LED_MILLIAMPS` mA at value 255, so a
//! pixel draws `(R + G + B) / 765 * (PER_LED_MILLIAMPS * 3)` mA. When a frame
//! would reach the strip's budget every pixel is scaled down uniformly.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::color::RgbColor;

/// Estimated current draw per WS2812 channel at full brightness (value=255).
/// WS2812B datasheet: ~20mA typical per channel.
pub const PER_LED_MILLIAMPS: f32 = 20.0;

/// Upper bound on the applied scale factor. Frames sitting right at the
/// budget would otherwise toggle between scaled and unscaled.
pub const MAX_SCALE: f32 = 0.99;

/// Estimated draw of a pixel list in milliamps.
pub fn estimate_draw_ma(pixels: &[RgbColor]) -> f32 {
    // (sum / 765) * (mA * 3) == (sum / 255) * mA
    let total: u64 = pixels.iter().map(|p| p.channel_sum() as u64).sum();
    total as f32 / 255.0 * PER_LED_MILLIAMPS
}

/// Scale factor that brings `draw_ma` under `limit_ma`, if one is needed.
pub fn limit_scale(draw_ma: f32, limit_ma: u32) -> Option<f32> {
    if limit_ma == 0 || draw_ma < limit_ma as f32 {
        return None;
    }
    Some((limit_ma as f32 / draw_ma).min(MAX_SCALE))
}

/// Strip UUID → milliamp budget. Missing or zero means unlimited.
#[derive(Debug, Default)]
pub struct PowerLimiter {
    limits: RwLock<HashMap<Uuid, u32>>,
}

impl PowerLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_limit(&self, strip: Uuid, limit_ma: u32) {
        self.limits.write().insert(strip, limit_ma);
    }

    pub fn get_limit(&self, strip: Uuid) -> Option<u32> {
        self.limits.read().get(&strip).copied()
    }

    pub fn remove_limit(&self, strip: Uuid) -> Option<u32> {
        self.limits.write().remove(&strip)
    }

    /// Apply the strip's budget. Never increases brightness.
    pub fn apply_limit(&self, pixels: Vec<RgbColor>, strip: Uuid) -> Vec<RgbColor> {
        let Some(limit) = self.get_limit(strip) else {
            return pixels;
        };
        let draw = estimate_draw_ma(&pixels);
        match limit_scale(draw, limit) {
            Some(scale) => {
                trace!(%strip, draw_ma = draw, limit_ma = limit, scale, "power limited");
                pixels.into_iter().map(|p| p.scale(scale)).collect()
            }
            None => pixels,
        }
    }
}
