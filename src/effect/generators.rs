//! Palette-driven generators.

use chrono::{Local, NaiveTime};

use super::EffectGenerator;
use crate::color::{PaletteSource, RgbColor};

/// Local wall-clock time, used to pick time-of-day palettes.
fn local_time() -> NaiveTime {
    Local::now().time()
}

/// Every pixel the same color.
#[derive(Debug, Clone)]
pub struct SolidColor {
    color: RgbColor,
    frames: u64,
}

impl SolidColor {
    pub fn new(color: RgbColor) -> Self {
        Self { color, frames: 0 }
    }
}

impl EffectGenerator for SolidColor {
    fn name(&self) -> &'static str {
        "solid"
    }

    fn next_frame(&mut self, length: usize) -> Vec<RgbColor> {
        self.frames += 1;
        vec![self.color; length]
    }

    /// Each rendered frame counts as one iteration.
    fn iterations(&self) -> u64 {
        self.frames
    }
}

/// Palette laid out along the strip and scrolled.
#[derive(Debug, Clone)]
pub struct Spectrum {
    palette: PaletteSource,
    /// Palette repetitions across the strip
    spread: f32,
    /// Scroll distance per frame, in palette lengths
    step: f32,
    offset: f64,
}

impl Spectrum {
    /// `speed` is palette cycles per second.
    pub fn new(palette: PaletteSource, spread: f32, speed: f32, fps: u32) -> Self {
        Self {
            palette,
            spread: if spread > 0.0 { spread } else { 1.0 },
            step: speed / fps.max(1) as f32,
            offset: 0.0,
        }
    }
}

impl EffectGenerator for Spectrum {
    fn name(&self) -> &'static str {
        "spectrum"
    }

    fn next_frame(&mut self, length: usize) -> Vec<RgbColor> {
        let palette = self.palette.resolve(local_time());
        let offset = self.offset.fract() as f32;
        let pixels = (0..length)
            .map(|i| palette.color_at(i as f32 / length as f32 * self.spread + offset))
            .collect();
        self.offset += self.step as f64;
        pixels
    }

    /// Completed scroll cycles.
    fn iterations(&self) -> u64 {
        self.offset.abs() as u64
    }
}

/// Whole strip fading through the palette.
#[derive(Debug, Clone)]
pub struct ColorFade {
    palette: PaletteSource,
    /// Phase advance per frame (1.0 = full palette cycle)
    step: f64,
    phase: f64,
}

impl ColorFade {
    pub fn new(palette: PaletteSource, cycle_secs: f32, fps: u32) -> Self {
        let frames_per_cycle = (cycle_secs.max(0.001) as f64) * fps.max(1) as f64;
        Self {
            palette,
            step: 1.0 / frames_per_cycle,
            phase: 0.0,
        }
    }
}

impl EffectGenerator for ColorFade {
    fn name(&self) -> &'static str {
        "color_fade"
    }

    fn next_frame(&mut self, length: usize) -> Vec<RgbColor> {
        let palette = self.palette.resolve(local_time());
        let color = palette.color_at(self.phase.fract() as f32);
        self.phase += self.step;
        vec![color; length]
    }

    fn iterations(&self) -> u64 {
        // Tolerate float drift just below a whole cycle
        (self.phase + 1e-9) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Palette;

    fn red_blue() -> PaletteSource {
        PaletteSource::Static(Palette::new(vec![
            RgbColor::new(255, 0, 0),
            RgbColor::new(0, 0, 255),
        ]))
    }

    #[test]
    fn test_solid_counts_frames() {
        let mut fx = SolidColor::new(RgbColor::new(1, 2, 3));
        assert_eq!(fx.next_frame(4), vec![RgbColor::new(1, 2, 3); 4]);
        fx.next_frame(4);
        assert_eq!(fx.iterations(), 2);
    }

    #[test]
    fn test_spectrum_layout_and_scroll() {
        // 2 fps, 1 cycle/s → half a palette per frame
        let mut fx = Spectrum::new(red_blue(), 1.0, 1.0, 2);
        let first = fx.next_frame(2);
        assert_eq!(first, vec![RgbColor::new(255, 0, 0), RgbColor::new(0, 0, 255)]);
        let second = fx.next_frame(2);
        assert_eq!(second, vec![RgbColor::new(0, 0, 255), RgbColor::new(255, 0, 0)]);
        assert_eq!(fx.iterations(), 1);
    }

    #[test]
    fn test_color_fade_cycles() {
        // 1s cycle at 4 fps → 4 frames per cycle
        let mut fx = ColorFade::new(red_blue(), 1.0, 4);
        assert_eq!(fx.next_frame(3), vec![RgbColor::new(255, 0, 0); 3]);
        fx.next_frame(3);
        assert_eq!(fx.next_frame(3), vec![RgbColor::new(0, 0, 255); 3]);
        fx.next_frame(3);
        assert_eq!(fx.iterations(), 1);
    }
}
