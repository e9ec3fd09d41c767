//! Pixel-list filters applied after an effect's generator.
//!
//! Each filter takes a full strip-length pixel list and returns one of the
//! same length. Filters run in configured order.

use serde::{Deserialize, Serialize};

use crate::color::RgbColor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LightEffectFilter {
    /// Constant brightness multiplier.
    Intensity { factor: f32 },
    /// Brightness ramp from `from` to `to` over `frames` frames, then held.
    IntensityFade {
        from: f32,
        to: f32,
        frames: u32,
        #[serde(skip)]
        elapsed: u32,
    },
    /// First half mirrored onto the second half.
    Reflect,
    /// Pixel order reversed.
    Reverse,
}

impl LightEffectFilter {
    pub fn intensity_fade(from: f32, to: f32, frames: u32) -> Self {
        LightEffectFilter::IntensityFade {
            from,
            to,
            frames,
            elapsed: 0,
        }
    }

    pub fn apply(&mut self, pixels: Vec<RgbColor>) -> Vec<RgbColor> {
        match self {
            LightEffectFilter::Intensity { factor } => {
                let f = *factor;
                pixels.into_iter().map(|p| p.scale(f)).collect()
            }
            LightEffectFilter::IntensityFade {
                from,
                to,
                frames,
                elapsed,
            } => {
                let progress = if *frames == 0 {
                    1.0
                } else {
                    (*elapsed as f32 / *frames as f32).min(1.0)
                };
                let f = *from + (*to - *from) * progress;
                if *elapsed < *frames {
                    *elapsed += 1;
                }
                pixels.into_iter().map(|p| p.scale(f)).collect()
            }
            LightEffectFilter::Reflect => {
                let mut out = pixels;
                let n = out.len();
                for i in 0..n / 2 {
                    out[n - 1 - i] = out[i];
                }
                out
            }
            LightEffectFilter::Reverse => {
                let mut out = pixels;
                out.reverse();
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: u8) -> Vec<RgbColor> {
        (0..n).map(|i| RgbColor::new(i * 10, 0, 0)).collect()
    }

    #[test]
    fn test_intensity() {
        let mut f = LightEffectFilter::Intensity { factor: 0.5 };
        assert_eq!(
            f.apply(vec![RgbColor::new(200, 100, 0)]),
            vec![RgbColor::new(100, 50, 0)]
        );
    }

    #[test]
    fn test_intensity_fade_ramps_then_holds() {
        let mut f = LightEffectFilter::intensity_fade(0.0, 1.0, 2);
        let px = vec![RgbColor::new(200, 200, 200)];
        assert_eq!(f.apply(px.clone())[0], RgbColor::BLACK);
        assert_eq!(f.apply(px.clone())[0], RgbColor::new(100, 100, 100));
        assert_eq!(f.apply(px.clone())[0], RgbColor::new(200, 200, 200));
        assert_eq!(f.apply(px.clone())[0], RgbColor::new(200, 200, 200));
    }

    #[test]
    fn test_reflect() {
        let mut f = LightEffectFilter::Reflect;
        let out = f.apply(ramp(5));
        let reds: Vec<u8> = out.iter().map(|p| p.r).collect();
        assert_eq!(reds, vec![0, 10, 20, 10, 0]);
    }

    #[test]
    fn test_reverse_keeps_length() {
        let mut f = LightEffectFilter::Reverse;
        let out = f.apply(ramp(4));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].r, 30);
        assert_eq!(out[3].r, 0);
    }

    #[test]
    fn test_deserialize_tagged() {
        let f: Vec<LightEffectFilter> = serde_json::from_str(
            r#"[{"type":"reverse"},{"type":"intensity_fade","from":0.0,"to":1.0,"frames":30}]"#,
        )
        .unwrap();
        assert_eq!(f[0], LightEffectFilter::Reverse);
        assert_eq!(f[1], LightEffectFilter::intensity_fade(0.0, 1.0, 30));
    }
}
