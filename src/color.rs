//! Color and palette math.
//!
//! Pure value types: `RgbColor`, `Palette`, the time-of-day palette schedule
//! and per-client channel ordering.

use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

// ── RgbColor ─────────────────────────────────────────────────────────

/// RGB color, one byte per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };
    pub const WHITE: Self = Self {
        r: 255,
        g: 255,
        b: 255,
    };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create from HSV (h: 0-360, s: 0-1, v: 0-1).
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let h = h.rem_euclid(360.0);
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;
        let (r, g, b) = match (h / 60.0) as i32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        Self {
            r: ((r + m) * 255.0) as u8,
            g: ((g + m) * 255.0) as u8,
            b: ((b + m) * 255.0) as u8,
        }
    }

    /// Multiply every channel by `factor`, clamping the result to 0..=255.
    pub fn scale(self, factor: f32) -> Self {
        let f = factor.max(0.0);
        let ch = |c: u8| (c as f32 * f).clamp(0.0, 255.0) as u8;
        Self {
            r: ch(self.r),
            g: ch(self.g),
            b: ch(self.b),
        }
    }

    /// Linearly interpolate towards `other`; `t` is clamped to [0, 1].
    pub fn interpolate(self, other: RgbColor, t: f32) -> RgbColor {
        let t = t.clamp(0.0, 1.0);
        let ch = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        RgbColor {
            r: ch(self.r, other.r),
            g: ch(self.g, other.g),
            b: ch(self.b, other.b),
        }
    }

    /// Sum of the three channels (0..=765).
    pub fn channel_sum(self) -> u32 {
        self.r as u32 + self.g as u32 + self.b as u32
    }

    /// Parse a color string: "#RRGGBB", "red", "green", etc.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() == 6 && hex.is_ascii() {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Self::new(r, g, b));
            }
            return None;
        }
        match s.to_ascii_lowercase().as_str() {
            "black" | "off" => Some(Self::BLACK),
            "red" => Some(Self::new(255, 0, 0)),
            "green" => Some(Self::new(0, 255, 0)),
            "blue" => Some(Self::new(0, 0, 255)),
            "yellow" => Some(Self::new(255, 255, 0)),
            "cyan" => Some(Self::new(0, 255, 255)),
            "magenta" | "pink" => Some(Self::new(255, 0, 255)),
            "white" => Some(Self::WHITE),
            "orange" => Some(Self::new(255, 165, 0)),
            "purple" => Some(Self::new(128, 0, 255)),
            "warm-white" => Some(Self::new(255, 180, 107)),
            _ => None,
        }
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for RgbColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RgbColor::parse(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

impl From<RgbColor> for String {
    fn from(c: RgbColor) -> Self {
        c.to_string()
    }
}

// ── Palette ──────────────────────────────────────────────────────────

/// Ordered color stops, evenly spaced over [0, 1).
///
/// Positions wrap: sampling past the last stop blends back into the first,
/// so scrolling effects loop seamlessly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette {
    pub colors: Vec<RgbColor>,
}

impl Palette {
    pub fn new(colors: Vec<RgbColor>) -> Self {
        Self { colors }
    }

    /// Sample the palette at `position` (any real; only the fractional part matters).
    pub fn color_at(&self, position: f32) -> RgbColor {
        match self.colors.len() {
            0 => RgbColor::BLACK,
            1 => self.colors[0],
            n => {
                let scaled = position.rem_euclid(1.0) * n as f32;
                let index = (scaled.floor() as usize).min(n - 1);
                let next = (index + 1) % n;
                self.colors[index].interpolate(self.colors[next], scaled - index as f32)
            }
        }
    }

    /// `count` colors sampled evenly across the palette.
    pub fn gradient(&self, count: usize) -> Vec<RgbColor> {
        (0..count)
            .map(|i| self.color_at(i as f32 / count as f32))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// One palette in a daily schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayEntry {
    /// Local time this palette takes over.
    pub at: NaiveTime,
    pub colors: Palette,
}

/// Palettes keyed by the time of day they start at.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeOfDayPalette {
    entries: Vec<TimeOfDayEntry>,
}

impl TimeOfDayPalette {
    pub fn new(mut entries: Vec<TimeOfDayEntry>) -> Self {
        entries.sort_by_key(|e| e.at);
        Self { entries }
    }

    /// The palette in effect at `time`.
    ///
    /// Before the first entry of the day the last entry (from the previous
    /// evening) is still in effect.
    pub fn select(&self, time: NaiveTime) -> Option<&Palette> {
        let mut sorted: Vec<&TimeOfDayEntry> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.at);
        sorted
            .iter()
            .rev()
            .find(|e| e.at <= time)
            .or_else(|| sorted.last())
            .map(|e| &e.colors)
    }
}

/// Where an effect gets its palette from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaletteSource {
    Static(Palette),
    TimeOfDay { time_of_day: TimeOfDayPalette },
}

impl PaletteSource {
    /// Resolve the palette for the given local time.
    pub fn resolve(&self, time: NaiveTime) -> Palette {
        match self {
            PaletteSource::Static(p) => p.clone(),
            PaletteSource::TimeOfDay { time_of_day } => time_of_day
                .select(time)
                .cloned()
                .unwrap_or_else(|| Palette::new(vec![RgbColor::BLACK])),
        }
    }
}

// ── ColorOrder ───────────────────────────────────────────────────────

/// Channel order the strip hardware expects on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ColorOrder {
    /// Permute a color so that encoding it as R,G,B yields this order.
    pub fn reorder(self, c: RgbColor) -> RgbColor {
        let (r, g, b) = (c.r, c.g, c.b);
        match self {
            ColorOrder::Rgb => RgbColor::new(r, g, b),
            ColorOrder::Rbg => RgbColor::new(r, b, g),
            ColorOrder::Grb => RgbColor::new(g, r, b),
            ColorOrder::Gbr => RgbColor::new(g, b, r),
            ColorOrder::Brg => RgbColor::new(b, r, g),
            ColorOrder::Bgr => RgbColor::new(b, g, r),
        }
    }

    pub fn apply(self, pixels: &mut [RgbColor]) {
        if self != ColorOrder::Rgb {
            for p in pixels.iter_mut() {
                *p = self.reorder(*p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hsv() {
        assert_eq!(RgbColor::from_hsv(0.0, 1.0, 1.0), RgbColor::new(255, 0, 0));
        assert_eq!(RgbColor::from_hsv(120.0, 1.0, 1.0), RgbColor::new(0, 255, 0));
        assert_eq!(RgbColor::from_hsv(240.0, 1.0, 1.0), RgbColor::new(0, 0, 255));
        assert_eq!(RgbColor::from_hsv(0.0, 0.0, 1.0), RgbColor::WHITE);
        assert_eq!(RgbColor::from_hsv(0.0, 1.0, 0.0), RgbColor::BLACK);
    }

    #[test]
    fn test_scale_clamps() {
        let c = RgbColor::new(200, 100, 10);
        assert_eq!(c.scale(0.5), RgbColor::new(100, 50, 5));
        assert_eq!(c.scale(2.0), RgbColor::new(255, 200, 20));
        assert_eq!(c.scale(-1.0), RgbColor::BLACK);
    }

    #[test]
    fn test_interpolate() {
        let a = RgbColor::BLACK;
        let b = RgbColor::new(100, 200, 50);
        assert_eq!(a.interpolate(b, 0.5), RgbColor::new(50, 100, 25));
        assert_eq!(a.interpolate(b, 0.0), a);
        assert_eq!(a.interpolate(b, 7.0), b);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(RgbColor::parse("#FF8000"), Some(RgbColor::new(255, 128, 0)));
        assert_eq!(RgbColor::parse("Red"), Some(RgbColor::new(255, 0, 0)));
        assert_eq!(RgbColor::parse("#FFF"), None);
        assert_eq!(RgbColor::parse("unknown"), None);
        assert_eq!(RgbColor::new(1, 2, 255).to_string(), "#0102FF");
    }

    #[test]
    fn test_palette_wraps() {
        let p = Palette::new(vec![RgbColor::new(0, 0, 0), RgbColor::new(200, 0, 0)]);
        assert_eq!(p.color_at(0.0), RgbColor::new(0, 0, 0));
        assert_eq!(p.color_at(0.25), RgbColor::new(100, 0, 0));
        assert_eq!(p.color_at(0.5), RgbColor::new(200, 0, 0));
        // Past the last stop blends back into the first
        assert_eq!(p.color_at(0.75), RgbColor::new(100, 0, 0));
        assert_eq!(p.color_at(1.0), p.color_at(0.0));
        assert_eq!(p.gradient(4).len(), 4);
    }

    #[test]
    fn test_time_of_day_selection() {
        let day = Palette::new(vec![RgbColor::WHITE]);
        let night = Palette::new(vec![RgbColor::new(0, 0, 40)]);
        let schedule = TimeOfDayPalette::new(vec![
            TimeOfDayEntry {
                at: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                colors: night.clone(),
            },
            TimeOfDayEntry {
                at: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                colors: day.clone(),
            },
        ]);

        let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        assert_eq!(schedule.select(t(12)), Some(&day));
        assert_eq!(schedule.select(t(21)), Some(&night));
        // Early morning still uses last night's palette
        assert_eq!(schedule.select(t(3)), Some(&night));
    }

    #[test]
    fn test_color_order() {
        let c = RgbColor::new(1, 2, 3);
        assert_eq!(ColorOrder::Rgb.reorder(c), c);
        assert_eq!(ColorOrder::Grb.reorder(c), RgbColor::new(2, 1, 3));
        assert_eq!(ColorOrder::Bgr.reorder(c), RgbColor::new(3, 2, 1));
    }

    #[test]
    fn test_serde_string_form() {
        let p: Palette = serde_json::from_str(r##"["red", "#00FF00"]"##).unwrap();
        assert_eq!(p.colors, vec![RgbColor::new(255, 0, 0), RgbColor::new(0, 255, 0)]);
        assert!(serde_json::from_str::<RgbColor>("\"nope\"").is_err());
    }
}
