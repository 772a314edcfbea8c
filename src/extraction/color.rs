//! Bubble color classification.
//!
//! Maps a computed CSS background color to one of a small, fixed set of
//! human-readable names. The quantization is deliberately coarse: it only has
//! to separate "my" bubbles from "their" bubbles while tolerating theme drift.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Pairwise channel delta below which a color counts as gray.
const GRAYSCALE_DELTA: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorSample {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `rgb(r, g, b)` / `rgba(r, g, b, a)`. Channels may be fractional
    /// (newer engines report `rgb(12.5, ...)`); they are rounded and clamped.
    pub fn parse(css: &str) -> Option<Self> {
        static RGB_RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = RGB_RE
            .get_or_init(|| {
                Regex::new(
                    r"(?i)^\s*rgba?\(\s*([0-9]*\.?[0-9]+)\s*,\s*([0-9]*\.?[0-9]+)\s*,\s*([0-9]*\.?[0-9]+)\s*(?:,\s*[0-9]*\.?[0-9]+%?\s*)?\)\s*$",
                )
                .ok()
            })
            .as_ref()?;

        let caps = re.captures(css)?;
        let channel = |i: usize| -> Option<u8> {
            let v: f64 = caps.get(i)?.as_str().parse().ok()?;
            Some(v.round().clamp(0.0, 255.0) as u8)
        };
        Some(Self::new(channel(1)?, channel(2)?, channel(3)?))
    }

    fn is_grayscale(&self) -> bool {
        let (r, g, b) = (self.r as i32, self.g as i32, self.b as i32);
        (r - g).abs().max((r - b).abs()).max((g - b).abs()) < GRAYSCALE_DELTA
    }

    /// Hue in degrees `[0, 360)`, saturation and value in percent.
    fn to_hsv(self) -> (f64, f64, f64) {
        let (r, g, b) = (self.r as f64, self.g as f64, self.b as f64);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max * 100.0 };
        let value = max / 255.0 * 100.0;
        (hue, saturation, value)
    }
}

macro_rules! color_names {
    ($($variant:ident => $label:literal),+ $(,)?) => {
        /// Closed vocabulary produced by [`classify`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub enum ColorName {
            $($variant),+
        }

        impl ColorName {
            pub const ALL: &'static [ColorName] = &[$(ColorName::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ColorName::$variant => $label),+
                }
            }
        }
    };
}

color_names! {
    Black => "Black",
    DarkGray => "Dark Gray",
    Gray => "Gray",
    LightGray => "Light Gray",
    White => "White",
    Pink => "Pink",
    Red => "Red",
    DarkRed => "Dark Red",
    Maroon => "Maroon",
    Salmon => "Salmon",
    DarkSalmon => "Dark Salmon",
    Orange => "Orange",
    DarkOrange => "Dark Orange",
    Brown => "Brown",
    Yellow => "Yellow",
    Gold => "Gold",
    Olive => "Olive",
    Lime => "Lime",
    Green => "Green",
    DarkGreen => "Dark Green",
    LightGreen => "Light Green",
    SeaGreen => "Sea Green",
    ForestGreen => "Forest Green",
    Aqua => "Aqua",
    Teal => "Teal",
    DarkTeal => "Dark Teal",
    LightBlue => "Light Blue",
    SkyBlue => "Sky Blue",
    SteelBlue => "Steel Blue",
    Azure => "Azure",
    Blue => "Blue",
    Navy => "Navy",
    Violet => "Violet",
    Purple => "Purple",
    DarkPurple => "Dark Purple",
    Magenta => "Magenta",
    HotPink => "Hot Pink",
    DeepPink => "Deep Pink",
    LightPink => "Light Pink",
    Rose => "Rose",
    DarkRose => "Dark Rose",
    Unknown => "Unknown",
}

impl ColorName {
    pub fn is_grayscale(&self) -> bool {
        matches!(
            self,
            ColorName::Black
                | ColorName::DarkGray
                | ColorName::Gray
                | ColorName::LightGray
                | ColorName::White
        )
    }
}

impl std::fmt::Display for ColorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; spaces, dashes and underscores are interchangeable
/// (`"light-gray"`, `"Light Gray"`, `"light_gray"`).
impl std::str::FromStr for ColorName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        ColorName::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().replace(' ', "").to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown color name '{}'", s.trim()))
    }
}

impl From<ColorName> for String {
    fn from(c: ColorName) -> Self {
        c.as_str().to_string()
    }
}

impl TryFrom<String> for ColorName {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Classify a parsed sample. `None` (fully transparent ancestry) is `Unknown`.
pub fn classify(sample: Option<ColorSample>) -> ColorName {
    let Some(sample) = sample else {
        return ColorName::Unknown;
    };

    if sample.is_grayscale() {
        let luminance = (sample.r as u32 + sample.g as u32 + sample.b as u32) / 3;
        return match luminance {
            l if l < 30 => ColorName::Black,
            l if l > 225 => ColorName::White,
            l if l > 160 => ColorName::LightGray,
            l if l > 90 => ColorName::Gray,
            _ => ColorName::DarkGray,
        };
    }

    let (hue, saturation, value) = sample.to_hsv();

    if saturation < 10.0 {
        return ColorName::Gray;
    }
    if value < 15.0 {
        return ColorName::Black;
    }
    if value > 95.0 && saturation < 20.0 {
        return ColorName::White;
    }

    let band = |bright: ColorName, mid: ColorName, dark: ColorName| {
        if value > 80.0 {
            bright
        } else if value > 50.0 {
            mid
        } else {
            dark
        }
    };

    match hue {
        h if h <= 10.0 || h >= 350.0 => {
            let bright = if saturation < 50.0 {
                ColorName::Pink
            } else {
                ColorName::Red
            };
            band(bright, ColorName::DarkRed, ColorName::Maroon)
        }
        h if h <= 20.0 => {
            if value > 80.0 {
                ColorName::Salmon
            } else {
                ColorName::DarkSalmon
            }
        }
        h if h <= 40.0 => band(ColorName::Orange, ColorName::DarkOrange, ColorName::Brown),
        h if h <= 70.0 => band(ColorName::Yellow, ColorName::Gold, ColorName::Olive),
        h if h <= 100.0 => band(ColorName::Lime, ColorName::Green, ColorName::DarkGreen),
        h if h <= 140.0 => band(
            ColorName::LightGreen,
            ColorName::SeaGreen,
            ColorName::ForestGreen,
        ),
        h if h <= 170.0 => band(ColorName::Aqua, ColorName::Teal, ColorName::DarkTeal),
        h if h <= 200.0 => band(
            ColorName::LightBlue,
            ColorName::SkyBlue,
            ColorName::SteelBlue,
        ),
        h if h <= 240.0 => band(ColorName::Azure, ColorName::Blue, ColorName::Navy),
        h if h <= 280.0 => band(ColorName::Violet, ColorName::Purple, ColorName::DarkPurple),
        h if h <= 320.0 => band(ColorName::Magenta, ColorName::HotPink, ColorName::DeepPink),
        h if h < 350.0 => band(ColorName::LightPink, ColorName::Rose, ColorName::DarkRose),
        // NaN never matches any arm above.
        _ => ColorName::Unknown,
    }
}

/// Parse and classify in one step. Anything unparseable is `Unknown`.
pub fn classify_css(css: &str) -> ColorName {
    classify(ColorSample::parse(css))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_and_rgba() {
        assert_eq!(
            ColorSample::parse("rgb(0, 132, 255)"),
            Some(ColorSample::new(0, 132, 255))
        );
        assert_eq!(
            ColorSample::parse("rgba(240,240,240,0.5)"),
            Some(ColorSample::new(240, 240, 240))
        );
        assert_eq!(
            ColorSample::parse("RGB( 12.6 , 300, 0 )"),
            Some(ColorSample::new(13, 255, 0))
        );
    }

    #[test]
    fn unparseable_input_is_unknown() {
        assert_eq!(classify(None), ColorName::Unknown);
        for bad in ["", "transparent", "#0084ff", "rgb(1,2)", "rgb(a,b,c)", "hsl(0, 0%, 0%)"] {
            assert_eq!(classify_css(bad), ColorName::Unknown, "input {bad:?}");
        }
    }

    #[test]
    fn messenger_bubbles() {
        // Outgoing bubble blue and the light incoming bubble.
        assert_eq!(classify_css("rgb(0, 132, 255)"), ColorName::Azure);
        assert_eq!(classify_css("rgb(240, 240, 240)"), ColorName::White);
        assert_eq!(classify_css("rgb(255, 255, 255)"), ColorName::White);
    }

    #[test]
    fn grayscale_bands() {
        assert_eq!(classify_css("rgb(10, 10, 10)"), ColorName::Black);
        assert_eq!(classify_css("rgb(60, 65, 70)"), ColorName::DarkGray);
        assert_eq!(classify_css("rgb(128, 128, 128)"), ColorName::Gray);
        assert_eq!(classify_css("rgb(200, 195, 205)"), ColorName::LightGray);
        assert_eq!(classify_css("rgb(230, 230, 240)"), ColorName::White);
    }

    #[test]
    fn grayscale_never_gets_a_hue_name() {
        for base in (0..=235u8).step_by(5) {
            for (dr, dg, db) in [(0, 0, 0), (19, 0, 0), (0, 19, 10), (5, 0, 19)] {
                let s = ColorSample::new(base + dr, base + dg, base + db);
                let name = classify(Some(s));
                assert!(name.is_grayscale(), "{s:?} classified as {name}");
            }
        }
    }

    #[test]
    fn hue_table_and_overrides() {
        assert_eq!(classify_css("rgb(255, 0, 0)"), ColorName::Red);
        assert_eq!(classify_css("rgb(255, 160, 160)"), ColorName::Pink);
        assert_eq!(classify_css("rgb(160, 0, 0)"), ColorName::DarkRed);
        assert_eq!(classify_css("rgb(100, 0, 0)"), ColorName::Maroon);
        assert_eq!(classify_css("rgb(255, 165, 0)"), ColorName::Orange);
        assert_eq!(classify_css("rgb(0, 255, 0)"), ColorName::LightGreen);
        assert_eq!(classify_css("rgb(0, 200, 0)"), ColorName::SeaGreen);
        // Pure blue sits on the 240° boundary, which belongs to the azure band.
        assert_eq!(classify_css("rgb(0, 0, 200)"), ColorName::Blue);
        assert_eq!(classify_css("rgb(0, 0, 100)"), ColorName::Navy);
        assert_eq!(classify_css("rgb(100, 0, 255)"), ColorName::Violet);
        assert_eq!(classify_css("rgb(50, 0, 100)"), ColorName::DarkPurple);
        assert_eq!(classify_css("rgb(0, 70, 160)"), ColorName::Blue);
        assert_eq!(classify_css("rgb(255, 0, 255)"), ColorName::Magenta);
        assert_eq!(classify_css("rgb(255, 0, 128)"), ColorName::LightPink);
        // Dark but not gray-by-delta: value override.
        assert_eq!(classify_css("rgb(30, 5, 0)"), ColorName::Black);
        // Low saturation override (delta >= 20 but sat < 10%).
        assert_eq!(classify_css("rgb(255, 250, 232)"), ColorName::Gray);
    }

    #[test]
    fn classification_is_total_and_deterministic() {
        for r in (0..=255u16).step_by(17) {
            for g in (0..=255u16).step_by(17) {
                for b in (0..=255u16).step_by(17) {
                    let css = format!("rgb({r}, {g}, {b})");
                    let first = classify_css(&css);
                    assert_ne!(first, ColorName::Unknown, "{css}");
                    assert_eq!(first, classify_css(&css));
                }
            }
        }
    }

    #[test]
    fn names_round_trip_through_from_str() {
        assert_eq!(ColorName::ALL.len(), 42);
        for name in ColorName::ALL {
            assert_eq!(name.as_str().parse::<ColorName>(), Ok(*name));
        }
        assert_eq!("light-gray".parse::<ColorName>(), Ok(ColorName::LightGray));
        assert_eq!("SKY_BLUE".parse::<ColorName>(), Ok(ColorName::SkyBlue));
    }
}
