//! Overlay specifications.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Chroma-key similarity used when a color key is set without one.
pub const DEFAULT_COLOR_KEY_SIMILARITY: f64 = 0.3;
/// Chroma-key blend used when a color key is set without one.
pub const DEFAULT_COLOR_KEY_BLEND: f64 = 0.1;

/// Anchor of an overlay inside the base frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl Position {
    pub const ALL: &'static [Position] = &[
        Position::TopLeft,
        Position::TopRight,
        Position::BottomLeft,
        Position::BottomRight,
        Position::Center,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::TopLeft => "top-left",
            Position::TopRight => "top-right",
            Position::BottomLeft => "bottom-left",
            Position::BottomRight => "bottom-right",
            Position::Center => "center",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Position {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(Position::TopLeft),
            "top-right" => Ok(Position::TopRight),
            "bottom-left" => Ok(Position::BottomLeft),
            "bottom-right" => Ok(Position::BottomRight),
            "center" | "centre" => Ok(Position::Center),
            _ => Err(ModelError::UnknownPosition(s.to_string())),
        }
    }
}

/// Overlay width or height: absolute pixels or a percentage of the base frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dimension {
    Pixels(u32),
    Percent(f64),
}

impl Dimension {
    /// Resolve against the base stream's extent along the same axis.
    pub fn resolve(&self, base: u32) -> u32 {
        match *self {
            Dimension::Pixels(px) => px,
            Dimension::Percent(pct) => ((base as f64) * pct / 100.0).round().max(1.0) as u32,
        }
    }

    /// Whether the value can produce a visible overlay.
    pub fn is_valid(&self) -> bool {
        match *self {
            Dimension::Pixels(px) => px > 0,
            Dimension::Percent(pct) => pct.is_finite() && pct > 0.0,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Pixels(px) => write!(f, "{}", px),
            Dimension::Percent(pct) => write!(f, "{}%", pct),
        }
    }
}

impl FromStr for Dimension {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(pct) = trimmed.strip_suffix('%') {
            return pct
                .trim()
                .parse::<f64>()
                .map(Dimension::Percent)
                .map_err(|_| ModelError::InvalidDimension(s.to_string()));
        }
        let px = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
        px.parse::<u32>()
            .map(Dimension::Pixels)
            .map_err(|_| ModelError::InvalidDimension(s.to_string()))
    }
}

impl TryFrom<String> for Dimension {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dimension> for String {
    fn from(value: Dimension) -> Self {
        value.to_string()
    }
}

/// 24-bit RGB color, rendered the way FFmpeg color options expect (`0xRRGGBB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RgbHex(u32);

impl RgbHex {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }
}

impl fmt::Display for RgbHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}

impl FromStr for RgbHex {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ModelError::InvalidColor(s.to_string()));
        }

        u32::from_str_radix(hex, 16)
            .map(RgbHex)
            .map_err(|_| ModelError::InvalidColor(s.to_string()))
    }
}

impl TryFrom<String> for RgbHex {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RgbHex> for String {
    fn from(value: RgbHex) -> Self {
        format!("#{:06X}", value.0)
    }
}

fn default_opacity() -> f64 {
    1.0
}

/// How an overlay asset is laid over the base stream.
///
/// Use the builder methods for flexible configuration:
/// ```ignore
/// let spec = OverlaySpec::new(Position::TopRight)
///     .with_width(Dimension::Percent(25.0))
///     .with_color_key("#00FF00".parse()?)
///     .starting_at(2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlaySpec {
    /// Anchor inside the base frame
    #[serde(default)]
    pub position: Position,

    /// Target width ("480" or "25%"); omitted keeps the source size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub width: Option<Dimension>,

    /// Target height ("270" or "25%"); omitted keeps the source size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub height: Option<Dimension>,

    /// Opacity (0.0 to 1.0)
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Seconds into the base stream at which the overlay appears
    #[serde(default)]
    pub start_time_secs: f64,

    /// How long the overlay stays visible; omitted means until the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Color to key out ("#00FF00")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub color_key: Option<RgbHex>,

    /// Chroma-key similarity (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_key_similarity: Option<f64>,

    /// Chroma-key blend (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_key_blend: Option<f64>,

    /// Mix the overlay's own audio track into the output
    #[serde(default)]
    pub mix_audio: bool,
}

impl Default for OverlaySpec {
    fn default() -> Self {
        Self {
            position: Position::default(),
            width: None,
            height: None,
            opacity: default_opacity(),
            start_time_secs: 0.0,
            duration_secs: None,
            color_key: None,
            color_key_similarity: None,
            color_key_blend: None,
            mix_audio: false,
        }
    }
}

impl OverlaySpec {
    /// Create a spec anchored at `position` with default settings.
    pub fn new(position: Position) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_width(mut self, width: Dimension) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: Dimension) -> Self {
        self.height = Some(height);
        self
    }

    /// Set opacity (0.0 = invisible, 1.0 = fully opaque).
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    /// Delay the overlay's appearance.
    pub fn starting_at(mut self, secs: f64) -> Self {
        self.start_time_secs = secs;
        self
    }

    /// Limit how long the overlay stays visible.
    pub fn lasting(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_color_key(mut self, color: RgbHex) -> Self {
        self.color_key = Some(color);
        self
    }

    pub fn with_color_key_tolerance(mut self, similarity: f64, blend: f64) -> Self {
        self.color_key_similarity = Some(similarity);
        self.color_key_blend = Some(blend);
        self
    }

    /// Mix the overlay's audio into the output.
    pub fn with_audio(mut self) -> Self {
        self.mix_audio = true;
        self
    }

    pub fn effective_similarity(&self) -> f64 {
        self.color_key_similarity
            .unwrap_or(DEFAULT_COLOR_KEY_SIMILARITY)
    }

    pub fn effective_blend(&self) -> f64 {
        self.color_key_blend.unwrap_or(DEFAULT_COLOR_KEY_BLEND)
    }

    /// Whether visibility is gated by a time window.
    pub fn is_timed(&self) -> bool {
        self.start_time_secs > 0.0 || self.duration_secs.is_some()
    }

    /// End of the visibility window, if bounded.
    pub fn end_time_secs(&self) -> Option<f64> {
        self.duration_secs.map(|d| self.start_time_secs + d)
    }
}
