//! Output options for a composition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Default output container
pub const DEFAULT_FORMAT: &str = "mp4";
/// Resolution used when neither the output options nor the main asset name one
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
/// Frame rate used for concatenation when none is known
pub const DEFAULT_FPS: f64 = 30.0;
/// Sample rate used for audio normalization when none is known
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FULL_HD: Resolution = Resolution {
        width: DEFAULT_WIDTH,
        height: DEFAULT_HEIGHT,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X', ':'])
            .ok_or_else(|| ModelError::InvalidResolution(s.to_string()))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidResolution(s.to_string()))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidResolution(s.to_string()))?;
        Ok(Self { width, height })
    }
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

/// Output stream labels and encoder flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputOptions {
    /// Label for the final video stream inside the filter graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_label: Option<String>,

    /// Label for the final audio stream inside the filter graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_label: Option<String>,

    /// Output container / file extension
    #[serde(default = "default_format")]
    pub format: String,

    /// Video codec (e.g., "libx264")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,

    /// Audio codec (e.g., "aac")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    /// Video bitrate (e.g., "4M")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,

    /// Output frame size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,

    /// Output frame rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            video_label: None,
            audio_label: None,
            format: default_format(),
            video_codec: None,
            audio_codec: None,
            bitrate: None,
            resolution: None,
            fps: None,
        }
    }
}

impl OutputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_video_label(mut self, label: impl Into<String>) -> Self {
        self.video_label = Some(label.into());
        self
    }

    pub fn with_audio_label(mut self, label: impl Into<String>) -> Self {
        self.audio_label = Some(label.into());
        self
    }

    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = Some(codec.into());
        self
    }

    pub fn with_audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = Some(codec.into());
        self
    }

    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = Some(bitrate.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some(Resolution::new(width, height));
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Convert to FFmpeg output arguments.
    ///
    /// Video flags are only emitted when the output carries a video stream,
    /// audio flags only when it carries audio.
    pub fn to_ffmpeg_args(&self, has_video: bool, has_audio: bool) -> Vec<String> {
        let mut args = Vec::new();

        if has_video {
            if let Some(codec) = &self.video_codec {
                args.extend(["-c:v".to_string(), codec.clone()]);
            }
            if let Some(bitrate) = &self.bitrate {
                args.extend(["-b:v".to_string(), bitrate.clone()]);
            }
            if let Some(resolution) = &self.resolution {
                args.extend(["-s".to_string(), resolution.to_string()]);
            }
            if let Some(fps) = self.fps {
                args.extend(["-r".to_string(), fps.to_string()]);
            }
        }

        if has_audio {
            if let Some(codec) = &self.audio_codec {
                args.extend(["-c:a".to_string(), codec.clone()]);
            }
        }

        args
    }
}
