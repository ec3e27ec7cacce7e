//! Asset references.
//!
//! An [`AssetRef`] is an in-memory byte sequence plus the stream metadata the
//! compiler needs (dimensions, frame rate, audio presence). The bytes are
//! shared behind an `Arc`, so cloning an asset into a compiled program does
//! not copy the payload.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of media carried by an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    #[default]
    Video,
    Audio,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Video => "video",
            AssetKind::Audio => "audio",
        }
    }

    /// File extension used when the metadata does not name a container.
    pub fn default_extension(&self) -> &'static str {
        match self {
            AssetKind::Video => "mp4",
            AssetKind::Audio => "wav",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptive stream metadata. Every field is optional; the compiler falls
/// back to engine defaults for anything missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetMetadata {
    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Width in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Height in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Frame rate (fps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    /// Audio sample rate in Hz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Audio channel count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    /// Whether the asset carries an audio track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_audio: Option<bool>,
    /// Container format / file extension (e.g. "mp4", "png", "wav")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl AssetMetadata {
    /// Width and height, when both are known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Fill fields that are unset here from `other`.
    pub fn merged_with(mut self, other: &AssetMetadata) -> Self {
        self.duration_secs = self.duration_secs.or(other.duration_secs);
        self.width = self.width.or(other.width);
        self.height = self.height.or(other.height);
        self.frame_rate = self.frame_rate.or(other.frame_rate);
        self.sample_rate = self.sample_rate.or(other.sample_rate);
        self.channels = self.channels.or(other.channels);
        self.has_audio = self.has_audio.or(other.has_audio);
        if self.format.is_none() {
            self.format = other.format.clone();
        }
        self
    }
}

/// Immutable reference to a caller-owned media payload.
#[derive(Clone, PartialEq)]
pub struct AssetRef {
    bytes: Arc<[u8]>,
    kind: AssetKind,
    metadata: AssetMetadata,
}

impl AssetRef {
    /// Create an asset from raw bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>, kind: AssetKind) -> Self {
        Self {
            bytes: bytes.into(),
            kind,
            metadata: AssetMetadata::default(),
        }
    }

    /// Create a video asset.
    pub fn video(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(bytes, AssetKind::Video)
    }

    /// Create an audio asset.
    pub fn audio(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(bytes, AssetKind::Audio)
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn metadata(&self) -> &AssetMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_video(&self) -> bool {
        self.kind == AssetKind::Video
    }

    /// Whether the asset has an audio stream.
    ///
    /// Audio assets always do. Video assets are assumed to carry audio unless
    /// the metadata says otherwise.
    pub fn has_audio(&self) -> bool {
        match self.kind {
            AssetKind::Audio => true,
            AssetKind::Video => self.metadata.has_audio.unwrap_or(true),
        }
    }

    /// File extension used when staging this asset on disk.
    pub fn extension(&self) -> &str {
        self.metadata
            .format
            .as_deref()
            .filter(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| self.kind.default_extension())
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetRef")
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_assumes_audio_unless_told_otherwise() {
        let clip = AssetRef::video(vec![1u8, 2, 3]);
        assert!(clip.has_audio());

        let silent = AssetRef::video(vec![1u8]).with_metadata(AssetMetadata {
            has_audio: Some(false),
            ..Default::default()
        });
        assert!(!silent.has_audio());
        assert!(AssetRef::audio(vec![0u8]).has_audio());
    }

    #[test]
    fn test_extension_fallbacks() {
        let clip = AssetRef::video(vec![0u8]);
        assert_eq!(clip.extension(), "mp4");

        let png = AssetRef::video(vec![0u8]).with_metadata(AssetMetadata {
            format: Some("png".to_string()),
            ..Default::default()
        });
        assert_eq!(png.extension(), "png");

        let hostile = AssetRef::audio(vec![0u8]).with_metadata(AssetMetadata {
            format: Some("../x".to_string()),
            ..Default::default()
        });
        assert_eq!(hostile.extension(), "wav");
    }

    #[test]
    fn test_metadata_merge_keeps_explicit_values() {
        let explicit = AssetMetadata {
            width: Some(1280),
            ..Default::default()
        };
        let probed = AssetMetadata {
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        };
        let merged = explicit.merged_with(&probed);
        assert_eq!(merged.dimensions(), Some((1280, 1080)));
    }

    #[test]
    fn test_debug_does_not_dump_bytes() {
        let clip = AssetRef::video(vec![7u8; 4096]);
        let rendered = format!("{:?}", clip);
        assert!(rendered.contains("len: 4096"));
        assert!(rendered.len() < 300);
    }
}
