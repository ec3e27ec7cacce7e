//! Shared data models for the vcomp composition engine.
//!
//! This crate provides Serde-serializable types for:
//! - Asset references and their stream metadata
//! - Overlay specifications (position, size, opacity, timing, color key)
//! - Output options and FFmpeg output flags
//! - JSON composition manifests

pub mod asset;
pub mod error;
pub mod manifest;
pub mod output;
pub mod overlay;

// Re-export common types
pub use asset::{AssetKind, AssetMetadata, AssetRef};
pub use error::{ModelError, ModelResult};
pub use manifest::{AssetSource, CompositionManifest, OverlayEntry};
pub use output::{OutputOptions, Resolution};
pub use overlay::{Dimension, OverlaySpec, Position, RgbHex};
