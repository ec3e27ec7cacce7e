//! JSON composition manifests.
//!
//! A manifest describes a composition in terms of files on disk so it can be
//! written by hand or produced by another service:
//!
//! ```json
//! {
//!   "main": { "path": "talk.mp4", "metadata": { "width": 1920, "height": 1080 } },
//!   "append": [{ "path": "outro.mp4" }],
//!   "overlays": [
//!     { "asset": { "path": "logo.mov" }, "position": "top-right", "width": "25%", "color_key": "#00FF00" }
//!   ],
//!   "output": { "format": "mp4", "video_codec": "libx264" }
//! }
//! ```

use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::asset::{AssetKind, AssetMetadata};
use crate::error::{ModelError, ModelResult};
use crate::output::OutputOptions;
use crate::overlay::OverlaySpec;

/// An asset stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetSource {
    /// File path, relative paths resolve against the manifest's directory
    pub path: PathBuf,

    #[serde(default)]
    pub kind: AssetKind,

    /// Known metadata; missing fields may be filled by probing the file
    #[serde(default)]
    pub metadata: AssetMetadata,
}

/// An overlay asset plus how to lay it over the base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayEntry {
    pub asset: AssetSource,

    #[serde(flatten)]
    pub spec: OverlaySpec,
}

/// A complete composition described by file paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionManifest {
    pub main: AssetSource,

    #[serde(default)]
    pub prepend: Vec<AssetSource>,

    #[serde(default)]
    pub append: Vec<AssetSource>,

    #[serde(default)]
    pub overlays: Vec<OverlayEntry>,

    /// Raw filter-graph fragments appended after the generated graph
    #[serde(default)]
    pub custom_filters: Vec<String>,

    #[serde(default)]
    pub output: OutputOptions,
}

impl CompositionManifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> ModelResult<Self> {
        let manifest: Self = serde_json::from_str(text)?;
        if manifest.main.path.as_os_str().is_empty() {
            return Err(ModelError::InvalidManifest(
                "main asset path is empty".to_string(),
            ));
        }
        Ok(manifest)
    }

    /// JSON schema describing the manifest format.
    pub fn schema() -> RootSchema {
        schemars::schema_for!(CompositionManifest)
    }

    /// Resolve every relative asset path against `base_dir`.
    pub fn resolve_paths(mut self, base_dir: &Path) -> Self {
        let resolve = |source: &mut AssetSource| {
            if source.path.is_relative() {
                source.path = base_dir.join(&source.path);
            }
        };

        resolve(&mut self.main);
        self.prepend.iter_mut().for_each(resolve);
        self.append.iter_mut().for_each(resolve);
        self.overlays.iter_mut().for_each(|o| resolve(&mut o.asset));
        self
    }
}
