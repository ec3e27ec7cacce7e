//! Composition state.
//!
//! [`CompositionState`] accumulates a composition request: a main asset,
//! clips to prepend and append, overlays, raw filter fragments and output
//! options. Mutators consume and return the state so calls chain; nothing
//! here touches the filesystem or spawns a process.
//!
//! ```ignore
//! let state = CompositionState::new(main)
//!     .prepend([intro])
//!     .append([outro])
//!     .add_overlay(logo, OverlaySpec::new(Position::TopRight).with_opacity(0.8));
//! state.validate()?;
//! ```

use vcomp_models::{AssetRef, OutputOptions, OverlaySpec};

use crate::error::{MediaError, MediaResult};

/// An overlay asset and how to lay it over the base.
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    pub asset: AssetRef,
    pub spec: OverlaySpec,
}

impl OverlayLayer {
    /// Whether the layer contributes a video overlay (as opposed to audio only).
    pub fn is_visual(&self) -> bool {
        self.asset.is_video()
    }

    /// Whether the layer's audio is mixed into the output.
    pub fn is_audible(&self) -> bool {
        self.asset.has_audio() && (!self.asset.is_video() || self.spec.mix_audio)
    }
}

/// Accumulated composition request.
#[derive(Debug, Clone)]
pub struct CompositionState {
    main: AssetRef,
    prepend: Vec<AssetRef>,
    append: Vec<AssetRef>,
    overlays: Vec<OverlayLayer>,
    custom_filters: Vec<String>,
    output: OutputOptions,
}

impl CompositionState {
    /// Start a composition around its main asset.
    pub fn new(main: AssetRef) -> Self {
        Self {
            main,
            prepend: Vec::new(),
            append: Vec::new(),
            overlays: Vec::new(),
            custom_filters: Vec::new(),
            output: OutputOptions::default(),
        }
    }

    /// Add clips to play before the main asset. Calls accumulate.
    pub fn prepend<I>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = AssetRef>,
    {
        self.prepend.extend(assets);
        self
    }

    /// Add clips to play after the main asset. Calls accumulate.
    pub fn append<I>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = AssetRef>,
    {
        self.append.extend(assets);
        self
    }

    /// Add an overlay. Overlays apply, and stack, in call order.
    pub fn add_overlay(mut self, asset: AssetRef, spec: OverlaySpec) -> Self {
        self.overlays.push(OverlayLayer { asset, spec });
        self
    }

    /// Append a raw filter-graph fragment.
    pub fn set_custom_filter(mut self, fragment: impl Into<String>) -> Self {
        self.custom_filters.push(fragment.into());
        self
    }

    /// Replace the output options.
    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    pub fn main(&self) -> &AssetRef {
        &self.main
    }

    pub fn prepended(&self) -> &[AssetRef] {
        &self.prepend
    }

    pub fn appended(&self) -> &[AssetRef] {
        &self.append
    }

    pub fn overlays(&self) -> &[OverlayLayer] {
        &self.overlays
    }

    pub fn custom_filters(&self) -> &[String] {
        &self.custom_filters
    }

    pub fn output(&self) -> &OutputOptions {
        &self.output
    }

    /// Clips played end to end: prepend, main, append.
    pub fn sequence(&self) -> impl Iterator<Item = &AssetRef> {
        self.prepend
            .iter()
            .chain(std::iter::once(&self.main))
            .chain(self.append.iter())
    }

    /// All assets in engine input order: sequence first, then overlays.
    pub fn input_assets(&self) -> Vec<AssetRef> {
        self.sequence()
            .cloned()
            .chain(self.overlays.iter().map(|o| o.asset.clone()))
            .collect()
    }

    /// Validate the composition before any I/O.
    pub fn validate(&self) -> MediaResult<()> {
        self.check().map_err(MediaError::InvalidComposition)
    }

    /// Structural and range checks shared by `validate` and the compiler.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.main.is_empty() {
            return Err("composition has no main asset".to_string());
        }

        let main_kind = self.main.kind();
        for (name, list) in [("prepend", &self.prepend), ("append", &self.append)] {
            for (i, asset) in list.iter().enumerate() {
                if asset.is_empty() {
                    return Err(format!("{} asset {} is empty", name, i));
                }
                if asset.kind() != main_kind {
                    return Err(format!(
                        "{} asset {} is {} but the main asset is {}",
                        name,
                        i,
                        asset.kind(),
                        main_kind
                    ));
                }
            }
        }

        for (i, layer) in self.overlays.iter().enumerate() {
            check_overlay(i, layer, self.main.is_video())?;
        }

        if self.custom_filters.iter().any(|f| f.trim().is_empty()) {
            return Err("custom filter fragment is empty".to_string());
        }

        check_output(&self.output)
    }
}

fn check_overlay(index: usize, layer: &OverlayLayer, main_is_video: bool) -> Result<(), String> {
    let spec = &layer.spec;

    if layer.asset.is_empty() {
        return Err(format!("overlay {} asset is empty", index));
    }
    if layer.is_visual() && !main_is_video {
        return Err(format!(
            "overlay {} is a video but the main asset is audio",
            index
        ));
    }
    if !(0.0..=1.0).contains(&spec.opacity) {
        return Err(format!(
            "overlay {} opacity {} is outside [0, 1]",
            index, spec.opacity
        ));
    }
    if !spec.start_time_secs.is_finite() || spec.start_time_secs < 0.0 {
        return Err(format!(
            "overlay {} start time {} must be >= 0",
            index, spec.start_time_secs
        ));
    }
    if let Some(duration) = spec.duration_secs {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(format!(
                "overlay {} duration {} must be > 0",
                index, duration
            ));
        }
    }
    for (name, value) in [
        ("color key similarity", spec.color_key_similarity),
        ("color key blend", spec.color_key_blend),
    ] {
        if let Some(v) = value {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("overlay {} {} {} is outside [0, 1]", index, name, v));
            }
        }
    }
    for (name, value) in [("width", spec.width), ("height", spec.height)] {
        if let Some(dim) = value {
            if !dim.is_valid() {
                return Err(format!("overlay {} {} {} is not positive", index, name, dim));
            }
        }
    }

    Ok(())
}

fn check_output(output: &OutputOptions) -> Result<(), String> {
    for (name, label) in [
        ("video label", &output.video_label),
        ("audio label", &output.audio_label),
    ] {
        if let Some(label) = label {
            if !is_valid_label(label) {
                return Err(format!("output {} {:?} is not a valid link label", name, label));
            }
        }
    }
    if let (Some(v), Some(a)) = (&output.video_label, &output.audio_label) {
        if v == a {
            return Err(format!("output video and audio labels are both {:?}", v));
        }
    }
    if output.format.trim().is_empty() || !output.format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("output format {:?} is not a file extension", output.format));
    }
    if let Some(resolution) = output.resolution {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(format!("output resolution {} has a zero axis", resolution));
        }
    }
    if let Some(fps) = output.fps {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(format!("output fps {} must be > 0", fps));
        }
    }
    Ok(())
}

/// Link labels are plain identifiers; anything FFmpeg treats as syntax is rejected.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.contains(':')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
