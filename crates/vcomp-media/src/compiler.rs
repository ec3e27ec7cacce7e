//! Filter-graph compiler.
//!
//! [`compile`] turns a [`CompositionState`] into a [`CompiledProgram`]: the
//! `-filter_complex` text, the final stream labels and the output arguments.
//! Emission order is fixed:
//!
//! 1. normalization + `concat` when more than one clip is sequenced
//! 2. per-overlay preparation chains (time pad, color key, scale)
//! 3. sequential overlay application (alpha, position, enable window)
//! 4. audio mixing
//! 5. caller fragments, verbatim
//!
//! Label invariants are checked on the structured statements before the
//! program is returned, so a broken graph never reaches the engine.

use tracing::debug;

use vcomp_models::output::{DEFAULT_FPS, DEFAULT_SAMPLE_RATE};
use vcomp_models::{AssetKind, AssetRef, Resolution};

use crate::composition::CompositionState;
use crate::error::{MediaError, MediaResult};
use crate::filters;
use crate::graph::{input_stream_index, map_target, parse_raw_fragment, FilterGraph, FilterKind, Statement};

/// Concat output labels.
pub const BASE_VIDEO_LABEL: &str = "basev";
pub const BASE_AUDIO_LABEL: &str = "basea";
/// Mix output label.
pub const MIXED_AUDIO_LABEL: &str = "mixa";

/// A compiled composition, ready for the execution engine.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    statements: Vec<Statement>,
    filter_graph: String,
    final_video_label: Option<String>,
    final_audio_label: Option<String>,
    extra_args: Vec<String>,
    inputs: Vec<AssetRef>,
    output_format: String,
    base_resolution: Option<Resolution>,
    delegated: bool,
}

impl CompiledProgram {
    /// Rendered `-filter_complex` text. Empty when no filtering is needed.
    pub fn filter_graph(&self) -> &str {
        &self.filter_graph
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Statements of one kind, in emission order.
    pub fn statements_of(&self, kind: FilterKind) -> impl Iterator<Item = &Statement> {
        self.statements.iter().filter(move |s| s.kind() == kind)
    }

    pub fn count(&self, kind: FilterKind) -> usize {
        self.statements_of(kind).count()
    }

    pub fn final_video_label(&self) -> Option<&str> {
        self.final_video_label.as_deref()
    }

    pub fn final_audio_label(&self) -> Option<&str> {
        self.final_audio_label.as_deref()
    }

    /// `-map` flags followed by output encoder flags.
    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// Assets in engine input order.
    pub fn inputs(&self) -> &[AssetRef] {
        &self.inputs
    }

    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    /// Kind of the asset the program produces.
    pub fn output_kind(&self) -> AssetKind {
        if self.final_video_label.is_some() {
            AssetKind::Video
        } else {
            AssetKind::Audio
        }
    }

    /// Resolution of the stream overlays are composited onto.
    pub fn base_resolution(&self) -> Option<Resolution> {
        self.base_resolution
    }

    /// Whether the program came from the simplified overlay path.
    pub fn is_delegated(&self) -> bool {
        self.delegated
    }

    /// Filter graph with one statement per line, for humans.
    pub fn pretty_graph(&self) -> String {
        self.statements
            .iter()
            .map(Statement::render)
            .collect::<Vec<_>>()
            .join(";\n")
    }
}

/// Compile a composition into a filter-graph program.
pub fn compile(state: &CompositionState) -> MediaResult<CompiledProgram> {
    state
        .check()
        .map_err(|message| MediaError::graph_build(message, None))?;

    let layout = InputLayout::of(state);
    let mut graph = FilterGraph::new();

    let base = concat_sequence(state, &mut graph)?;
    let base_resolution = base_resolution(state, layout.sequence_len() > 1);

    let prepared = prepare_overlays(state, &layout, base_resolution, &mut graph);
    let video = apply_overlays(state, &prepared, base.video, &mut graph);
    let video = relabel(&mut graph, video, state.output().video_label.as_deref(), true);

    let audio = mix_overlay_audio(state, &layout, base.audio, &mut graph);
    let audio = relabel(&mut graph, audio, state.output().audio_label.as_deref(), false);

    let streams = append_custom_filters(state, Streams { video, audio }, &mut graph)?;

    assemble(state, graph, streams, &layout, base_resolution, false)
}

/// Input index assignment: prepend, main, append, then overlays.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InputLayout {
    prepend: usize,
    append: usize,
    overlays: usize,
}

impl InputLayout {
    pub(crate) fn of(state: &CompositionState) -> Self {
        Self {
            prepend: state.prepended().len(),
            append: state.appended().len(),
            overlays: state.overlays().len(),
        }
    }

    pub(crate) fn main(&self) -> usize {
        self.prepend
    }

    pub(crate) fn sequence_len(&self) -> usize {
        self.prepend + 1 + self.append
    }

    pub(crate) fn overlay(&self, index: usize) -> usize {
        self.sequence_len() + index
    }

    pub(crate) fn total(&self) -> usize {
        self.sequence_len() + self.overlays
    }
}

/// Current video/audio stream labels.
#[derive(Debug, Clone, Default)]
pub(crate) struct Streams {
    pub video: Option<String>,
    pub audio: Option<String>,
}

/// The main input's own streams.
pub(crate) fn main_streams(state: &CompositionState, layout: &InputLayout) -> Streams {
    let main = state.main();
    Streams {
        video: main.is_video().then(|| format!("{}:v", layout.main())),
        audio: main.has_audio().then(|| format!("{}:a", layout.main())),
    }
}

/// Resolution overlays are composited onto.
///
/// A concatenated base is normalized to the output resolution (or the main
/// asset's); a single clip keeps its own size.
pub(crate) fn base_resolution(state: &CompositionState, concatenated: bool) -> Option<Resolution> {
    if !state.main().is_video() {
        return None;
    }

    let main = state
        .main()
        .metadata()
        .dimensions()
        .map(|(w, h)| Resolution::new(w, h));
    let requested = state.output().resolution;
    let resolved = if concatenated {
        requested.or(main)
    } else {
        main.or(requested)
    };

    Some(resolved.unwrap_or_else(|| {
        debug!("No resolution known for the base stream, assuming {}", Resolution::FULL_HD);
        Resolution::FULL_HD
    }))
}

fn concat_sequence(state: &CompositionState, graph: &mut FilterGraph) -> MediaResult<Streams> {
    let layout = InputLayout::of(state);
    let clips: Vec<&AssetRef> = state.sequence().collect();

    if clips.len() == 1 {
        return Ok(main_streams(state, &layout));
    }

    let with_video = state.main().is_video();
    let with_audio = clips.iter().any(|c| c.has_audio());
    let target = base_resolution(state, true).unwrap_or(Resolution::FULL_HD);
    let fps = state
        .output()
        .fps
        .or(state.main().metadata().frame_rate)
        .filter(|f| f.is_finite() && *f > 0.0)
        .unwrap_or(DEFAULT_FPS);
    let sample_rate = state
        .main()
        .metadata()
        .sample_rate
        .filter(|r| *r > 0)
        .unwrap_or(DEFAULT_SAMPLE_RATE);

    let mut segments: Vec<String> = Vec::with_capacity(clips.len() * 2);
    for (index, clip) in clips.iter().enumerate() {
        if with_video {
            let label = format!("v{}", index);
            graph.push(Statement::chain(
                FilterKind::Normalize,
                &format!("{}:v", index),
                filters::normalize_video(target, fps),
                &label,
            ));
            segments.push(label);
        }

        if with_audio {
            let label = format!("a{}", index);
            if clip.has_audio() {
                graph.push(Statement::chain(
                    FilterKind::NormalizeAudio,
                    &format!("{}:a", index),
                    filters::normalize_audio(sample_rate),
                    &label,
                ));
            } else {
                let duration = clip
                    .metadata()
                    .duration_secs
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .ok_or_else(|| {
                        MediaError::graph_build(
                            format!(
                                "clip {} has no audio track and no known duration to fill with silence",
                                index
                            ),
                            None,
                        )
                    })?;
                graph.push(Statement::new(
                    FilterKind::SilentAudio,
                    Vec::<String>::new(),
                    filters::silent_audio(sample_rate, duration),
                    [label.clone()],
                ));
            }
            segments.push(label);
        }
    }

    let video = with_video.then(|| BASE_VIDEO_LABEL.to_string());
    let audio = with_audio.then(|| BASE_AUDIO_LABEL.to_string());
    let outputs: Vec<String> = video.iter().chain(audio.iter()).cloned().collect();

    graph.push(Statement::new(
        FilterKind::Concat,
        segments,
        filters::concat(clips.len(), with_video, with_audio),
        outputs,
    ));

    Ok(Streams { video, audio })
}

/// Emit each visual overlay's preparation chain; returns the label to
/// composite per overlay (`None` for audio-only layers).
fn prepare_overlays(
    state: &CompositionState,
    layout: &InputLayout,
    base: Option<Resolution>,
    graph: &mut FilterGraph,
) -> Vec<Option<String>> {
    let base = base.unwrap_or(Resolution::FULL_HD);

    state
        .overlays()
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            if !layer.is_visual() {
                return None;
            }
            let spec = &layer.spec;
            let mut steps: Vec<(FilterKind, String, &str)> = Vec::new();

            if spec.start_time_secs > 0.0 {
                steps.push((FilterKind::TimePad, filters::time_pad(spec.start_time_secs), "pad"));
            }
            if let Some(color) = spec.color_key {
                steps.push((
                    FilterKind::ColorKey,
                    filters::color_key(color, spec.effective_similarity(), spec.effective_blend()),
                    "key",
                ));
            }
            if spec.width.is_some() || spec.height.is_some() {
                let width = spec.width.map(|d| d.resolve(base.width));
                let height = spec.height.map(|d| d.resolve(base.height));
                steps.push((FilterKind::Scale, filters::scale(width, height), "scaled"));
            }

            let input = format!("{}:v", layout.overlay(i));
            Some(push_chain(graph, &input, i, steps, &format!("overlayProcessed{}", i)))
        })
        .collect()
}

/// Push `steps` as linked statements; the last one declares `final_label`.
fn push_chain(
    graph: &mut FilterGraph,
    input: &str,
    index: usize,
    steps: Vec<(FilterKind, String, &str)>,
    final_label: &str,
) -> String {
    if steps.is_empty() {
        return input.to_string();
    }

    let last = steps.len() - 1;
    let mut current = input.to_string();
    for (step, (kind, body, suffix)) in steps.into_iter().enumerate() {
        let output = if step == last {
            final_label.to_string()
        } else {
            format!("ov{}_{}", index, suffix)
        };
        graph.push(Statement::chain(kind, &current, body, &output));
        current = output;
    }
    current
}

fn apply_overlays(
    state: &CompositionState,
    prepared: &[Option<String>],
    base: Option<String>,
    graph: &mut FilterGraph,
) -> Option<String> {
    let mut current = base?;

    for (i, (layer, label)) in state.overlays().iter().zip(prepared).enumerate() {
        let Some(label) = label else {
            continue;
        };
        let spec = &layer.spec;

        let mut layer_label = label.clone();
        if spec.opacity < 1.0 {
            let alpha_label = format!("ov{}_alpha", i);
            graph.push(Statement::chain(
                FilterKind::Alpha,
                &layer_label,
                filters::alpha(spec.opacity),
                &alpha_label,
            ));
            layer_label = alpha_label;
        }

        let window = spec
            .is_timed()
            .then(|| filters::enable_window(spec.start_time_secs, spec.end_time_secs()));
        let output = format!("ov{}", i);
        graph.push(Statement::new(
            FilterKind::Overlay,
            [current, layer_label],
            filters::overlay(spec.position, window.as_deref()),
            [output.clone()],
        ));
        current = output;
    }

    Some(current)
}

/// Mix the base audio with every audible overlay, aligning timed overlays to
/// their visibility window.
fn mix_overlay_audio(
    state: &CompositionState,
    layout: &InputLayout,
    base: Option<String>,
    graph: &mut FilterGraph,
) -> Option<String> {
    let mut sources: Vec<String> = base.into_iter().collect();

    for (i, layer) in state.overlays().iter().enumerate() {
        if !layer.is_audible() {
            continue;
        }
        let spec = &layer.spec;
        let input = format!("{}:a", layout.overlay(i));
        if spec.is_timed() {
            let output = format!("ov{}_audio", i);
            graph.push(Statement::chain(
                FilterKind::AudioTiming,
                &input,
                filters::audio_timing(spec.start_time_secs, spec.end_time_secs()),
                &output,
            ));
            sources.push(output);
        } else {
            sources.push(input);
        }
    }

    mix_sources(graph, sources)
}

/// Collapse audio sources into one stream: nothing, the single source, or an
/// `amix` of all of them.
pub(crate) fn mix_sources(graph: &mut FilterGraph, sources: Vec<String>) -> Option<String> {
    match sources.len() {
        0 => None,
        1 => sources.into_iter().next(),
        n => {
            graph.push(Statement::new(
                FilterKind::Mix,
                sources,
                filters::mix(n),
                [MIXED_AUDIO_LABEL],
            ));
            Some(MIXED_AUDIO_LABEL.to_string())
        }
    }
}

/// Give the final stream the caller's label.
pub(crate) fn relabel(
    graph: &mut FilterGraph,
    label: Option<String>,
    requested: Option<&str>,
    video: bool,
) -> Option<String> {
    let Some(requested) = requested else {
        return label;
    };
    let current = label?;
    if current == requested {
        return Some(current);
    }

    if !graph.rename_output(&current, requested) {
        let body = if video { "null" } else { "anull" };
        graph.push(Statement::chain(FilterKind::Passthrough, &current, body, requested));
    }
    Some(requested.to_string())
}

/// Append caller fragments. A chain that consumes a final stream hands the
/// role over to its own outputs: video takes the first output, audio the
/// next one.
fn append_custom_filters(
    state: &CompositionState,
    mut streams: Streams,
    graph: &mut FilterGraph,
) -> MediaResult<Streams> {
    for fragment in state.custom_filters() {
        for statement in parse_raw_fragment(fragment) {
            let mut handoff = statement.outputs().iter();

            for (name, slot) in [("video", &mut streams.video), ("audio", &mut streams.audio)] {
                let consumed = slot
                    .as_ref()
                    .is_some_and(|current| statement.inputs().iter().any(|l| l == current));
                if consumed {
                    let next = handoff.next().cloned().ok_or_else(|| {
                        MediaError::graph_build(
                            format!(
                                "custom filter consumes the final {} stream without producing a replacement",
                                name
                            ),
                            Some(statement.render()),
                        )
                    })?;
                    *slot = Some(next);
                }
            }

            graph.push(statement);
        }
    }

    Ok(streams)
}

/// Validate the graph and build the program.
pub(crate) fn assemble(
    state: &CompositionState,
    graph: FilterGraph,
    streams: Streams,
    layout: &InputLayout,
    base_resolution: Option<Resolution>,
    delegated: bool,
) -> MediaResult<CompiledProgram> {
    graph.validate(layout.total())?;

    if streams.video.is_none() && streams.audio.is_none() {
        return Err(MediaError::graph_build(
            "composition produces no output streams",
            None,
        ));
    }

    let mut extra_args = Vec::new();
    for (label, optional) in [(&streams.video, false), (&streams.audio, true)] {
        let Some(label) = label else {
            continue;
        };
        let is_input = input_stream_index(label).is_some();
        if !is_input && !graph.declares(label) {
            return Err(MediaError::graph_build(
                format!("final label [{}] is never declared", label),
                None,
            ));
        }
        if !is_input && graph.consumes(label) {
            return Err(MediaError::graph_build(
                format!("final label [{}] is consumed inside the graph", label),
                None,
            ));
        }

        let mut target = map_target(label);
        // The main clip's audio track is assumed, not known; let FFmpeg skip it if absent.
        if is_input && optional {
            target.push('?');
        }
        extra_args.push("-map".to_string());
        extra_args.push(target);
    }

    let finals = [streams.video.as_deref(), streams.audio.as_deref()];
    if let Some(label) = graph
        .dangling_labels()
        .into_iter()
        .find(|l| !finals.contains(&Some(*l)))
    {
        return Err(MediaError::graph_build(
            format!("label [{}] is neither consumed nor mapped to the output", label),
            None,
        ));
    }

    extra_args.extend(
        state
            .output()
            .to_ffmpeg_args(streams.video.is_some(), streams.audio.is_some()),
    );

    let filter_graph = graph.render();
    debug!(
        statements = graph.len(),
        delegated,
        video = ?streams.video,
        audio = ?streams.audio,
        "Compiled filter graph"
    );

    Ok(CompiledProgram {
        statements: graph.into_statements(),
        filter_graph,
        final_video_label: streams.video,
        final_audio_label: streams.audio,
        extra_args,
        inputs: state.input_assets(),
        output_format: state.output().format.clone(),
        base_resolution,
        delegated,
    })
}
