//! Simplified single-pass overlay path.
//!
//! A composition with no sequencing, no caller fragments and only "plain"
//! overlays (no color key, no timing) does not need the per-overlay
//! preparation chain. [`can_delegate`] classifies a state once;
//! [`build_delegated_program`] emits one combined scale/alpha chain and one
//! overlay per layer, the same shape the watermark exporter uses.

use tracing::debug;

use vcomp_models::Resolution;

use crate::compiler::{
    assemble, base_resolution, main_streams, mix_sources, relabel, CompiledProgram, InputLayout,
    Streams,
};
use crate::composition::{CompositionState, OverlayLayer};
use crate::error::{MediaError, MediaResult};
use crate::filters;
use crate::graph::{FilterGraph, FilterKind, Statement};

/// Whether `state` can take the simplified overlay path.
pub fn can_delegate(state: &CompositionState) -> bool {
    state.prepended().is_empty()
        && state.appended().is_empty()
        && state.custom_filters().is_empty()
        && state.overlays().iter().all(is_plain)
}

fn is_plain(layer: &OverlayLayer) -> bool {
    let spec = &layer.spec;
    spec.color_key.is_none() && spec.start_time_secs == 0.0 && spec.duration_secs.is_none()
}

/// Build the simplified program. Fails if the state does not qualify.
pub fn build_delegated_program(state: &CompositionState) -> MediaResult<CompiledProgram> {
    state
        .check()
        .map_err(|message| MediaError::graph_build(message, None))?;
    if !can_delegate(state) {
        return Err(MediaError::internal(
            "composition needs the full compiler but was routed to the overlay pass",
        ));
    }

    let layout = InputLayout::of(state);
    let base = main_streams(state, &layout);
    let resolution = base_resolution(state, false);
    let mut graph = FilterGraph::new();

    let video = match (base.video, resolution) {
        (Some(video), Some(resolution)) => Some(overlay_plain_layers(
            state, &layout, video, resolution, &mut graph,
        )),
        (video, _) => video,
    };
    let video = relabel(&mut graph, video, state.output().video_label.as_deref(), true);

    let mut sources: Vec<String> = base.audio.into_iter().collect();
    sources.extend(
        state
            .overlays()
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.is_audible())
            .map(|(i, _)| format!("{}:a", layout.overlay(i))),
    );
    let audio = mix_sources(&mut graph, sources);
    let audio = relabel(&mut graph, audio, state.output().audio_label.as_deref(), false);

    debug!(overlays = state.overlays().len(), "Built single-pass overlay graph");

    assemble(
        state,
        graph,
        Streams { video, audio },
        &layout,
        resolution,
        true,
    )
}

fn overlay_plain_layers(
    state: &CompositionState,
    layout: &InputLayout,
    base: String,
    resolution: Resolution,
    graph: &mut FilterGraph,
) -> String {
    let mut current = base;

    for (i, layer) in state.overlays().iter().enumerate() {
        if !layer.is_visual() {
            continue;
        }
        let spec = &layer.spec;
        let input = format!("{}:v", layout.overlay(i));

        let mut steps = Vec::new();
        if spec.width.is_some() || spec.height.is_some() {
            steps.push(filters::scale(
                spec.width.map(|d| d.resolve(resolution.width)),
                spec.height.map(|d| d.resolve(resolution.height)),
            ));
        }
        if spec.opacity < 1.0 {
            steps.push(filters::alpha(spec.opacity));
        }

        let layer_label = if steps.is_empty() {
            input
        } else {
            let kind = if spec.opacity < 1.0 {
                FilterKind::Alpha
            } else {
                FilterKind::Scale
            };
            let label = format!("layer{}", i);
            graph.push(Statement::chain(kind, &input, steps.join(","), &label));
            label
        };

        let output = format!("dv{}", i);
        graph.push(Statement::new(
            FilterKind::Overlay,
            [current, layer_label],
            filters::overlay(spec.position, None),
            [output.clone()],
        ));
        current = output;
    }

    current
}
