//! Execution engine tests against scripted stand-ins for ffmpeg/ffprobe.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::watch;

use vcomp_media::{compile, CompositionState, EngineConfig, Executor, MediaError};
use vcomp_models::{AssetKind, AssetMetadata, AssetRef, OutputOptions, OverlaySpec, Position, RgbHex};

const PROBE_JSON: &str = r#"{"streams":[{"codec_type":"video","width":1920,"height":1080,"avg_frame_rate":"30/1"},{"codec_type":"audio","sample_rate":"48000","channels":2}],"format":{"format_name":"mov,mp4","duration":"10.0"}}"#;

/// Scripts are written once, before any test spawns a process.
fn fixtures() -> &'static Path {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = TempDir::new().unwrap();
        let scripts = [
            (
                "ffmpeg-ok",
                "for last; do :; done\necho 'frame=1 fps=30' >&2\nprintf 'composited' > \"$last\"\n".to_string(),
            ),
            (
                "ffmpeg-args",
                "printf '%s\\n' \"$@\" > \"$0.args\"\nfor last; do :; done\nprintf 'composited' > \"$last\"\n"
                    .to_string(),
            ),
            (
                "ffmpeg-fail",
                "echo \"[AVFilterGraph] No such filter: 'bogus'\" >&2\nexit 1\n".to_string(),
            ),
            ("ffmpeg-noop", "echo 'Output file is empty, nothing was encoded' >&2\nexit 0\n".to_string()),
            ("ffmpeg-slow", "echo $$ > \"$0.pid\"\nexec sleep 30\n".to_string()),
            ("ffmpeg-slow-cancel", "echo $$ > \"$0.pid\"\nexec sleep 30\n".to_string()),
            ("ffprobe-ok", format!("cat <<'JSON'\n{}\nJSON\n", PROBE_JSON)),
            ("ffprobe-fail", "echo 'Invalid data found when processing input' >&2\nexit 1\n".to_string()),
        ];
        for (name, body) in scripts {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    })
    .path()
}

fn script(name: &str) -> PathBuf {
    fixtures().join(name)
}

fn config(work: &TempDir, ffmpeg: &str, ffprobe: &str) -> EngineConfig {
    EngineConfig::default()
        .with_ffmpeg_path(script(ffmpeg))
        .with_ffprobe_path(script(ffprobe))
        .with_work_dir(work.path())
        .with_timeout(Duration::from_secs(10))
}

fn video() -> AssetRef {
    AssetRef::video(vec![7u8; 64]).with_metadata(AssetMetadata {
        width: Some(1920),
        height: Some(1080),
        duration_secs: Some(10.0),
        ..Default::default()
    })
}

fn keyed_state() -> CompositionState {
    CompositionState::new(video()).add_overlay(
        video(),
        OverlaySpec::new(Position::TopRight)
            .with_color_key(RgbHex::new(0, 255, 0))
            .starting_at(2.0),
    )
}

fn assert_empty(dir: &Path) {
    let left: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(left.is_empty(), "staging leftovers: {:?}", left);
}

#[tokio::test]
async fn test_compose_success_returns_output_and_cleans_up() {
    let work = TempDir::new().unwrap();
    let executor = Executor::new(config(&work, "ffmpeg-ok", "ffprobe-ok"));

    let state = CompositionState::new(video())
        .add_overlay(video(), OverlaySpec::new(Position::BottomLeft).with_opacity(0.5));
    let result = executor.compose(&state).await.unwrap();

    assert_eq!(result.output.bytes(), b"composited");
    assert_eq!(result.output.kind(), AssetKind::Video);
    let meta = result.output.metadata();
    assert_eq!(meta.dimensions(), Some((1920, 1080)));
    assert_eq!(meta.frame_rate, Some(30.0));
    assert_eq!(meta.duration_secs, Some(10.0));
    assert_eq!(meta.format.as_deref(), Some("mp4"));
    assert_empty(work.path());
}

#[tokio::test]
async fn test_engine_receives_graph_and_maps() {
    let work = TempDir::new().unwrap();
    let executor = Executor::new(config(&work, "ffmpeg-args", "ffprobe-ok"));

    let program = compile(&keyed_state()).unwrap();
    executor.execute(&program).await.unwrap();

    let args = std::fs::read_to_string(script("ffmpeg-args.args")).unwrap();
    let args: Vec<&str> = args.lines().collect();

    let graph_at = args.iter().position(|a| *a == "-filter_complex").unwrap();
    assert_eq!(args[graph_at + 1], program.filter_graph());
    assert_eq!(args.iter().filter(|a| **a == "-i").count(), 2);
    assert!(args.windows(2).any(|w| w == ["-map", "[ov0]"]));
    assert!(args.windows(2).any(|w| w == ["-map", "0:a?"]));
    assert!(args.last().unwrap().ends_with("output.mp4"));
    assert_empty(work.path());
}

#[tokio::test]
async fn test_engine_failure_carries_stderr_and_graph() {
    let work = TempDir::new().unwrap();
    let executor = Executor::new(config(&work, "ffmpeg-fail", "ffprobe-ok"));

    match executor.compose(&keyed_state()).await {
        Err(MediaError::EngineFailed {
            stderr,
            exit_code,
            filter_graph,
            ..
        }) => {
            assert!(stderr.contains("No such filter: 'bogus'"));
            assert_eq!(exit_code, Some(1));
            assert!(filter_graph.unwrap().contains("chromakey=color=0x00FF00"));
        }
        other => panic!("expected engine failure, got {other:?}"),
    }
    assert_empty(work.path());
}

#[tokio::test]
async fn test_timeout_kills_engine() {
    let work = TempDir::new().unwrap();
    let executor = Executor::new(
        config(&work, "ffmpeg-slow", "ffprobe-ok").with_timeout(Duration::from_millis(500)),
    );

    let started = Instant::now();
    let err = executor.compose(&keyed_state()).await.unwrap_err();

    assert!(matches!(err, MediaError::Timeout(t) if t == Duration::from_millis(500)));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_empty(work.path());

    let pid = std::fs::read_to_string(script("ffmpeg-slow.pid")).unwrap();
    let pid = pid.trim();
    assert!(!pid.is_empty());
    if cfg!(target_os = "linux") {
        assert!(
            !Path::new(&format!("/proc/{}", pid)).exists(),
            "engine process {} still running",
            pid
        );
    }
}

#[tokio::test]
async fn test_cancellation_kills_engine() {
    let work = TempDir::new().unwrap();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let executor = Executor::new(
        config(&work, "ffmpeg-slow-cancel", "ffprobe-ok").with_timeout(Duration::from_secs(30)),
    )
    .with_cancel(cancel_rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = cancel_tx.send(true);
    });

    let started = Instant::now();
    let err = executor.compose(&keyed_state()).await.unwrap_err();

    assert!(matches!(err, MediaError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_empty(work.path());
}

#[tokio::test]
async fn test_missing_engine_is_spawn_error() {
    fixtures();
    let work = TempDir::new().unwrap();
    let executor = Executor::new(
        config(&work, "ffmpeg-ok", "ffprobe-ok").with_ffmpeg_path("/nonexistent/bin/ffmpeg"),
    );

    let err = executor.compose(&keyed_state()).await.unwrap_err();
    assert!(matches!(err, MediaError::Spawn { .. }));
    assert_empty(work.path());
}

#[tokio::test]
async fn test_probe_failure_degrades_to_default_metadata() {
    let work = TempDir::new().unwrap();
    let executor = Executor::new(config(&work, "ffmpeg-ok", "ffprobe-fail"));

    let result = executor.compose(&keyed_state()).await.unwrap();

    assert_eq!(result.output.bytes(), b"composited");
    let meta = result.output.metadata();
    assert_eq!(meta.dimensions(), None);
    assert_eq!(meta.duration_secs, None);
    assert_eq!(meta.has_audio, Some(true));
    assert_eq!(meta.format.as_deref(), Some("mp4"));
    assert_empty(work.path());
}

#[tokio::test]
async fn test_audio_only_output() {
    let work = TempDir::new().unwrap();
    let executor =
        Executor::new(config(&work, "ffmpeg-ok", "ffprobe-ok").with_probe_output(false));

    let state = CompositionState::new(AssetRef::audio(vec![1u8; 32]))
        .add_overlay(AssetRef::audio(vec![2u8; 32]), OverlaySpec::default().starting_at(1.0))
        .with_output(OutputOptions::new().with_format("wav"));
    let result = executor.compose(&state).await.unwrap();

    assert_eq!(result.output.kind(), AssetKind::Audio);
    assert_eq!(result.output.metadata().format.as_deref(), Some("wav"));
    assert_empty(work.path());
}

#[tokio::test]
async fn test_invalid_composition_never_touches_disk() {
    fixtures();
    let work = TempDir::new().unwrap();
    let work_dir = work.path().join("requests");
    let executor = Executor::new(
        config(&work, "ffmpeg-ok", "ffprobe-ok").with_work_dir(&work_dir),
    );

    let state = CompositionState::new(video())
        .add_overlay(video(), OverlaySpec::default().with_color_key_tolerance(1.2, 0.1));
    let err = executor.compose(&state).await.unwrap_err();
    assert!(matches!(err, MediaError::InvalidComposition(_)));
    assert!(err.is_pre_execution());

    let state = keyed_state().set_custom_filter("[1:v]hflip[ov0_pad]");
    let err = executor.compose(&state).await.unwrap_err();
    assert!(matches!(err, MediaError::GraphBuild { .. }));
    assert!(err.is_pre_execution());

    assert!(!work_dir.exists());
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let work = TempDir::new().unwrap();
    let executor = Executor::new(config(&work, "ffmpeg-ok", "ffprobe-ok"));

    let plain = CompositionState::new(video()).add_overlay(video(), OverlaySpec::default());
    let keyed = keyed_state();
    let (a, b) = tokio::join!(executor.compose(&plain), executor.compose(&keyed));

    assert_eq!(a.unwrap().output.bytes(), b"composited");
    assert_eq!(b.unwrap().output.bytes(), b"composited");
    assert_empty(work.path());
}

#[tokio::test]
async fn test_missing_output_is_io_error_and_cleans_up() {
    let work = TempDir::new().unwrap();
    let executor = Executor::new(config(&work, "ffmpeg-noop", "ffprobe-ok"));

    let err = executor.compose(&keyed_state()).await.unwrap_err();
    assert!(matches!(err, MediaError::Io(_)));
    assert_eq!(err.kind(), "io");
    assert_empty(work.path());
}
