//! FFprobe metadata extraction.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use vcomp_models::AssetMetadata;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

/// Probe a media file for metadata.
pub async fn probe_file(
    ffprobe: &Path,
    path: &Path,
    timeout: Duration,
) -> MediaResult<AssetMetadata> {
    if !path.exists() {
        return Err(MediaError::probe_failed(
            format!("File not found: {}", path.display()),
            None,
        ));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(MediaError::probe_failed(
                format!("Failed to run {}: {}", ffprobe.display(), e),
                None,
            ))
        }
        Err(_) => {
            return Err(MediaError::probe_failed(
                format!("FFprobe timed out after {:.1}s", timeout.as_secs_f64()),
                None,
            ))
        }
    };

    if !output.status.success() {
        return Err(MediaError::probe_failed(
            "FFprobe failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    parse_probe_output(&output.stdout)
}

/// Turn FFprobe's JSON document into asset metadata.
pub fn parse_probe_output(json: &[u8]) -> MediaResult<AssetMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| MediaError::probe_failed(format!("Unreadable FFprobe output: {}", e), None))?;

    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

    // Container duration first, longest stream otherwise.
    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_positive)
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_positive))
                .reduce(f64::max)
        });

    let frame_rate = video.and_then(|v| {
        v.avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .filter(|r| *r > 0.0)
            .or_else(|| v.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .filter(|r| *r > 0.0)
    });

    Ok(AssetMetadata {
        duration_secs,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        frame_rate,
        sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
        channels: audio.and_then(|a| a.channels),
        has_audio: Some(audio.is_some()),
        format: probe
            .format
            .as_ref()
            .and_then(|f| f.format_name.as_deref())
            .and_then(|name| name.split(',').next())
            .map(str::to_string),
    })
}

fn parse_positive(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}
