//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// FFmpeg binary (name on PATH or absolute path)
    pub ffmpeg_path: PathBuf,
    /// FFprobe binary (name on PATH or absolute path)
    pub ffprobe_path: PathBuf,
    /// Hard deadline for the FFmpeg process
    pub timeout: Duration,
    /// Directory under which per-request staging directories are created
    pub work_dir: PathBuf,
    /// FFmpeg `-v` log level
    pub log_level: String,
    /// Probe the output file for metadata after a successful run
    pub probe_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            timeout: Duration::from_secs(600), // 10 minutes
            work_dir: std::env::temp_dir().join("vcomp"),
            log_level: "error".to_string(),
            probe_output: true,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_path: std::env::var("VCOMP_FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("VCOMP_FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_path),
            timeout: std::env::var("VCOMP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            work_dir: std::env::var("VCOMP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            log_level: std::env::var("VCOMP_FFMPEG_LOGLEVEL").unwrap_or(defaults.log_level),
            probe_output: std::env::var("VCOMP_PROBE_OUTPUT")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.probe_output),
        }
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn with_ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_probe_output(mut self, probe: bool) -> Self {
        self.probe_output = probe;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
