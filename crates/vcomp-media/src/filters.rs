//! FFmpeg filter bodies used by the compiler.
//!
//! Each function returns the text between a statement's input and output
//! labels; labels are attached by [`crate::graph::Statement`].

use vcomp_models::{Position, Resolution, RgbHex};

/// Smallest similarity FFmpeg's `chromakey` accepts.
pub const MIN_CHROMAKEY_SIMILARITY: f64 = 0.00001;

/// Shortest decimal text that reads back as the same value (`2`, `2.5`,
/// `0.0004`). Never uses exponent notation.
pub fn format_number(value: f64) -> String {
    // -0.0 + 0.0 == +0.0
    format!("{}", value + 0.0)
}

/// Scale into `target` preserving aspect ratio, pad to fill, then force a
/// common sample aspect ratio, frame rate and pixel format.
pub fn normalize_video(target: Resolution, fps: f64) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p",
        w = target.width,
        h = target.height,
        fps = format_number(fps),
    )
}

/// Resample to a common rate, sample format and channel layout.
pub fn normalize_audio(sample_rate: u32) -> String {
    format!(
        "aresample={},aformat=sample_fmts=fltp:channel_layouts=stereo",
        sample_rate
    )
}

/// Silent stereo track of a fixed duration, matching [`normalize_audio`].
pub fn silent_audio(sample_rate: u32, duration_secs: f64) -> String {
    format!(
        "anullsrc=channel_layout=stereo:sample_rate={},atrim=duration={},\
         aformat=sample_fmts=fltp:channel_layouts=stereo",
        sample_rate,
        format_number(duration_secs)
    )
}

/// Concatenate `segments` clips with the given stream counts per segment.
pub fn concat(segments: usize, video: bool, audio: bool) -> String {
    format!(
        "concat=n={}:v={}:a={}",
        segments,
        u8::from(video),
        u8::from(audio)
    )
}

/// Transparent lead-in of `secs` before the content, timestamps reset.
pub fn time_pad(secs: f64) -> String {
    format!(
        "format=rgba,tpad=start_duration={}:start_mode=add:color=black@0.0,setpts=PTS-STARTPTS",
        format_number(secs)
    )
}

/// Promote to an alpha-capable format and key out `color`.
pub fn color_key(color: RgbHex, similarity: f64, blend: f64) -> String {
    format!(
        "format=rgba,chromakey=color={}:similarity={}:blend={}",
        color,
        format_number(similarity.max(MIN_CHROMAKEY_SIMILARITY)),
        format_number(blend)
    )
}

/// Scale to explicit sizes; `None` on one axis keeps the aspect ratio.
pub fn scale(width: Option<u32>, height: Option<u32>) -> String {
    let axis = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_else(|| "-1".to_string());
    format!("scale={}:{}", axis(width), axis(height))
}

/// Multiply the alpha channel by `opacity`.
pub fn alpha(opacity: f64) -> String {
    format!("format=rgba,colorchannelmixer=aa={}", format_number(opacity))
}

/// Overlay position expressions in terms of `W`,`H` (base) and `w`,`h`
/// (overlay).
pub fn position_expr(position: Position) -> (&'static str, &'static str) {
    match position {
        Position::TopLeft => ("0", "0"),
        Position::TopRight => ("W-w", "0"),
        Position::BottomLeft => ("0", "H-h"),
        Position::BottomRight => ("W-w", "H-h"),
        Position::Center => ("(W-w)/2", "(H-h)/2"),
    }
}

/// Numeric overlay coordinates for known base and overlay sizes.
pub fn resolve_position(position: Position, base: Resolution, overlay: Resolution) -> (i64, i64) {
    let dx = base.width as i64 - overlay.width as i64;
    let dy = base.height as i64 - overlay.height as i64;
    match position {
        Position::TopLeft => (0, 0),
        Position::TopRight => (dx, 0),
        Position::BottomLeft => (0, dy),
        Position::BottomRight => (dx, dy),
        Position::Center => (dx / 2, dy / 2),
    }
}

/// Visibility window: `between(t,start,end)` when bounded, `gte(t,start)`
/// when open-ended.
pub fn enable_window(start: f64, end: Option<f64>) -> String {
    match end {
        Some(end) => format!("between(t,{},{})", format_number(start), format_number(end)),
        None => format!("gte(t,{})", format_number(start)),
    }
}

/// Overlay filter body.
pub fn overlay(position: Position, enable: Option<&str>) -> String {
    let (x, y) = position_expr(position);
    match enable {
        Some(window) => format!("overlay=x={}:y={}:format=auto:enable='{}'", x, y, window),
        None => format!("overlay=x={}:y={}:format=auto", x, y),
    }
}

/// Delay and optionally cut an overlay's audio to its visibility window.
pub fn audio_timing(start: f64, end: Option<f64>) -> String {
    let mut parts = Vec::new();
    if start > 0.0 {
        parts.push(format!("adelay=delays={}:all=1", format_number(start * 1000.0)));
    }
    if let Some(end) = end {
        parts.push(format!("atrim=end={}", format_number(end)));
    }
    parts.join(",")
}

/// Mix `inputs` audio streams without level normalization.
pub fn mix(inputs: usize) -> String {
    format!(
        "amix=inputs={}:duration=longest:dropout_transition=0:normalize=0",
        inputs
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.125), "0.125");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(10.25), "10.25");
        assert_eq!(format_number(0.0004), "0.0004");
        assert_eq!(format_number(0.00001), "0.00001");
    }

    #[test]
    fn test_small_values_keep_their_precision() {
        assert!(time_pad(0.0004).contains("tpad=start_duration=0.0004:"));
        assert_eq!(enable_window(0.0004, None), "gte(t,0.0004)");
        assert_eq!(alpha(0.004), "format=rgba,colorchannelmixer=aa=0.004");
        assert_eq!(
            color_key(RgbHex::new(0, 255, 0), 0.004, 0.0025),
            "format=rgba,chromakey=color=0x00FF00:similarity=0.004:blend=0.0025"
        );
    }

    #[test]
    fn test_color_key_similarity_floor() {
        let green = RgbHex::new(0, 255, 0);
        assert!(color_key(green, 0.0, 0.0).contains("similarity=0.00001:blend=0"));
        assert!(color_key(green, 0.00001, 0.0).contains("similarity=0.00001:"));
    }

    #[test]
    fn test_position_formulas() {
        let base = Resolution::new(1920, 1080);
        let overlay = Resolution::new(480, 270);
        assert_eq!(resolve_position(Position::TopRight, base, overlay), (1440, 0));
        assert_eq!(resolve_position(Position::Center, base, overlay), (720, 405));
        assert_eq!(resolve_position(Position::BottomLeft, base, overlay), (0, 810));
        assert_eq!(resolve_position(Position::BottomRight, base, overlay), (1440, 810));
        assert_eq!(resolve_position(Position::TopLeft, base, overlay), (0, 0));
        assert_eq!(position_expr(Position::TopRight), ("W-w", "0"));
    }

    #[test]
    fn test_overlay_body() {
        assert_eq!(
            overlay(Position::TopRight, Some("gte(t,2)")),
            "overlay=x=W-w:y=0:format=auto:enable='gte(t,2)'"
        );
        assert_eq!(
            overlay(Position::Center, None),
            "overlay=x=(W-w)/2:y=(H-h)/2:format=auto"
        );
    }

    #[test]
    fn test_enable_window() {
        assert_eq!(enable_window(2.0, Some(5.5)), "between(t,2,5.5)");
        assert_eq!(enable_window(2.0, None), "gte(t,2)");
    }

    #[test]
    fn test_color_key_and_alpha() {
        let key = color_key(RgbHex::new(0, 255, 0), 0.3, 0.1);
        assert_eq!(key, "format=rgba,chromakey=color=0x00FF00:similarity=0.3:blend=0.1");
        assert_eq!(alpha(0.7), "format=rgba,colorchannelmixer=aa=0.7");
    }

    #[test]
    fn test_scale_and_concat() {
        assert_eq!(scale(Some(480), None), "scale=480:-1");
        assert_eq!(scale(None, Some(270)), "scale=-1:270");
        assert_eq!(concat(3, true, true), "concat=n=3:v=1:a=1");
        assert_eq!(concat(2, false, true), "concat=n=2:v=0:a=1");
    }

    #[test]
    fn test_audio_timing() {
        assert_eq!(audio_timing(2.0, Some(5.0)), "adelay=delays=2000:all=1,atrim=end=5");
        assert_eq!(audio_timing(0.0, Some(3.0)), "atrim=end=3");
        assert_eq!(audio_timing(1.5, None), "adelay=delays=1500:all=1");
    }

    #[test]
    fn test_normalize_bodies() {
        let video = normalize_video(Resolution::new(1280, 720), 30.0);
        assert!(video.starts_with("scale=1280:720:force_original_aspect_ratio=decrease"));
        assert!(video.contains("pad=1280:720:(ow-iw)/2:(oh-ih)/2"));
        assert!(video.contains("setsar=1"));
        assert!(video.contains("fps=30,"));

        let ntsc = normalize_video(Resolution::new(1280, 720), 30000.0 / 1001.0);
        assert!(ntsc.contains(&format!("fps={},", 30000.0 / 1001.0)));
        assert!(!ntsc.contains("fps=29.97,"));

        assert!(normalize_audio(48000).contains("aresample=48000"));
        assert!(silent_audio(44100, 4.0).contains("atrim=duration=4"));
        assert!(mix(3).contains("normalize=0"));
    }
}
