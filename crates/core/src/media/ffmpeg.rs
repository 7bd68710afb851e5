//! ffmpeg/ffprobe backed [`MediaTool`].

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::{
    AudioMix, MediaError, MediaInfo, MediaResult, MediaTool, OutputFormat, Segment,
    VideoStreamInfo,
};

/// Lines of tool stderr kept in an error.
const STDERR_TAIL_LINES: usize = 20;

/// Runs the system (or explicitly configured) ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTool {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Confirms both binaries start and returns ffmpeg's version line.
    pub fn detect(&self) -> MediaResult<String> {
        let output = run(&self.ffmpeg_path, ["-version".to_string()])?;
        run(&self.ffprobe_path, ["-version".to_string()])?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or("unknown").to_string())
    }
}

impl MediaTool for FfmpegTool {
    fn probe(&self, input: &Path) -> MediaResult<MediaInfo> {
        if !input.exists() {
            return Err(MediaError::MissingInput(input.to_path_buf()));
        }

        let output = run(&self.ffprobe_path, probe_args(input))?;
        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn concat(
        &self,
        segments: &[Segment],
        format: &OutputFormat,
        output: &Path,
    ) -> MediaResult<()> {
        for segment in segments {
            if !segment.path().exists() {
                return Err(MediaError::MissingInput(segment.path().to_path_buf()));
            }
        }

        run(&self.ffmpeg_path, concat_args(segments, format, output)).map(|_| ())
    }

    fn overlay_audio(
        &self,
        video: &Path,
        audio: &Path,
        mix: &AudioMix,
        output: &Path,
    ) -> MediaResult<()> {
        if !audio.exists() {
            return Err(MediaError::MissingInput(audio.to_path_buf()));
        }

        run(&self.ffmpeg_path, overlay_args(video, audio, mix, output)).map(|_| ())
    }
}

fn run<I>(program: &Path, args: I) -> MediaResult<Output>
where
    I: IntoIterator<Item = String>,
{
    let tool = program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    let args: Vec<String> = args.into_iter().collect();
    tracing::debug!(%tool, args = %args.join(" "), "running media tool");

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|source| MediaError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(MediaError::ExecutionFailed {
            tool,
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(output)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        input.to_string_lossy().into_owned(),
    ]
}

/// Builds one ffmpeg invocation that scales, pads and re-times every segment
/// to `format` before concatenating them.
fn concat_args(segments: &[Segment], format: &OutputFormat, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
        .into_iter()
        .map(String::from)
        .collect();

    for segment in segments {
        if let Segment::Still { seconds, .. } = segment {
            args.extend(["-loop".to_string(), "1".to_string()]);
            args.extend(["-t".to_string(), format!("{seconds}")]);
        }
        args.extend(["-i".to_string(), segment.path().to_string_lossy().into_owned()]);
    }

    let OutputFormat { width, height, fps } = *format;
    let mut graph = String::new();
    for index in 0..segments.len() {
        graph.push_str(&format!(
            "[{index}:v]fps={fps},scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{index}];"
        ));
    }
    for index in 0..segments.len() {
        graph.push_str(&format!("[v{index}]"));
    }
    graph.push_str(&format!(
        "concat=n={}:v=1:a=0,format=yuv420p[vout]",
        segments.len()
    ));

    let rate = format!("{fps}");
    args.extend(
        [
            "-filter_complex",
            graph.as_str(),
            "-map",
            "[vout]",
            "-r",
            rate.as_str(),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]
        .into_iter()
        .map(String::from),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

fn overlay_args(video: &Path, audio: &Path, mix: &AudioMix, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        video.to_string_lossy().into_owned(),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        audio.to_string_lossy().into_owned(),
        "-filter_complex".to_string(),
        format!("[1:a]volume={}[aud]", mix.volume),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "[aud]".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-shortest".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Parse ffprobe JSON output.
fn parse_probe_output(json_str: &str) -> MediaResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| MediaError::Probe(format!("failed to parse ffprobe output: {e}")))?;

    let duration_sec = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::Probe("no usable duration reported".to_string()))?;

    let video = json
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("video"))
        })
        .and_then(parse_video_stream);

    Ok(MediaInfo {
        duration_sec,
        video,
    })
}

fn parse_video_stream(stream: &serde_json::Value) -> Option<VideoStreamInfo> {
    let width = stream.get("width")?.as_u64()? as u32;
    let height = stream.get("height")?.as_u64()? as u32;
    let fps = ["r_frame_rate", "avg_frame_rate"]
        .iter()
        .filter_map(|key| stream.get(*key).and_then(|v| v.as_str()))
        .find_map(parse_frame_rate)?;

    Some(VideoStreamInfo { width, height, fps })
}

/// Parses "30000/1001" or "25" style rates.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => raw.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_probe_output_with_video() {
        let json = r#"{
            "streams": [
                { "codec_type": "audio", "sample_rate": "48000" },
                { "codec_type": "video", "width": 1280, "height": 720, "r_frame_rate": "25/1" }
            ],
            "format": { "duration": "300.040000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2" }
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!((info.duration_sec - 300.04).abs() < 1e-9);
        assert_eq!(
            info.video,
            Some(VideoStreamInfo {
                width: 1280,
                height: 720,
                fps: 25.0
            })
        );
    }

    #[test]
    fn parses_fractional_frame_rate() {
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn missing_or_zero_duration_is_unusable() {
        let err = parse_probe_output(r#"{ "format": {} }"#).unwrap_err();
        assert!(matches!(err, MediaError::Probe(_)));

        let err = parse_probe_output(r#"{ "format": { "duration": "0.000000" } }"#).unwrap_err();
        assert!(matches!(err, MediaError::Probe(_)));

        assert!(parse_probe_output("not json").is_err());
    }

    #[test]
    fn concat_args_hold_stills_and_normalise_every_input() {
        let segments = vec![
            Segment::Clip(PathBuf::from("/night/images/timelapse.mp4")),
            Segment::Still {
                path: PathBuf::from("/night/fieldsums.png"),
                seconds: 3.0,
            },
            Segment::Still {
                path: PathBuf::from("/night/radiants.png"),
                seconds: 3.0,
            },
        ];
        let args = concat_args(&segments, &OutputFormat::default(), Path::new("/tmp/out.mp4"));

        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        assert_eq!(args.iter().filter(|a| *a == "-loop").count(), 2);
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("[0:v]fps=25,scale=1280:720"));
        assert!(graph.contains("[v0][v1][v2]concat=n=3:v=1:a=0"));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn overlay_args_loop_audio_and_stop_with_video() {
        let args = overlay_args(
            Path::new("video.mp4"),
            Path::new("bg.mp3"),
            &AudioMix { volume: 0.6 },
            Path::new("final.mp4"),
        );
        let loop_at = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[loop_at + 1], "-1");
        assert_eq!(args[loop_at + 3], "bg.mp3");
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"[1:a]volume=0.6[aud]".to_string()));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let noisy: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(noisy.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let tool = FfmpegTool::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(matches!(tool.detect(), Err(MediaError::Spawn { .. })));
    }
}
