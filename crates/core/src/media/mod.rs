//! Media tool capability.
//!
//! Every external media operation the pipeline needs goes through the
//! [`MediaTool`] trait: probing a file, joining an ordered list of segments
//! into one normalised video, and laying an audio track over a video. The
//! production implementation shells out to ffmpeg/ffprobe; tests inject a
//! recording fake.

mod ffmpeg;
#[cfg(test)]
pub(crate) mod fake;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{MeteorError, Result};

pub use ffmpeg::FfmpegTool;

/// Media-related error types.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ExecutionFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("input file does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("probe error: {0}")]
    Probe(String),
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;

/// Facts about a media file reported by a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds, always positive.
    pub duration_sec: f64,
    pub video: Option<VideoStreamInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Resolution and frame rate shared by every segment of the output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 25.0,
        }
    }
}

impl OutputFormat {
    /// Uses the probed video stream when it looks sane, `fallback` otherwise.
    pub fn from_probe(video: Option<&VideoStreamInfo>, fallback: OutputFormat) -> Self {
        match video {
            Some(stream)
                if stream.width > 0
                    && stream.height > 0
                    && (1.0..=120.0).contains(&stream.fps) =>
            {
                Self {
                    width: stream.width,
                    height: stream.height,
                    fps: stream.fps,
                }
            }
            _ => fallback,
        }
    }

    /// Seconds covered by one output frame.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MeteorError::config("output resolution must be non-zero"));
        }
        if !(1.0..=120.0).contains(&self.fps) {
            return Err(MeteorError::config(format!(
                "output frame rate must lie within 1..=120, got {}",
                self.fps
            )));
        }
        Ok(())
    }
}

/// One piece of the assembled video, in presentation order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A video file used for its full length.
    Clip(PathBuf),
    /// A still image held on screen for `seconds`.
    Still { path: PathBuf, seconds: f64 },
}

impl Segment {
    pub fn path(&self) -> &Path {
        match self {
            Segment::Clip(path) => path,
            Segment::Still { path, .. } => path,
        }
    }
}

/// How background audio is mixed under the video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMix {
    pub volume: f64,
}

/// External media processing capability.
///
/// All calls block until the underlying tool finishes. Implementations must
/// treat a non-zero exit as an error and keep the tool's diagnostics.
pub trait MediaTool {
    /// Reports the duration (and video geometry, when present) of `input`.
    fn probe(&self, input: &Path) -> MediaResult<MediaInfo>;

    /// Joins `segments` in order into `output`, normalising every segment to
    /// `format`. The output has no audio track.
    fn concat(&self, segments: &[Segment], format: &OutputFormat, output: &Path)
        -> MediaResult<()>;

    /// Writes `output` as `video` with `audio` looped or truncated to the
    /// video's length. The video duration never grows.
    fn overlay_audio(
        &self,
        video: &Path,
        audio: &Path,
        mix: &AudioMix,
        output: &Path,
    ) -> MediaResult<()>;
}
