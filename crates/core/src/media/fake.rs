//! Recording [`MediaTool`] used by tests in place of ffmpeg.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{
    AudioMix, MediaError, MediaInfo, MediaResult, MediaTool, OutputFormat, Segment,
    VideoStreamInfo,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Probe(PathBuf),
    Concat {
        segments: Vec<Segment>,
        format: OutputFormat,
        output: PathBuf,
    },
    Overlay {
        video: PathBuf,
        audio: PathBuf,
        output: PathBuf,
    },
}

/// Knows durations for the files it was told about and for every file it
/// "produced". Outputs are written to disk as small placeholder files.
#[derive(Debug, Default)]
pub(crate) struct FakeMediaTool {
    durations: RefCell<HashMap<PathBuf, f64>>,
    audio_tracks: RefCell<HashMap<PathBuf, f64>>,
    calls: RefCell<Vec<Call>>,
    fail_concat: bool,
    fail_overlay: bool,
}

impl FakeMediaTool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_duration(self, path: impl Into<PathBuf>, seconds: f64) -> Self {
        self.durations.borrow_mut().insert(path.into(), seconds);
        self
    }

    pub(crate) fn failing_concat(mut self) -> Self {
        self.fail_concat = true;
        self
    }

    pub(crate) fn failing_overlay(mut self) -> Self {
        self.fail_overlay = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn concat_calls(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Concat { .. }))
            .count()
    }

    /// Length of the audio track muxed into `path`, if any.
    pub(crate) fn audio_duration(&self, path: &Path) -> Option<f64> {
        self.audio_tracks.borrow().get(path).copied()
    }

    fn produce(&self, output: &Path, seconds: f64) -> MediaResult<()> {
        std::fs::write(output, b"fake media").map_err(|source| MediaError::Spawn {
            tool: "fake".to_string(),
            source,
        })?;
        self.durations
            .borrow_mut()
            .insert(output.to_path_buf(), seconds);
        Ok(())
    }
}

impl MediaTool for FakeMediaTool {
    fn probe(&self, input: &Path) -> MediaResult<MediaInfo> {
        self.calls.borrow_mut().push(Call::Probe(input.to_path_buf()));
        if !input.exists() {
            return Err(MediaError::MissingInput(input.to_path_buf()));
        }

        match self.durations.borrow().get(input) {
            Some(&duration_sec) => Ok(MediaInfo {
                duration_sec,
                video: Some(VideoStreamInfo {
                    width: 1280,
                    height: 720,
                    fps: 25.0,
                }),
            }),
            None => Err(MediaError::Probe("no usable duration reported".to_string())),
        }
    }

    fn concat(
        &self,
        segments: &[Segment],
        format: &OutputFormat,
        output: &Path,
    ) -> MediaResult<()> {
        self.calls.borrow_mut().push(Call::Concat {
            segments: segments.to_vec(),
            format: *format,
            output: output.to_path_buf(),
        });
        if self.fail_concat {
            return Err(MediaError::ExecutionFailed {
                tool: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Error while filtering".to_string(),
            });
        }

        let total: f64 = segments
            .iter()
            .map(|segment| match segment {
                Segment::Clip(path) => self.durations.borrow().get(path).copied().unwrap_or(0.0),
                Segment::Still { seconds, .. } => *seconds,
            })
            .sum();
        self.produce(output, total)
    }

    fn overlay_audio(
        &self,
        video: &Path,
        audio: &Path,
        _mix: &AudioMix,
        output: &Path,
    ) -> MediaResult<()> {
        self.calls.borrow_mut().push(Call::Overlay {
            video: video.to_path_buf(),
            audio: audio.to_path_buf(),
            output: output.to_path_buf(),
        });
        if self.fail_overlay {
            // ffmpeg leaves a truncated file behind when it dies mid-write.
            let _ = std::fs::write(output, b"partial");
            return Err(MediaError::ExecutionFailed {
                tool: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        if !audio.exists() {
            return Err(MediaError::MissingInput(audio.to_path_buf()));
        }

        let video_len = self.durations.borrow().get(video).copied().unwrap_or(0.0);
        self.produce(output, video_len)?;
        // Looped or cut to the video, as `-stream_loop -1 -shortest` does.
        self.audio_tracks
            .borrow_mut()
            .insert(output.to_path_buf(), video_len);
        Ok(())
    }
}
