//! Builds the daily summary video.
//!
//! The timelapse plays first, followed by the configured summary stills and,
//! when configured, a background audio bed. Everything is written inside a
//! scoped work directory owned by the returned [`Artifact`]; dropping the
//! artifact removes the directory, so no partial media outlives a run.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{
    config::{AudioConfig, ImageConfig},
    media::{AudioMix, MediaTool, OutputFormat, Segment},
    validate::ValidatedSession,
    MeteorError, Result,
};

/// The assembled video for one session.
#[derive(Debug)]
pub struct Artifact {
    // Held for its Drop: removing the directory cleans up every output.
    _workspace: TempDir,
    path: PathBuf,
    /// Probed duration of the finished file, or the expected one if the
    /// final probe failed.
    pub duration_sec: f64,
    /// Timelapse duration plus one slot per still.
    pub expected_duration: f64,
    pub stills: Vec<PathBuf>,
    pub has_audio: bool,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the artifact into `dir` so it survives the work directory.
    pub fn retain(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| MeteorError::config("artifact path has no file name"))?;
        let destination = dir.join(file_name);
        std::fs::copy(&self.path, &destination)?;
        tracing::info!(path = %destination.display(), "artifact retained");
        Ok(destination)
    }
}

/// Turns a validated session into an [`Artifact`] using a [`MediaTool`].
pub struct Assembler<'a> {
    images: &'a ImageConfig,
    audio: Option<&'a AudioConfig>,
    work_root: Option<&'a Path>,
}

impl<'a> Assembler<'a> {
    /// `work_root` is where the scoped work directory is created; the system
    /// temp dir when `None`.
    pub fn new(
        images: &'a ImageConfig,
        audio: Option<&'a AudioConfig>,
        work_root: Option<&'a Path>,
    ) -> Self {
        Self {
            images,
            audio,
            work_root,
        }
    }

    pub fn assemble(&self, session: &ValidatedSession, media: &dyn MediaTool) -> Result<Artifact> {
        let workspace = self.create_workspace()?;
        let stem = format!("{}_summary", session.session.folder_name);
        let silent = workspace.path().join(format!("{stem}.noaudio.mp4"));
        let path = workspace.path().join(format!("{stem}.mp4"));

        let stills = collect_stills(session, &self.images.keywords);
        let format = OutputFormat::from_probe(
            session.session.timelapse_video.as_ref(),
            self.images.fallback_format,
        );
        let segments: Vec<Segment> = std::iter::once(Segment::Clip(session.timelapse.clone()))
            .chain(stills.iter().map(|still| Segment::Still {
                path: still.clone(),
                seconds: self.images.seconds_per_image,
            }))
            .collect();
        let expected_duration =
            session.timelapse_duration + stills.len() as f64 * self.images.seconds_per_image;

        tracing::info!(
            stills = stills.len(),
            width = format.width,
            height = format.height,
            fps = format.fps,
            expected_duration,
            "joining timelapse and stills"
        );
        media
            .concat(&segments, &format, &silent)
            .map_err(MeteorError::Assembly)?;

        let has_audio = match self.audio {
            Some(audio) => self.mix_audio(media, audio, &silent, &path),
            None => false,
        };
        if !has_audio {
            std::fs::rename(&silent, &path)?;
        }

        let duration_sec = match media.probe(&path) {
            Ok(info) => info.duration_sec,
            Err(e) => {
                tracing::warn!(error = %e, "could not probe finished artifact; using expected duration");
                expected_duration
            }
        };
        if (duration_sec - expected_duration).abs() > format.frame_interval() {
            tracing::warn!(
                duration_sec,
                expected_duration,
                "artifact duration differs from timelapse plus stills"
            );
        }

        tracing::info!(path = %path.display(), duration_sec, has_audio, "artifact assembled");
        Ok(Artifact {
            _workspace: workspace,
            path,
            duration_sec,
            expected_duration,
            stills,
            has_audio,
        })
    }

    /// Any failure here is logged and the silent video is used instead.
    fn mix_audio(
        &self,
        media: &dyn MediaTool,
        audio: &AudioConfig,
        video: &Path,
        output: &Path,
    ) -> bool {
        if !audio.path.is_file() {
            tracing::warn!(
                audio = %audio.path.display(),
                "background audio is missing; continuing without it"
            );
            return false;
        }

        let mix = AudioMix {
            volume: audio.volume,
        };
        match media.overlay_audio(video, &audio.path, &mix, output) {
            Ok(()) => {
                if let Err(e) = std::fs::remove_file(video) {
                    tracing::debug!(error = %e, "could not remove silent intermediate");
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "audio overlay failed; continuing without audio");
                if let Err(e) = std::fs::remove_file(output) {
                    tracing::debug!(error = %e, "no partial overlay output to remove");
                }
                false
            }
        }
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("meteor-summary-");
        let workspace = match self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(workspace)
    }
}

/// Resolves the configured keywords to files, in keyword order. A keyword
/// matching the validated stack image's name takes that image, so the video
/// shows the same detections the title counts. Other keywords take the
/// lexicographically first file containing them, looking in the session
/// folder and then next to the timelapse.
pub fn collect_stills(session: &ValidatedSession, keywords: &[String]) -> Vec<PathBuf> {
    let mut dirs = vec![session.session.folder.clone()];
    if let Some(parent) = session.timelapse.parent() {
        if parent != session.session.folder {
            dirs.push(parent.to_path_buf());
        }
    }
    let listings: Vec<Vec<(String, PathBuf)>> = dirs.iter().map(|dir| list_files(dir)).collect();

    let stack_name = session
        .stack_image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let mut stills: Vec<PathBuf> = Vec::new();
    for keyword in keywords {
        if stack_name
            .as_deref()
            .is_some_and(|name| name.contains(keyword.as_str()))
            && !stills.contains(&session.stack_image)
        {
            stills.push(session.stack_image.clone());
            continue;
        }
        let found = listings.iter().find_map(|files| {
            files
                .iter()
                .find(|(name, path)| name.contains(keyword.as_str()) && !stills.contains(path))
                .map(|(_, path)| path.clone())
        });
        match found {
            Some(path) => stills.push(path),
            None => tracing::debug!(%keyword, "no summary image matches keyword"),
        }
    }
    stills
}

fn list_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .collect();
    files.sort();
    files
}
