use std::path::{Path, PathBuf};

use chrono::{
    format::{Item, StrftimeItems},
    NaiveDate,
};
use serde::{Deserialize, Serialize};

use crate::{media::OutputFormat, MeteorError, Result};

/// Top-level configuration structure for a pipeline run.
///
/// Built once at process start (file, then command line overrides) and handed
/// to every stage by reference. Nothing in the core reads ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub archive: ArchiveConfig,
    pub images: ImageConfig,
    /// Background audio; `None` disables the overlay step entirely.
    pub audio: Option<AudioConfig>,
    pub metadata: MetadataConfig,
    pub publish: PublishConfig,
    pub artifact: ArtifactConfig,
    /// State file used to skip sessions that were already uploaded.
    pub ledger_path: Option<PathBuf>,
    /// Seconds between the two timelapse size samples; `0` disables the check.
    pub settle_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            images: ImageConfig::default(),
            audio: None,
            metadata: MetadataConfig::default(),
            publish: PublishConfig::default(),
            artifact: ArtifactConfig::default(),
            ledger_path: None,
            settle_seconds: 3,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON configuration file and validates it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive.timelapse_patterns.is_empty() {
            return Err(MeteorError::config(
                "at least one timelapse pattern is required",
            ));
        }
        for pattern in &self.archive.timelapse_patterns {
            globset::Glob::new(pattern).map_err(|e| {
                MeteorError::config(format!("invalid timelapse pattern `{pattern}`: {e}"))
            })?;
        }

        if !(self.images.seconds_per_image > 0.0 && self.images.seconds_per_image.is_finite()) {
            return Err(MeteorError::config(format!(
                "seconds_per_image must be positive, got {}",
                self.images.seconds_per_image
            )));
        }
        self.images.fallback_format.validate()?;

        if let Some(audio) = &self.audio {
            if !(0.0..=4.0).contains(&audio.volume) {
                return Err(MeteorError::config(format!(
                    "audio volume must lie within 0..=4, got {}",
                    audio.volume
                )));
            }
        }

        if self.metadata.title_template.trim().is_empty() {
            return Err(MeteorError::config("title template must not be empty"));
        }
        if StrftimeItems::new(&self.metadata.date_format).any(|item| item == Item::Error) {
            return Err(MeteorError::config(format!(
                "invalid date format `{}`",
                self.metadata.date_format
            )));
        }

        Ok(())
    }
}

/// Where sessions live and how the target night is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub root: PathBuf,
    /// Globs relative to a session folder, most preferred first.
    pub timelapse_patterns: Vec<String>,
    pub date_policy: DatePolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/home/rms/RMS_data/ArchivedFiles"),
            timelapse_patterns: [
                "images/timelapse*.mp4",
                "images/images*.mp4",
                "video/*timelapse*.mp4",
                "video/*.mp4",
                "*timelapse*.mp4",
                "*.mp4",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            date_policy: DatePolicy::Latest,
        }
    }
}

/// Which night a run targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DatePolicy {
    /// Most recent date present in the archive.
    #[default]
    Latest,
    /// Most recent date, provided it is no older than `days` before today.
    WithinDays { days: u32 },
    /// One specific night.
    Exact { date: NaiveDate },
}

/// Still images appended after the timelapse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Filename fragments, in presentation order. Each selects at most one file.
    pub keywords: Vec<String>,
    pub seconds_per_image: f64,
    /// Output format used when the timelapse cannot be probed for one.
    pub fallback_format: OutputFormat,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            keywords: [
                "_meteors.jpg",
                "captured_stack.jpg",
                "report_astrometry.jpg",
                "fieldsums.png",
                "observing_periods.png",
                "radiants.png",
                "report_photometry.png",
                "photometry_variation.png",
                "calibration_variation.png",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            seconds_per_image: 3.0,
            fallback_format: OutputFormat::default(),
        }
    }
}

/// Background audio overlaid on the finished video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub path: PathBuf,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    0.6
}

/// Templates and fixed fields for the uploaded video's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub title_template: String,
    pub description_template: String,
    pub tags: Vec<String>,
    /// `chrono` format string used for `{date}`.
    pub date_format: String,
    pub category_id: String,
    pub privacy: PrivacyStatus,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            title_template: "Meteor Camera on {date} with {meteors} Meteors Detected  {station}"
                .to_string(),
            description_template: concat!(
                "Nightly summary from Global Meteor Network station {station}.\n",
                "Date: {date}\n",
                "Meteors detected: {meteors}\n",
                "Duration: {duration}\n",
                "#meteor #GMN #MeteorNetwork"
            )
            .to_string(),
            tags: ["meteor", "GMN", "RMS", "meteor detection", "night sky", "{station}"]
                .into_iter()
                .map(String::from)
                .collect(),
            date_format: "%d-%m-%Y".to_string(),
            category_id: "28".to_string(),
            privacy: PrivacyStatus::Public,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    Private,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Run every local stage but replace the upload with a report.
    pub dry_run: bool,
    /// Environment variable holding an OAuth access token for the upload.
    pub access_token_env: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            access_token_env: "YOUTUBE_ACCESS_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Parent for the scoped work directory; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
    pub retention: Retention,
}

/// What happens to the assembled video once the publish attempt is over.
///
/// The work directory is always removed. `Keep` copies the artifact out first,
/// whatever the publish result was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Retention {
    #[default]
    Delete,
    Keep { dir: PathBuf },
}
