//! Stage orchestration: scan, validate, assemble, publish.
//!
//! Stages run strictly one after another. A fatal error stops the run where
//! it happens and is reported once as a [`PipelineFailure`]; "nothing to do"
//! conditions end the run early with [`RunOutcome::NothingToPublish`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;

use crate::{
    archive::{ArchiveScanner, Selection},
    assemble::{Artifact, Assembler},
    config::{PipelineConfig, Retention},
    ledger::UploadLedger,
    media::MediaTool,
    metadata::PublishMetadata,
    publish::Publisher,
    validate::{select_eligible, ValidatedSession, Validation},
    PipelineFailure, Stage,
};

/// Why a run ended without publishing. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyArchive,
    NoSessionForDate(NaiveDate),
    NoRecentSession { latest: NaiveDate, today: NaiveDate },
    NoMeteors { folder: String },
    MissingTimelapse { folder: String },
    TimelapseStillGrowing { folder: String },
    AlreadyPublished { folder: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyArchive => write!(f, "archive holds no session folders"),
            SkipReason::NoSessionForDate(date) => write!(f, "no session recorded on {date}"),
            SkipReason::NoRecentSession { latest, today } => {
                write!(f, "latest session ({latest}) is too old for {today}")
            }
            SkipReason::NoMeteors { folder } => write!(f, "{folder}: no meteors detected"),
            SkipReason::MissingTimelapse { folder } => write!(f, "{folder}: no timelapse found"),
            SkipReason::TimelapseStillGrowing { folder } => {
                write!(f, "{folder}: timelapse is still being written")
            }
            SkipReason::AlreadyPublished { folder } => write!(f, "{folder}: already published"),
        }
    }
}

/// Summary of a run that reached the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport {
    pub folder: String,
    pub meteor_count: u32,
    pub artifact_duration: f64,
    pub metadata: PublishMetadata,
    pub remote_id: Option<String>,
    pub dry_run: bool,
    /// Where the artifact was kept, under the `keep` retention policy.
    pub retained: Option<PathBuf>,
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Published(PublishReport),
    NothingToPublish(SkipReason),
}

/// Runs one scan-to-publish pass over the archive.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    media: &'a dyn MediaTool,
    publisher: &'a dyn Publisher,
    today: NaiveDate,
}

impl<'a> Pipeline<'a> {
    /// `today` anchors relative date policies; the caller reads the clock.
    pub fn new(
        config: &'a PipelineConfig,
        media: &'a dyn MediaTool,
        publisher: &'a dyn Publisher,
        today: NaiveDate,
    ) -> Self {
        Self {
            config,
            media,
            publisher,
            today,
        }
    }

    /// Runs every stage once. The work directory is gone when this returns.
    pub fn run(&self) -> Result<RunOutcome, PipelineFailure> {
        tracing::info!(
            archive = %self.config.archive.root.display(),
            dry_run = self.config.publish.dry_run,
            "starting run"
        );

        let scanner = ArchiveScanner::new(&self.config.archive)
            .map_err(|e| PipelineFailure::new(Stage::Scan, e))?;
        let selection = scanner
            .select_target(self.media, self.today)
            .map_err(|e| PipelineFailure::new(Stage::Scan, e))?;
        let (date, candidates) = match selection {
            Selection::Night { date, candidates } => (date, candidates),
            Selection::Skip(reason) => return Ok(skip(reason)),
        };

        let validation =
            select_eligible(date, candidates).map_err(|e| PipelineFailure::new(Stage::Validate, e))?;
        let session = match validation {
            Validation::Eligible(session) => session,
            Validation::Skip(reason) => return Ok(skip(reason)),
        };
        if let Some(reason) = self
            .readiness(&session)
            .map_err(|e| PipelineFailure::new(Stage::Validate, e))?
        {
            return Ok(skip(reason));
        }

        let artifact = Assembler::new(
            &self.config.images,
            self.config.audio.as_ref(),
            self.config.artifact.work_dir.as_deref(),
        )
        .assemble(&session, self.media)
        .map_err(|e| PipelineFailure::new(Stage::Assemble, e))?;

        let metadata =
            PublishMetadata::build(&self.config.metadata, &session, artifact.duration_sec);
        let published = self.publisher.publish(artifact.path(), &metadata);
        let retained = self.retain(&artifact);
        let receipt = published.map_err(|e| PipelineFailure::new(Stage::Publish, e))?;

        if let (Some(ledger), Some(remote_id)) = (self.ledger(), &receipt.remote_id) {
            if !receipt.dry_run {
                if let Err(e) = ledger.record(&session.timelapse, remote_id) {
                    tracing::warn!(error = %e, "published, but the upload ledger could not be written");
                }
            }
        }

        tracing::info!(
            folder = %session.session.folder_name,
            remote_id = ?receipt.remote_id,
            dry_run = receipt.dry_run,
            "run complete"
        );
        Ok(RunOutcome::Published(PublishReport {
            folder: session.session.folder_name.clone(),
            meteor_count: session.meteor_count,
            artifact_duration: artifact.duration_sec,
            metadata,
            remote_id: receipt.remote_id,
            dry_run: receipt.dry_run,
            retained,
        }))
    }

    /// Checks that gate assembly once a session is known to be eligible.
    fn readiness(&self, session: &ValidatedSession) -> crate::Result<Option<SkipReason>> {
        let folder = || session.session.folder_name.clone();

        if let Some(ledger) = self.ledger() {
            if ledger.already_published(&session.timelapse) {
                return Ok(Some(SkipReason::AlreadyPublished { folder: folder() }));
            }
        }

        if self.config.settle_seconds > 0 {
            let wait = Duration::from_secs(self.config.settle_seconds);
            if !timelapse_settled(&session.timelapse, wait)? {
                return Ok(Some(SkipReason::TimelapseStillGrowing { folder: folder() }));
            }
        }

        Ok(None)
    }

    fn ledger(&self) -> Option<UploadLedger> {
        self.config.ledger_path.as_ref().map(UploadLedger::new)
    }

    fn retain(&self, artifact: &Artifact) -> Option<PathBuf> {
        match &self.config.artifact.retention {
            Retention::Delete => None,
            Retention::Keep { dir } => match artifact.retain(dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "could not retain artifact");
                    None
                }
            },
        }
    }
}

fn skip(reason: SkipReason) -> RunOutcome {
    tracing::info!(%reason, "nothing to publish");
    RunOutcome::NothingToPublish(reason)
}

/// Samples the file size twice, `wait` apart. A change means the recorder is
/// still writing.
pub fn timelapse_settled(path: &Path, wait: Duration) -> std::io::Result<bool> {
    let before = std::fs::metadata(path)?.len();
    std::thread::sleep(wait);
    let after = std::fs::metadata(path)?.len();
    Ok(before == after)
}
