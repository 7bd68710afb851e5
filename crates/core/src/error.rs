use std::{fmt, path::PathBuf};

use crate::{media::MediaError, publish::PublishError};

/// Result alias that carries the crate-wide [`MeteorError`] type.
pub type Result<T> = std::result::Result<T, MeteorError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MeteorError {
    /// The configuration was rejected before any stage ran.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The archive root could not be enumerated.
    #[error("cannot read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The timelapse exists but probing produced no usable duration.
    #[error("corrupt session {folder}: {reason}")]
    CorruptSession { folder: String, reason: String },
    /// The external media tool failed while joining segments.
    #[error("assembly failed: {0}")]
    Assembly(#[source] MediaError),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl MeteorError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Pipeline stage in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configuration and tool checks before the archive is touched.
    Setup,
    Scan,
    Validate,
    Assemble,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Scan => "scan",
            Stage::Validate => "validate",
            Stage::Assemble => "assemble",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Terminating report for a run that hit a fatal error.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub error: MeteorError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, error: impl Into<MeteorError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}
