//! Publisher boundary.
//!
//! The pipeline hands a finished artifact and its metadata to a [`Publisher`]
//! exactly once per run. Failures are terminal for the run; retrying is left
//! to the next scheduled invocation.

mod youtube;

use std::path::Path;

use crate::metadata::PublishMetadata;

pub use youtube::YouTubePublisher;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Missing, expired or insufficient credentials.
    #[error("authorisation rejected: {0}")]
    Auth(String),

    /// Daily quota or rate limit reached.
    #[error("upload quota exhausted: {0}")]
    Quota(String),

    /// Connection failure, timeout or server-side error.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// Any other refusal, e.g. invalid metadata.
    #[error("upload rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("cannot read artifact: {0}")]
    Artifact(#[from] std::io::Error),
}

/// What a successful publish call reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Identifier assigned by the platform; `None` for a dry run.
    pub remote_id: Option<String>,
    pub dry_run: bool,
}

/// Destination for finished artifacts.
pub trait Publisher {
    fn publish(
        &self,
        artifact: &Path,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, PublishError>;
}

/// Checks the artifact and reports what would be uploaded. Never touches the
/// network.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPublisher;

impl Publisher for DryRunPublisher {
    fn publish(
        &self,
        artifact: &Path,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, PublishError> {
        let size = std::fs::metadata(artifact)?.len();
        tracing::info!(
            file = %artifact.display(),
            size,
            title = %metadata.title,
            tags = ?metadata.tags,
            privacy = metadata.privacy.as_str(),
            "dry run: would upload"
        );
        tracing::info!(description = %metadata.description, "dry run: description");

        Ok(PublishReceipt {
            remote_id: None,
            dry_run: true,
        })
    }
}
