//! Core library for the nightly meteor camera summary publisher.
//!
//! A run walks the station archive, picks the most complete session of the
//! target night, checks that it recorded meteors, joins its timelapse with the
//! nightly summary stills and hands the result to a publisher. Each stage lives
//! in its own module; [`Pipeline`] drives them in order.
//!
//! External tools and services sit behind two traits, [`MediaTool`] and
//! [`Publisher`], so the whole pipeline can be exercised without ffmpeg or a
//! network connection.

pub mod archive;
pub mod assemble;
pub mod config;
pub mod error;
pub mod ledger;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod publish;
pub mod validate;

pub use archive::{rank_candidates, ArchiveScanner, Selection, Session};
pub use assemble::{Artifact, Assembler};
pub use config::{DatePolicy, PipelineConfig, PrivacyStatus, Retention};
pub use error::{MeteorError, PipelineFailure, Result, Stage};
pub use ledger::UploadLedger;
pub use media::{FfmpegTool, MediaError, MediaTool};
pub use metadata::PublishMetadata;
pub use pipeline::{Pipeline, PublishReport, RunOutcome, SkipReason};
pub use publish::{DryRunPublisher, PublishError, PublishReceipt, Publisher, YouTubePublisher};
pub use validate::{select_eligible, validate, ValidatedSession, Validation};
