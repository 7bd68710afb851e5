//! Archive scanning and session selection.
//!
//! The archive root holds one folder per recording session. Several sessions
//! can share a night (the capture restarted), in which case the one with the
//! longest timelapse is taken as the most complete recording.

mod name;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::{
    config::{ArchiveConfig, DatePolicy},
    media::{MediaTool, VideoStreamInfo},
    pipeline::SkipReason,
    MeteorError, Result,
};

pub use name::{parse_folder_name, FolderName, SessionName};

/// Depth below a session folder searched for assets.
const ASSET_SEARCH_DEPTH: usize = 3;

/// One night's recording from one station.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub name: SessionName,
    pub folder_name: String,
    pub folder: PathBuf,
    /// Best timelapse match, if the folder has one.
    pub timelapse: Option<PathBuf>,
    /// Probed duration in seconds. `None` until probed, or when probing failed.
    pub timelapse_duration: Option<f64>,
    pub timelapse_video: Option<VideoStreamInfo>,
}

impl Session {
    /// Camera station code, e.g. `UK00DF`.
    pub fn station_id(&self) -> &str {
        &self.name.station_id
    }

    /// Night the session belongs to, taken from the folder name.
    pub fn date(&self) -> NaiveDate {
        self.name.date
    }
}

/// Outcome of choosing the night a run should publish.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Every session of the target night, best ranked first. Never empty.
    Night {
        date: NaiveDate,
        candidates: Vec<Session>,
    },
    Skip(SkipReason),
}

/// Enumerates session folders under the archive root.
pub struct ArchiveScanner<'a> {
    config: &'a ArchiveConfig,
    timelapse_matchers: Vec<GlobMatcher>,
}

impl<'a> ArchiveScanner<'a> {
    /// Compiles the timelapse patterns; fails on an invalid glob.
    pub fn new(config: &'a ArchiveConfig) -> Result<Self> {
        let timelapse_matchers = config
            .timelapse_patterns
            .iter()
            .map(|pattern| {
                GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map(|glob| glob.compile_matcher())
                    .map_err(|e| {
                        MeteorError::config(format!("invalid timelapse pattern `{pattern}`: {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            timelapse_matchers,
        })
    }

    /// Lists every well-named session folder, grouped by night. Nothing is
    /// probed yet.
    pub fn discover(&self) -> Result<BTreeMap<NaiveDate, Vec<Session>>> {
        let root = &self.config.root;
        let entries = std::fs::read_dir(root).map_err(|source| MeteorError::Archive {
            path: root.clone(),
            source,
        })?;

        let mut folders: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable archive entry");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            folders.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
        folders.sort();

        let mut by_date: BTreeMap<NaiveDate, Vec<Session>> = BTreeMap::new();
        for (folder_name, folder) in folders {
            let name = match parse_folder_name(&folder_name) {
                FolderName::Session(name) => name,
                FolderName::Malformed { reason } => {
                    tracing::warn!(folder = %folder_name, %reason, "ignoring folder with unexpected name");
                    continue;
                }
            };

            let timelapse = self.locate_timelapse(&folder);
            if timelapse.is_none() {
                tracing::info!(folder = %folder_name, "no timelapse found in session folder");
            }

            by_date.entry(name.date).or_default().push(Session {
                name,
                folder_name,
                folder,
                timelapse,
                timelapse_duration: None,
                timelapse_video: None,
            });
        }

        Ok(by_date)
    }

    /// Picks the night to publish according to the configured date policy and
    /// ranks its sessions. Eligibility is left to the validator.
    pub fn select_target(&self, media: &dyn MediaTool, today: NaiveDate) -> Result<Selection> {
        let mut by_date = self.discover()?;
        let date = match target_date(by_date.keys().copied(), self.config.date_policy, today) {
            Ok(date) => date,
            Err(reason) => return Ok(Selection::Skip(reason)),
        };

        let candidates = by_date.remove(&date).unwrap_or_default();
        tracing::info!(%date, candidates = candidates.len(), "ranking sessions for night");
        let candidates = probe_and_rank(candidates, media);
        if candidates.is_empty() {
            return Ok(Selection::Skip(SkipReason::NoSessionForDate(date)));
        }
        Ok(Selection::Night { date, candidates })
    }

    /// Ranked sessions for every night present in the archive.
    pub fn select_all(&self, media: &dyn MediaTool) -> Result<BTreeMap<NaiveDate, Vec<Session>>> {
        Ok(self
            .discover()?
            .into_iter()
            .map(|(date, candidates)| (date, probe_and_rank(candidates, media)))
            .collect())
    }

    /// Highest priority pattern wins; within a pattern the largest file, then
    /// the lexicographically first path.
    fn locate_timelapse(&self, folder: &Path) -> Option<PathBuf> {
        let files: Vec<(String, u64, PathBuf)> = WalkDir::new(folder)
            .max_depth(ASSET_SEARCH_DEPTH)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(folder).ok()?;
                let relative = relative.to_string_lossy().replace('\\', "/");
                let size = entry.metadata().ok()?.len();
                Some((relative, size, entry.into_path()))
            })
            .collect();

        self.timelapse_matchers.iter().find_map(|matcher| {
            files
                .iter()
                .filter(|(relative, _, _)| matcher.is_match(relative.as_str()))
                .min_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
                .map(|(_, _, path)| path.clone())
        })
    }
}

/// Probes every candidate sharing one night and ranks them.
fn probe_and_rank(candidates: Vec<Session>, media: &dyn MediaTool) -> Vec<Session> {
    let probed = candidates
        .into_iter()
        .map(|mut session| {
            if let Some(timelapse) = &session.timelapse {
                match media.probe(timelapse) {
                    Ok(info) => {
                        tracing::info!(
                            folder = %session.folder_name,
                            duration = info.duration_sec,
                            "probed timelapse"
                        );
                        session.timelapse_duration = Some(info.duration_sec);
                        session.timelapse_video = info.video;
                    }
                    Err(e) => {
                        tracing::warn!(
                            folder = %session.folder_name,
                            error = %e,
                            "timelapse could not be probed; ranking it last"
                        );
                    }
                }
            }
            session
        })
        .collect();

    rank_candidates(probed)
}

/// Orders sessions of one night best first: longest probed timelapse, with
/// unprobed ones counted as zero, then folder name ascending.
pub fn rank_candidates(mut candidates: Vec<Session>) -> Vec<Session> {
    candidates.sort_by(|a, b| {
        let a_len = a.timelapse_duration.unwrap_or(0.0);
        let b_len = b.timelapse_duration.unwrap_or(0.0);
        b_len
            .total_cmp(&a_len)
            .then_with(|| a.folder_name.cmp(&b.folder_name))
    });
    candidates
}

/// Resolves the night a run targets from the nights present in the archive.
pub fn target_date<I>(
    dates: I,
    policy: DatePolicy,
    today: NaiveDate,
) -> std::result::Result<NaiveDate, SkipReason>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut dates = dates.into_iter().peekable();
    if dates.peek().is_none() {
        return Err(SkipReason::EmptyArchive);
    }

    match policy {
        DatePolicy::Latest => dates.max().ok_or(SkipReason::EmptyArchive),
        DatePolicy::WithinDays { days } => {
            let latest = dates.max().ok_or(SkipReason::EmptyArchive)?;
            let age = (today - latest).num_days();
            if age <= i64::from(days) {
                Ok(latest)
            } else {
                Err(SkipReason::NoRecentSession { latest, today })
            }
        }
        DatePolicy::Exact { date } => {
            if dates.any(|d| d == date) {
                Ok(date)
            } else {
                Err(SkipReason::NoSessionForDate(date))
            }
        }
    }
}
