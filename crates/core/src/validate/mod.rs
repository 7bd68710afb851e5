use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use walkdir::WalkDir;

use crate::{archive::Session, pipeline::SkipReason, MeteorError, Result};

/// Depth below a session folder searched for the stack image.
const STACK_SEARCH_DEPTH: usize = 3;

/// A session cleared for assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSession {
    pub session: Session,
    /// `N` from `stack_<N>_meteors.jpg`, at least one.
    pub meteor_count: u32,
    pub stack_image: PathBuf,
    pub timelapse: PathBuf,
    pub timelapse_duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Eligible(ValidatedSession),
    Skip(SkipReason),
}

/// Decides whether `session` can be published.
///
/// Missing detections or a missing timelapse mean there is nothing to do; a
/// timelapse that is present but could not be probed is a corrupt session.
pub fn validate(session: Session) -> Result<Validation> {
    let Some((meteor_count, stack_image)) = find_stack_image(&session.folder) else {
        tracing::info!(folder = %session.folder_name, "no meteors detected");
        return Ok(Validation::Skip(SkipReason::NoMeteors {
            folder: session.folder_name,
        }));
    };

    let timelapse = match &session.timelapse {
        Some(path) if path.is_file() => path.clone(),
        _ => {
            return Ok(Validation::Skip(SkipReason::MissingTimelapse {
                folder: session.folder_name,
            }))
        }
    };

    let Some(timelapse_duration) = session.timelapse_duration else {
        return Err(MeteorError::CorruptSession {
            folder: session.folder_name,
            reason: format!("{} has no usable duration", timelapse.display()),
        });
    };

    tracing::info!(
        folder = %session.folder_name,
        meteors = meteor_count,
        duration = timelapse_duration,
        "session is eligible"
    );
    Ok(Validation::Eligible(ValidatedSession {
        session,
        meteor_count,
        stack_image,
        timelapse,
        timelapse_duration,
    }))
}

/// Walks the ranked sessions of one night and returns the first eligible one.
///
/// A corrupt session does not hide an eligible sibling; it is only reported
/// when nothing on the night is eligible. Otherwise the best ranked
/// candidate's skip reason stands for the night.
pub fn select_eligible(date: NaiveDate, ranked: Vec<Session>) -> Result<Validation> {
    let mut first_skip: Option<SkipReason> = None;
    let mut first_corrupt: Option<MeteorError> = None;

    for session in ranked {
        let folder = session.folder_name.clone();
        match validate(session) {
            Ok(Validation::Eligible(valid)) => return Ok(Validation::Eligible(valid)),
            Ok(Validation::Skip(reason)) => {
                tracing::debug!(%folder, %reason, "candidate not eligible");
                first_skip.get_or_insert(reason);
            }
            Err(e) => {
                tracing::warn!(%folder, error = %e, "candidate is corrupt; trying the next one");
                first_corrupt.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_corrupt {
        return Err(e);
    }
    Ok(Validation::Skip(
        first_skip.unwrap_or(SkipReason::NoSessionForDate(date)),
    ))
}

/// Finds `stack_<N>_meteors.jpg` with `N >= 1`. Should a folder hold more
/// than one, the largest count wins.
pub fn find_stack_image(folder: &Path) -> Option<(u32, PathBuf)> {
    let pattern = stack_pattern();
    WalkDir::new(folder)
        .max_depth(STACK_SEARCH_DEPTH)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?;
            let digits = pattern.captures(name)?.get(1)?.as_str();
            match digits.parse::<u32>() {
                Ok(count) if count >= 1 => Some((count, entry.into_path())),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "ignoring unparsable meteor count");
                    None
                }
            }
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
}

fn stack_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^stack_(\d+)_meteors\.jpg$").expect("stack image pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{parse_folder_name, FolderName};

    fn fixture(files: &[&str], duration: Option<f64>) -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let folder_name = "UK00DF_20250928_182658_a";
        let folder = dir.path().join(folder_name);
        std::fs::create_dir_all(folder.join("images")).unwrap();
        for file in files {
            std::fs::write(folder.join(file), b"x").unwrap();
        }

        let FolderName::Session(name) = parse_folder_name(folder_name) else {
            unreachable!()
        };
        let timelapse = folder.join("images/timelapse.mp4");
        let session = Session {
            name,
            folder_name: folder_name.to_string(),
            folder,
            timelapse: Some(timelapse),
            timelapse_duration: duration,
            timelapse_video: None,
        };
        (dir, session)
    }

    #[test]
    fn meteor_count_comes_from_stack_image() {
        let (_dir, session) = fixture(
            &["images/timelapse.mp4", "stack_3_meteors.jpg"],
            Some(300.0),
        );

        let Validation::Eligible(valid) = validate(session).unwrap() else {
            panic!("session should be eligible");
        };
        assert_eq!(valid.meteor_count, 3);
        assert_eq!(valid.timelapse_duration, 300.0);
        assert!(valid.stack_image.ends_with("stack_3_meteors.jpg"));
    }

    #[test]
    fn zero_meteors_means_nothing_to_publish() {
        let (_dir, session) = fixture(
            &["images/timelapse.mp4", "stack_0_meteors.jpg"],
            Some(300.0),
        );
        assert!(matches!(
            validate(session).unwrap(),
            Validation::Skip(SkipReason::NoMeteors { .. })
        ));
    }

    #[test]
    fn absent_stack_image_means_nothing_to_publish() {
        let (_dir, session) = fixture(&["images/timelapse.mp4", "captured_stack.jpg"], Some(1.0));
        assert!(matches!(
            validate(session).unwrap(),
            Validation::Skip(SkipReason::NoMeteors { .. })
        ));
    }

    #[test]
    fn match_is_case_sensitive() {
        let (_dir, session) = fixture(
            &["images/timelapse.mp4", "STACK_4_METEORS.JPG"],
            Some(10.0),
        );
        assert!(matches!(
            validate(session).unwrap(),
            Validation::Skip(SkipReason::NoMeteors { .. })
        ));
    }

    #[test]
    fn missing_timelapse_means_nothing_to_publish() {
        let (_dir, session) = fixture(&["stack_2_meteors.jpg"], None);
        assert!(matches!(
            validate(session).unwrap(),
            Validation::Skip(SkipReason::MissingTimelapse { .. })
        ));
    }

    #[test]
    fn unprobeable_timelapse_is_corrupt() {
        let (_dir, session) = fixture(&["images/timelapse.mp4", "stack_2_meteors.jpg"], None);
        assert!(matches!(
            validate(session),
            Err(MeteorError::CorruptSession { .. })
        ));
    }

    fn sibling(dir: &Path, folder_name: &str, files: &[&str], duration: Option<f64>) -> Session {
        let folder = dir.join(folder_name);
        std::fs::create_dir_all(folder.join("images")).unwrap();
        for file in files {
            std::fs::write(folder.join(file), b"x").unwrap();
        }
        let FolderName::Session(name) = parse_folder_name(folder_name) else {
            unreachable!()
        };
        Session {
            name,
            folder_name: folder_name.to_string(),
            timelapse: Some(folder.join("images/timelapse.mp4")),
            folder,
            timelapse_duration: duration,
            timelapse_video: None,
        }
    }

    fn night() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 28).unwrap()
    }

    #[test]
    fn shorter_session_with_meteors_beats_longer_one_without() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = vec![
            sibling(
                dir.path(),
                "UK00DF_20250928_190000_b",
                &["images/timelapse.mp4", "stack_0_meteors.jpg"],
                Some(300.0),
            ),
            sibling(
                dir.path(),
                "UK00DF_20250928_182658_a",
                &["images/timelapse.mp4", "stack_2_meteors.jpg"],
                Some(120.0),
            ),
        ];

        let Validation::Eligible(valid) = select_eligible(night(), ranked).unwrap() else {
            panic!("the session with meteors should be chosen");
        };
        assert_eq!(valid.session.folder_name, "UK00DF_20250928_182658_a");
        assert_eq!(valid.meteor_count, 2);
    }

    #[test]
    fn best_ranked_reason_stands_when_nothing_is_eligible() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = vec![
            sibling(
                dir.path(),
                "UK00DF_20250928_190000_b",
                &["images/timelapse.mp4", "stack_0_meteors.jpg"],
                Some(300.0),
            ),
            sibling(dir.path(), "UK00DF_20250928_182658_a", &["stack_1_meteors.jpg"], None),
        ];

        assert_eq!(
            select_eligible(night(), ranked).unwrap(),
            Validation::Skip(SkipReason::NoMeteors {
                folder: "UK00DF_20250928_190000_b".to_string()
            })
        );
        assert_eq!(
            select_eligible(night(), Vec::new()).unwrap(),
            Validation::Skip(SkipReason::NoSessionForDate(night()))
        );
    }

    #[test]
    fn corrupt_session_surfaces_only_without_an_eligible_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let good = sibling(
            dir.path(),
            "UK00DF_20250928_190000_b",
            &["images/timelapse.mp4", "stack_4_meteors.jpg"],
            Some(60.0),
        );
        let corrupt = sibling(
            dir.path(),
            "UK00DF_20250928_170000_a",
            &["images/timelapse.mp4", "stack_2_meteors.jpg"],
            None,
        );

        let Validation::Eligible(valid) =
            select_eligible(night(), vec![corrupt.clone(), good]).unwrap()
        else {
            panic!("the eligible sibling should be chosen");
        };
        assert_eq!(valid.meteor_count, 4);

        assert!(matches!(
            select_eligible(night(), vec![corrupt]),
            Err(MeteorError::CorruptSession { .. })
        ));
    }

    #[test]
    fn largest_count_wins_and_overflow_is_ignored() {
        let (_dir, session) = fixture(
            &[
                "images/timelapse.mp4",
                "stack_2_meteors.jpg",
                "images/stack_7_meteors.jpg",
                "stack_99999999999_meteors.jpg",
            ],
            Some(5.0),
        );
        assert_eq!(find_stack_image(&session.folder).unwrap().0, 7);
    }
}
