use serde::Serialize;

use crate::{
    config::{MetadataConfig, PrivacyStatus},
    validate::ValidatedSession,
};

/// Upper bound on a video title accepted by the hosting platform.
const MAX_TITLE_CHARS: usize = 100;
/// Upper bound on a video description accepted by the hosting platform.
const MAX_DESCRIPTION_BYTES: usize = 5000;

/// Everything sent alongside the artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy: PrivacyStatus,
}

impl PublishMetadata {
    /// Renders the configured templates for `session`. `duration_sec` is the
    /// finished artifact's length.
    pub fn build(config: &MetadataConfig, session: &ValidatedSession, duration_sec: f64) -> Self {
        let date = session.session.date().format(&config.date_format).to_string();
        let meteors = session.meteor_count.to_string();
        let duration = format_duration(duration_sec);
        let values = [
            ("station", session.session.station_id()),
            ("date", date.as_str()),
            ("meteors", meteors.as_str()),
            ("duration", duration.as_str()),
            ("folder", session.session.folder_name.as_str()),
        ];

        let title = clean_text(&render(&config.title_template, &values));
        let title: String = title.chars().take(MAX_TITLE_CHARS).collect();
        let mut description = clean_text(&render(&config.description_template, &values));
        truncate_bytes(&mut description, MAX_DESCRIPTION_BYTES);

        let mut tags: Vec<String> = Vec::new();
        for template in &config.tags {
            let tag = clean_text(&render(template, &values)).trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Self {
            title,
            description,
            tags,
            category_id: config.category_id.clone(),
            privacy: config.privacy,
        }
    }
}

/// Replaces every `{key}` with its value. Unknown placeholders stay as typed.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
}

/// Angle brackets are refused by the platform in titles and descriptions.
fn clean_text(text: &str) -> String {
    text.chars().filter(|c| *c != '<' && *c != '>').collect()
}

fn truncate_bytes(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// `m:ss`, or `h:mm:ss` past the hour.
fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::archive::{parse_folder_name, FolderName, Session};

    fn session(meteors: u32) -> ValidatedSession {
        let folder_name = "UK00DF_20250928_182658_a";
        let FolderName::Session(name) = parse_folder_name(folder_name) else {
            unreachable!()
        };
        ValidatedSession {
            session: Session {
                name,
                folder_name: folder_name.to_string(),
                folder: PathBuf::from(folder_name),
                timelapse: None,
                timelapse_duration: Some(300.0),
                timelapse_video: None,
            },
            meteor_count: meteors,
            stack_image: PathBuf::from("stack_3_meteors.jpg"),
            timelapse: PathBuf::from("timelapse.mp4"),
            timelapse_duration: 300.0,
        }
    }

    #[test]
    fn default_templates_use_session_fields() {
        let meta = PublishMetadata::build(&MetadataConfig::default(), &session(3), 309.0);

        assert_eq!(
            meta.title,
            "Meteor Camera on 28-09-2025 with 3 Meteors Detected  UK00DF"
        );
        assert!(meta.description.contains("Date: 28-09-2025"));
        assert!(meta.description.contains("Meteors detected: 3"));
        assert!(meta.description.contains("Duration: 5:09"));
        assert!(meta.tags.contains(&"UK00DF".to_string()));
        assert_eq!(meta.category_id, "28");
    }

    #[test]
    fn metadata_is_a_pure_function_of_the_session() {
        let config = MetadataConfig::default();
        assert_eq!(
            PublishMetadata::build(&config, &session(2), 100.0),
            PublishMetadata::build(&config, &session(2), 100.0)
        );
    }

    #[test]
    fn titles_are_cleaned_and_bounded() {
        let config = MetadataConfig {
            title_template: format!("<{}> {{station}}", "x".repeat(200)),
            tags: vec!["{station}".into(), "{station}".into(), "  ".into()],
            ..MetadataConfig::default()
        };
        let meta = PublishMetadata::build(&config, &session(1), 1.0);

        assert_eq!(meta.title.chars().count(), MAX_TITLE_CHARS);
        assert!(!meta.title.contains('<'));
        assert_eq!(meta.tags, ["UK00DF"]);
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        assert_eq!(render("{station} {unknown}", &[("station", "UK1")]), "UK1 {unknown}");
    }

    #[test]
    fn durations_render_as_clock_time() {
        assert_eq!(format_duration(59.6), "1:00");
        assert_eq!(format_duration(309.0), "5:09");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }

    #[test]
    fn description_truncation_respects_char_boundaries() {
        let mut text = "é".repeat(3000);
        truncate_bytes(&mut text, MAX_DESCRIPTION_BYTES);
        assert!(text.len() <= MAX_DESCRIPTION_BYTES);
        assert!(text.chars().all(|c| c == 'é'));
    }
}
