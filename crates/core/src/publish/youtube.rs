//! YouTube Data API v3 resumable upload.
//!
//! The access token is obtained elsewhere; this client only spends it.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use serde_json::json;

use super::{PublishError, PublishReceipt, Publisher};
use crate::metadata::PublishMetadata;

const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// Error reasons the API uses for exhausted quotas and rate limits.
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "uploadLimitExceeded",
];

/// Uploads artifacts to a YouTube channel with a pre-issued OAuth access
/// token.
pub struct YouTubePublisher {
    client: Client,
    access_token: String,
    upload_url: String,
}

impl YouTubePublisher {
    pub fn new(access_token: impl Into<String>) -> Result<Self, PublishError> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(PublishError::Auth("access token is empty".to_string()));
        }

        // No overall timeout: large uploads legitimately take a long time.
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| PublishError::TransientNetwork(e.to_string()))?;

        Ok(Self {
            client,
            access_token,
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
        })
    }

    /// Reads the access token from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self, PublishError> {
        let token = std::env::var(var)
            .map_err(|_| PublishError::Auth(format!("environment variable {var} is not set")))?;
        Self::new(token)
    }

    /// Points uploads at another endpoint.
    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }

    /// Opens a resumable upload session and returns its URL.
    fn start_session(&self, size: u64, metadata: &PublishMetadata) -> Result<String, PublishError> {
        let response = self
            .client
            .post(&self.upload_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&video_resource(metadata))
            .send()
            .map_err(transport_error)?;
        let response = check_status(response)?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::Rejected {
                status: response.status().as_u16(),
                message: "upload session response carried no Location header".to_string(),
            })
    }
}

impl Publisher for YouTubePublisher {
    fn publish(
        &self,
        artifact: &Path,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, PublishError> {
        let file = File::open(artifact)?;
        let size = file.metadata()?.len();

        tracing::info!(file = %artifact.display(), size, title = %metadata.title, "starting upload");
        let session_url = self.start_session(size, metadata)?;

        let response = self
            .client
            .put(&session_url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, "video/mp4")
            .body(Body::sized(file, size))
            .send()
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let video: UploadedVideo = check_status(response)?
            .json()
            .map_err(|e| PublishError::Rejected {
                status,
                message: format!("unexpected upload response: {e}"),
            })?;

        tracing::info!(video_id = %video.id, "upload complete");
        Ok(PublishReceipt {
            remote_id: Some(video.id),
            dry_run: false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

fn video_resource(metadata: &PublishMetadata) -> serde_json::Value {
    json!({
        "snippet": {
            "title": metadata.title,
            "description": metadata.description,
            "tags": metadata.tags,
            "categoryId": metadata.category_id,
        },
        "status": {
            "privacyStatus": metadata.privacy.as_str(),
            "selfDeclaredMadeForKids": false,
        },
    })
}

fn transport_error(err: reqwest::Error) -> PublishError {
    PublishError::TransientNetwork(err.to_string())
}

fn check_status(response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(classify_failure(status.as_u16(), &body))
}

/// Maps an HTTP failure onto the publish error taxonomy.
fn classify_failure(status: u16, body: &str) -> PublishError {
    let (reason, message) = error_details(body);
    let detail = match &reason {
        Some(reason) => format!("{reason}: {message}"),
        None => message,
    };
    let quota_reason = reason
        .as_deref()
        .is_some_and(|r| QUOTA_REASONS.contains(&r));

    match status {
        401 => PublishError::Auth(detail),
        403 if quota_reason => PublishError::Quota(detail),
        403 => PublishError::Auth(detail),
        429 => PublishError::Quota(detail),
        408 | 500..=599 => PublishError::TransientNetwork(format!("HTTP {status}: {detail}")),
        _ => PublishError::Rejected {
            status,
            message: detail,
        },
    }
}

/// Pulls `error.errors[0].reason` and `error.message` out of a Google API
/// error body, falling back to the raw text.
fn error_details(body: &str) -> (Option<String>, String) {
    #[derive(Deserialize)]
    struct Envelope {
        error: ApiError,
    }
    #[derive(Deserialize)]
    struct ApiError {
        #[serde(default)]
        message: String,
        #[serde(default)]
        errors: Vec<ApiErrorItem>,
    }
    #[derive(Deserialize)]
    struct ApiErrorItem {
        reason: Option<String>,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => {
            let reason = envelope
                .error
                .errors
                .into_iter()
                .find_map(|item| item.reason);
            (reason, envelope.error.message)
        }
        Err(_) => (None, body.trim().to_string()),
    }
}
