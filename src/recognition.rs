use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AttendanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub sample_fps: f64,
    pub min_confidence_frames: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            sample_fps: 1.0,
            min_confidence_frames: 1,
        }
    }
}

/// Face recognition service.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Returns one identity label per person seen in the video with enough
    /// confidence.
    async fn recognize(&self, video: &Path, params: SamplingParams) -> Result<Vec<String>>;

    /// Registers a person's reference photos so later videos can be matched
    /// against them.
    async fn enroll(&self, name: &str, roll_number: &str, photos: &[PathBuf]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct RecognizedUser {
    user: String,
}

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    #[serde(default)]
    summary: Vec<RecognizedUser>,
}

pub struct HttpRecognizer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRecognizer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

async fn read_media(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| AttendanceError::Validation(format!("cannot read {}: {e}", path.display())))
}

fn file_name_or(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AttendanceError::Upstream(format!(
        "recognizer answered {status}: {body}"
    )))
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, video: &Path, params: SamplingParams) -> Result<Vec<String>> {
        let bytes = read_media(video).await?;
        let file_name = file_name_or(video, "lecture.mp4");

        debug!(
            "Sending {} bytes to recognizer (fps {}, min frames {})",
            bytes.len(),
            params.sample_fps,
            params.min_confidence_frames
        );

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("sample_fps", params.sample_fps.to_string())
            .text(
                "min_confidence_frames",
                params.min_confidence_frames.to_string(),
            );

        let response = self
            .client
            .post(format!("{}/video_recognize", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let parsed: RecognitionResponse = ensure_success(response).await?.json().await?;
        let users = parse_users(parsed);
        info!("Recognizer reported {} identities", users.len());
        Ok(users)
    }

    async fn enroll(&self, name: &str, roll_number: &str, photos: &[PathBuf]) -> Result<()> {
        let mut form = Form::new()
            .text("name", name.to_string())
            .text("rollno", roll_number.to_string());
        for photo in photos {
            let bytes = read_media(photo).await?;
            form = form.part(
                "photos",
                Part::bytes(bytes).file_name(file_name_or(photo, "photo.jpg")),
            );
        }

        let response = self
            .client
            .post(format!("{}/enroll", self.base_url))
            .multipart(form)
            .send()
            .await?;
        ensure_success(response).await?;

        info!("Recognizer enrolled {} with {} photos", name, photos.len());
        Ok(())
    }
}

fn parse_users(response: RecognitionResponse) -> Vec<String> {
    response
        .summary
        .into_iter()
        .map(|entry| entry.user)
        .collect()
}
