//! # Relay Client
//!
//! Second half of the upload pipeline: re-sends a stored artifact to the
//! processing engine as a fresh multipart upload and translates the engine's
//! answer into a [`ProcessingResult`] or an upstream-flavored [`AppError`].
//!
//! ## Failure mapping:
//! - Connection refused, DNS failure, timeout → `UpstreamUnreachable`
//! - Engine answered with a non-2xx status → `UpstreamError` (raw body kept)
//! - 2xx body that is not a processing result → `ResponseParseError`
//!
//! No retries: every failure is terminal for the request.

pub mod types;

pub use types::ProcessingResult;

use crate::config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::intake::AUDIO_FIELD;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// HTTP client bound to the engine's processing endpoint.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    /// Build a client with the configured deadlines attached to every call.
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.url.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send the artifact at `artifact_path` to the engine and decode its answer.
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn relay(&self, artifact_path: &Path) -> AppResult<ProcessingResult> {
        let file_name = artifact_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(AUDIO_FIELD)
            .to_string();

        let bytes = tokio::fs::read(artifact_path)
            .await
            .map_err(|e| AppError::StorageError(format!("Unable to open the file for relay: {}", e)))?;
        let size_bytes = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| AppError::Internal(format!("failed to build multipart part: {}", e)))?;
        let form = Form::new().part(AUDIO_FIELD, part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, timeout = e.is_timeout(), "Engine request failed");
                AppError::UpstreamUnreachable(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, "Failed to read engine response body");
            AppError::UpstreamUnreachable(format!("failed to read response body: {}", e))
        })?;

        info!(
            status = status.as_u16(),
            request_bytes = size_bytes,
            response_len = body.len(),
            "Engine request completed"
        );

        if !status.is_success() {
            return Err(AppError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        ProcessingResult::from_json(&body)
    }
}
