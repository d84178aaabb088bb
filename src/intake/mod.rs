//! # Intake Validator
//!
//! First half of the upload pipeline: takes the raw multipart request, decides
//! whether the file is an audio container we accept, and writes it to transient
//! storage.
//!
//! ## Stages:
//! 1. **Received**: read the `audio` part, enforcing the body size cap ([`form`])
//! 2. **Sniffed**: derive the MIME type from the leading bytes, then rewind ([`sniff`])
//! 3. **Authorized / Rejected**: check the sniffed type against the allow-list ([`policy`])
//! 4. **Stored**: copy the whole file under a collision-free name ([`storage`], [`naming`])
//!
//! Nothing the client declares about the file's type is trusted; only the bytes are.

pub mod form;
pub mod naming;
pub mod policy;
pub mod sniff;
pub mod storage;

pub use form::Upload;
pub use storage::{ArtifactStore, StoredArtifact};

use crate::config::UploadConfig;
use crate::error::{AppError, AppResult};
use actix_web::{web, HttpRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the multipart file field, both inbound and on the relay.
pub const AUDIO_FIELD: &str = "audio";

/// Validates uploads and stores the ones that pass.
#[derive(Debug)]
pub struct IntakeValidator {
    store: ArtifactStore,
    max_body_bytes: u64,
}

impl IntakeValidator {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            store: ArtifactStore::new(config.storage_dir.clone()),
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn max_body_bytes(&self) -> u64 {
        self.max_body_bytes
    }

    /// Run the whole intake for one request and return the stored artifact.
    ///
    /// Multipart parsing happens on the async worker; sniffing and the file copy
    /// run on the blocking pool.
    pub async fn accept(
        self: &Arc<Self>,
        req: &HttpRequest,
        payload: web::Payload,
    ) -> AppResult<StoredArtifact> {
        let upload = form::read_upload(req, payload, AUDIO_FIELD, self.max_body_bytes).await?;
        debug!(
            filename = upload.filename.as_deref().unwrap_or("<none>"),
            size_bytes = upload.len(),
            "Upload received"
        );

        let intake = Arc::clone(self);
        web::block(move || intake.validate_and_store(upload)).await?
    }

    /// Sniff, authorize and store an upload that has already been read.
    pub fn validate_and_store(&self, mut upload: Upload) -> AppResult<StoredArtifact> {
        let content_type = sniff::sniff_reader(&mut upload.content)?;

        if !policy::is_allowed(content_type) {
            warn!(content_type, "Rejected upload with unsupported type");
            return Err(AppError::UnsupportedMediaType(content_type.to_string()));
        }

        let artifact = self
            .store
            .persist(&mut upload.content, upload.filename.as_deref())?;

        info!(
            content_type,
            file_name = %artifact.file_name,
            size_bytes = artifact.size_bytes,
            "Upload accepted and stored"
        );
        Ok(artifact)
    }
}
