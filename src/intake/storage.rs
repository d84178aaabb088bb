//! # Transient Artifact Storage
//!
//! Writes accepted uploads into the storage directory under collision-free names.
//! Everything in here is blocking filesystem I/O; async callers run it through
//! `web::block`.

use crate::error::{AppError, AppResult};
use crate::intake::naming::ArtifactNamer;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Attempts at finding an unused name before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

/// A file written to the storage directory for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Absolute path of the artifact
    pub path: PathBuf,
    /// Base name, `audio_<stamp><ext>`
    pub file_name: String,
    /// Bytes written
    pub size_bytes: u64,
}

/// The storage directory plus the namer that hands out file names in it.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    namer: ArtifactNamer,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            namer: ArtifactNamer::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the storage directory if it is missing and return its absolute path.
    ///
    /// Safe to call on every request: creating an existing directory is a no-op.
    pub fn ensure_dir(&self) -> AppResult<PathBuf> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }

        builder
            .create(&self.dir)
            .map_err(|e| AppError::StorageError(format!("Unable to create folder: {}", e)))?;

        fs::canonicalize(&self.dir)
            .map_err(|e| AppError::StorageError(format!("Unable to create folder: {}", e)))
    }

    /// Copy everything `reader` yields into a new artifact.
    ///
    /// The file is opened with create-new semantics, so an existing artifact is
    /// never overwritten; on a name clash the next stamp is tried. A failed copy
    /// removes the partial file before returning the error.
    pub fn persist<R: Read>(&self, reader: &mut R, original_name: Option<&str>) -> AppResult<StoredArtifact> {
        let dir = self.ensure_dir()?;

        let mut opened = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let file_name = self.namer.file_name(original_name);
            let path = dir.join(&file_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    opened = Some((file, path, file_name));
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(file_name = %file_name, "Artifact name already taken, retrying");
                }
                Err(e) => {
                    return Err(AppError::StorageError(format!("Unable to save the file: {}", e)));
                }
            }
        }

        let (mut file, path, file_name) = opened.ok_or_else(|| {
            AppError::StorageError(format!(
                "Unable to save the file: no free name after {} attempts",
                MAX_NAME_ATTEMPTS
            ))
        })?;

        let copied = io::copy(reader, &mut file).and_then(|n| file.flush().map(|_| n));
        match copied {
            Ok(size_bytes) => {
                debug!(path = %path.display(), size_bytes, "Artifact stored");
                Ok(StoredArtifact {
                    path,
                    file_name,
                    size_bytes,
                })
            }
            Err(e) => {
                drop(file);
                if let Err(remove_err) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %remove_err, "Failed to remove partial artifact");
                }
                Err(AppError::StorageError(format!("Error writing file: {}", e)))
            }
        }
    }

    /// Best-effort removal of an artifact. Already-missing files are fine.
    pub fn discard(&self, artifact: &StoredArtifact) {
        match fs::remove_file(&artifact.path) {
            Ok(()) => debug!(file_name = %artifact.file_name, "Artifact discarded"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %artifact.path.display(),
                error = %e,
                "Failed to discard artifact"
            ),
        }
    }
}
