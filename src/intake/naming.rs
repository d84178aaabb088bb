//! # Artifact Naming
//!
//! Stored artifacts are named `audio_<stamp><ext>`. The stamp is a nanosecond
//! wall-clock timestamp, but it is issued through [`ArtifactNamer`], which makes
//! every stamp strictly greater than the previous one. Two uploads landing inside
//! the same clock tick (or a clock that steps backwards) still get distinct names.

use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Extension used when the client's filename has none we can trust.
pub const DEFAULT_EXTENSION: &str = ".webm";

const MAX_EXTENSION_LEN: usize = 16;

/// Process-wide generator of strictly increasing timestamps.
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    last: AtomicU64,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in nanoseconds, or `last + 1` if the clock has not moved past
    /// the last stamp handed out.
    pub fn next_stamp(&self) -> u64 {
        let now = clock_nanos();
        let previous = match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.saturating_add(1)))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        now.max(previous.saturating_add(1))
    }

    /// Build a fresh artifact file name for an upload called `original`.
    pub fn file_name(&self, original: Option<&str>) -> String {
        format!("audio_{}{}", self.next_stamp(), extension_for(original))
    }
}

/// The extension of the client filename (with its dot), or [`DEFAULT_EXTENSION`].
///
/// Only short ASCII-alphanumeric extensions are kept, so nothing from the client
/// can smuggle a separator or `..` into the stored name.
pub fn extension_for(original: Option<&str>) -> String {
    original
        .map(Path::new)
        .and_then(Path::extension)
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn clock_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|nanos| nanos.max(0) as u64)
        .unwrap_or(0)
}
