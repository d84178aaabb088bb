//! Which sniffed types may pass the intake.

/// Sniffed MIME types accepted for relay: WAV variants, MP3, and WebM in its
/// audio or video container form.
pub const ALLOWED_AUDIO_TYPES: [&str; 8] = [
    "audio/wav",
    "audio/wave",
    "audio/x-wav",
    "audio/x-pn-wav",
    "audio/mp3",
    "audio/mpeg",
    "audio/webm",
    "video/webm",
];

/// Exact match against [`ALLOWED_AUDIO_TYPES`].
pub fn is_allowed(mime: &str) -> bool {
    ALLOWED_AUDIO_TYPES.contains(&mime)
}
