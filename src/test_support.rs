//! Fixtures shared by the unit tests.

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A well-formed 16 kHz mono 16-bit PCM WAV file of exactly `total_len` bytes
/// (minimum 44, the header size).
pub fn wav_fixture(total_len: usize) -> Vec<u8> {
    let data_len = total_len.saturating_sub(44) & !1;
    let sample_rate = 16_000u32;
    let channels = 1u16;
    let bits_per_sample = 16u16;
    let block_align = channels * bits_per_sample / 8;

    let mut out = Vec::with_capacity(44 + data_len);
    out.write_all(b"RIFF").unwrap();
    out.write_u32::<LittleEndian>(36 + data_len as u32).unwrap();
    out.write_all(b"WAVE").unwrap();
    out.write_all(b"fmt ").unwrap();
    out.write_u32::<LittleEndian>(16).unwrap();
    out.write_u16::<LittleEndian>(1).unwrap(); // PCM
    out.write_u16::<LittleEndian>(channels).unwrap();
    out.write_u32::<LittleEndian>(sample_rate).unwrap();
    out.write_u32::<LittleEndian>(sample_rate * block_align as u32).unwrap();
    out.write_u16::<LittleEndian>(block_align).unwrap();
    out.write_u16::<LittleEndian>(bits_per_sample).unwrap();
    out.write_all(b"data").unwrap();
    out.write_u32::<LittleEndian>(data_len as u32).unwrap();

    for i in 0..data_len / 2 {
        let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
        out.write_i16::<LittleEndian>(sample).unwrap();
    }
    out
}

/// Files currently in `dir`, sorted. A missing directory counts as empty.
pub fn stored_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
        .into_iter()
        .map(|path| fs::canonicalize(&path).unwrap_or(path))
        .collect()
}

pub const BOUNDARY: &str = "----audio-match-test-boundary";

/// A multipart/form-data body with a single file part.
pub fn multipart_body(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    write!(
        body,
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        BOUNDARY, field, filename, content_type
    )
    .unwrap();
    body.extend_from_slice(bytes);
    write!(body, "\r\n--{}--\r\n", BOUNDARY).unwrap();
    body
}

/// A multipart/form-data body with a single plain value part (no filename).
pub fn multipart_value_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    write!(
        body,
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
        BOUNDARY, field
    )
    .unwrap();
    body.extend_from_slice(bytes);
    write!(body, "\r\n--{}--\r\n", BOUNDARY).unwrap();
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
