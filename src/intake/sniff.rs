//! # Content-Type Sniffing
//!
//! Derives a MIME type from the leading bytes of an upload using the standard
//! MIME-sniffing signature table. Whatever `Content-Type` the client attached to
//! the multipart part is never consulted.
//!
//! At most [`SNIFF_LEN`] bytes are examined. Signatures are checked in table order
//! and the first match wins; if nothing matches, the data is classified as either
//! `text/plain; charset=utf-8` or `application/octet-stream`.

use crate::error::{AppError, AppResult};
use std::io::{Read, Seek, SeekFrom};

/// Number of leading bytes considered by the sniffer.
pub const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_UTF8: &str = "text/plain; charset=utf-8";
const HTML_UTF8: &str = "text/html; charset=utf-8";

/// One entry in the signature table.
enum Signature {
    /// `data` starts with `pattern`.
    Exact(&'static [u8], &'static str),
    /// `data & mask == pattern`, optionally after skipping leading whitespace.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_ws: bool,
        mime: &'static str,
    },
    /// Case-insensitive HTML tag, followed by a space or `>`.
    Html(&'static [u8]),
    /// ISO base media file with an `mp4` brand in its `ftyp` box.
    Mp4,
    /// Bare MPEG-1/2 Layer III frame header (MP3 without an ID3 tag).
    MpegFrame,
}

const RIFF_MASK: &[u8] = b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF";

static SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\xFF",
        pattern: b"<?xml",
        skip_ws: true,
        mime: "text/xml; charset=utf-8",
    },
    Signature::Exact(b"%PDF-", "application/pdf"),
    Signature::Exact(b"%!PS-Adobe-", "application/postscript"),
    // Byte order marks
    Signature::Exact(b"\xFE\xFF", "text/plain; charset=utf-16be"),
    Signature::Exact(b"\xFF\xFE", "text/plain; charset=utf-16le"),
    Signature::Exact(b"\xEF\xBB\xBF", TEXT_UTF8),
    // Images
    Signature::Exact(b"\x00\x00\x01\x00", "image/x-icon"),
    Signature::Exact(b"\x00\x00\x02\x00", "image/x-icon"),
    Signature::Exact(b"BM", "image/bmp"),
    Signature::Exact(b"GIF87a", "image/gif"),
    Signature::Exact(b"GIF89a", "image/gif"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        skip_ws: false,
        mime: "image/webp",
    },
    Signature::Exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    Signature::Exact(b"\xFF\xD8\xFF", "image/jpeg"),
    // Audio and video
    Signature::Masked {
        mask: RIFF_MASK,
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        skip_ws: false,
        mime: "audio/aiff",
    },
    Signature::Exact(b".snd", "audio/basic"),
    Signature::Exact(b"OggS\x00", "application/ogg"),
    Signature::Exact(b"MThd\x00\x00\x00\x06", "audio/midi"),
    Signature::Exact(b"ID3", "audio/mpeg"),
    Signature::Masked {
        mask: RIFF_MASK,
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        skip_ws: false,
        mime: "video/avi",
    },
    Signature::Masked {
        mask: RIFF_MASK,
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        skip_ws: false,
        mime: "audio/wave",
    },
    Signature::Mp4,
    Signature::Exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    // Fonts
    Signature::Exact(b"\x00\x01\x00\x00", "font/ttf"),
    Signature::Exact(b"OTTO", "font/otf"),
    Signature::Exact(b"ttcf", "font/collection"),
    Signature::Exact(b"wOFF", "font/woff"),
    Signature::Exact(b"wOF2", "font/woff2"),
    // Archives
    Signature::Exact(b"\x1F\x8B\x08", "application/x-gzip"),
    Signature::Exact(b"PK\x03\x04", "application/zip"),
    Signature::Exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    Signature::Exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    Signature::Exact(b"\x00\x61\x73\x6D", "application/wasm"),
    Signature::MpegFrame,
];

impl Signature {
    fn matches(&self, data: &[u8], first_non_ws: usize) -> Option<&'static str> {
        match self {
            Signature::Exact(pattern, mime) => data.starts_with(pattern).then_some(*mime),
            Signature::Masked { mask, pattern, skip_ws, mime } => {
                let data = if *skip_ws { &data[first_non_ws..] } else { data };
                if data.len() < pattern.len() {
                    return None;
                }
                let hit = pattern
                    .iter()
                    .zip(mask.iter())
                    .zip(data.iter())
                    .all(|((p, m), d)| d & m == *p);
                hit.then_some(*mime)
            }
            Signature::Html(tag) => {
                let data = &data[first_non_ws..];
                if data.len() < tag.len() + 1 {
                    return None;
                }
                let head_matches = tag
                    .iter()
                    .zip(data.iter())
                    .all(|(t, d)| d.to_ascii_uppercase() == *t);
                let terminated = matches!(data[tag.len()], b' ' | b'>');
                (head_matches && terminated).then_some(HTML_UTF8)
            }
            Signature::Mp4 => is_mp4(data).then_some("video/mp4"),
            Signature::MpegFrame => is_mpeg_layer3_frame(data).then_some("audio/mpeg"),
        }
    }
}

/// Sniff the MIME type of `data`, looking at no more than [`SNIFF_LEN`] bytes.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    let first_non_ws = data
        .iter()
        .position(|b| !is_whitespace(*b))
        .unwrap_or(data.len());

    SIGNATURES
        .iter()
        .find_map(|sig| sig.matches(data, first_non_ws))
        .unwrap_or_else(|| {
            if data[first_non_ws..].iter().any(|b| is_binary(*b)) {
                OCTET_STREAM
            } else {
                TEXT_UTF8
            }
        })
}

/// Read up to [`SNIFF_LEN`] bytes from `reader`, sniff them, then seek back to
/// where the reader started so the full copy still sees every byte.
pub fn sniff_reader<R: Read + Seek>(reader: &mut R) -> AppResult<&'static str> {
    let start = reader
        .stream_position()
        .map_err(|_| AppError::SniffFailure("Unable to read file for type detection".to_string()))?;

    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    reader
        .by_ref()
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut prefix)
        .map_err(|_| AppError::SniffFailure("Unable to read file for type detection".to_string()))?;

    reader
        .seek(SeekFrom::Start(start))
        .map_err(|_| AppError::SniffFailure("Failed to reset file pointer".to_string()))?;

    Ok(sniff_content_type(&prefix))
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_binary(b: u8) -> bool {
    b <= 0x08 || b == 0x0B || (0x0E..=0x1A).contains(&b) || (0x1C..=0x1F).contains(&b)
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    // Major brand at 8, minor version at 12, compatible brands after that.
    (8..box_size)
        .step_by(4)
        .filter(|offset| *offset != 12)
        .any(|offset| &data[offset..offset + 3] == b"mp4")
}

/// MPEG audio frame header: 11 sync bits, a defined version, Layer III, and
/// neither the reserved bitrate index nor the reserved sample-rate index.
fn is_mpeg_layer3_frame(data: &[u8]) -> bool {
    if data.len() < 4 || data[0] != 0xFF || data[1] & 0xE0 != 0xE0 {
        return false;
    }
    let version = (data[1] >> 3) & 0b11;
    let layer = (data[1] >> 1) & 0b11;
    let bitrate_index = data[2] >> 4;
    let sample_rate_index = (data[2] >> 2) & 0b11;

    version != 0b01 && layer == 0b01 && bitrate_index != 0b1111 && sample_rate_index != 0b11
}
