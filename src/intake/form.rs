//! # Multipart Intake
//!
//! Pulls the `audio` file part out of a multipart request body while enforcing the
//! body size cap.
//!
//! ## Size cap:
//! - A declared `Content-Length` above the cap is rejected before the multipart
//!   parser sees a single byte.
//! - Bodies without a declared length are counted chunk by chunk as they stream in;
//!   the first chunk that crosses the cap aborts parsing.

use crate::error::{AppError, AppResult};
use actix_multipart::{Multipart, MultipartError};
use actix_web::error::PayloadError;
use actix_web::http::header::{HeaderMap, CONTENT_LENGTH};
use actix_web::{web, HttpRequest};
use futures_util::StreamExt;
use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;

/// The uploaded file, buffered in memory behind a seekable cursor.
///
/// The whole body is bounded by the size cap, so holding it in memory is cheap
/// and gives the sniffer a stream it can rewind.
#[derive(Debug)]
pub struct Upload {
    /// Filename the client declared for the part, if any
    pub filename: Option<String>,
    /// File content, positioned at the start
    pub content: Cursor<Vec<u8>>,
}

impl Upload {
    pub fn len(&self) -> u64 {
        self.content.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.get_ref().is_empty()
    }
}

/// Reject requests whose declared `Content-Length` is above `limit`.
pub fn check_declared_length(headers: &HeaderMap, limit: u64) -> AppResult<()> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    match declared {
        Some(length) if length > limit => Err(AppError::PayloadTooLarge(limit)),
        _ => Ok(()),
    }
}

/// Read the first file part named `field_name` from the multipart body.
///
/// Only parts with a non-empty `filename` count as files; a plain form value
/// with the same name is drained and dropped like every other part.
///
/// ## Errors:
/// - `PayloadTooLarge` when the body is over `limit`
/// - `BadRequest` when the form is malformed, the field is missing or the file is empty
pub async fn read_upload(
    req: &HttpRequest,
    payload: web::Payload,
    field_name: &str,
    limit: u64,
) -> AppResult<Upload> {
    check_declared_length(req.headers(), limit)?;

    let seen = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&seen);
    let limited = payload.map(move |chunk| {
        let chunk = chunk?;
        let total = counter.get() + chunk.len() as u64;
        counter.set(total);
        if total > limit {
            Err(PayloadError::Overflow)
        } else {
            Ok(chunk)
        }
    });

    let mut multipart = Multipart::new(req.headers(), limited);
    let mut upload: Option<Upload> = None;

    while let Some(item) = multipart.next().await {
        let mut field = item.map_err(|e| form_error(e, &seen, limit))?;

        let (name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().map(str::to_owned),
                disposition.get_filename().map(str::to_owned),
            ),
            None => (None, None),
        };
        let is_file = filename.as_deref().is_some_and(|f| !f.is_empty());
        let wanted = upload.is_none() && is_file && name.as_deref() == Some(field_name);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| form_error(e, &seen, limit))?;
            if wanted {
                bytes.extend_from_slice(&chunk);
            }
        }

        if wanted {
            upload = Some(Upload {
                filename,
                content: Cursor::new(bytes),
            });
        }
    }

    let upload = upload.ok_or_else(|| {
        AppError::BadRequest(format!(
            "Error retrieving the file: no file part named '{}'",
            field_name
        ))
    })?;

    if upload.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    Ok(upload)
}

/// A parser error caused by our own size limit is a size error, not a bad form.
fn form_error(err: MultipartError, seen: &Cell<u64>, limit: u64) -> AppError {
    if seen.get() > limit {
        AppError::PayloadTooLarge(limit)
    } else {
        AppError::BadRequest(format!("Error parsing form data: {}", err))
    }
}
