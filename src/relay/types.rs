//! Wire types exchanged with the processing engine.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The engine's answer, passed back to the caller with the same field shape.
///
/// Exactly one of `match_result` and `error` is populated.
///
/// ```json
/// { "match_result": { "song_name": "Imagine - John Lennon" } }
/// { "error": "No match found" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_result: Option<MatchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Success payload. Fields other than `song_name` are carried through untouched.
///
/// `song_name` keeps three states apart: absent (`None`), an explicit `null`
/// for "no match" (`Some(None)`), and a matched title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub song_name: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Maps any present value, `null` included, to `Some`.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl MatchResult {
    pub fn song_name(&self) -> Option<&str> {
        self.song_name.as_ref().and_then(|name| name.as_deref())
    }
}

impl ProcessingResult {
    /// Decode an engine response body and check the exactly-one invariant.
    pub fn from_json(body: &str) -> AppResult<Self> {
        let result: ProcessingResult =
            serde_json::from_str(body).map_err(|e| AppError::ResponseParseError(e.to_string()))?;

        match (&result.match_result, &result.error) {
            (Some(_), None) | (None, Some(_)) => Ok(result),
            (None, None) => Err(AppError::ResponseParseError(
                "response has neither match_result nor error".to_string(),
            )),
            (Some(_), Some(_)) => Err(AppError::ResponseParseError(
                "response has both match_result and error".to_string(),
            )),
        }
    }

    /// True when the engine named a song.
    pub fn is_match(&self) -> bool {
        self.match_result
            .as_ref()
            .is_some_and(|m| m.song_name().is_some())
    }
}
