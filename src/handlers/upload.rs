//! # Upload Handler
//!
//! `POST /upload-audio`: runs the full pipeline for one request.
//!
//! ```text
//! Received → Sniffed → Authorized|Rejected → Stored → Relayed → Responded
//! ```
//!
//! The caller's connection stays open until the engine answers (or the relay
//! deadline passes); the response is either the engine's result as JSON or a
//! plain-text error.

use crate::config::RetentionPolicy;
use crate::error::AppError;
use crate::middleware::RequestId;
use crate::state::{AppState, UploadOutcome};
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use tracing::{error, info, warn, Instrument};

pub async fn upload_audio(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.to_string())
        .unwrap_or_default();
    let span = tracing::info_span!("upload_audio", request_id = %request_id);

    run_pipeline(req, payload, state).instrument(span).await
}

async fn run_pipeline(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let artifact = match state.intake.accept(&req, payload).await {
        Ok(artifact) => artifact,
        Err(err) => {
            let outcome = match err {
                AppError::SniffFailure(_) | AppError::StorageError(_) | AppError::Internal(_) => {
                    UploadOutcome::StorageFailed
                }
                _ => UploadOutcome::Rejected,
            };
            state.record_upload(outcome);
            log_failure(&err);
            return Err(err);
        }
    };

    let relayed = state.relay.relay(&artifact.path).await;

    if state.config.upload.retention == RetentionPolicy::Delete {
        let intake = state.intake.clone();
        let artifact = artifact.clone();
        web::block(move || intake.store().discard(&artifact)).await?;
    }

    match relayed {
        Ok(result) => {
            state.record_upload(UploadOutcome::Responded);
            info!(
                file_name = %artifact.file_name,
                matched = result.is_match(),
                "Upload processed"
            );
            Ok(HttpResponse::Ok().json(result))
        }
        Err(err) => {
            state.record_upload(UploadOutcome::RelayFailed);
            log_failure(&err);
            Err(err)
        }
    }
}

fn log_failure(err: &AppError) {
    use actix_web::ResponseError;

    let status = err.status_code();
    if status.is_server_error() {
        error!(kind = err.kind(), status = status.as_u16(), error = %err, "Upload failed");
    } else {
        warn!(kind = err.kind(), status = status.as_u16(), error = %err, "Upload rejected");
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{AppConfig, RetentionPolicy};
    use crate::handlers::configure;
    use crate::middleware::RequestLogging;
    use crate::state::AppState;
    use crate::test_support::{
        multipart_body, multipart_content_type, multipart_value_body, stored_files, wav_fixture,
        BOUNDARY,
    };
    use actix_web::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR\x00\x00\x00\x01\x00\x00\x00\x01";

    fn config(tmp: &TempDir, engine_url: String, retention: RetentionPolicy) -> AppConfig {
        let mut config = AppConfig::default();
        config.upload.storage_dir = tmp.path().join("temp");
        config.upload.retention = retention;
        config.engine.url = engine_url;
        config.engine.timeout_secs = 5;
        config.engine.connect_timeout_secs = 2;
        config
    }

    fn storage_dir(tmp: &TempDir) -> PathBuf {
        tmp.path().join("temp")
    }

    fn upload_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/upload-audio")
            .insert_header((CONTENT_TYPE, multipart_content_type()))
            .set_payload(body)
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    async fn engine_returning(template: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }

    macro_rules! app {
        ($config:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(AppState::new($config).unwrap()))
                    .wrap(RequestLogging)
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_wav_upload_is_stored_relayed_and_answered() {
        let engine = engine_returning(
            ResponseTemplate::new(200).set_body_json(json!({"match_result": {"song_name": "X"}})),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", engine.uri()), RetentionPolicy::Keep));

        let wav = wav_fixture(1024);
        let body = multipart_body("audio", "clip.wav", "audio/wav", &wav);
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));
        let response_body = test::read_body(resp).await;
        assert_eq!(response_body, r#"{"match_result":{"song_name":"X"}}"#);

        // Exactly one artifact, named audio_<ts>.wav, byte-identical to the upload.
        let files = stored_files(&storage_dir(&tmp));
        assert_eq!(files.len(), 1);
        let file_name = files[0].file_name().unwrap().to_str().unwrap().to_string();
        assert!(file_name.starts_with("audio_"));
        assert!(file_name.ends_with(".wav"));
        assert_eq!(fs::read(&files[0]).unwrap(), wav);

        // The engine received the same bytes under the same field name.
        let requests = engine.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(contains(&requests[0].body, &wav));
        assert!(contains(&requests[0].body, b"name=\"audio\""));
        assert!(contains(&requests[0].body, format!("filename=\"{}\"", file_name).as_bytes()));
    }

    #[actix_web::test]
    async fn test_delete_retention_removes_artifact_after_relay() {
        let engine = engine_returning(
            ResponseTemplate::new(200).set_body_json(json!({"match_result": {"song_name": "X"}})),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", engine.uri()), RetentionPolicy::Delete));

        let body = multipart_body("audio", "clip.wav", "audio/wav", &wav_fixture(1024));
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(stored_files(&storage_dir(&tmp)).is_empty());
        assert_eq!(engine.received_requests().await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_engine_error_payload_passes_through() {
        let engine = engine_returning(
            ResponseTemplate::new(200).set_body_json(json!({"error": "No match found"})),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", engine.uri()), RetentionPolicy::Delete));

        let body = multipart_body("audio", "clip.wav", "audio/wav", &wav_fixture(512));
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, r#"{"error":"No match found"}"#);
    }

    #[actix_web::test]
    async fn test_empty_file_is_rejected_without_storage() {
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, "http://127.0.0.1:9/process".to_string(), RetentionPolicy::Keep));

        let body = multipart_body("audio", "clip.wav", "audio/wav", b"");
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(test::read_body(resp).await, "Uploaded file is empty");
        assert!(stored_files(&storage_dir(&tmp)).is_empty());
    }

    #[actix_web::test]
    async fn test_png_labelled_as_audio_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", mock_server.uri()), RetentionPolicy::Keep));

        let body = multipart_body("audio", "clip.wav", "audio/wav", PNG);
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(test::read_body(resp).await, "Unsupported file type: image/png");
        assert!(stored_files(&storage_dir(&tmp)).is_empty());
    }

    #[actix_web::test]
    async fn test_oversized_body_is_rejected_before_parsing() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp, "http://127.0.0.1:9/process".to_string(), RetentionPolicy::Keep);
        config.upload.max_body_bytes = 1024;
        let app = app!(config);

        // Not even a valid multipart body: the size check must win.
        let body = vec![b'x'; 4096];
        let req = upload_request(body)
            .insert_header((CONTENT_LENGTH, "4096"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(stored_files(&storage_dir(&tmp)).is_empty());
    }

    #[actix_web::test]
    async fn test_missing_audio_field_is_bad_request() {
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, "http://127.0.0.1:9/process".to_string(), RetentionPolicy::Keep));

        let body = multipart_body("file", "clip.wav", "audio/wav", &wav_fixture(512));
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let text = test::read_body(resp).await;
        assert!(text.starts_with(b"Error retrieving the file"));
    }

    #[actix_web::test]
    async fn test_audio_form_value_without_filename_is_not_a_file() {
        let engine = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"match_result": {"song_name": "X"}})))
            .expect(0)
            .mount(&engine)
            .await;

        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", engine.uri()), RetentionPolicy::Keep));

        let body = multipart_value_body("audio", &wav_fixture(1024));
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let text = test::read_body(resp).await;
        assert!(text.starts_with(b"Error retrieving the file"));
        assert!(stored_files(&storage_dir(&tmp)).is_empty());
    }

    #[actix_web::test]
    async fn test_non_multipart_body_is_bad_request() {
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, "http://127.0.0.1:9/process".to_string(), RetentionPolicy::Keep));

        let req = test::TestRequest::post()
            .uri("/upload-audio")
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload(r#"{"audio": "nope"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let text = test::read_body(resp).await;
        assert!(text.starts_with(b"Error parsing form data"));
    }

    #[actix_web::test]
    async fn test_unreachable_engine_is_bad_gateway_and_cleans_up() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("http://127.0.0.1:{}/process", port), RetentionPolicy::Delete));

        let body = multipart_body("audio", "clip.mp3", "audio/mpeg", b"ID3\x04\x00\x00\x00\x00\x00\x00frames");
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let text = test::read_body(resp).await;
        assert!(text.starts_with(b"Processing failed: engine unreachable"));
        assert!(stored_files(&storage_dir(&tmp)).is_empty());
    }

    #[actix_web::test]
    async fn test_engine_failure_status_is_surfaced_with_body() {
        let engine = engine_returning(
            ResponseTemplate::new(500).set_body_string(r#"{"error": "fingerprint failed"}"#),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", engine.uri()), RetentionPolicy::Delete));

        let body = multipart_body("audio", "clip.wav", "audio/wav", &wav_fixture(512));
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(text.contains("500"));
        assert!(text.contains(r#"{"error": "fingerprint failed"}"#));
    }

    #[actix_web::test]
    async fn test_garbled_engine_json_is_never_a_success() {
        let engine = engine_returning(ResponseTemplate::new(200).set_body_string(r#"{"match_result": {"song"#)).await;
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", engine.uri()), RetentionPolicy::Delete));

        let body = multipart_body("audio", "clip.wav", "audio/wav", &wav_fixture(512));
        let resp = test::call_service(&app, upload_request(body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn test_concurrent_uploads_get_distinct_artifacts() {
        let engine = engine_returning(
            ResponseTemplate::new(200).set_body_json(json!({"match_result": {"song_name": "X"}})),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let app = app!(config(&tmp, format!("{}/process", engine.uri()), RetentionPolicy::Keep));

        let uploads: Vec<Vec<u8>> = (0..4).map(|i| wav_fixture(600 + i * 100)).collect();
        let responses = futures_util::future::join_all(uploads.iter().map(|wav| {
            let body = multipart_body("audio", "clip.wav", "audio/wav", wav);
            test::call_service(&app, upload_request(body).to_request())
        }))
        .await;

        for resp in responses {
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let files = stored_files(&storage_dir(&tmp));
        assert_eq!(files.len(), uploads.len());
        let mut stored: Vec<Vec<u8>> = files.iter().map(|f| fs::read(f).unwrap()).collect();
        let mut expected = uploads.clone();
        stored.sort();
        expected.sort();
        assert_eq!(stored, expected);
    }

    #[actix_web::test]
    async fn test_boundary_fixture_matches_content_type() {
        assert!(multipart_content_type().ends_with(BOUNDARY));
    }
}
