pub mod upload;

pub use upload::*;

use crate::health;
use actix_web::web;

/// Route table shared by the server and the handler tests.
///
/// - `POST /upload-audio`: the upload pipeline
/// - `GET /ping`: liveness probe
/// - `GET /health`, `GET /metrics`: also mounted under `/api/v1`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/upload-audio", web::post().to(upload_audio))
        .route("/ping", web::get().to(health::ping))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics)),
        );
}
