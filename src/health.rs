use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness probe: always answers `pong`.
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body("pong")
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;
    let storage_dir = state.intake.store().dir();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "storage": {
            "dir": storage_dir.display().to_string(),
            "available": storage_dir.is_dir(),
            "retention": config.upload.retention.to_string(),
            "max_body_bytes": state.intake.max_body_bytes()
        },
        "engine": {
            "url": state.relay.endpoint(),
            "timeout_secs": config.engine.timeout_secs
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "uploads": {
                "rejected": metrics.uploads.rejected,
                "storage_failures": metrics.uploads.storage_failures,
                "relay_failures": metrics.uploads.relay_failures,
                "responded": metrics.uploads.responded
            }
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "uploads": {
            "rejected": metrics.uploads.rejected,
            "storage_failures": metrics.uploads.storage_failures,
            "relay_failures": metrics.uploads.relay_failures,
            "responded": metrics.uploads.responded
        },
        "endpoints": endpoint_stats
    }))
}
