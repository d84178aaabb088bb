//! # Application State Management
//!
//! State shared by every HTTP handler. Requests never share pipeline state with
//! each other; what lives here is either immutable (configuration, the relay
//! client) or internally synchronized (the artifact namer inside the intake, the
//! metrics counters).
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (every actix worker holds a clone of AppState)
//! - **RwLock**: Many readers OR one writer, used for the metrics counters

use crate::config::AppConfig;
use crate::intake::IntakeValidator;
use crate::relay::RelayClient;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration is read-only after startup
    pub config: Arc<AppConfig>,

    /// First half of the pipeline, including the storage directory and namer
    pub intake: Arc<IntakeValidator>,

    /// Second half of the pipeline; reqwest clients are cheap to clone
    pub relay: RelayClient,

    /// Request and upload counters, updated by middleware and the upload handler
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected since server start.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed
    pub request_count: u64,

    /// Total number of HTTP requests answered with a 4xx or 5xx status
    pub error_count: u64,

    /// Upload outcomes, one counter per terminal stage
    pub uploads: UploadMetrics,

    /// Key: endpoint name (e.g., "POST /upload-audio")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// How uploads ended, by pipeline stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadMetrics {
    /// Rejected before storage (too large, malformed, unsupported type)
    pub rejected: u64,
    /// Failed while sniffing or writing to storage
    pub storage_failures: u64,
    /// Stored but the engine could not produce a result
    pub relay_failures: u64,
    /// Reached `Responded`
    pub responded: u64,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Where an upload's pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Rejected,
    StorageFailed,
    RelayFailed,
    Responded,
}

impl AppState {
    /// Build the shared state. Fails only if the HTTP client cannot be created.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let intake = IntakeValidator::new(&config.upload);
        let relay = RelayClient::new(&config.engine)?;

        Ok(Self {
            config: Arc::new(config),
            intake: Arc::new(intake),
            relay,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        })
    }

    /// A poisoned lock only means a panic happened mid-update of some counters;
    /// the counters themselves are still usable.
    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one finished HTTP request (called by the metrics middleware).
    pub fn record_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Record where an upload's pipeline ended.
    pub fn record_upload(&self, outcome: UploadOutcome) {
        let mut metrics = self.metrics_write();
        let uploads = &mut metrics.uploads;
        match outcome {
            UploadOutcome::Rejected => uploads.rejected += 1,
            UploadOutcome::StorageFailed => uploads.storage_failures += 1,
            UploadOutcome::RelayFailed => uploads.relay_failures += 1,
            UploadOutcome::Responded => uploads.responded += 1,
        }
    }

    /// Copy of the current metrics, so the lock is not held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
