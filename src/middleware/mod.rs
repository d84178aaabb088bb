pub mod logging;
pub mod metrics;

pub use logging::{RequestId, RequestLogging};
pub use metrics::MetricsMiddleware;
