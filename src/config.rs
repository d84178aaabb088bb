//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment shorthands (HOST, PORT, ENGINE_URL)
//! 2. Environment variables (APP_SERVER__PORT, APP_UPLOAD__STORAGE_DIR, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore so that field names which
//! contain underscores themselves (`max_body_bytes`) survive the mapping.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub engine: EngineConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (containers)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Intake settings: how big an upload may be and where accepted files go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Hard cap on the whole request body, in bytes
    pub max_body_bytes: u64,
    /// Directory that receives stored artifacts
    pub storage_dir: PathBuf,
    /// What happens to an artifact once its relay has finished
    pub retention: RetentionPolicy,
}

/// Artifact retention after the relay call finishes.
///
/// - `Delete`: remove the artifact whether the relay succeeded or failed
/// - `Keep`: leave it on disk for debugging; the operator owns cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    Delete,
    Keep,
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicy::Delete => write!(f, "delete"),
            RetentionPolicy::Keep => write!(f, "keep"),
        }
    }
}

/// Where the processing engine lives and how long we are willing to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Full URL of the engine's processing endpoint
    pub url: String,
    /// Deadline for the whole outbound call, in seconds
    pub timeout_secs: u64,
    /// Deadline for establishing the connection, in seconds
    pub connect_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            upload: UploadConfig {
                max_body_bytes: 10 * 1024 * 1024, // 10 MiB
                storage_dir: PathBuf::from("./temp"),
                retention: RetentionPolicy::Delete,
            },
            engine: EngineConfig {
                url: "http://engine:5000/process".to_string(),
                timeout_secs: 30,
                connect_timeout_secs: 5,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=9000`: Override server port
    /// - `APP_UPLOAD__RETENTION=keep`: Keep artifacts after relaying them
    /// - `APP_ENGINE__TIMEOUT_SECS=60`: Give the engine more time
    /// - `HOST`, `PORT`, `ENGINE_URL`: Shorthands used by deployment platforms
    pub fn load() -> AppResult<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(url) = env::var("ENGINE_URL") {
            settings = settings.set_override("engine.url", url)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - The body cap allows at least one byte
    /// - A storage directory is named
    /// - The engine URL is an http(s) URL
    /// - Both engine deadlines are non-zero, so the relay can never hang forever
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::ConfigError("Server port cannot be 0".to_string()));
        }

        if self.upload.max_body_bytes == 0 {
            return Err(AppError::ConfigError("Upload body limit must be greater than 0".to_string()));
        }

        if self.upload.storage_dir.as_os_str().is_empty() {
            return Err(AppError::ConfigError("Upload storage directory cannot be empty".to_string()));
        }

        if !(self.engine.url.starts_with("http://") || self.engine.url.starts_with("https://")) {
            return Err(AppError::ConfigError(format!(
                "Engine URL must start with http:// or https://, got '{}'",
                self.engine.url
            )));
        }

        if self.engine.timeout_secs == 0 || self.engine.connect_timeout_secs == 0 {
            return Err(AppError::ConfigError("Engine timeouts must be greater than 0".to_string()));
        }

        Ok(())
    }
}
