//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default data directory (uploads and job records live underneath).
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default directory for finished export archives.
pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";

/// Default maximum accepted upload size: 20 GiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024 * 1024;

/// Chunk size returned to clients at upload initiation: 16 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Default number of concurrent conversion workers.
pub const DEFAULT_CONVERT_WORKERS: usize = 2;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub convert: ConvertConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Filesystem layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory containing `uploads/` and `jobs/`
    pub data_dir: PathBuf,
    /// Directory where finished export archives are written
    pub download_dir: PathBuf,
}

impl StorageConfig {
    /// Directory holding in-flight and finalized upload files
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory holding one JSON record per job
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }
}

/// Upload protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted declared size in bytes
    pub max_bytes: u64,
    /// Chunk size clients must use for chunked uploads
    pub chunk_size: u64,
}

/// Conversion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Number of conversions allowed to run concurrently
    pub workers: usize,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("MBOXCSV_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("MBOXCSV_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("MBOXCSV_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            storage: StorageConfig {
                data_dir: std::env::var("MBOXCSV_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
                download_dir: std::env::var("MBOXCSV_DOWNLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            },
            upload: UploadConfig {
                max_bytes: std::env::var("MBOXCSV_MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
                chunk_size: std::env::var("MBOXCSV_CHUNK_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CHUNK_SIZE),
            },
            convert: ConvertConfig {
                workers: std::env::var("MBOXCSV_CONVERT_WORKERS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CONVERT_WORKERS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                allow_credentials: std::env::var("CORS_ALLOW_CREDENTIALS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.upload.max_bytes == 0 {
            anyhow::bail!("Maximum upload size must be greater than 0");
        }

        if self.upload.chunk_size == 0 {
            anyhow::bail!("Chunk size must be greater than 0");
        }

        if self.upload.chunk_size > self.upload.max_bytes {
            anyhow::bail!(
                "Chunk size ({}) cannot be greater than the maximum upload size ({})",
                self.upload.chunk_size,
                self.upload.max_bytes
            );
        }

        if self.convert.workers == 0 {
            anyhow::bail!("Conversion worker count must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from(DEFAULT_DATA_DIR),
                download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            },
            upload: UploadConfig {
                max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                chunk_size: DEFAULT_CHUNK_SIZE,
            },
            convert: ConvertConfig {
                workers: DEFAULT_CONVERT_WORKERS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.convert.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_size_larger_than_max_rejected() {
        let mut config = Config::default();
        config.upload.max_bytes = 1024;
        config.upload.chunk_size = 2048;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_subdirectories() {
        let config = Config::default();
        assert!(config.storage.uploads_dir().ends_with("uploads"));
        assert!(config.storage.jobs_dir().ends_with("jobs"));
    }
}
