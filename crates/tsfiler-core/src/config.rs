use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{TsfilerError, TsfilerResult};

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TsfilerConfig {
    pub service: ServiceConfig,
    pub auth: AuthConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

impl TsfilerConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> TsfilerResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| TsfilerError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service base URL (default: http://localhost:3000)
    pub base_url: String,
    /// Skip TLS certificate verification (self-signed development servers)
    pub accept_invalid_certs: bool,
    /// Refuse plaintext http:// endpoints
    pub enforce_tls: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub login_path: String,
    pub upload_path: String,
    pub confirm_path: String,
    /// Manifest endpoint; the file id is appended as a path segment
    pub download_path: String,
    pub direct_upload_path: String,
    pub metadata_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Default account used when --email is not given
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunks fetched concurrently during a download (1 = sequential)
    pub chunk_concurrency: usize,
    /// Delete local files after a confirmed tree upload
    pub remove_after_upload: bool,
    /// Whether tree uploads descend into hidden directories
    pub sync_hidden_dirs: bool,
    /// Glob patterns excluded from tree uploads
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            accept_invalid_certs: false,
            enforce_tls: false,
            timeout_secs: 60,
            login_path: "/auth/login".into(),
            upload_path: "/upload".into(),
            confirm_path: "/upload/confirm".into(),
            download_path: "/download".into(),
            direct_upload_path: "/upload/direct".into(),
            metadata_path: "/metadata".into(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_concurrency: 1,
            remove_after_upload: false,
            sync_hidden_dirs: false,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
