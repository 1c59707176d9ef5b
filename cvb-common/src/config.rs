//! Bundler configuration loading
//!
//! Settings sources, highest priority first:
//! 1. Command-line flags (applied by the binary after loading)
//! 2. Environment variables (`CVB_*`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! Config file resolution: explicit path → `CVB_CONFIG` → platform config
//! directory (`<config_dir>/cvb/bundler.toml`) → defaults only.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CVB_CONFIG";

/// Complete bundler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Connection URL of the clip metadata database
    pub database_url: String,
    /// File holding the SQL text that selects one row per clip
    pub query_file: PathBuf,
    /// Local output directory (clips, clips.tsv, stats.json)
    pub out_dir: PathBuf,
    /// Release name; archives land under `<release>/<locale>.tar.gz`
    pub release: String,
    /// Skip archive upload and stats publication
    pub skip_upload: bool,
    pub storage: StorageConfig,
    pub pipeline: PipelineSettings,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

/// Object storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// S3-compatible HTTP endpoint
    Http,
    /// Local directory tree (one subdirectory per bucket)
    Filesystem,
}

/// Remote object storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Endpoint URL (http) or root directory (filesystem)
    pub endpoint: String,
    /// Bucket holding the source clips
    pub clips_bucket: String,
    /// Bucket receiving archives and stats.json
    pub bundle_bucket: String,
    /// Public base URL used in `bundleURLTemplate`
    pub public_url: Option<String>,
    /// Bearer token sent with every request (http only)
    pub token: Option<String>,
    /// TCP connect timeout in seconds; transfers themselves are never timed out
    pub connect_timeout_secs: u64,
}

/// Download pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Pause the row source once more than this many fetches are in flight
    pub high_watermark: usize,
    /// Resume the row source once fewer than this many fetches are in flight
    pub low_watermark: usize,
    /// Attempts per clip before it is recorded as failed
    pub fetch_attempts: u32,
    /// Delay between attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
    /// Rows buffered between the cursor task and the aggregator
    pub row_buffer: usize,
}

/// External helper commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Duration summing command; the clips directory is appended as last argument
    pub duration_command: Vec<String>,
    /// Corpus splitter command; the TSV path and output directory are appended
    pub splitter_command: Option<Vec<String>>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            database_url: "mysql://localhost/voice".to_string(),
            query_file: PathBuf::from("query.sql"),
            out_dir: PathBuf::from("out"),
            release: "cv-corpus".to_string(),
            skip_upload: false,
            storage: StorageConfig::default(),
            pipeline: PipelineSettings::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Http,
            endpoint: "https://s3.amazonaws.com".to_string(),
            clips_bucket: "voice-clips".to_string(),
            bundle_bucket: "voice-bundles".to_string(),
            public_url: None,
            token: None,
            connect_timeout_secs: 30,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            high_watermark: 50,
            low_watermark: 25,
            fetch_attempts: 3,
            retry_backoff_ms: 500,
            row_buffer: 64,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            duration_command: vec!["mp3-duration-sum".to_string()],
            splitter_command: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BundlerConfig {
    /// Load configuration from file (if any), apply environment overrides, validate
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Override secrets and endpoints from `CVB_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CVB_DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(dir) = std::env::var("CVB_OUT_DIR") {
            self.out_dir = PathBuf::from(dir);
        }
        if let Ok(release) = std::env::var("CVB_RELEASE") {
            self.release = release;
        }
        if let Ok(endpoint) = std::env::var("CVB_STORAGE_ENDPOINT") {
            self.storage.endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("CVB_STORAGE_TOKEN") {
            self.storage.token = Some(token);
        }
        if let Ok(bucket) = std::env::var("CVB_CLIPS_BUCKET") {
            self.storage.clips_bucket = bucket;
        }
        if let Ok(bucket) = std::env::var("CVB_BUNDLE_BUCKET") {
            self.storage.bundle_bucket = bucket;
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.low_watermark >= p.high_watermark {
            return Err(Error::Config(format!(
                "low_watermark ({}) must be below high_watermark ({})",
                p.low_watermark, p.high_watermark
            )));
        }
        if p.low_watermark == 0 {
            return Err(Error::Config("low_watermark must be at least 1".to_string()));
        }
        if p.fetch_attempts == 0 {
            return Err(Error::Config("fetch_attempts must be at least 1".to_string()));
        }
        if p.row_buffer == 0 {
            return Err(Error::Config("row_buffer must be at least 1".to_string()));
        }
        if self.tools.duration_command.is_empty() {
            return Err(Error::Config("duration_command must not be empty".to_string()));
        }
        if self.release.trim().is_empty() {
            return Err(Error::Config("release must not be empty".to_string()));
        }
        Ok(())
    }

    /// URL template published in stats.json
    pub fn bundle_url_template(&self) -> String {
        let base = self.storage.public_url.clone().unwrap_or_else(|| {
            format!(
                "{}/{}",
                self.storage.endpoint.trim_end_matches('/'),
                self.storage.bundle_bucket
            )
        });
        format!("{}/{}/{{locale}}.tar.gz", base.trim_end_matches('/'), self.release)
    }
}

/// Find the configuration file to load, if any
fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: explicit path (must exist; a typo should not fall through silently)
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: platform config directory
    dirs::config_dir()
        .map(|d| d.join("cvb").join("bundler.toml"))
        .filter(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BundlerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.high_watermark, 50);
        assert_eq!(config.pipeline.low_watermark, 25);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BundlerConfig::from_toml_str(
            r#"
            release = "cv-corpus-5"

            [pipeline]
            high_watermark = 10
            low_watermark = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.release, "cv-corpus-5");
        assert_eq!(config.pipeline.high_watermark, 10);
        assert_eq!(config.pipeline.fetch_attempts, 3);
        assert_eq!(config.storage.kind, StorageKind::Http);
    }

    #[test]
    fn test_inverted_watermarks_rejected() {
        let mut config = BundlerConfig::default();
        config.pipeline.low_watermark = 50;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = BundlerConfig::default();
        config.pipeline.fetch_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bundle_url_template() {
        let mut config = BundlerConfig::default();
        config.release = "cv-1".to_string();
        config.storage.public_url = Some("https://cdn.example.org/".to_string());
        assert_eq!(
            config.bundle_url_template(),
            "https://cdn.example.org/cv-1/{locale}.tar.gz"
        );

        config.storage.public_url = None;
        assert_eq!(
            config.bundle_url_template(),
            "https://s3.amazonaws.com/voice-bundles/cv-1/{locale}.tar.gz"
        );
    }

    #[test]
    fn test_unknown_storage_kind_rejected() {
        let result = BundlerConfig::from_toml_str("[storage]\nkind = \"ftp\"\n");
        assert!(result.is_err());
    }
}
