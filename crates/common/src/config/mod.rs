//! Configuration management for curation services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Literature metadata service configuration
    #[serde(default)]
    pub literature: LiteratureConfig,

    /// Annotation rules
    #[serde(default)]
    pub annotations: AnnotationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Log every statement through sqlx
    #[serde(default)]
    pub sqlx_logging: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiteratureConfig {
    /// Provider: europepmc, mock
    #[serde(default = "default_literature_provider")]
    pub provider: String,

    /// API base URL
    #[serde(default = "default_literature_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_literature_timeout")]
    pub timeout_secs: u64,

    /// Maximum identifiers per request
    #[serde(default = "default_literature_batch_size")]
    pub batch_size: usize,

    /// Lookups slower than this are logged as warnings
    #[serde(default = "default_slow_lookup_ms")]
    pub slow_lookup_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnnotationConfig {
    /// Imported titles longer than this are truncated
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Cross-reference databases accepted on top of the built-in registry
    #[serde(default)]
    pub extra_cross_ref_dbs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_literature_provider() -> String { "europepmc".to_string() }
fn default_literature_base_url() -> String {
    "https://www.ebi.ac.uk/europepmc/webservices/rest".to_string()
}
fn default_literature_timeout() -> u64 { 30 }
fn default_literature_batch_size() -> usize { 100 }
fn default_slow_lookup_ms() -> u64 { 2000 }
fn default_title_max_chars() -> usize { crate::DEFAULT_TITLE_MAX_CHARS }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "curation".to_string() }

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            provider: default_literature_provider(),
            base_url: default_literature_base_url(),
            timeout_secs: default_literature_timeout(),
            batch_size: default_literature_batch_size(),
            slow_lookup_ms: default_slow_lookup_ms(),
        }
    }
}

impl LiteratureConfig {
    /// Per-request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            title_max_chars: default_title_max_chars(),
            extra_cross_ref_dbs: Vec::new(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/curation".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                sqlx_logging: false,
            },
            literature: LiteratureConfig::default(),
            annotations: AnnotationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
