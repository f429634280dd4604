//! Curation Common Library
//!
//! Shared code for the annotation curation workspace including:
//! - Database models, schema provisioning and repository patterns
//! - Literature service client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and tracing bootstrap

pub mod config;
pub mod db;
pub mod errors;
pub mod literature;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use literature::LiteratureSource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default cap on imported citation titles, in characters
pub const DEFAULT_TITLE_MAX_CHARS: usize = 740;
