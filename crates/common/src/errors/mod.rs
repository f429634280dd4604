//! Error types for curation services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Short titles for curator-facing messages
//! - Structured error responses
//! - Error codes for client handling

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MalformedMarkup,

    // Reference errors (2xxx)
    UnknownCrossReference,
    InvalidCrossReference,
    InvalidCitation,
    UnresolvedCitation,

    // Invariant errors (3xxx)
    InvariantViolation,

    // Resource errors (4xxx)
    NotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    LiteratureServiceError,

    // Internal errors (9xxx)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MalformedMarkup => 1002,

            // References (2xxx)
            ErrorCode::UnknownCrossReference => 2001,
            ErrorCode::InvalidCrossReference => 2002,
            ErrorCode::InvalidCitation => 2003,
            ErrorCode::UnresolvedCitation => 2004,

            // Invariants (3xxx)
            ErrorCode::InvariantViolation => 3001,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,

            // Conflicts (5xxx)
            ErrorCode::Conflict => 5001,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::LiteratureServiceError => 8002,

            // Internal (9xxx)
            ErrorCode::ConfigurationError => 9002,
        }
    }

    /// Short, curator-facing title for this class of error
    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "Invalid input",
            ErrorCode::MalformedMarkup => "Invalid markup",
            ErrorCode::UnknownCrossReference
            | ErrorCode::InvalidCrossReference
            | ErrorCode::InvalidCitation
            | ErrorCode::UnresolvedCitation => "Invalid reference",
            ErrorCode::InvariantViolation => "Operation not permitted",
            ErrorCode::NotFound => "Not found",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::DatabaseError | ErrorCode::ConnectionError => "Database error",
            ErrorCode::UpstreamError | ErrorCode::LiteratureServiceError => {
                "Literature service error"
            }
            ErrorCode::ConfigurationError => "Internal error",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid markup: {message}")]
    Markup {
        message: String,
        tag: Option<String>,
    },

    // Reference errors
    #[error("Unknown cross-reference database: {db}")]
    UnknownCrossReference { db: String },

    #[error("Invalid cross-reference identifier in [{db}:{id}]")]
    InvalidCrossReference { db: String, id: String },

    #[error("Invalid citation reference: '{value}'")]
    InvalidCitation { value: String },

    #[error("Unresolved citations: {}", .ids.join(", "))]
    UnresolvedCitations { ids: Vec<String> },

    // Invariant errors
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Literature service error: {message}")]
    LiteratureService { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Markup { .. } => ErrorCode::MalformedMarkup,
            AppError::UnknownCrossReference { .. } => ErrorCode::UnknownCrossReference,
            AppError::InvalidCrossReference { .. } => ErrorCode::InvalidCrossReference,
            AppError::InvalidCitation { .. } => ErrorCode::InvalidCitation,
            AppError::UnresolvedCitations { .. } => ErrorCode::UnresolvedCitation,
            AppError::InvariantViolation { .. } => ErrorCode::InvariantViolation,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::LiteratureService { .. } => ErrorCode::LiteratureServiceError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Short title for this error
    pub fn title(&self) -> &'static str {
        self.code().title()
    }

    /// Whether the caller can fix this error by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::Markup { .. }
                | AppError::UnknownCrossReference { .. }
                | AppError::InvalidCrossReference { .. }
                | AppError::InvalidCitation { .. }
                | AppError::UnresolvedCitations { .. }
                | AppError::InvariantViolation { .. }
                | AppError::NotFound { .. }
                | AppError::Duplicate { .. }
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Whether this error belongs to the reference taxonomy
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            AppError::UnknownCrossReference { .. }
                | AppError::InvalidCrossReference { .. }
                | AppError::InvalidCitation { .. }
                | AppError::UnresolvedCitations { .. }
        )
    }

    /// Log this error once at the operation boundary
    pub fn log(&self, operation: &str) {
        let code = self.code();
        if self.is_server_error() {
            tracing::error!(
                operation,
                error = %self,
                code = ?code,
                "Operation failed"
            );
        } else {
            tracing::warn!(
                operation,
                error = %self,
                code = ?code,
                "Operation rejected"
            );
        }
    }

    /// Build the structured response for this error
    pub fn to_response(&self) -> ErrorResponse {
        let code = self.code();
        let details = match self {
            AppError::Markup { tag: Some(tag), .. } => Some(serde_json::json!({ "tag": tag })),
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            AppError::UnresolvedCitations { ids } => Some(serde_json::json!({ "ids": ids })),
            _ => None,
        };

        ErrorResponse {
            error: ErrorDetails {
                code,
                title: code.title().to_string(),
                message: self.to_string(),
                details,
            },
        }
    }
}

/// Structured error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
