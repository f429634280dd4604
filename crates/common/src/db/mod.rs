//! Database layer for annotation curation
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection pool management
//! - Schema provisioning

pub mod models;
mod repository;
pub mod schema;

pub use repository::{NewAnnotation, Repository};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(config.sqlx_logging);

        let pool = Self::connect(opts).await?;

        info!("Database connection established");

        Ok(pool)
    }

    /// Connect with explicit options
    pub async fn connect(opts: ConnectOptions) -> Result<Self> {
        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        Ok(Self { conn })
    }

    /// Single-connection in-memory SQLite pool with the schema provisioned
    pub async fn in_memory() -> Result<Self> {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        // Every pooled connection would otherwise open its own empty database
        opts.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let pool = Self::connect(opts).await?;
        schema::create_schema(pool.connection()).await?;

        Ok(pool)
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}
