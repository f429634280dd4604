//! Curator operator CLI
//!
//! Maintenance commands for the annotation store:
//! - Schema provisioning
//! - Citation drift audits
//! - Offline markup checks

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use curation_annotations::{markup, AnnotationLinkManager};
use curation_common::{
    config::AppConfig, db::schema, db::DbPool, literature::create_literature_source, metrics,
    telemetry, Repository,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "curator")]
#[command(author, version, about = "Annotation curation maintenance tool")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file, instead of the config/ directory lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing tables and indexes
    Schema,

    /// Compare primary citations with what linked annotations cite
    Audit {
        /// Audit a single entry instead of every entry
        #[arg(long)]
        entry: Option<String>,
    },

    /// Validate the markup of an annotation text file
    CheckMarkup {
        /// File holding the annotation text
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;
    telemetry::init_tracing(&config.observability)?;
    metrics::register_metrics();

    info!("curator v{}", curation_common::VERSION);

    match cli.command {
        Commands::Schema => {
            let db = DbPool::new(&config.database).await?;
            schema::create_schema(db.connection()).await?;
            info!("Schema provisioned");
        }
        Commands::Audit { entry } => audit(&config, entry).await?,
        Commands::CheckMarkup { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if let Err(e) = markup::validate(&text) {
                bail!("{}: {}", path.display(), e);
            }
            println!("{}: ok", path.display());
        }
    }

    Ok(())
}

async fn audit(config: &AppConfig, entry: Option<String>) -> anyhow::Result<()> {
    let db = DbPool::new(&config.database).await?;
    db.ping().await?;

    let literature = create_literature_source(&config.literature)?;
    let manager = AnnotationLinkManager::from_config(config, literature);

    let entries = match entry {
        Some(id) => vec![id],
        None => Repository::new(db.connection()).list_entry_ids().await?,
    };

    let mut drifted = 0usize;
    for entry_id in &entries {
        let report = manager.audit_entry(db.connection(), entry_id).await?;
        if !report.is_consistent() {
            drifted += 1;
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    info!(entries = entries.len(), drifted, "Audit finished");
    if drifted > 0 {
        bail!("{} of {} entries have drifted citations", drifted, entries.len());
    }
    Ok(())
}
