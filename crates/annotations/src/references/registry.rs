//! Known cross-reference databases

use super::tags::ReferenceTag;
use curation_common::config::AnnotationConfig;
use curation_common::errors::{AppError, Result};
use std::collections::BTreeSet;

/// Databases accepted in `[db:id]` tags out of the box
pub const DEFAULT_CROSS_REF_DBS: &[&str] = &[
    "cazy",
    "cdd",
    "cog",
    "ec",
    "genprop",
    "go",
    "intenz",
    "interpro",
    "pdbe",
    "pfam",
    "pirsf",
    "prosite",
    "prositedoc",
    "smart",
    "superfamily",
    "swissprot",
    "tc",
    "taxonomy",
    "trembl",
];

/// Case-insensitive registry of cross-reference database names
#[derive(Debug, Clone)]
pub struct CrossReferenceRegistry {
    dbs: BTreeSet<String>,
}

impl Default for CrossReferenceRegistry {
    fn default() -> Self {
        Self {
            dbs: DEFAULT_CROSS_REF_DBS.iter().map(|db| db.to_string()).collect(),
        }
    }
}

impl CrossReferenceRegistry {
    /// Default registry plus additional database names
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::default();
        registry
            .dbs
            .extend(extra.into_iter().map(|db| db.as_ref().trim().to_ascii_lowercase()));
        registry
    }

    pub fn from_config(config: &AnnotationConfig) -> Self {
        Self::with_extra(&config.extra_cross_ref_dbs)
    }

    pub fn contains(&self, db: &str) -> bool {
        self.dbs.contains(&db.to_ascii_lowercase())
    }

    /// Check a cross-reference tag: known database, non-empty id without whitespace
    pub fn check(&self, tag: &ReferenceTag) -> Result<()> {
        if !self.contains(&tag.db) {
            return Err(AppError::UnknownCrossReference { db: tag.db.clone() });
        }
        if tag.value.is_empty() || tag.value.chars().any(char::is_whitespace) {
            return Err(AppError::InvalidCrossReference {
                db: tag.db.clone(),
                id: tag.value.clone(),
            });
        }
        Ok(())
    }
}
