//! Reference resolution
//!
//! Checks cross-references against the registry, resolves citation
//! sub-references to canonical ids (importing unknown PubMed ids through the
//! literature service) and rewrites citation tags into their normalized form.

use super::registry::CrossReferenceRegistry;
use super::tags::{citation_refs, citation_tag, scan, CitationRef};
use curation_common::config::AnnotationConfig;
use curation_common::errors::{AppError, Result};
use curation_common::{LiteratureSource, Repository};
use sea_orm::ConnectionTrait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Text with normalized citation tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedText {
    pub text: String,
    /// Canonical ids cited by `text`
    pub citations: BTreeSet<String>,
    /// Canonical ids created by this resolution, in import order
    pub imported: Vec<String>,
}

/// Resolves references in annotation text
pub struct ReferenceResolver {
    registry: CrossReferenceRegistry,
    literature: Arc<dyn LiteratureSource>,
    title_max_chars: usize,
}

impl ReferenceResolver {
    pub fn new(registry: CrossReferenceRegistry, literature: Arc<dyn LiteratureSource>) -> Self {
        Self {
            registry,
            literature,
            title_max_chars: curation_common::DEFAULT_TITLE_MAX_CHARS,
        }
    }

    pub fn with_title_limit(mut self, max_chars: usize) -> Self {
        self.title_max_chars = max_chars;
        self
    }

    pub fn from_config(config: &AnnotationConfig, literature: Arc<dyn LiteratureSource>) -> Self {
        Self::new(CrossReferenceRegistry::from_config(config), literature)
            .with_title_limit(config.title_max_chars)
    }

    /// Resolve every reference in `text`.
    ///
    /// Citation records imported on the way are written through `conn`, so
    /// callers pass an open transaction to keep a failed edit from leaving
    /// them behind.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub async fn resolve<C: ConnectionTrait>(&self, conn: &C, text: &str) -> Result<ResolvedText> {
        let tags = scan(text);

        for tag in tags.iter().filter(|t| !t.is_citation()) {
            self.registry.check(tag)?;
        }

        let mut parsed = Vec::new();
        let mut canonical = BTreeSet::new();
        let mut pubmed = BTreeSet::new();
        for tag in tags.iter().filter(|t| t.is_citation()) {
            let refs =
                citation_refs(&tag.value).map_err(|value| AppError::InvalidCitation { value })?;
            for r in &refs {
                match r {
                    CitationRef::Canonical(id) => {
                        canonical.insert(id.clone());
                    }
                    CitationRef::PubMed(pmid) => {
                        pubmed.insert(*pmid);
                    }
                }
            }
            parsed.push((tag, refs));
        }

        let repo = Repository::new(conn);
        let mut unresolved = Self::missing_canonical(&repo, &canonical).await?;
        let (by_pubmed, imported, missing_pubmed) = self.resolve_pubmed(&repo, &pubmed).await?;
        unresolved.extend(missing_pubmed.into_iter().map(|pmid| pmid.to_string()));
        if !unresolved.is_empty() {
            return Err(AppError::UnresolvedCitations { ids: unresolved });
        }

        let mut normalized = String::with_capacity(text.len());
        let mut citations = BTreeSet::new();
        let mut cursor = 0;
        for (tag, refs) in parsed {
            let ids: BTreeSet<String> = refs
                .into_iter()
                .filter_map(|r| match r {
                    CitationRef::Canonical(id) => Some(id),
                    CitationRef::PubMed(pmid) => by_pubmed.get(&pmid).cloned(),
                })
                .collect();

            normalized.push_str(&text[cursor..tag.start]);
            normalized.push_str(
                &ids.iter()
                    .map(|id| citation_tag(id))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            cursor = tag.end;
            citations.extend(ids);
        }
        normalized.push_str(&text[cursor..]);

        debug!(citations = citations.len(), imported = imported.len(), "References resolved");

        Ok(ResolvedText {
            text: normalized,
            citations,
            imported,
        })
    }

    /// Canonical ids with no stored record
    async fn missing_canonical<C: ConnectionTrait>(
        repo: &Repository<'_, C>,
        ids: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: Vec<String> = ids.iter().cloned().collect();
        let found: HashSet<String> = repo
            .find_citations(&wanted)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        Ok(wanted.into_iter().filter(|id| !found.contains(id)).collect())
    }

    async fn resolve_pubmed<C: ConnectionTrait>(
        &self,
        repo: &Repository<'_, C>,
        pubmed_ids: &BTreeSet<i64>,
    ) -> Result<(HashMap<i64, String>, Vec<String>, Vec<i64>)> {
        let mut resolved = HashMap::new();
        let mut imported = Vec::new();
        if pubmed_ids.is_empty() {
            return Ok((resolved, imported, Vec::new()));
        }

        let wanted: Vec<i64> = pubmed_ids.iter().copied().collect();
        for citation in repo.find_citations_by_pubmed_ids(&wanted).await? {
            if let Some(pmid) = citation.pubmed_id {
                resolved.insert(pmid, citation.id);
            }
        }

        let missing: Vec<i64> = wanted
            .iter()
            .copied()
            .filter(|pmid| !resolved.contains_key(pmid))
            .collect();

        if !missing.is_empty() {
            // The enclosing transaction stays open across this round trip
            debug!(
                count = missing.len(),
                provider = self.literature.name(),
                "Looking up citations"
            );
            let records = self.literature.fetch(&missing).await?;

            for mut record in records {
                let pmid = record.pubmed_id;
                if !missing.contains(&pmid) || resolved.contains_key(&pmid) {
                    continue;
                }
                record.title = truncate_title(&record.title, self.title_max_chars);

                let citation = repo.insert_citation(record).await?;
                info!(citation_id = %citation.id, pubmed_id = pmid, "Imported citation");
                resolved.insert(pmid, citation.id.clone());
                imported.push(citation.id);
            }
            curation_common::metrics::record_citation_imports(imported.len());
        }

        let unresolved: Vec<i64> = wanted
            .into_iter()
            .filter(|pmid| !resolved.contains_key(pmid))
            .collect();

        Ok((resolved, imported, unresolved))
    }
}

/// Cap a title at `max_chars` characters, marking the cut with "..."
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }
    if max_chars < 3 {
        return title.chars().take(max_chars).collect();
    }
    let mut truncated: String = title.chars().take(max_chars - 3).collect();
    truncated.push_str("...");
    truncated
}
