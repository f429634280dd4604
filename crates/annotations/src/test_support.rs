//! Fixtures shared by the crate's tests

use crate::manager::AnnotationDraft;
use crate::references::{CrossReferenceRegistry, ReferenceResolver};
use curation_common::db::models::{AnnotationOrigin, CitationActiveModel};
use curation_common::{DbPool, LiteratureSource, Repository};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::collections::BTreeSet;
use std::sync::Arc;

pub async fn store() -> DbPool {
    DbPool::in_memory().await.expect("in-memory store")
}

pub async fn seed_entries(db: &DatabaseConnection, ids: &[&str]) {
    let repo = Repository::new(db);
    for id in ids {
        repo.insert_entry(id, &format!("Entry {}", id), "family", true)
            .await
            .expect("seed entry");
    }
}

/// Store a citation under an explicit identifier
pub async fn seed_citation(db: &DatabaseConnection, id: &str, serial: i64, pubmed_id: Option<i64>) {
    CitationActiveModel {
        id: Set(id.to_string()),
        serial: Set(serial),
        pubmed_id: Set(pubmed_id),
        title: Set(format!("Seeded {}", id)),
        authors: Set(None),
        journal: Set(None),
        year: Set(None),
        volume: Set(None),
        issue: Set(None),
        pages: Set(None),
        doi: Set(None),
        url: Set(None),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("seed citation");
}

pub fn resolver(source: Arc<dyn LiteratureSource>) -> ReferenceResolver {
    ReferenceResolver::new(CrossReferenceRegistry::default(), source)
}

pub fn draft(text: &str) -> AnnotationDraft {
    AnnotationDraft {
        text: text.to_string(),
        comment: None,
        author: Some("curator".to_string()),
        origin: AnnotationOrigin::Human,
        reviewed: false,
    }
}

/// Primary citation ids of an entry, in position order
pub async fn primary_ids(db: &DatabaseConnection, entry_id: &str) -> Vec<String> {
    Repository::new(db)
        .primary_citations(entry_id)
        .await
        .expect("primary citations")
        .into_iter()
        .map(|c| c.citation_id)
        .collect()
}

pub async fn supplementary_ids(db: &DatabaseConnection, entry_id: &str) -> BTreeSet<String> {
    Repository::new(db)
        .supplementary_citations(entry_id)
        .await
        .expect("supplementary citations")
        .into_iter()
        .map(|c| c.citation_id)
        .collect()
}
