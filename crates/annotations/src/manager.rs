//! Annotation lifecycle: create, edit, link, unlink, reorder, delete
//!
//! Each operation runs in a single transaction. Validation, reference
//! resolution and citation reconciliation all see the same snapshot, and a
//! failure at any step rolls back every write made so far, including
//! citation records imported along the way.

use crate::markup;
use crate::reconcile::{CitationMutation, ReferenceReconciler};
use crate::references::{extract_citations, ReferenceResolver};
use curation_common::db::models::{Annotation, AnnotationActiveModel, AnnotationOrigin};
use curation_common::db::NewAnnotation;
use curation_common::errors::{AppError, Result};
use curation_common::{AppConfig, LiteratureSource, Repository};
use sea_orm::{ConnectionTrait, DatabaseConnection, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Proposed annotation content
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnnotationDraft {
    #[validate(length(min = 1, message = "Annotation text must not be empty"))]
    pub text: String,

    /// Reason for the change
    #[validate(length(max = 1000))]
    pub comment: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub author: Option<String>,

    #[serde(default)]
    pub origin: AnnotationOrigin,

    /// Human-written text counts as reviewed regardless of this flag
    #[serde(default)]
    pub reviewed: bool,
}

impl AnnotationDraft {
    fn is_reviewed(&self) -> bool {
        self.reviewed || self.origin == AnnotationOrigin::Human
    }
}

/// Result of a create or edit
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationChange {
    pub annotation: Annotation,
    pub citations: BTreeSet<String>,
    pub imported: Vec<String>,
    pub mutations: Vec<CitationMutation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkPosition {
    pub annotation_id: String,
    pub order_in: i32,
}

/// Result of a link or unlink
#[derive(Debug, Clone, Serialize)]
pub struct LinkChange {
    pub entry_id: String,
    pub annotation_id: String,
    /// The entry's annotations after the change, in display order
    pub ordering: Vec<LinkPosition>,
    pub mutations: Vec<CitationMutation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryCitations {
    pub primary: Vec<String>,
    pub supplementary: Vec<String>,
}

/// Drift between an entry's primary citations and its annotation texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationAudit {
    pub entry_id: String,
    /// Citations of the linked annotation texts
    pub expected: BTreeSet<String>,
    pub primary: BTreeSet<String>,
    /// Cited but not primary
    pub missing: Vec<String>,
    /// Primary but not cited
    pub unexpected: Vec<String>,
    /// Both primary and supplementary
    pub overlapping: Vec<String>,
}

impl CitationAudit {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.overlapping.is_empty()
    }
}

/// Coordinates markup validation, reference resolution and citation
/// reconciliation for annotation edits
pub struct AnnotationLinkManager {
    resolver: ReferenceResolver,
    reconciler: ReferenceReconciler,
}

impl AnnotationLinkManager {
    pub fn new(resolver: ReferenceResolver, reconciler: ReferenceReconciler) -> Self {
        Self {
            resolver,
            reconciler,
        }
    }

    pub fn from_config(config: &AppConfig, literature: Arc<dyn LiteratureSource>) -> Self {
        Self::new(
            ReferenceResolver::from_config(&config.annotations, literature),
            ReferenceReconciler::new(),
        )
    }

    // ========================================================================
    // Text operations
    // ========================================================================

    /// Validate, normalize and store a new annotation
    #[instrument(skip(self, db, draft))]
    pub async fn create_annotation(
        &self,
        db: &DatabaseConnection,
        draft: AnnotationDraft,
    ) -> Result<AnnotationChange> {
        finish("create", self.create_in(db, draft).await)
    }

    async fn create_in(
        &self,
        db: &DatabaseConnection,
        draft: AnnotationDraft,
    ) -> Result<AnnotationChange> {
        let text = check_draft(&draft)?;

        let txn = db.begin().await?;
        let resolved = self.resolver.resolve(&txn, text).await?;
        let repo = Repository::new(&txn);

        if let Some(existing) = repo.find_annotation_by_text(&resolved.text).await? {
            return Err(AppError::Duplicate {
                message: format!("The same text is already stored as {}", existing.id),
            });
        }

        let reviewed = draft.is_reviewed();
        let annotation = repo
            .insert_annotation(NewAnnotation {
                text: resolved.text,
                comment: draft.comment,
                origin: draft.origin,
                reviewed,
                author: draft.author,
            })
            .await?;
        txn.commit().await?;

        info!(
            annotation_id = %annotation.id,
            citations = resolved.citations.len(),
            imported = resolved.imported.len(),
            "Annotation created"
        );

        Ok(AnnotationChange {
            annotation,
            citations: resolved.citations,
            imported: resolved.imported,
            mutations: Vec::new(),
        })
    }

    /// Replace the text of an annotation, reconciling every entry it is linked to
    #[instrument(skip(self, db, draft))]
    pub async fn update_annotation(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        draft: AnnotationDraft,
    ) -> Result<AnnotationChange> {
        finish("update", self.update_in(db, annotation_id, draft).await)
    }

    async fn update_in(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        draft: AnnotationDraft,
    ) -> Result<AnnotationChange> {
        let text = check_draft(&draft)?;

        let txn = db.begin().await?;
        let repo = Repository::new(&txn);
        let current = require_annotation(&repo, annotation_id).await?;
        let resolved = self.resolver.resolve(&txn, text).await?;

        if let Some(other) = repo.find_annotation_by_text(&resolved.text).await? {
            if other.id != current.id {
                return Err(AppError::Duplicate {
                    message: format!("The same text is already stored as {}", other.id),
                });
            }
        }

        let before = extract_citations(&current.text);
        let mut mutations = Vec::new();
        for link in repo.annotation_links(annotation_id).await? {
            let siblings = repo.sibling_texts(&link.entry_id, annotation_id).await?;
            mutations.extend(
                self.reconciler
                    .reconcile(&txn, &link.entry_id, &before, &resolved.citations, &siblings)
                    .await?,
            );
        }

        let reviewed = draft.is_reviewed();
        let mut active: AnnotationActiveModel = current.into();
        active.text = Set(resolved.text);
        active.comment = Set(draft.comment);
        active.origin = Set(String::from(draft.origin));
        active.reviewed = Set(reviewed);
        active.updated_by = Set(draft.author);
        active.updated_at = Set(chrono::Utc::now().into());
        let annotation = repo.update_annotation(active).await?;
        txn.commit().await?;

        info!(
            annotation_id,
            mutations = mutations.len(),
            imported = resolved.imported.len(),
            "Annotation updated"
        );

        Ok(AnnotationChange {
            annotation,
            citations: resolved.citations,
            imported: resolved.imported,
            mutations,
        })
    }

    /// Mark an annotation reviewed or unreviewed
    #[instrument(skip(self, db))]
    pub async fn set_reviewed(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        reviewed: bool,
        author: &str,
    ) -> Result<Annotation> {
        let outcome: Result<Annotation> = async {
            let repo = Repository::new(db);
            let current = require_annotation(&repo, annotation_id).await?;

            let mut active: AnnotationActiveModel = current.into();
            active.reviewed = Set(reviewed);
            active.updated_by = Set(Some(author.to_string()));
            active.updated_at = Set(chrono::Utc::now().into());
            repo.update_annotation(active).await
        }
        .await;
        finish("review", outcome)
    }

    // ========================================================================
    // Link operations
    // ========================================================================

    /// Attach an annotation to the end of an entry's list
    #[instrument(skip(self, db))]
    pub async fn link(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        entry_id: &str,
    ) -> Result<LinkChange> {
        finish("link", self.link_in(db, annotation_id, entry_id).await)
    }

    async fn link_in(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        entry_id: &str,
    ) -> Result<LinkChange> {
        let txn = db.begin().await?;
        let repo = Repository::new(&txn);
        let annotation = require_annotation(&repo, annotation_id).await?;
        require_entry(&repo, entry_id).await?;

        if repo.find_link(entry_id, annotation_id).await?.is_some() {
            return Err(AppError::Duplicate {
                message: format!("{} is already linked to {}", annotation_id, entry_id),
            });
        }

        let order_in = repo.max_annotation_order(entry_id).await?.unwrap_or(0) + 1;
        repo.insert_link(entry_id, annotation_id, order_in).await?;

        let mutations = self
            .reconciler
            .reconcile(
                &txn,
                entry_id,
                &BTreeSet::new(),
                &extract_citations(&annotation.text),
                &[],
            )
            .await?;

        let ordering = ordering(&repo, entry_id).await?;
        txn.commit().await?;

        info!(annotation_id, entry_id, order_in, "Annotation linked");

        Ok(LinkChange {
            entry_id: entry_id.to_string(),
            annotation_id: annotation_id.to_string(),
            ordering,
            mutations,
        })
    }

    /// Detach an annotation from an entry; an entry keeps at least one annotation
    #[instrument(skip(self, db))]
    pub async fn unlink(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        entry_id: &str,
    ) -> Result<LinkChange> {
        finish("unlink", self.unlink_in(db, annotation_id, entry_id).await)
    }

    async fn unlink_in(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        entry_id: &str,
    ) -> Result<LinkChange> {
        let txn = db.begin().await?;
        let repo = Repository::new(&txn);

        if repo.find_link(entry_id, annotation_id).await?.is_none() {
            return Err(not_found("link", &format!("{}/{}", entry_id, annotation_id)));
        }
        if repo.count_entry_links(entry_id).await? <= 1 {
            return Err(last_annotation(entry_id));
        }

        let annotation = require_annotation(&repo, annotation_id).await?;
        repo.delete_link(entry_id, annotation_id).await?;

        let siblings = repo.sibling_texts(entry_id, annotation_id).await?;
        let mutations = self
            .reconciler
            .reconcile(
                &txn,
                entry_id,
                &extract_citations(&annotation.text),
                &BTreeSet::new(),
                &siblings,
            )
            .await?;

        let ordering = ordering(&repo, entry_id).await?;
        txn.commit().await?;

        info!(annotation_id, entry_id, "Annotation unlinked");

        Ok(LinkChange {
            entry_id: entry_id.to_string(),
            annotation_id: annotation_id.to_string(),
            ordering,
            mutations,
        })
    }

    /// Move an annotation `delta` places within an entry's list.
    ///
    /// The move is clamped to the list bounds. Positions are renumbered
    /// densely, starting at 0 when the old positions all lie at or above the
    /// list length and after the old maximum otherwise, so no renumbered
    /// position collides with one still in use.
    #[instrument(skip(self, db))]
    pub async fn reorder(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        entry_id: &str,
        delta: i32,
    ) -> Result<Vec<LinkPosition>> {
        finish("reorder", self.reorder_in(db, annotation_id, entry_id, delta).await)
    }

    async fn reorder_in(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
        entry_id: &str,
        delta: i32,
    ) -> Result<Vec<LinkPosition>> {
        let txn = db.begin().await?;
        let repo = Repository::new(&txn);

        let links = repo.entry_links(entry_id).await?;
        let current = links
            .iter()
            .position(|l| l.annotation_id == annotation_id)
            .ok_or_else(|| not_found("link", &format!("{}/{}", entry_id, annotation_id)))?;

        let count = links.len();
        let target = (current as i64 + i64::from(delta)).clamp(0, count as i64 - 1) as usize;
        if target == current {
            return Ok(positions(&links));
        }

        let prev_min = links.first().map_or(0, |l| l.order_in);
        let prev_max = links.last().map_or(0, |l| l.order_in);
        let start = if prev_max > prev_min && prev_min >= count as i32 {
            0
        } else {
            prev_max + 1
        };

        let mut ids: Vec<String> = links.into_iter().map(|l| l.annotation_id).collect();
        let moved = ids.remove(current);
        ids.insert(target, moved);

        for (offset, id) in ids.iter().enumerate() {
            repo.set_link_order(entry_id, id, start + offset as i32).await?;
        }

        let ordering = ordering(&repo, entry_id).await?;
        txn.commit().await?;

        info!(annotation_id, entry_id, delta, from = current, to = target, "Annotation moved");
        Ok(ordering)
    }

    /// Delete an annotation and all its links
    #[instrument(skip(self, db))]
    pub async fn delete_annotation(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
    ) -> Result<Vec<CitationMutation>> {
        finish("delete", self.delete_in(db, annotation_id).await)
    }

    async fn delete_in(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
    ) -> Result<Vec<CitationMutation>> {
        let txn = db.begin().await?;
        let repo = Repository::new(&txn);
        let annotation = require_annotation(&repo, annotation_id).await?;
        let links = repo.annotation_links(annotation_id).await?;

        for link in &links {
            if repo.count_entry_links(&link.entry_id).await? <= 1 {
                return Err(last_annotation(&link.entry_id));
            }
        }

        let before = extract_citations(&annotation.text);
        let mut mutations = Vec::new();
        for link in &links {
            repo.delete_link(&link.entry_id, annotation_id).await?;
            let siblings = repo.sibling_texts(&link.entry_id, annotation_id).await?;
            mutations.extend(
                self.reconciler
                    .reconcile(&txn, &link.entry_id, &before, &BTreeSet::new(), &siblings)
                    .await?,
            );
        }

        repo.delete_annotation(annotation_id).await?;
        txn.commit().await?;

        info!(
            annotation_id,
            entries = links.len(),
            mutations = mutations.len(),
            "Annotation deleted"
        );
        Ok(mutations)
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Annotations of an entry in display order
    pub async fn entry_annotations(
        &self,
        db: &DatabaseConnection,
        entry_id: &str,
    ) -> Result<Vec<Annotation>> {
        let repo = Repository::new(db);
        require_entry(&repo, entry_id).await?;
        repo.entry_annotations(entry_id).await
    }

    /// Entries an annotation is linked to
    pub async fn annotation_entries(
        &self,
        db: &DatabaseConnection,
        annotation_id: &str,
    ) -> Result<Vec<String>> {
        let repo = Repository::new(db);
        require_annotation(&repo, annotation_id).await?;
        Ok(repo
            .annotation_links(annotation_id)
            .await?
            .into_iter()
            .map(|l| l.entry_id)
            .collect())
    }

    pub async fn entry_citations(
        &self,
        db: &DatabaseConnection,
        entry_id: &str,
    ) -> Result<EntryCitations> {
        let repo = Repository::new(db);
        require_entry(&repo, entry_id).await?;

        Ok(EntryCitations {
            primary: repo
                .primary_citations(entry_id)
                .await?
                .into_iter()
                .map(|c| c.citation_id)
                .collect(),
            supplementary: repo
                .supplementary_citations(entry_id)
                .await?
                .into_iter()
                .map(|c| c.citation_id)
                .collect(),
        })
    }

    /// Compare an entry's citation links with what its annotations cite
    pub async fn audit_entry<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry_id: &str,
    ) -> Result<CitationAudit> {
        let repo = Repository::new(conn);
        require_entry(&repo, entry_id).await?;

        let expected: BTreeSet<String> = repo
            .entry_annotations(entry_id)
            .await?
            .iter()
            .flat_map(|a| extract_citations(&a.text))
            .collect();
        let primary: BTreeSet<String> = repo
            .primary_citations(entry_id)
            .await?
            .into_iter()
            .map(|c| c.citation_id)
            .collect();
        let supplementary: BTreeSet<String> = repo
            .supplementary_citations(entry_id)
            .await?
            .into_iter()
            .map(|c| c.citation_id)
            .collect();

        Ok(CitationAudit {
            entry_id: entry_id.to_string(),
            missing: expected.difference(&primary).cloned().collect(),
            unexpected: primary.difference(&expected).cloned().collect(),
            overlapping: primary.intersection(&supplementary).cloned().collect(),
            expected,
            primary,
        })
    }
}

/// Validate a draft, returning the text to resolve
fn check_draft(draft: &AnnotationDraft) -> Result<&str> {
    draft.validate()?;

    let text = draft.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation {
            message: "Annotation text must not be blank".to_string(),
            field: Some("text".to_string()),
        });
    }

    markup::validate(text)?;
    Ok(text)
}

fn finish<T>(operation: &str, outcome: Result<T>) -> Result<T> {
    curation_common::metrics::record_operation(operation, outcome.is_ok());
    if let Err(e) = &outcome {
        e.log(operation);
    }
    outcome
}

fn not_found(resource_type: &str, id: &str) -> AppError {
    AppError::NotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
    }
}

fn last_annotation(entry_id: &str) -> AppError {
    AppError::InvariantViolation {
        message: format!("{} would be left without annotations", entry_id),
    }
}

async fn require_annotation<C: ConnectionTrait>(
    repo: &Repository<'_, C>,
    id: &str,
) -> Result<Annotation> {
    repo.find_annotation(id)
        .await?
        .ok_or_else(|| not_found("annotation", id))
}

async fn require_entry<C: ConnectionTrait>(repo: &Repository<'_, C>, id: &str) -> Result<()> {
    repo.find_entry(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| not_found("entry", id))
}

async fn ordering<C: ConnectionTrait>(
    repo: &Repository<'_, C>,
    entry_id: &str,
) -> Result<Vec<LinkPosition>> {
    Ok(positions(&repo.entry_links(entry_id).await?))
}

fn positions(links: &[curation_common::db::models::EntryAnnotation]) -> Vec<LinkPosition> {
    links
        .iter()
        .map(|l| LinkPosition {
            annotation_id: l.annotation_id.clone(),
            order_in: l.order_in,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        draft, primary_ids, resolver, seed_citation, seed_entries, store, supplementary_ids,
    };
    use curation_common::literature::{LiteratureRecord, MockLiteratureSource};
    use curation_common::DbPool;

    const E1: &str = "IPR000001";
    const E2: &str = "IPR000002";

    async fn setup_with(source: MockLiteratureSource) -> (DbPool, AnnotationLinkManager) {
        let pool = store().await;
        seed_entries(pool.connection(), &[E1, E2]).await;
        seed_citation(pool.connection(), "PUB9", 9, Some(12345)).await;

        let manager =
            AnnotationLinkManager::new(resolver(Arc::new(source)), ReferenceReconciler::new());
        (pool, manager)
    }

    async fn setup() -> (DbPool, AnnotationLinkManager) {
        let source =
            MockLiteratureSource::new().with_record(LiteratureRecord::new(555, "Imported"));
        setup_with(source).await
    }

    async fn create(
        manager: &AnnotationLinkManager,
        db: &DatabaseConnection,
        text: &str,
    ) -> String {
        manager
            .create_annotation(db, draft(text))
            .await
            .unwrap()
            .annotation
            .id
    }

    fn order_of(ordering: &[LinkPosition]) -> Vec<(String, i32)> {
        ordering
            .iter()
            .map(|p| (p.annotation_id.clone(), p.order_in))
            .collect()
    }

    #[tokio::test]
    async fn test_create_normalizes_citations() {
        let (pool, manager) = setup().await;

        let change = manager
            .create_annotation(pool.connection(), draft("  <p>See [cite:12345]</p> "))
            .await
            .unwrap();

        assert_eq!(change.annotation.id, "AB00001");
        assert_eq!(change.annotation.text, "<p>See [cite:PUB9]</p>");
        assert_eq!(change.citations, BTreeSet::from(["PUB9".to_string()]));
        assert!(change.annotation.reviewed);
        assert!(change.mutations.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_markup_writes_nothing() {
        let (pool, manager) = setup().await;
        let db = pool.connection();

        let err = manager
            .create_annotation(db, draft("<p>Domain<ul><li>x</li></ul>"))
            .await
            .unwrap_err();

        match err {
            AppError::Markup { tag, .. } => assert_eq!(tag.as_deref(), Some("p")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(Repository::new(db).find_annotation("AB00001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_text_and_long_comment_are_rejected() {
        let (pool, manager) = setup().await;

        let blank = manager.create_annotation(pool.connection(), draft("   ")).await;
        assert!(matches!(blank, Err(AppError::Validation { .. })));

        let mut long = draft("<p>ok</p>");
        long.comment = Some("x".repeat(1001));
        let err = manager.create_annotation(pool.connection(), long).await.unwrap_err();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("comment")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_resolution_rolls_back_imports() {
        let (pool, manager) = setup().await;
        let db = pool.connection();

        let err = manager
            .create_annotation(db, draft("<p>[cite:555] and [cite:999]</p>"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnresolvedCitations { ids } if ids == vec!["999"]));
        let imported = Repository::new(db)
            .find_citations_by_pubmed_ids(&[555])
            .await
            .unwrap();
        assert!(imported.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_text_is_rejected() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        create(&manager, db, "<p>Same [cite:PUB9]</p>").await;

        // Normalizes to the stored text
        let err = manager
            .create_annotation(db, draft("<p>Same [cite:12345]</p>"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));

        let other = create(&manager, db, "<p>Different</p>").await;
        let err = manager
            .update_annotation(db, &other, draft("<p>Same [cite:PUB9]</p>"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_machine_annotation_awaits_review() {
        let (pool, manager) = setup().await;
        let db = pool.connection();

        let mut machine = draft("<p>Predicted kinase</p>");
        machine.origin = AnnotationOrigin::Machine;
        let created = manager.create_annotation(db, machine).await.unwrap().annotation;
        assert!(created.awaiting_review());

        let reviewed = manager
            .set_reviewed(db, &created.id, true, "curator2")
            .await
            .unwrap();
        assert!(!reviewed.awaiting_review());
        assert_eq!(reviewed.updated_by.as_deref(), Some("curator2"));
    }

    #[test]
    fn test_draft_origin_defaults_to_human() {
        let draft: AnnotationDraft =
            serde_json::from_value(serde_json::json!({ "text": "<p>Kinase</p>" })).unwrap();
        assert_eq!(draft.origin, AnnotationOrigin::Human);
        assert!(draft.is_reviewed());
    }

    #[tokio::test]
    async fn test_links_append_and_promote_citations() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>A [cite:PUB9]</p>").await;
        let b = create(&manager, db, "<p>B [cite:555]</p>").await;

        let first = manager.link(db, &a, E1).await.unwrap();
        assert_eq!(order_of(&first.ordering), vec![(a.clone(), 1)]);
        assert_eq!(first.mutations.len(), 1);

        let second = manager.link(db, &b, E1).await.unwrap();
        assert_eq!(order_of(&second.ordering), vec![(a.clone(), 1), (b.clone(), 2)]);

        assert_eq!(primary_ids(db, E1).await, vec!["PUB9", "PUB00000010"]);

        let again = manager.link(db, &a, E1).await.unwrap_err();
        assert!(matches!(again, AppError::Duplicate { .. }));

        let missing = manager.link(db, "AB99999", E1).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound { .. }));
        let missing = manager.link(db, &a, "IPR999999").await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sibling_citation_stays_primary() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>[cite:PUB9] binds, see [cite:PUB9]</p>").await;
        let b = create(&manager, db, "<p>Also [cite:PUB9]</p>").await;
        manager.link(db, &a, E1).await.unwrap();
        manager.link(db, &b, E1).await.unwrap();

        let change = manager
            .update_annotation(db, &a, draft("<p>No citations here</p>"))
            .await
            .unwrap();

        assert!(change.mutations.is_empty());
        assert_eq!(primary_ids(db, E1).await, vec!["PUB9"]);
        assert!(supplementary_ids(db, E1).await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_demotes_and_promotes() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>[cite:PUB9]</p>").await;
        manager.link(db, &a, E1).await.unwrap();

        manager
            .update_annotation(db, &a, draft("<p>Nothing cited</p>"))
            .await
            .unwrap();
        assert!(primary_ids(db, E1).await.is_empty());
        assert_eq!(
            supplementary_ids(db, E1).await,
            BTreeSet::from(["PUB9".to_string()])
        );

        manager
            .update_annotation(db, &a, draft("<p>Cited again [cite:12345]</p>"))
            .await
            .unwrap();
        assert_eq!(primary_ids(db, E1).await, vec!["PUB9"]);
        assert!(supplementary_ids(db, E1).await.is_empty());
    }

    #[tokio::test]
    async fn test_last_annotation_cannot_be_unlinked() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>Only [cite:PUB9]</p>").await;
        manager.link(db, &a, E1).await.unwrap();

        let err = manager.unlink(db, &a, E1).await.unwrap_err();

        assert!(matches!(err, AppError::InvariantViolation { .. }));
        assert_eq!(manager.annotation_entries(db, &a).await.unwrap(), vec![E1]);
        assert_eq!(primary_ids(db, E1).await, vec!["PUB9"]);
        assert!(supplementary_ids(db, E1).await.is_empty());
    }

    #[tokio::test]
    async fn test_unlink_demotes_unshared_citations() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>A [cite:PUB9]</p>").await;
        let b = create(&manager, db, "<p>B</p>").await;
        manager.link(db, &a, E1).await.unwrap();
        manager.link(db, &b, E1).await.unwrap();

        let change = manager.unlink(db, &a, E1).await.unwrap();

        assert_eq!(order_of(&change.ordering), vec![(b.clone(), 2)]);
        assert_eq!(change.mutations.len(), 2);
        assert!(primary_ids(db, E1).await.is_empty());
        assert_eq!(
            supplementary_ids(db, E1).await,
            BTreeSet::from(["PUB9".to_string()])
        );

        let gone = manager.unlink(db, &a, E1).await.unwrap_err();
        assert!(matches!(gone, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_protects_sole_annotations() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>A</p>").await;
        let b = create(&manager, db, "<p>B</p>").await;
        manager.link(db, &a, E1).await.unwrap();
        manager.link(db, &b, E1).await.unwrap();
        manager.link(db, &a, E2).await.unwrap();

        let err = manager.delete_annotation(db, &a).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation { .. }));
        assert_eq!(
            manager.annotation_entries(db, &a).await.unwrap(),
            vec![E1, E2]
        );
    }

    #[tokio::test]
    async fn test_delete_shared_annotation() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>A [cite:PUB9]</p>").await;
        let b = create(&manager, db, "<p>B</p>").await;
        let c = create(&manager, db, "<p>C [cite:PUB9]</p>").await;
        manager.link(db, &a, E1).await.unwrap();
        manager.link(db, &b, E1).await.unwrap();
        manager.link(db, &a, E2).await.unwrap();
        manager.link(db, &c, E2).await.unwrap();

        let mutations = manager.delete_annotation(db, &a).await.unwrap();

        // E1 loses its only citing annotation, E2 keeps one
        assert_eq!(mutations.len(), 2);
        assert!(primary_ids(db, E1).await.is_empty());
        assert_eq!(primary_ids(db, E2).await, vec!["PUB9"]);
        assert!(Repository::new(db).find_annotation(&a).await.unwrap().is_none());
        let remaining: Vec<String> = manager
            .entry_annotations(db, E1)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(remaining, vec![b]);
    }

    #[tokio::test]
    async fn test_reorder_renumbers_without_collisions() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>A</p>").await;
        let b = create(&manager, db, "<p>B</p>").await;
        let c = create(&manager, db, "<p>C</p>").await;
        for id in [&a, &b, &c] {
            manager.link(db, id, E1).await.unwrap();
        }

        let moved = manager.reorder(db, &c, E1, -2).await.unwrap();
        assert_eq!(
            order_of(&moved),
            vec![(c.clone(), 4), (a.clone(), 5), (b.clone(), 6)]
        );

        let clamped = manager.reorder(db, &a, E1, 5).await.unwrap();
        assert_eq!(
            order_of(&clamped),
            vec![(c.clone(), 0), (b.clone(), 1), (a.clone(), 2)]
        );

        let unchanged = manager.reorder(db, &c, E1, -1).await.unwrap();
        assert_eq!(order_of(&unchanged), order_of(&clamped));

        let missing = manager.reorder(db, &a, E2, 1).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_literature_outage_leaves_text_unchanged() {
        let (pool, manager) = setup_with(MockLiteratureSource::unavailable()).await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>Plain</p>").await;
        manager.link(db, &a, E1).await.unwrap();

        let err = manager
            .update_annotation(db, &a, draft("<p>Now [cite:777]</p>"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::LiteratureService { .. }));
        let stored = Repository::new(db).find_annotation(&a).await.unwrap().unwrap();
        assert_eq!(stored.text, "<p>Plain</p>");
    }

    #[tokio::test]
    async fn test_reconcile_failure_rolls_back_text_update() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>[cite:PUB9]</p>").await;
        manager.link(db, &a, E1).await.unwrap();

        db.execute_unprepared(
            "CREATE TRIGGER reject_supplementary BEFORE INSERT ON supplementary_citations \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .await
        .unwrap();

        let err = manager
            .update_annotation(db, &a, draft("<p>No citations</p>"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        let stored = Repository::new(db).find_annotation(&a).await.unwrap().unwrap();
        assert_eq!(stored.text, "<p>[cite:PUB9]</p>");
        assert_eq!(primary_ids(db, E1).await, vec!["PUB9"]);
        assert!(supplementary_ids(db, E1).await.is_empty());
    }

    #[tokio::test]
    async fn test_citations_stay_conserved_across_operations() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        let a = create(&manager, db, "<p>A [cite:PUB9]</p>").await;
        let b = create(&manager, db, "<p>B [cite:555]</p>").await;
        let c = create(&manager, db, "<p>C</p>").await;

        manager.link(db, &a, E1).await.unwrap();
        manager.link(db, &b, E1).await.unwrap();
        manager.link(db, &b, E2).await.unwrap();
        manager.link(db, &c, E2).await.unwrap();
        manager
            .update_annotation(db, &b, draft("<p>B [cite:PUB9]</p>"))
            .await
            .unwrap();
        manager.unlink(db, &a, E1).await.unwrap();
        manager
            .update_annotation(db, &c, draft("<p>C [cite:PUB00000010]</p>"))
            .await
            .unwrap();
        manager.reorder(db, &c, E2, -1).await.unwrap();
        manager.delete_annotation(db, &a).await.unwrap();

        for entry in [E1, E2] {
            let audit = manager.audit_entry(db, entry).await.unwrap();
            assert!(audit.is_consistent(), "{:?}", audit);
        }

        let citations = manager.entry_citations(db, E2).await.unwrap();
        assert_eq!(citations.primary, vec!["PUB9", "PUB00000010"]);
        assert!(citations.supplementary.is_empty());
        let citations = manager.entry_citations(db, E1).await.unwrap();
        assert_eq!(citations.primary, vec!["PUB9"]);
        assert_eq!(citations.supplementary, vec!["PUB00000010"]);
    }

    #[tokio::test]
    async fn test_audit_reports_drift() {
        let (pool, manager) = setup().await;
        let db = pool.connection();
        seed_citation(db, "PUB1", 1, None).await;
        let a = create(&manager, db, "<p>A [cite:PUB9]</p>").await;
        manager.link(db, &a, E1).await.unwrap();

        let repo = Repository::new(db);
        repo.delete_primary_citation(E1, "PUB9").await.unwrap();
        repo.insert_primary_citation(E1, "PUB1", 7).await.unwrap();
        repo.insert_supplementary_citation(E1, "PUB1").await.unwrap();

        let audit = manager.audit_entry(db, E1).await.unwrap();
        assert!(!audit.is_consistent());
        assert_eq!(audit.missing, vec!["PUB9"]);
        assert_eq!(audit.unexpected, vec!["PUB1"]);
        assert_eq!(audit.overlapping, vec!["PUB1"]);
    }
}
