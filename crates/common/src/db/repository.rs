//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations. The repository
//! borrows whatever connection it is given, so callers decide whether the
//! work runs inside a transaction.

use crate::db::models::*;
use crate::errors::Result;
use crate::literature::LiteratureRecord;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;

/// Fields of an annotation about to be created
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub text: String,
    pub comment: Option<String>,
    pub origin: AnnotationOrigin,
    pub reviewed: bool,
    pub author: Option<String>,
}

/// Repository for data access operations
pub struct Repository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> Repository<'c, C> {
    /// Create a repository over a connection or an open transaction
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Find entry by ID
    pub async fn find_entry(&self, id: &str) -> Result<Option<Entry>> {
        EntryEntity::find_by_id(id.to_string())
            .one(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Register an entry
    pub async fn insert_entry(
        &self,
        id: &str,
        name: &str,
        entry_type: &str,
        checked: bool,
    ) -> Result<Entry> {
        let entry = EntryActiveModel {
            id: Set(id.to_string()),
            name: Set(name.to_string()),
            entry_type: Set(entry_type.to_string()),
            checked: Set(checked),
        };

        entry.insert(self.conn).await.map_err(Into::into)
    }

    /// All entry identifiers, sorted
    pub async fn list_entry_ids(&self) -> Result<Vec<String>> {
        EntryEntity::find()
            .select_only()
            .column(EntryColumn::Id)
            .order_by_asc(EntryColumn::Id)
            .into_tuple::<String>()
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Annotation Operations
    // ========================================================================

    /// Find annotation by ID
    pub async fn find_annotation(&self, id: &str) -> Result<Option<Annotation>> {
        AnnotationEntity::find_by_id(id.to_string())
            .one(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Find an annotation whose stored text is exactly `text`
    pub async fn find_annotation_by_text(&self, text: &str) -> Result<Option<Annotation>> {
        AnnotationEntity::find()
            .filter(AnnotationColumn::Text.eq(text))
            .one(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Find annotations by IDs
    pub async fn find_annotations(&self, ids: &[String]) -> Result<Vec<Annotation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        AnnotationEntity::find()
            .filter(AnnotationColumn::Id.is_in(ids.iter().cloned()))
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Create a new annotation with the next free identifier
    pub async fn insert_annotation(&self, new: NewAnnotation) -> Result<Annotation> {
        let serial = self.max_annotation_serial().await?.unwrap_or(0) + 1;
        let now = chrono::Utc::now();

        let annotation = AnnotationActiveModel {
            id: Set(format!("AB{:05}", serial)),
            serial: Set(serial),
            text: Set(new.text),
            comment: Set(new.comment),
            origin: Set(String::from(new.origin)),
            reviewed: Set(new.reviewed),
            created_by: Set(new.author.clone()),
            updated_by: Set(new.author),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        annotation.insert(self.conn).await.map_err(Into::into)
    }

    /// Persist changed annotation columns
    pub async fn update_annotation(&self, annotation: AnnotationActiveModel) -> Result<Annotation> {
        annotation.update(self.conn).await.map_err(Into::into)
    }

    /// Delete annotation by ID
    pub async fn delete_annotation(&self, id: &str) -> Result<bool> {
        let result = AnnotationEntity::delete_by_id(id.to_string())
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn max_annotation_serial(&self) -> Result<Option<i64>> {
        let max = AnnotationEntity::find()
            .select_only()
            .column_as(AnnotationColumn::Serial.max(), "max_serial")
            .into_tuple::<Option<i64>>()
            .one(self.conn)
            .await?;

        Ok(max.flatten())
    }

    // ========================================================================
    // Entry/Annotation Link Operations
    // ========================================================================

    /// Links of an entry in display order
    pub async fn entry_links(&self, entry_id: &str) -> Result<Vec<EntryAnnotation>> {
        EntryAnnotationEntity::find()
            .filter(EntryAnnotationColumn::EntryId.eq(entry_id))
            .order_by_asc(EntryAnnotationColumn::OrderIn)
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Links of an annotation, one per entry, sorted by entry
    pub async fn annotation_links(&self, annotation_id: &str) -> Result<Vec<EntryAnnotation>> {
        EntryAnnotationEntity::find()
            .filter(EntryAnnotationColumn::AnnotationId.eq(annotation_id))
            .order_by_asc(EntryAnnotationColumn::EntryId)
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Find a single link
    pub async fn find_link(
        &self,
        entry_id: &str,
        annotation_id: &str,
    ) -> Result<Option<EntryAnnotation>> {
        EntryAnnotationEntity::find_by_id((entry_id.to_string(), annotation_id.to_string()))
            .one(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Number of annotations linked to an entry
    pub async fn count_entry_links(&self, entry_id: &str) -> Result<u64> {
        EntryAnnotationEntity::find()
            .filter(EntryAnnotationColumn::EntryId.eq(entry_id))
            .count(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Highest annotation position of an entry
    pub async fn max_annotation_order(&self, entry_id: &str) -> Result<Option<i32>> {
        let max = EntryAnnotationEntity::find()
            .select_only()
            .column_as(EntryAnnotationColumn::OrderIn.max(), "max_order")
            .filter(EntryAnnotationColumn::EntryId.eq(entry_id))
            .into_tuple::<Option<i32>>()
            .one(self.conn)
            .await?;

        Ok(max.flatten())
    }

    /// Link an annotation to an entry at a position
    pub async fn insert_link(
        &self,
        entry_id: &str,
        annotation_id: &str,
        order_in: i32,
    ) -> Result<()> {
        let link = EntryAnnotationActiveModel {
            entry_id: Set(entry_id.to_string()),
            annotation_id: Set(annotation_id.to_string()),
            order_in: Set(order_in),
        };

        EntryAnnotationEntity::insert(link)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    /// Remove a link
    pub async fn delete_link(&self, entry_id: &str, annotation_id: &str) -> Result<bool> {
        let result = EntryAnnotationEntity::delete_many()
            .filter(EntryAnnotationColumn::EntryId.eq(entry_id))
            .filter(EntryAnnotationColumn::AnnotationId.eq(annotation_id))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Move a link to a new position
    pub async fn set_link_order(
        &self,
        entry_id: &str,
        annotation_id: &str,
        order_in: i32,
    ) -> Result<()> {
        EntryAnnotationEntity::update_many()
            .col_expr(EntryAnnotationColumn::OrderIn, Expr::value(order_in))
            .filter(EntryAnnotationColumn::EntryId.eq(entry_id))
            .filter(EntryAnnotationColumn::AnnotationId.eq(annotation_id))
            .exec(self.conn)
            .await?;
        Ok(())
    }

    /// Annotations of an entry in display order
    pub async fn entry_annotations(&self, entry_id: &str) -> Result<Vec<Annotation>> {
        let links = self.entry_links(entry_id).await?;
        let ids: Vec<String> = links.iter().map(|l| l.annotation_id.clone()).collect();

        let mut by_id: HashMap<String, Annotation> = self
            .find_annotations(&ids)
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Texts of every annotation linked to `entry_id` except `exclude`
    pub async fn sibling_texts(&self, entry_id: &str, exclude: &str) -> Result<Vec<String>> {
        Ok(self
            .entry_annotations(entry_id)
            .await?
            .into_iter()
            .filter(|a| a.id != exclude)
            .map(|a| a.text)
            .collect())
    }

    // ========================================================================
    // Citation Operations
    // ========================================================================

    /// Find citations by canonical IDs
    pub async fn find_citations(&self, ids: &[String]) -> Result<Vec<Citation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        CitationEntity::find()
            .filter(CitationColumn::Id.is_in(ids.iter().cloned()))
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Find citations by PubMed IDs
    pub async fn find_citations_by_pubmed_ids(&self, pubmed_ids: &[i64]) -> Result<Vec<Citation>> {
        if pubmed_ids.is_empty() {
            return Ok(Vec::new());
        }

        CitationEntity::find()
            .filter(CitationColumn::PubmedId.is_in(pubmed_ids.iter().copied()))
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Store a bibliographic record under the next canonical identifier
    pub async fn insert_citation(&self, record: LiteratureRecord) -> Result<Citation> {
        let serial = self.max_citation_serial().await?.unwrap_or(0) + 1;
        let now = chrono::Utc::now();

        let citation = CitationActiveModel {
            id: Set(format!("PUB{:08}", serial)),
            serial: Set(serial),
            pubmed_id: Set(Some(record.pubmed_id)),
            title: Set(record.title),
            authors: Set(record.authors),
            journal: Set(record.journal),
            year: Set(record.year),
            volume: Set(record.volume),
            issue: Set(record.issue),
            pages: Set(record.pages),
            doi: Set(record.doi),
            url: Set(record.url),
            created_at: Set(now.into()),
        };

        citation.insert(self.conn).await.map_err(Into::into)
    }

    async fn max_citation_serial(&self) -> Result<Option<i64>> {
        let max = CitationEntity::find()
            .select_only()
            .column_as(CitationColumn::Serial.max(), "max_serial")
            .into_tuple::<Option<i64>>()
            .one(self.conn)
            .await?;

        Ok(max.flatten())
    }

    // ========================================================================
    // Entry Citation Operations
    // ========================================================================

    /// Primary citations of an entry in order
    pub async fn primary_citations(&self, entry_id: &str) -> Result<Vec<EntryCitation>> {
        EntryCitationEntity::find()
            .filter(EntryCitationColumn::EntryId.eq(entry_id))
            .order_by_asc(EntryCitationColumn::OrderIn)
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    /// Supplementary citations of an entry
    pub async fn supplementary_citations(
        &self,
        entry_id: &str,
    ) -> Result<Vec<SupplementaryCitation>> {
        SupplementaryCitationEntity::find()
            .filter(SupplementaryCitationColumn::EntryId.eq(entry_id))
            .order_by_asc(SupplementaryCitationColumn::CitationId)
            .all(self.conn)
            .await
            .map_err(Into::into)
    }

    pub async fn insert_primary_citation(
        &self,
        entry_id: &str,
        citation_id: &str,
        order_in: i32,
    ) -> Result<()> {
        let link = EntryCitationActiveModel {
            entry_id: Set(entry_id.to_string()),
            citation_id: Set(citation_id.to_string()),
            order_in: Set(order_in),
        };

        EntryCitationEntity::insert(link)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    pub async fn delete_primary_citation(&self, entry_id: &str, citation_id: &str) -> Result<bool> {
        let result = EntryCitationEntity::delete_many()
            .filter(EntryCitationColumn::EntryId.eq(entry_id))
            .filter(EntryCitationColumn::CitationId.eq(citation_id))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn insert_supplementary_citation(
        &self,
        entry_id: &str,
        citation_id: &str,
    ) -> Result<()> {
        let link = SupplementaryCitationActiveModel {
            entry_id: Set(entry_id.to_string()),
            citation_id: Set(citation_id.to_string()),
        };

        SupplementaryCitationEntity::insert(link)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    pub async fn delete_supplementary_citation(
        &self,
        entry_id: &str,
        citation_id: &str,
    ) -> Result<bool> {
        let result = SupplementaryCitationEntity::delete_many()
            .filter(SupplementaryCitationColumn::EntryId.eq(entry_id))
            .filter(SupplementaryCitationColumn::CitationId.eq(citation_id))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
