//! Schema provisioning from the entity definitions

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, EntityTrait, Schema};
use tracing::info;

/// Create every table and index used by the annotation workflow.
///
/// Statements use `IF NOT EXISTS`, so running this against an already
/// provisioned database is harmless.
pub async fn create_schema<C: ConnectionTrait>(conn: &C) -> Result<()> {
    // Referenced tables first
    create_table(conn, EntryEntity).await?;
    create_table(conn, AnnotationEntity).await?;
    create_table(conn, CitationEntity).await?;
    create_table(conn, EntryAnnotationEntity).await?;
    create_table(conn, EntryCitationEntity).await?;
    create_table(conn, SupplementaryCitationEntity).await?;

    for index in order_indexes() {
        let backend = conn.get_database_backend();
        conn.execute(backend.build(&index)).await?;
    }

    info!("Schema provisioned");
    Ok(())
}

async fn create_table<C, E>(conn: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);
    let stmt = schema.create_table_from_entity(entity).if_not_exists().to_owned();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Positions are unique within an entry for both ordered link tables
fn order_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("uq_entry_annotations_order")
            .table(EntryAnnotationEntity)
            .col(EntryAnnotationColumn::EntryId)
            .col(EntryAnnotationColumn::OrderIn)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("uq_entry_citations_order")
            .table(EntryCitationEntity)
            .col(EntryCitationColumn::EntryId)
            .col(EntryCitationColumn::OrderIn)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}
