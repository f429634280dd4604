//! SeaORM entity models
//!
//! Database entities for annotation curation

mod annotation;
mod citation;
mod entry;
mod entry_annotation;
mod entry_citation;
mod supplementary_citation;

pub use entry::{
    Entity as EntryEntity,
    Model as Entry,
    ActiveModel as EntryActiveModel,
    Column as EntryColumn,
};

pub use annotation::{
    Entity as AnnotationEntity,
    Model as Annotation,
    ActiveModel as AnnotationActiveModel,
    Column as AnnotationColumn,
    AnnotationOrigin,
};

pub use entry_annotation::{
    Entity as EntryAnnotationEntity,
    Model as EntryAnnotation,
    ActiveModel as EntryAnnotationActiveModel,
    Column as EntryAnnotationColumn,
};

pub use citation::{
    Entity as CitationEntity,
    Model as Citation,
    ActiveModel as CitationActiveModel,
    Column as CitationColumn,
};

pub use entry_citation::{
    Entity as EntryCitationEntity,
    Model as EntryCitation,
    ActiveModel as EntryCitationActiveModel,
    Column as EntryCitationColumn,
};

pub use supplementary_citation::{
    Entity as SupplementaryCitationEntity,
    Model as SupplementaryCitation,
    ActiveModel as SupplementaryCitationActiveModel,
    Column as SupplementaryCitationColumn,
};
