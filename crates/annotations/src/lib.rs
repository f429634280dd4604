//! Shared annotation curation
//!
//! Annotations are curator-written texts attached to one or more entries.
//! This crate validates their markup, resolves the references they carry and
//! keeps each entry's citation lists in step with the texts linked to it.

pub mod manager;
pub mod markup;
pub mod reconcile;
pub mod references;

#[cfg(test)]
mod test_support;

pub use manager::{
    AnnotationChange, AnnotationDraft, AnnotationLinkManager, CitationAudit, EntryCitations,
    LinkChange, LinkPosition,
};
pub use markup::MarkupError;
pub use reconcile::{CitationMutation, ReferenceReconciler};
pub use references::{CrossReferenceRegistry, ReferenceResolver, ResolvedText};
