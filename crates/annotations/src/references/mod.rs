//! Cross-reference and citation handling

mod registry;
mod resolver;
pub mod tags;

pub use registry::{CrossReferenceRegistry, DEFAULT_CROSS_REF_DBS};
pub use resolver::{truncate_title, ReferenceResolver, ResolvedText};
pub use tags::{extract_citations, CitationRef, ReferenceTag};
