//! Reference tag scanning
//!
//! Two bracketed forms appear in annotation text: cross-references
//! `[db:id]` and citations `[cite:ref1,ref2]`, where a ref is a canonical
//! citation id (`PUB00000042`) or a bare PubMed id.

use regex_lite::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Database name of citation tags
pub const CITATION_DB: &str = "cite";

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Za-z][A-Za-z0-9_.-]*):([^\[\]]*)\]").expect("reference pattern compiles")
});

static CANONICAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PUB[0-9]+$").expect("canonical pattern compiles"));

/// A bracketed reference and its byte span in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTag {
    pub db: String,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

impl ReferenceTag {
    pub fn is_citation(&self) -> bool {
        self.db.eq_ignore_ascii_case(CITATION_DB)
    }
}

/// One sub-reference of a citation tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CitationRef {
    Canonical(String),
    PubMed(i64),
}

impl CitationRef {
    /// Parse a single sub-reference, `None` when it is neither form
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return raw.parse().ok().map(CitationRef::PubMed);
        }
        if is_canonical_id(raw) {
            return Some(CitationRef::Canonical(raw.to_string()));
        }
        None
    }
}

/// Whether `id` has the shape of a canonical citation identifier
pub fn is_canonical_id(id: &str) -> bool {
    CANONICAL_PATTERN.is_match(id)
}

/// Every bracketed reference in `text`, in document order
pub fn scan(text: &str) -> Vec<ReferenceTag> {
    REFERENCE_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ReferenceTag {
                db: caps.get(1)?.as_str().to_string(),
                value: caps.get(2)?.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Split a citation tag value into sub-references.
///
/// Returns the offending piece when one is not a valid reference.
pub fn citation_refs(value: &str) -> Result<Vec<CitationRef>, String> {
    value
        .split(',')
        .map(|piece| CitationRef::parse(piece).ok_or_else(|| piece.trim().to_string()))
        .collect()
}

/// Canonical ids cited by an already normalized text
pub fn extract_citations(text: &str) -> BTreeSet<String> {
    scan(text)
        .into_iter()
        .filter(ReferenceTag::is_citation)
        .flat_map(|tag| citation_refs(&tag.value).unwrap_or_default())
        .filter_map(|r| match r {
            CitationRef::Canonical(id) => Some(id),
            CitationRef::PubMed(_) => None,
        })
        .collect()
}

/// Normalized tag for a single canonical id
pub fn citation_tag(id: &str) -> String {
    format!("[{}:{}]", CITATION_DB, id)
}
