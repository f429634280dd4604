//! Primary / supplementary citation reconciliation
//!
//! Keeps an entry's primary citations equal to the union of the citations of
//! its linked annotations. Records that stop being cited are demoted to
//! supplementary instead of being dropped, and records cited again are
//! promoted back. Planning is a pure function over the current link state;
//! applying the plan is a handful of inserts and deletes.

use crate::references::extract_citations;
use curation_common::errors::Result;
use curation_common::Repository;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// A single write to the citation link tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationMutation {
    InsertPrimary {
        entry_id: String,
        citation_id: String,
        order_in: i32,
    },
    DeletePrimary {
        entry_id: String,
        citation_id: String,
    },
    InsertSupplementary {
        entry_id: String,
        citation_id: String,
    },
    DeleteSupplementary {
        entry_id: String,
        citation_id: String,
    },
}

impl CitationMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            CitationMutation::InsertPrimary { .. } => "insert_primary",
            CitationMutation::DeletePrimary { .. } => "delete_primary",
            CitationMutation::InsertSupplementary { .. } => "insert_supplementary",
            CitationMutation::DeleteSupplementary { .. } => "delete_supplementary",
        }
    }
}

/// Citation links of one entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryCitationState {
    pub primary: BTreeSet<String>,
    pub supplementary: BTreeSet<String>,
    pub max_order: Option<i32>,
}

impl EntryCitationState {
    pub async fn load<C: ConnectionTrait>(
        repo: &Repository<'_, C>,
        entry_id: &str,
    ) -> Result<Self> {
        let primary = repo.primary_citations(entry_id).await?;
        let max_order = primary.iter().map(|c| c.order_in).max();

        Ok(Self {
            primary: primary.into_iter().map(|c| c.citation_id).collect(),
            supplementary: repo
                .supplementary_citations(entry_id)
                .await?
                .into_iter()
                .map(|c| c.citation_id)
                .collect(),
            max_order,
        })
    }
}

/// Mutations that move `entry_id` from citing `before` to citing `after`.
///
/// `sibling_texts` are the texts of the entry's other annotations; a record
/// they still cite stays primary.
pub fn plan(
    entry_id: &str,
    before: &BTreeSet<String>,
    after: &BTreeSet<String>,
    sibling_texts: &[String],
    state: &EntryCitationState,
) -> Vec<CitationMutation> {
    let mut mutations = Vec::new();

    let removed: Vec<&String> = before.difference(after).collect();
    if !removed.is_empty() {
        let still_cited: BTreeSet<String> = sibling_texts
            .iter()
            .flat_map(|text| extract_citations(text))
            .collect();

        for id in removed {
            if still_cited.contains(id) || !state.primary.contains(id) {
                continue;
            }
            mutations.push(CitationMutation::DeletePrimary {
                entry_id: entry_id.to_string(),
                citation_id: id.clone(),
            });
            if !state.supplementary.contains(id) {
                mutations.push(CitationMutation::InsertSupplementary {
                    entry_id: entry_id.to_string(),
                    citation_id: id.clone(),
                });
            }
        }
    }

    let mut next_order = state.max_order.unwrap_or(0);
    for id in after.difference(before) {
        if state.primary.contains(id) {
            continue;
        }
        next_order += 1;
        mutations.push(CitationMutation::InsertPrimary {
            entry_id: entry_id.to_string(),
            citation_id: id.clone(),
            order_in: next_order,
        });
        if state.supplementary.contains(id) {
            mutations.push(CitationMutation::DeleteSupplementary {
                entry_id: entry_id.to_string(),
                citation_id: id.clone(),
            });
        }
    }

    mutations
}

/// Applies citation plans to the store
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceReconciler;

impl ReferenceReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Reconcile the citation links of `entry_id` after one of its
    /// annotations changed from citing `before` to citing `after`
    #[instrument(skip(self, conn, before, after, sibling_texts))]
    pub async fn reconcile<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry_id: &str,
        before: &BTreeSet<String>,
        after: &BTreeSet<String>,
        sibling_texts: &[String],
    ) -> Result<Vec<CitationMutation>> {
        if before == after {
            return Ok(Vec::new());
        }

        let repo = Repository::new(conn);
        let state = EntryCitationState::load(&repo, entry_id).await?;
        let mutations = plan(entry_id, before, after, sibling_texts, &state);

        for mutation in &mutations {
            apply(&repo, mutation).await?;
            curation_common::metrics::record_citation_mutation(mutation.kind());
        }

        debug!(count = mutations.len(), "Citations reconciled");
        Ok(mutations)
    }
}

async fn apply<C: ConnectionTrait>(
    repo: &Repository<'_, C>,
    mutation: &CitationMutation,
) -> Result<()> {
    match mutation {
        CitationMutation::InsertPrimary {
            entry_id,
            citation_id,
            order_in,
        } => repo.insert_primary_citation(entry_id, citation_id, *order_in).await,
        CitationMutation::DeletePrimary {
            entry_id,
            citation_id,
        } => repo.delete_primary_citation(entry_id, citation_id).await.map(|_| ()),
        CitationMutation::InsertSupplementary {
            entry_id,
            citation_id,
        } => repo.insert_supplementary_citation(entry_id, citation_id).await,
        CitationMutation::DeleteSupplementary {
            entry_id,
            citation_id,
        } => repo
            .delete_supplementary_citation(entry_id, citation_id)
            .await
            .map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{primary_ids, seed_citation, seed_entries, store, supplementary_ids};

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn state(
        primary: &[&str],
        supplementary: &[&str],
        max_order: Option<i32>,
    ) -> EntryCitationState {
        EntryCitationState {
            primary: ids(primary),
            supplementary: ids(supplementary),
            max_order,
        }
    }

    #[test]
    fn test_unchanged_set_plans_nothing() {
        let s = ids(&["PUB1", "PUB2"]);
        assert!(plan("E1", &s, &s, &[], &state(&["PUB1", "PUB2"], &[], Some(2))).is_empty());
    }

    #[test]
    fn test_removed_citation_is_demoted() {
        let plan = plan("E1", &ids(&["PUB1"]), &ids(&[]), &[], &state(&["PUB1"], &[], Some(1)));
        assert_eq!(
            plan,
            vec![
                CitationMutation::DeletePrimary {
                    entry_id: "E1".into(),
                    citation_id: "PUB1".into()
                },
                CitationMutation::InsertSupplementary {
                    entry_id: "E1".into(),
                    citation_id: "PUB1".into()
                },
            ]
        );
    }

    #[test]
    fn test_sibling_keeps_citation_primary() {
        let siblings = vec!["Also [cite:PUB1].".to_string()];
        let current = state(&["PUB1"], &[], Some(1));
        let plan = plan("E1", &ids(&["PUB1"]), &ids(&[]), &siblings, &current);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_never_linked_citation_is_left_alone() {
        let plan = plan("E1", &ids(&["PUB1"]), &ids(&[]), &[], &state(&[], &[], None));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_existing_supplementary_is_not_duplicated() {
        let current = state(&["PUB1"], &["PUB1"], Some(1));
        let plan = plan("E1", &ids(&["PUB1"]), &ids(&[]), &[], &current);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].kind(), "delete_primary");
    }

    #[test]
    fn test_added_citations_take_consecutive_positions() {
        let current = state(&["PUB1"], &[], Some(4));
        let plan = plan("E1", &ids(&[]), &ids(&["PUB3", "PUB2"]), &[], &current);
        let orders: Vec<(String, i32)> = plan
            .into_iter()
            .filter_map(|m| match m {
                CitationMutation::InsertPrimary {
                    citation_id,
                    order_in,
                    ..
                } => Some((citation_id, order_in)),
                _ => None,
            })
            .collect();
        assert_eq!(orders, vec![("PUB2".to_string(), 5), ("PUB3".to_string(), 6)]);
    }

    #[test]
    fn test_supplementary_citation_is_promoted() {
        let plan = plan("E1", &ids(&[]), &ids(&["PUB1"]), &[], &state(&[], &["PUB1"], None));
        assert_eq!(
            plan,
            vec![
                CitationMutation::InsertPrimary {
                    entry_id: "E1".into(),
                    citation_id: "PUB1".into(),
                    order_in: 1
                },
                CitationMutation::DeleteSupplementary {
                    entry_id: "E1".into(),
                    citation_id: "PUB1".into()
                },
            ]
        );
    }

    #[test]
    fn test_already_primary_citation_is_left_alone() {
        let plan = plan("E1", &ids(&[]), &ids(&["PUB1"]), &[], &state(&["PUB1"], &[], Some(1)));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_mutation_serializes_with_kind() {
        let json = serde_json::to_value(CitationMutation::InsertSupplementary {
            entry_id: "E1".into(),
            citation_id: "PUB1".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "insert_supplementary");
    }

    #[tokio::test]
    async fn test_reconcile_applies_and_is_idempotent() {
        let pool = store().await;
        let db = pool.connection();
        seed_entries(db, &["IPR000001"]).await;
        seed_citation(db, "PUB1", 1, None).await;
        seed_citation(db, "PUB2", 2, None).await;
        let reconciler = ReferenceReconciler::new();

        let none = ids(&[]);
        let cited = ids(&["PUB1", "PUB2"]);
        let first = reconciler
            .reconcile(db, "IPR000001", &none, &cited, &[])
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(primary_ids(db, "IPR000001").await, vec!["PUB1", "PUB2"]);

        let again = reconciler
            .reconcile(db, "IPR000001", &none, &cited, &[])
            .await
            .unwrap();
        assert!(again.is_empty());

        let only_first = ids(&["PUB1"]);
        reconciler
            .reconcile(db, "IPR000001", &cited, &only_first, &[])
            .await
            .unwrap();
        assert_eq!(primary_ids(db, "IPR000001").await, vec!["PUB1"]);
        assert_eq!(supplementary_ids(db, "IPR000001").await, ids(&["PUB2"]));

        let repeat = reconciler
            .reconcile(db, "IPR000001", &cited, &only_first, &[])
            .await
            .unwrap();
        assert!(repeat.is_empty());
    }

    #[tokio::test]
    async fn test_identical_sets_touch_nothing() {
        let pool = store().await;
        let db = pool.connection();
        let same = ids(&["PUB404"]);

        // No entry or citation rows exist, so any write would fail
        let mutations = ReferenceReconciler::new()
            .reconcile(db, "IPR999999", &same, &same, &[])
            .await
            .unwrap();
        assert!(mutations.is_empty());
    }
}
