//! Type facet aggregation.
//!
//! Counts are per distinct entity and only ever grow within a session. The
//! snapshot order is count descending with ties kept in first-seen order.

use crate::index::Entity;
use crate::types::{EntityId, TypeFacetCount, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One facet row for the type list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFacet {
    pub type_id: TypeId,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct FacetAggregator {
    /// Types in first-seen order.
    order: Vec<TypeId>,
    counts: HashMap<TypeId, u64>,
    labels: HashMap<TypeId, String>,
    /// Entities already counted, so a repeated call cannot double count.
    recorded: HashSet<EntityId>,
}

impl FacetAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember labels from a backend facet list. The first label seen for a
    /// type sticks.
    pub fn note_labels(&mut self, facets: &[TypeFacetCount]) {
        for facet in facets {
            if facet.label.is_empty() {
                continue;
            }
            self.labels
                .entry(facet.type_id.clone())
                .or_insert_with(|| facet.label.clone());
        }
    }

    /// Count the entity's types. Returns `false` if the entity has no
    /// knowledge record yet or was already counted.
    pub fn record_entity_types(&mut self, entity: &Entity) -> bool {
        let Some(types) = entity.type_list() else {
            return false;
        };
        if !self.recorded.insert(entity.id().clone()) {
            return false;
        }

        let mut seen = HashSet::new();
        for type_id in types {
            if !seen.insert(type_id) {
                continue;
            }
            match self.counts.get_mut(type_id) {
                Some(count) => *count += 1,
                None => {
                    self.counts.insert(type_id.clone(), 1);
                    self.order.push(type_id.clone());
                }
            }
        }
        true
    }

    pub fn count(&self, type_id: &TypeId) -> u64 {
        self.counts.get(type_id).copied().unwrap_or(0)
    }

    pub fn label(&self, type_id: &TypeId) -> Option<&str> {
        self.labels.get(type_id).map(String::as_str)
    }

    /// Every type seen so far, in first-seen order.
    pub fn type_ids(&self) -> &[TypeId] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn snapshot(&self) -> Vec<TypeFacet> {
        let mut facets: Vec<TypeFacet> = self
            .order
            .iter()
            .map(|type_id| TypeFacet {
                type_id: type_id.clone(),
                label: self
                    .labels
                    .get(type_id)
                    .cloned()
                    .unwrap_or_else(|| type_id.to_string()),
                count: self.count(type_id),
            })
            .collect();
        // sort_by is stable: equal counts keep first-seen order.
        facets.sort_by(|a, b| b.count.cmp(&a.count));
        facets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EntityIndex;
    use crate::types::KnowledgeRecord;

    fn index_with(records: Vec<KnowledgeRecord>) -> EntityIndex {
        let mut index = EntityIndex::new();
        for r in records {
            index.upsert_knowledge(r);
        }
        index
    }

    fn record_all(facets: &mut FacetAggregator, index: &EntityIndex, ids: &[&str]) {
        for id in ids {
            facets.record_entity_types(index.get(&EntityId::new(*id)).unwrap());
        }
    }

    #[test]
    fn test_single_castle_snapshot() {
        let index = index_with(vec![KnowledgeRecord::new("Q1", "Castle Rising").with_type("T1")]);
        let mut facets = FacetAggregator::new();
        facets.note_labels(&[TypeFacetCount::new("T1", "Castle", 1)]);
        record_all(&mut facets, &index, &["Q1"]);

        assert_eq!(
            facets.snapshot(),
            vec![TypeFacet {
                type_id: "T1".into(),
                label: "Castle".to_string(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let index = index_with(vec![
            KnowledgeRecord::new("Q1", "a").with_type("T2"),
            KnowledgeRecord::new("Q2", "b").with_type("T1"),
            KnowledgeRecord::new("Q3", "c").with_type("T3").with_type("T1"),
        ]);
        let mut facets = FacetAggregator::new();
        record_all(&mut facets, &index, &["Q1", "Q2", "Q3"]);

        let order: Vec<(String, u64)> = facets
            .snapshot()
            .into_iter()
            .map(|f| (f.type_id.to_string(), f.count))
            .collect();
        assert_eq!(
            order,
            vec![
                ("T1".to_string(), 2),
                ("T2".to_string(), 1),
                ("T3".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_entity_counted_once() {
        let index = index_with(vec![KnowledgeRecord::new("Q1", "a").with_type("T1")]);
        let mut facets = FacetAggregator::new();
        record_all(&mut facets, &index, &["Q1", "Q1"]);
        assert_eq!(facets.count(&"T1".into()), 1);
    }

    #[test]
    fn test_first_label_sticks() {
        let mut facets = FacetAggregator::new();
        facets.note_labels(&[TypeFacetCount::new("T1", "Castle", 3)]);
        facets.note_labels(&[TypeFacetCount::new("T1", "Fortress", 9)]);
        assert_eq!(facets.label(&"T1".into()), Some("Castle"));
    }

    #[test]
    fn test_unlabelled_type_falls_back_to_id() {
        let index = index_with(vec![KnowledgeRecord::new("Q1", "a").with_type("Q16970")]);
        let mut facets = FacetAggregator::new();
        record_all(&mut facets, &index, &["Q1"]);
        assert_eq!(facets.snapshot()[0].label, "Q16970");
    }
}
