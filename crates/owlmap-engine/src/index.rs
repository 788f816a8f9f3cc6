//! Entity index: the merged view of both data sources keyed by item id.
//!
//! ```text
//!   knowledge page ──► upsert_knowledge ─┐
//!                                        ├──► Entity { knowledge?, geo[] } ──► link_status()
//!   geo page ───────► upsert_geo ────────┘
//! ```
//!
//! Duplicate handling is first-write-wins: a second knowledge record for an
//! id is ignored, and a geo record is ignored when the same geo identifier
//! was already recorded under that id. Link status is never stored; it is
//! derived from the entity on every read.

use crate::types::{EntityId, GeoId, GeoRecord, KnowledgeRecord, LatLon, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// Link status
// ============================================================================

/// How far an entity has been reconciled across the two sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkStatus {
    /// Knowledge record present, no geographic object references it.
    Unlinked,
    /// Knowledge record present and at least one geographic object.
    Linked,
    /// Geographic objects only, after a both-loaded settle found no knowledge
    /// record for them.
    Orphaned,
    /// Geographic objects only, not yet settled.
    GeoOnlyUnresolved,
}

impl LinkStatus {
    pub fn derive(has_knowledge: bool, has_geo: bool, settled: bool) -> Self {
        match (has_knowledge, has_geo) {
            (true, true) => LinkStatus::Linked,
            (true, false) => LinkStatus::Unlinked,
            (false, _) if settled => LinkStatus::Orphaned,
            // An entity with neither source never enters the index.
            (false, _) => LinkStatus::GeoOnlyUnresolved,
        }
    }

    pub fn is_linked(self) -> bool {
        matches!(self, LinkStatus::Linked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Unlinked => "unlinked",
            LinkStatus::Linked => "linked",
            LinkStatus::Orphaned => "orphaned",
            LinkStatus::GeoOnlyUnresolved => "unresolved",
        }
    }
}

/// Marker role a renderer picks its icon from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerRole {
    /// Knowledge marker for an item that is tagged on the map.
    ItemLinked,
    /// Knowledge marker for an item nothing on the map references.
    ItemUnlinked,
    /// Geographic marker whose item is loaded.
    GeoMatched,
    /// Geographic marker whose item is not (yet) loaded.
    GeoUnmatched,
}

// ============================================================================
// Entity
// ============================================================================

/// One reconciled entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    knowledge: Option<KnowledgeRecord>,
    geo: Vec<GeoRecord>,
    settled: bool,
}

impl Entity {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            knowledge: None,
            geo: Vec::new(),
            settled: false,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn knowledge(&self) -> Option<&KnowledgeRecord> {
        self.knowledge.as_ref()
    }

    pub fn geo_records(&self) -> &[GeoRecord] {
        &self.geo
    }

    pub fn has_geo(&self) -> bool {
        !self.geo.is_empty()
    }

    /// Types from the knowledge record; `None` until it arrives.
    pub fn type_list(&self) -> Option<&[TypeId]> {
        self.knowledge.as_ref().map(|k| k.type_list.as_slice())
    }

    pub fn link_status(&self) -> LinkStatus {
        LinkStatus::derive(self.knowledge.is_some(), self.has_geo(), self.settled)
    }

    pub fn knowledge_marker(&self) -> Option<MarkerRole> {
        self.knowledge.as_ref().map(|_| {
            if self.has_geo() {
                MarkerRole::ItemLinked
            } else {
                MarkerRole::ItemUnlinked
            }
        })
    }

    pub fn geo_marker(&self) -> Option<MarkerRole> {
        self.has_geo().then(|| {
            if self.knowledge.is_some() {
                MarkerRole::GeoMatched
            } else {
                MarkerRole::GeoUnmatched
            }
        })
    }

    /// Line segments from each knowledge coordinate to each geographic
    /// centroid; empty unless the entity is linked.
    pub fn link_segments(&self) -> Vec<(LatLon, LatLon)> {
        let Some(knowledge) = &self.knowledge else {
            return Vec::new();
        };
        knowledge
            .coords
            .iter()
            .flat_map(|from| self.geo.iter().map(move |g| (*from, g.centroid)))
            .collect()
    }
}

// ============================================================================
// Index
// ============================================================================

/// Per-status entity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub linked: usize,
    pub unlinked: usize,
    pub orphaned: usize,
    pub unresolved: usize,
}

impl LinkSummary {
    pub fn total(&self) -> usize {
        self.linked + self.unlinked + self.orphaned + self.unresolved
    }
}

/// Keyed storage of merged entities.
#[derive(Debug, Default)]
pub struct EntityIndex {
    entities: HashMap<EntityId, Entity>,
    /// First entity each geo identifier was recorded under.
    geo_owner: HashMap<GeoId, EntityId>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Store a knowledge record. Returns `true` only when the id had no
    /// knowledge record before; later arrivals are ignored.
    pub fn upsert_knowledge(&mut self, mut record: KnowledgeRecord) -> bool {
        let entity = self
            .entities
            .entry(record.id.clone())
            .or_insert_with(|| Entity::new(record.id.clone()));

        if entity.knowledge.is_some() {
            debug!(id = %record.id, "knowledge record already known, ignoring");
            return false;
        }

        record.dedup_types();
        entity.knowledge = Some(record);
        true
    }

    /// Attach a geographic record to the entity it references. Returns
    /// `false` when the record has no cross-reference or its identifier is
    /// already recorded under the same entity.
    pub fn upsert_geo(&mut self, record: GeoRecord) -> bool {
        let Some(id) = record.entity_id.clone() else {
            debug!(geo = %record.identifier, "geo record without item reference, ignoring");
            return false;
        };

        let entity = self
            .entities
            .entry(id.clone())
            .or_insert_with(|| Entity::new(id.clone()));

        if entity
            .geo
            .iter()
            .any(|g| g.identifier == record.identifier)
        {
            return false;
        }

        self.geo_owner
            .entry(record.identifier.clone())
            .or_insert(id);
        entity.geo.push(record);
        true
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn has_knowledge(&self, id: &EntityId) -> bool {
        self.entities
            .get(id)
            .is_some_and(|e| e.knowledge.is_some())
    }

    pub fn link_status(&self, id: &EntityId) -> Option<LinkStatus> {
        self.entities.get(id).map(Entity::link_status)
    }

    /// All ids, in no particular order.
    pub fn all_ids(&self) -> impl Iterator<Item = &EntityId> + '_ {
        self.entities.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Entity a geographic object was first recorded under.
    pub fn owner_of_geo(&self, geo: &GeoId) -> Option<&EntityId> {
        self.geo_owner.get(geo)
    }

    /// Promote every geo-only entity from unresolved to orphaned. Called on
    /// the both-loaded edge, once the viewport's knowledge page has had its
    /// chance to supply a match. Returns how many entities changed.
    pub fn settle(&mut self) -> usize {
        let mut promoted = 0;
        for entity in self.entities.values_mut() {
            if entity.knowledge.is_none() && !entity.settled {
                entity.settled = true;
                promoted += 1;
            }
        }
        promoted
    }

    /// Promote only the listed geo-only entities. Used after a by-id lookup,
    /// which speaks for the ids it asked about and nothing else.
    pub fn settle_ids(&mut self, ids: &[EntityId]) -> usize {
        let mut promoted = 0;
        for id in ids {
            if let Some(entity) = self.entities.get_mut(id) {
                if entity.knowledge.is_none() && !entity.settled {
                    entity.settled = true;
                    promoted += 1;
                }
            }
        }
        promoted
    }

    /// Ids whose status is [`LinkStatus::Orphaned`], sorted.
    pub fn orphaned_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.link_status() == LinkStatus::Orphaned)
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn summary(&self) -> LinkSummary {
        let mut summary = LinkSummary::default();
        for entity in self.entities.values() {
            match entity.link_status() {
                LinkStatus::Linked => summary.linked += 1,
                LinkStatus::Unlinked => summary.unlinked += 1,
                LinkStatus::Orphaned => summary.orphaned += 1,
                LinkStatus::GeoOnlyUnresolved => summary.unresolved += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn castle() -> KnowledgeRecord {
        KnowledgeRecord::new("Q1", "Castle Rising")
            .with_type("T1")
            .with_coord(52.79, 0.47)
    }

    fn way(n: u32, qid: &str) -> GeoRecord {
        GeoRecord::new(format!("way/{n}").as_str(), qid, LatLon::new(52.791, 0.471))
    }

    #[test]
    fn test_first_knowledge_write_wins() {
        let mut index = EntityIndex::new();
        assert!(index.upsert_knowledge(castle()));

        let renamed = KnowledgeRecord::new("Q1", "Something Else");
        assert!(!index.upsert_knowledge(renamed));

        let entity = index.get(&"Q1".into()).unwrap();
        assert_eq!(entity.knowledge().unwrap().label, "Castle Rising");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_geo_dedup_by_identifier_only() {
        let mut index = EntityIndex::new();
        assert!(index.upsert_geo(way(5, "Q1")));
        assert!(!index.upsert_geo(way(5, "Q1")));

        // Same geometry, different identifier: kept.
        assert!(index.upsert_geo(way(6, "Q1")));
        assert_eq!(index.get(&"Q1".into()).unwrap().geo_records().len(), 2);
    }

    #[test]
    fn test_geo_without_reference_is_ignored() {
        let mut index = EntityIndex::new();
        let mut record = way(5, "Q1");
        record.entity_id = None;
        assert!(!index.upsert_geo(record));
        assert!(index.is_empty());
    }

    #[test]
    fn test_link_status_transitions() {
        let mut index = EntityIndex::new();
        index.upsert_geo(way(5, "Q2"));
        assert_eq!(
            index.link_status(&"Q2".into()),
            Some(LinkStatus::GeoOnlyUnresolved)
        );

        assert_eq!(index.settle(), 1);
        assert_eq!(index.link_status(&"Q2".into()), Some(LinkStatus::Orphaned));
        assert_eq!(index.orphaned_ids(), vec![EntityId::new("Q2")]);

        index.upsert_knowledge(KnowledgeRecord::new("Q2", "Mill"));
        assert_eq!(index.link_status(&"Q2".into()), Some(LinkStatus::Linked));
        assert!(index.orphaned_ids().is_empty());

        index.upsert_knowledge(castle());
        assert_eq!(index.link_status(&"Q1".into()), Some(LinkStatus::Unlinked));
        assert_eq!(index.link_status(&"Q9".into()), None);
    }

    #[test]
    fn test_settle_ids_leaves_others_unresolved() {
        let mut index = EntityIndex::new();
        index.upsert_geo(way(5, "Q2"));
        index.upsert_geo(way(6, "Q3"));

        assert_eq!(index.settle_ids(&["Q2".into(), "Q9".into()]), 1);
        assert_eq!(index.link_status(&"Q2".into()), Some(LinkStatus::Orphaned));
        assert_eq!(
            index.link_status(&"Q3".into()),
            Some(LinkStatus::GeoOnlyUnresolved)
        );
    }

    #[test]
    fn test_duplicate_types_collapse() {
        let mut index = EntityIndex::new();
        let mut record = castle();
        record.type_list.push("T1".into());
        record.type_list.push("T2".into());
        index.upsert_knowledge(record);

        let types = index.get(&"Q1".into()).unwrap().type_list().unwrap();
        assert_eq!(types, &[EntityId::new("T1"), EntityId::new("T2")]);
    }

    #[test]
    fn test_link_segments_and_markers() {
        let mut index = EntityIndex::new();
        index.upsert_knowledge(castle());
        let entity = index.get(&"Q1".into()).unwrap();
        assert!(entity.link_segments().is_empty());
        assert_eq!(entity.knowledge_marker(), Some(MarkerRole::ItemUnlinked));
        assert_eq!(entity.geo_marker(), None);

        index.upsert_geo(way(5, "Q1"));
        index.upsert_geo(way(6, "Q1"));
        let entity = index.get(&"Q1".into()).unwrap();
        assert_eq!(entity.link_segments().len(), 2);
        assert_eq!(entity.knowledge_marker(), Some(MarkerRole::ItemLinked));
        assert_eq!(entity.geo_marker(), Some(MarkerRole::GeoMatched));
    }

    #[test]
    fn test_summary_counts() {
        let mut index = EntityIndex::new();
        index.upsert_knowledge(castle());
        index.upsert_geo(way(5, "Q2"));
        index.upsert_geo(way(6, "Q3"));
        index.upsert_knowledge(KnowledgeRecord::new("Q3", "Church"));

        let summary = index.summary();
        assert_eq!(summary.unlinked, 1);
        assert_eq!(summary.linked, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(index.owner_of_geo(&GeoId::new("way/6")), Some(&EntityId::new("Q3")));
    }
}
