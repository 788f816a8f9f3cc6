//! Missing-match resolution.
//!
//! Geographic objects can reference items outside the viewport query's
//! results (the item's coordinates lie just outside the bounds, or the item
//! has none). After both viewport pages have landed, the orphaned ids are
//! requested by id in a single batch. Each id is requested at most once per
//! session; a failed batch is not retried.

use crate::coordinator::CycleId;
use crate::facets::FacetAggregator;
use crate::index::EntityIndex;
use crate::types::{EntityId, KnowledgeRecord, LatLon, TypeFacetCount};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// One batched by-id request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub cycle: CycleId,
    /// Sorted, no duplicates.
    pub ids: Vec<EntityId>,
    /// Centre of the cycle's bounds.
    pub center: Option<LatLon>,
}

/// What merging a by-id response changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    /// Ids that gained a knowledge record, in response order.
    pub resolved: Vec<EntityId>,
    /// Requested ids the response did not cover.
    pub still_missing: Vec<EntityId>,
    /// Returned ids that were never requested.
    pub unrequested: Vec<EntityId>,
}

#[derive(Debug, Default)]
pub struct MissingMatchResolver {
    requested: HashSet<EntityId>,
}

impl MissingMatchResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_requested(&self, id: &EntityId) -> bool {
        self.requested.contains(id)
    }

    /// Build the batch for this cycle, or `None` when nothing new is
    /// orphaned.
    pub fn plan(
        &mut self,
        index: &EntityIndex,
        cycle: CycleId,
        center: Option<LatLon>,
    ) -> Option<ResolutionRequest> {
        let ids: Vec<EntityId> = index
            .orphaned_ids()
            .into_iter()
            .filter(|id| !self.requested.contains(id))
            .collect();

        if ids.is_empty() {
            debug!(%cycle, "no orphaned entities to resolve");
            return None;
        }

        self.requested.extend(ids.iter().cloned());
        info!(%cycle, count = ids.len(), "requesting missing knowledge records");
        Some(ResolutionRequest { cycle, ids, center })
    }

    /// Merge a by-id response. Records for ids that were not requested are
    /// merged too.
    pub fn apply(
        &self,
        request: &ResolutionRequest,
        items: Vec<KnowledgeRecord>,
        facet_labels: &[TypeFacetCount],
        index: &mut EntityIndex,
        facets: &mut FacetAggregator,
    ) -> ResolutionOutcome {
        facets.note_labels(facet_labels);

        let requested: HashSet<&EntityId> = request.ids.iter().collect();
        let mut outcome = ResolutionOutcome::default();
        let mut returned = HashSet::new();

        for record in items {
            let id = record.id.clone();
            returned.insert(id.clone());
            if !requested.contains(&id) {
                outcome.unrequested.push(id.clone());
            }
            if index.upsert_knowledge(record) {
                if let Some(entity) = index.get(&id) {
                    facets.record_entity_types(entity);
                }
                outcome.resolved.push(id);
            }
        }

        outcome.still_missing = request
            .ids
            .iter()
            .filter(|id| !returned.contains(*id))
            .cloned()
            .collect();

        info!(
            cycle = %request.cycle,
            resolved = outcome.resolved.len(),
            still_missing = outcome.still_missing.len(),
            "missing knowledge records merged"
        );
        outcome
    }
}
