//! The session state machine.
//!
//! [`MapEngine`] owns every piece of session state and is purely
//! synchronous: callers issue the backend queries and hand the results back
//! through the `apply_*` methods. Each call returns the [`MapEvent`]s it
//! produced, so a renderer can follow along without polling.

use crate::backend::{GeoPage, KnowledgePage};
use crate::config::EngineConfig;
use crate::coordinator::{Completion, CycleId, LoadCoordinator, Source};
use crate::detail::{DetailSession, DetailState, FocusOutcome, FocusTicket};
use crate::error::{EngineError, FetchError, Query, Result};
use crate::facets::{FacetAggregator, TypeFacet};
use crate::filter::{FilterEngine, FilterSelection, VisibilityDiff};
use crate::index::{Entity, EntityIndex, LinkStatus, LinkSummary};
use crate::resolver::{MissingMatchResolver, ResolutionOutcome, ResolutionRequest};
use crate::types::{BoundingBox, Candidate, CandidateList, EntityId, EntityTags, TypeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ============================================================================
// Events
// ============================================================================

/// State transitions a renderer can subscribe to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MapEvent {
    LoadStarted {
        cycle: CycleId,
        bounds: BoundingBox,
    },
    KnowledgeLoaded {
        cycle: CycleId,
        items: usize,
        new_entities: usize,
    },
    GeoLoaded {
        cycle: CycleId,
        objects: usize,
        new_records: usize,
    },
    /// Both viewport queries of the cycle succeeded.
    BothLoaded {
        cycle: CycleId,
        summary: LinkSummary,
    },
    ResolutionRequested {
        cycle: CycleId,
        ids: Vec<EntityId>,
    },
    ResolutionApplied {
        cycle: CycleId,
        outcome: ResolutionOutcome,
    },
    FacetsChanged {
        facets: Vec<TypeFacet>,
    },
    VisibilityChanged {
        diff: VisibilityDiff,
    },
    DetailOpened {
        id: EntityId,
        epoch: u64,
    },
    DetailTagsReady {
        id: EntityId,
        tags: Vec<String>,
    },
    DetailCandidatesReady {
        id: EntityId,
        candidates: Vec<Candidate>,
    },
    DetailClosed {
        id: EntityId,
    },
    FetchFailed {
        query: Query,
        message: String,
    },
}

/// Everything one load step produced.
#[derive(Debug, Default)]
pub struct Step {
    pub events: Vec<MapEvent>,
    /// Set when this step fired the both-loaded edge.
    pub both_loaded: bool,
    /// Batch the caller should fetch next.
    pub resolution: Option<ResolutionRequest>,
    pub outcome: Option<ResolutionOutcome>,
    pub error: Option<EngineError>,
}

impl Step {
    fn failed(&mut self, query: Query, source: FetchError) {
        warn!(%query, error = %source, "fetch failed");
        self.events.push(MapEvent::FetchFailed {
            query,
            message: source.to_string(),
        });
        self.error = Some(EngineError::fetch(query, source));
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug)]
pub struct MapEngine {
    config: EngineConfig,
    index: EntityIndex,
    facets: FacetAggregator,
    selection: FilterSelection,
    filter: FilterEngine,
    detail: DetailSession,
    coordinator: LoadCoordinator,
    resolver: MissingMatchResolver,
    bounds: Option<BoundingBox>,
}

impl Default for MapEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl MapEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            index: EntityIndex::new(),
            facets: FacetAggregator::new(),
            selection: FilterSelection::default(),
            filter: FilterEngine::new(),
            detail: DetailSession::new(),
            coordinator: LoadCoordinator::new(),
            resolver: MissingMatchResolver::new(),
            bounds: None,
        }
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Start a load cycle for `bounds`. Every type is ticked again; the
    /// link toggles are left alone. Responses still in flight for older
    /// cycles are merged when they land but never count towards this one.
    pub fn begin_load(&mut self, bounds: BoundingBox) -> (CycleId, Vec<MapEvent>) {
        self.bounds = Some(bounds);
        let cycle = self.coordinator.begin();
        info!(%cycle, bounds = %bounds.to_bbox_string(), "loading viewport");

        let mut events = vec![MapEvent::LoadStarted { cycle, bounds }];
        self.selection.select_all();
        self.push_diff(&mut events);
        (cycle, events)
    }

    pub fn apply_knowledge(
        &mut self,
        cycle: CycleId,
        result: std::result::Result<KnowledgePage, FetchError>,
    ) -> Step {
        let mut step = Step::default();
        let page = match result {
            Ok(page) => page,
            Err(source) => {
                step.failed(Query::KnowledgeInBounds, source);
                self.coordinator.complete(cycle, Source::Knowledge, false);
                return step;
            }
        };

        let items = page.items.len();
        self.facets.note_labels(&page.type_facets);
        let mut new_entities = 0;
        for record in page.items {
            let id = record.id.clone();
            if self.index.upsert_knowledge(record) {
                new_entities += 1;
                if let Some(entity) = self.index.get(&id) {
                    self.facets.record_entity_types(entity);
                }
            }
        }
        debug!(%cycle, items, new_entities, "knowledge page merged");

        step.events.push(MapEvent::KnowledgeLoaded {
            cycle,
            items,
            new_entities,
        });
        if new_entities > 0 {
            step.events.push(MapEvent::FacetsChanged {
                facets: self.facets.snapshot(),
            });
        }

        let completion = self.coordinator.complete(cycle, Source::Knowledge, true);
        self.after_merge(cycle, completion, &mut step);
        step
    }

    pub fn apply_geo(
        &mut self,
        cycle: CycleId,
        result: std::result::Result<GeoPage, FetchError>,
    ) -> Step {
        let mut step = Step::default();
        let page = match result {
            Ok(page) => page,
            Err(source) => {
                step.failed(Query::GeoInBounds, source);
                self.coordinator.complete(cycle, Source::Geo, false);
                return step;
            }
        };

        let objects = page.objects.len();
        let mut new_records = 0;
        for record in page.objects {
            if self.index.upsert_geo(record) {
                new_records += 1;
            }
        }
        debug!(%cycle, objects, new_records, "geo page merged");

        step.events.push(MapEvent::GeoLoaded {
            cycle,
            objects,
            new_records,
        });

        let completion = self.coordinator.complete(cycle, Source::Geo, true);
        self.after_merge(cycle, completion, &mut step);
        step
    }

    /// Merge the by-id response for `request`, then settle the requested
    /// ids and refilter once more without looking for new orphans.
    pub fn apply_resolution(
        &mut self,
        request: &ResolutionRequest,
        result: std::result::Result<KnowledgePage, FetchError>,
    ) -> Step {
        let mut step = Step::default();
        let page = match result {
            Ok(page) => page,
            Err(source) => {
                step.failed(Query::KnowledgeById, source);
                return step;
            }
        };

        let outcome = self.resolver.apply(
            request,
            page.items,
            &page.type_facets,
            &mut self.index,
            &mut self.facets,
        );
        let gained = !outcome.resolved.is_empty();
        step.events.push(MapEvent::ResolutionApplied {
            cycle: request.cycle,
            outcome: outcome.clone(),
        });
        if gained {
            step.events.push(MapEvent::FacetsChanged {
                facets: self.facets.snapshot(),
            });
        }

        self.index.settle_ids(&request.ids);
        self.push_diff(&mut step.events);
        step.outcome = Some(outcome);
        step
    }

    fn after_merge(&mut self, cycle: CycleId, completion: Completion, step: &mut Step) {
        if completion == Completion::BothLoaded {
            let settled = self.index.settle();
            let summary = self.index.summary();
            info!(
                %cycle,
                settled,
                linked = summary.linked,
                unlinked = summary.unlinked,
                orphaned = summary.orphaned,
                "both sources loaded"
            );
            step.both_loaded = true;
            step.events.push(MapEvent::BothLoaded { cycle, summary });
        }

        self.push_diff(&mut step.events);

        if step.both_loaded
            && self.config.resolve_missing
            && self.coordinator.claim_resolution(cycle)
        {
            let center = self.bounds.map(|b| b.center());
            if let Some(request) = self.resolver.plan(&self.index, cycle, center) {
                step.events.push(MapEvent::ResolutionRequested {
                    cycle,
                    ids: request.ids.clone(),
                });
                step.resolution = Some(request);
            }
        }
    }

    fn refilter(&mut self) -> VisibilityDiff {
        self.filter.recompute(&self.index, &self.selection)
    }

    fn push_diff(&mut self, events: &mut Vec<MapEvent>) {
        let diff = self.refilter();
        if !diff.is_empty() {
            events.push(MapEvent::VisibilityChanged { diff });
        }
    }

    // ------------------------------------------------------------------------
    // Filter selection
    // ------------------------------------------------------------------------

    pub fn set_selection(&mut self, selection: FilterSelection) -> VisibilityDiff {
        self.selection = selection;
        self.refilter()
    }

    /// Show only entities of `type_id`.
    pub fn select_only_type(&mut self, type_id: TypeId) -> VisibilityDiff {
        self.selection.select_only(type_id);
        self.refilter()
    }

    pub fn select_all_types(&mut self) -> VisibilityDiff {
        self.selection.select_all();
        self.refilter()
    }

    pub fn toggle_type(&mut self, type_id: &TypeId) -> VisibilityDiff {
        self.selection.toggle(type_id, self.facets.type_ids());
        self.refilter()
    }

    pub fn set_show_linked(&mut self, show: bool) -> VisibilityDiff {
        self.selection.show_linked = show;
        self.refilter()
    }

    pub fn set_show_unlinked(&mut self, show: bool) -> VisibilityDiff {
        self.selection.show_unlinked = show;
        self.refilter()
    }

    // ------------------------------------------------------------------------
    // Detail
    // ------------------------------------------------------------------------

    /// Focus `id`. Switching from another entity closes it first, under the
    /// same epoch bump.
    pub fn focus(&mut self, id: EntityId) -> Result<(FocusOutcome, Vec<MapEvent>)> {
        let previous = self.detail.focused().cloned();
        let outcome = self.detail.focus(id, &self.index)?;

        let mut events = Vec::new();
        if let FocusOutcome::Opened(ticket) = &outcome {
            if let Some(previous) = previous {
                events.push(MapEvent::DetailClosed { id: previous });
            }
            events.push(MapEvent::DetailOpened {
                id: ticket.id.clone(),
                epoch: ticket.epoch,
            });
        }
        Ok((outcome, events))
    }

    pub fn close_detail(&mut self) -> Vec<MapEvent> {
        self.detail
            .close()
            .map(|id| MapEvent::DetailClosed { id })
            .into_iter()
            .collect()
    }

    pub fn apply_tags(
        &mut self,
        ticket: &FocusTicket,
        result: std::result::Result<EntityTags, FetchError>,
    ) -> Result<Vec<MapEvent>> {
        let response = match result {
            Ok(response) => response,
            Err(source) => return Err(self.detail_failure(ticket, Query::Tags, source)),
        };
        let id = response.id.clone();
        let tags = response.tags.clone();
        self.detail.apply_tags(ticket, response)?;
        Ok(vec![MapEvent::DetailTagsReady { id, tags }])
    }

    pub fn apply_candidates(
        &mut self,
        ticket: &FocusTicket,
        result: std::result::Result<CandidateList, FetchError>,
    ) -> Result<Vec<MapEvent>> {
        let response = match result {
            Ok(response) => response,
            Err(source) => return Err(self.detail_failure(ticket, Query::Candidates, source)),
        };
        let id = response.id.clone();
        let candidates = self
            .detail
            .apply_candidates(ticket, response, &self.index)?
            .to_vec();
        debug!(%id, count = candidates.len(), "candidates ready");
        Ok(vec![MapEvent::DetailCandidatesReady { id, candidates }])
    }

    /// A failed lookup for a focus that has since moved on is just stale.
    fn detail_failure(&self, ticket: &FocusTicket, query: Query, source: FetchError) -> EngineError {
        if !self.detail.is_current(ticket) {
            debug!(id = %ticket.id, %query, "ignoring failure of a stale lookup");
            return EngineError::StaleResponse {
                id: ticket.id.clone(),
                epoch: ticket.epoch,
                current: self.detail.epoch(),
            };
        }
        warn!(id = %ticket.id, %query, error = %source, "detail lookup failed");
        EngineError::fetch(query, source)
    }

    /// Bounds the candidate lookup searches within.
    pub fn detail_bounds(&self) -> BoundingBox {
        self.bounds.unwrap_or(self.config.default_bounds)
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &EntityIndex {
        &self.index
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.index.get(id)
    }

    pub fn link_status(&self, id: &EntityId) -> Option<LinkStatus> {
        self.index.link_status(id)
    }

    pub fn summary(&self) -> LinkSummary {
        self.index.summary()
    }

    pub fn facet_snapshot(&self) -> Vec<TypeFacet> {
        self.facets.snapshot()
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn is_shown(&self, id: &EntityId) -> bool {
        self.filter.is_shown(id)
    }

    pub fn visible_ids(&self) -> Vec<EntityId> {
        self.filter.visible_ids()
    }

    pub fn detail_state(&self) -> &DetailState {
        self.detail.state()
    }

    pub fn current_bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    /// The current cycle has not reached the both-loaded edge.
    pub fn is_loading(&self) -> bool {
        self.coordinator.is_loading()
    }
}
