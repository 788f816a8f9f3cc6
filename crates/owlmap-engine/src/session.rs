//! Async session driver.
//!
//! [`MapSession`] runs [`MapEngine`] against a [`MapBackend`]. The engine
//! sits behind a mutex that is only ever locked between awaits, so every
//! mutation happens on resumption of one suspended step and no two merges
//! overlap.
//!
//! ```text
//!   load_viewport(bounds)
//!        │
//!        ├── knowledge_in_bounds ──┐   (in flight together,
//!        ├── geo_in_bounds ────────┤    applied as each lands)
//!        │                         ▼
//!        │                   both-loaded edge
//!        │                         │
//!        └── knowledge_by_ids ◄────┘   (at most once per cycle)
//! ```

use crate::backend::MapBackend;
use crate::config::EngineConfig;
use crate::coordinator::CycleId;
use crate::detail::{DetailState, FocusOutcome};
use crate::engine::{MapEngine, MapEvent, Step};
use crate::error::{EngineError, Query, Result};
use crate::facets::TypeFacet;
use crate::filter::{FilterSelection, VisibilityDiff};
use crate::index::{LinkStatus, LinkSummary};
use crate::resolver::ResolutionRequest;
use crate::types::{BoundingBox, EntityId, SearchHit, TypeId};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Event handler type
pub type MapEventHandler = Box<dyn Fn(MapEvent) + Send + Sync>;

/// What one [`MapSession::load_viewport`] call did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub cycle: CycleId,
    pub knowledge_items: usize,
    pub geo_objects: usize,
    pub both_loaded: bool,
    /// Ids the resolution pass gained a knowledge record for.
    pub resolved: Vec<EntityId>,
    #[serde(skip)]
    pub failures: Vec<EngineError>,
}

impl LoadReport {
    fn new(cycle: CycleId) -> Self {
        Self {
            cycle,
            knowledge_items: 0,
            geo_objects: 0,
            both_loaded: false,
            resolved: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.both_loaded && self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct MapSession {
    engine: Arc<Mutex<MapEngine>>,
    backend: Arc<dyn MapBackend>,
    handlers: Arc<Mutex<Vec<MapEventHandler>>>,
}

impl MapSession {
    pub fn new(backend: Arc<dyn MapBackend>, config: EngineConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(MapEngine::new(config))),
            backend,
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_backend<B: MapBackend + 'static>(backend: B) -> Self {
        Self::new(Arc::new(backend), EngineConfig::default())
    }

    /// Register an event handler. Handlers run synchronously and must not
    /// call back into the session.
    pub fn on_event(&self, handler: MapEventHandler) {
        self.handlers.lock().push(handler);
    }

    fn emit(&self, events: Vec<MapEvent>) {
        if events.is_empty() {
            return;
        }
        let handlers = self.handlers.lock();
        for event in events {
            for handler in handlers.iter() {
                handler(event.clone());
            }
        }
    }

    fn emit_diff(&self, diff: &VisibilityDiff) {
        if !diff.is_empty() {
            self.emit(vec![MapEvent::VisibilityChanged { diff: diff.clone() }]);
        }
    }

    /// Read engine state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&MapEngine) -> R) -> R {
        let engine = self.engine.lock();
        f(&engine)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Run one load cycle for `bounds`: both viewport queries, then the
    /// missing-match resolution if the both-loaded edge fired.
    pub async fn load_viewport(&self, bounds: BoundingBox) -> LoadReport {
        let (cycle, events) = self.engine.lock().begin_load(bounds);
        self.emit(events);

        let mut report = LoadReport::new(cycle);
        let mut resolution = None;

        let backend = Arc::clone(&self.backend);
        let knowledge = backend.knowledge_in_bounds(bounds);
        let geo = backend.geo_in_bounds(bounds);
        tokio::pin!(knowledge);
        tokio::pin!(geo);

        let mut knowledge_done = false;
        let mut geo_done = false;
        while !(knowledge_done && geo_done) {
            tokio::select! {
                result = &mut knowledge, if !knowledge_done => {
                    knowledge_done = true;
                    if let Ok(page) = &result {
                        report.knowledge_items = page.items.len();
                    }
                    let step = self.engine.lock().apply_knowledge(cycle, result);
                    if let Some(request) = self.absorb(step, &mut report) {
                        resolution = Some(request);
                    }
                }
                result = &mut geo, if !geo_done => {
                    geo_done = true;
                    if let Ok(page) = &result {
                        report.geo_objects = page.objects.len();
                    }
                    let step = self.engine.lock().apply_geo(cycle, result);
                    if let Some(request) = self.absorb(step, &mut report) {
                        resolution = Some(request);
                    }
                }
            }
        }

        if let Some(request) = resolution {
            self.resolve(&request, &mut report).await;
        }

        info!(
            %cycle,
            items = report.knowledge_items,
            objects = report.geo_objects,
            resolved = report.resolved.len(),
            failures = report.failures.len(),
            "viewport load finished"
        );
        report
    }

    /// Load the configured default viewport.
    pub async fn load_default(&self) -> LoadReport {
        let bounds = self.read(|engine| engine.config().default_bounds);
        self.load_viewport(bounds).await
    }

    async fn resolve(&self, request: &ResolutionRequest, report: &mut LoadReport) {
        let result = self
            .backend
            .knowledge_by_ids(&request.ids, request.center)
            .await;
        let step = self.engine.lock().apply_resolution(request, result);
        if let Some(outcome) = &step.outcome {
            report.resolved = outcome.resolved.clone();
        }
        self.absorb(step, report);
    }

    fn absorb(&self, step: Step, report: &mut LoadReport) -> Option<ResolutionRequest> {
        report.both_loaded |= step.both_loaded;
        if let Some(error) = step.error {
            report.failures.push(error);
        }
        self.emit(step.events);
        step.resolution
    }

    // ========================================================================
    // Filter selection
    // ========================================================================

    pub fn set_selection(&self, selection: FilterSelection) -> VisibilityDiff {
        let diff = self.engine.lock().set_selection(selection);
        self.emit_diff(&diff);
        diff
    }

    pub fn select_only_type(&self, type_id: impl Into<TypeId>) -> VisibilityDiff {
        let diff = self.engine.lock().select_only_type(type_id.into());
        self.emit_diff(&diff);
        diff
    }

    pub fn select_all_types(&self) -> VisibilityDiff {
        let diff = self.engine.lock().select_all_types();
        self.emit_diff(&diff);
        diff
    }

    pub fn toggle_type(&self, type_id: impl Into<TypeId>) -> VisibilityDiff {
        let diff = self.engine.lock().toggle_type(&type_id.into());
        self.emit_diff(&diff);
        diff
    }

    pub fn set_show_linked(&self, show: bool) -> VisibilityDiff {
        let diff = self.engine.lock().set_show_linked(show);
        self.emit_diff(&diff);
        diff
    }

    pub fn set_show_unlinked(&self, show: bool) -> VisibilityDiff {
        let diff = self.engine.lock().set_show_unlinked(show);
        self.emit_diff(&diff);
        diff
    }

    // ========================================================================
    // Detail
    // ========================================================================

    /// Focus `id` and run its tags then candidates lookups. Returns the
    /// detail state the lookups produced, or why they were not applied:
    /// [`EngineError::StaleResponse`] when another focus overtook this one.
    ///
    /// Focusing the entity that is already open is a no-op and returns the
    /// current state without new lookups.
    pub async fn open_detail(&self, id: impl Into<EntityId>) -> Result<DetailState> {
        let focused = self.engine.lock().focus(id.into());
        let (outcome, events) = focused?;
        self.emit(events);

        let ticket = match outcome {
            FocusOutcome::Opened(ticket) => ticket,
            FocusOutcome::Unchanged(ticket) => {
                debug!(id = %ticket.id, "detail already open");
                return Ok(self.detail_state());
            }
        };

        let backend = Arc::clone(&self.backend);
        let tags = backend.entity_tags(&ticket.id).await;
        let applied = self.engine.lock().apply_tags(&ticket, tags);
        self.emit(self.settle(applied)?);

        let bounds = self.read(MapEngine::detail_bounds);
        let candidates = backend.nearby_candidates(&ticket.id, bounds).await;
        let applied = self.engine.lock().apply_candidates(&ticket, candidates);
        self.emit(self.settle(applied)?);

        Ok(self.detail_state())
    }

    /// Surface a failed lookup as an event before handing the error back.
    fn settle(&self, applied: Result<Vec<MapEvent>>) -> Result<Vec<MapEvent>> {
        if let Err(EngineError::FetchFailure { query, source }) = &applied {
            self.emit(vec![MapEvent::FetchFailed {
                query: *query,
                message: source.to_string(),
            }]);
        }
        applied
    }

    pub fn close_detail(&self) -> Option<EntityId> {
        let events = self.engine.lock().close_detail();
        let closed = events.iter().find_map(|event| match event {
            MapEvent::DetailClosed { id } => Some(id.clone()),
            _ => None,
        });
        self.emit(events);
        closed
    }

    pub fn detail_state(&self) -> DetailState {
        self.read(|engine| engine.detail_state().clone())
    }

    // ========================================================================
    // Search and snapshots
    // ========================================================================

    /// Free-text place search. Blank queries never reach the backend.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.backend
            .search(query)
            .await
            .map_err(|source| EngineError::fetch(Query::Search, source))
    }

    pub fn facets(&self) -> Vec<TypeFacet> {
        self.read(MapEngine::facet_snapshot)
    }

    pub fn visible_ids(&self) -> Vec<EntityId> {
        self.read(MapEngine::visible_ids)
    }

    pub fn link_status(&self, id: impl Into<EntityId>) -> Option<LinkStatus> {
        let id = id.into();
        self.read(|engine| engine.link_status(&id))
    }

    pub fn summary(&self) -> LinkSummary {
        self.read(MapEngine::summary)
    }
}
