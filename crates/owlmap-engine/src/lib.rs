//! OWL Map engine: reconciles Wikidata items with OpenStreetMap objects.
//!
//! Two viewport queries feed one entity index keyed by item id. Entities
//! found only on the OpenStreetMap side are looked up by id once both
//! queries are in, and a filter layer decides what the map shows.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                            MapSession                              │
//! │                                                                    │
//! │   MapBackend ──► LoadCoordinator ──► EntityIndex ──► FilterEngine  │
//! │   (http/mock)         │                  │  │             │        │
//! │        ▲              │ both loaded      │  └─► Facet-    │ diffs  │
//! │        │              ▼                  │     Aggregator ▼        │
//! │        └──── MissingMatchResolver ◄──────┘           MapEvent ──►  │
//! │                                                                    │
//! │   DetailSession ── reads EntityIndex, epoch-guarded lookups        │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Link status
//! - **Linked**: item record and at least one geographic object
//! - **Unlinked**: item record, no geographic object
//! - **Orphaned**: geographic objects only, after both queries settled
//! - **GeoOnlyUnresolved**: geographic objects only, still loading
//!
//! [`MapEngine`] is the synchronous core; [`MapSession`] drives it against
//! a [`MapBackend`].

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod detail;
pub mod engine;
pub mod error;
pub mod facets;
pub mod filter;
pub mod index;
pub mod resolver;
pub mod session;
pub mod types;

#[cfg(feature = "http")]
pub use backend::HttpBackend;
pub use backend::{GeoPage, KnowledgePage, MapBackend, MockBackend};
pub use config::{BackendConfig, ConfigError, EngineConfig};
pub use coordinator::{CycleId, LoadCoordinator};
pub use detail::{DetailSession, DetailState, FocusTicket};
pub use engine::{MapEngine, MapEvent};
pub use error::{EngineError, FetchError, Query, Result};
pub use facets::{FacetAggregator, TypeFacet};
pub use filter::{is_visible, FilterEngine, FilterSelection, TypeSelection, VisibilityDiff};
pub use index::{Entity, EntityIndex, LinkStatus, LinkSummary, MarkerRole};
pub use resolver::{MissingMatchResolver, ResolutionOutcome, ResolutionRequest};
pub use session::{LoadReport, MapEventHandler, MapSession};
pub use types::{
    BoundingBox, Candidate, CandidateList, EntityId, EntityTags, GeoId, GeoRecord,
    KnowledgeRecord, LatLon, Preset, SearchHit, TypeFacetCount, TypeId,
};
