//! Backend contract: the queries the engine issues against the map service.
//!
//! The engine only depends on [`MapBackend`]. [`HttpBackend`] (feature
//! `http`) talks to the web API; [`MockBackend`] serves canned pages for
//! tests and demos.

use crate::error::FetchError;
use crate::types::{
    BoundingBox, CandidateList, EntityId, EntityTags, GeoRecord, KnowledgeRecord, LatLon,
    SearchHit, TypeFacetCount,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

#[cfg(feature = "http")]
pub use http::HttpBackend;
pub use mock::MockBackend;

/// Knowledge records plus the per-type counts that came with them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgePage {
    #[serde(default)]
    pub items: Vec<KnowledgeRecord>,
    #[serde(rename = "isa_count", default)]
    pub type_facets: Vec<TypeFacetCount>,
}

impl KnowledgePage {
    pub fn new(items: Vec<KnowledgeRecord>, type_facets: Vec<TypeFacetCount>) -> Self {
        Self { items, type_facets }
    }
}

/// Geographic objects that carry an item reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPage {
    #[serde(default)]
    pub objects: Vec<GeoRecord>,
}

impl GeoPage {
    pub fn new(objects: Vec<GeoRecord>) -> Self {
        Self { objects }
    }
}

/// Queries against the map service.
#[async_trait]
pub trait MapBackend: Send + Sync {
    /// Knowledge records with a coordinate inside `bounds`.
    async fn knowledge_in_bounds(&self, bounds: BoundingBox) -> Result<KnowledgePage, FetchError>;

    /// Knowledge records by id. `center` is the viewport centre the ids were
    /// found around.
    async fn knowledge_by_ids(
        &self,
        ids: &[EntityId],
        center: Option<LatLon>,
    ) -> Result<KnowledgePage, FetchError>;

    /// Geographic objects inside `bounds` that reference an item.
    async fn geo_in_bounds(&self, bounds: BoundingBox) -> Result<GeoPage, FetchError>;

    /// Tag/key list the item's types map to.
    async fn entity_tags(&self, id: &EntityId) -> Result<EntityTags, FetchError>;

    /// Geographic objects near the item that could be its match.
    async fn nearby_candidates(
        &self,
        id: &EntityId,
        bounds: BoundingBox,
    ) -> Result<CandidateList, FetchError>;

    /// Free-text place search.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, FetchError>;
}
