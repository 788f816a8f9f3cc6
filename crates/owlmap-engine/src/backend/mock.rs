//! In-memory backend with canned responses.
//!
//! Records every request it receives, can fail chosen queries, and can
//! delay replies so tests control the order responses arrive in.

use super::{GeoPage, KnowledgePage, MapBackend};
use crate::error::{FetchError, Query};
use crate::types::{
    BoundingBox, Candidate, CandidateList, EntityId, EntityTags, KnowledgeRecord, LatLon,
    SearchHit, TypeFacetCount,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A request as the mock saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    KnowledgeInBounds(BoundingBox),
    KnowledgeByIds {
        ids: Vec<EntityId>,
        center: Option<LatLon>,
    },
    GeoInBounds(BoundingBox),
    Tags(EntityId),
    Candidates(EntityId, BoundingBox),
    Search(String),
}

impl RecordedRequest {
    pub fn query(&self) -> Query {
        match self {
            RecordedRequest::KnowledgeInBounds(_) => Query::KnowledgeInBounds,
            RecordedRequest::KnowledgeByIds { .. } => Query::KnowledgeById,
            RecordedRequest::GeoInBounds(_) => Query::GeoInBounds,
            RecordedRequest::Tags(_) => Query::Tags,
            RecordedRequest::Candidates(..) => Query::Candidates,
            RecordedRequest::Search(_) => Query::Search,
        }
    }
}

#[derive(Default)]
pub struct MockBackend {
    knowledge: KnowledgePage,
    geo: GeoPage,
    by_id: HashMap<EntityId, KnowledgeRecord>,
    by_id_facets: Vec<TypeFacetCount>,
    /// Returned from every by-id query whether asked for or not.
    over_return: Vec<KnowledgeRecord>,
    tags: HashMap<EntityId, Vec<String>>,
    candidates: HashMap<EntityId, Vec<Candidate>>,
    hits: Vec<SearchHit>,
    failing: HashSet<Query>,
    delays: HashMap<Query, Duration>,
    tag_delays: HashMap<EntityId, Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_knowledge(mut self, page: KnowledgePage) -> Self {
        self.knowledge = page;
        self
    }

    pub fn with_geo(mut self, page: GeoPage) -> Self {
        self.geo = page;
        self
    }

    /// Records served by id, with the facet labels that accompany them.
    pub fn with_by_id(mut self, records: Vec<KnowledgeRecord>, facets: Vec<TypeFacetCount>) -> Self {
        for record in records {
            self.by_id.insert(record.id.clone(), record);
        }
        self.by_id_facets = facets;
        self
    }

    pub fn with_over_return(mut self, record: KnowledgeRecord) -> Self {
        self.over_return.push(record);
        self
    }

    pub fn with_tags(mut self, id: impl Into<EntityId>, tags: &[&str]) -> Self {
        self.tags
            .insert(id.into(), tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_candidates(mut self, id: impl Into<EntityId>, candidates: Vec<Candidate>) -> Self {
        self.candidates.insert(id.into(), candidates);
        self
    }

    pub fn with_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn failing(mut self, query: Query) -> Self {
        self.failing.insert(query);
        self
    }

    pub fn delayed(mut self, query: Query, delay: Duration) -> Self {
        self.delays.insert(query, delay);
        self
    }

    /// Delay the tags reply for one item only.
    pub fn delayed_tags(mut self, id: impl Into<EntityId>, delay: Duration) -> Self {
        self.tag_delays.insert(id.into(), delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, query: Query) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.query() == query)
            .count()
    }

    async fn serve(&self, request: RecordedRequest) -> Result<(), FetchError> {
        let query = request.query();
        let extra = match &request {
            RecordedRequest::Tags(id) => self.tag_delays.get(id).copied(),
            _ => None,
        };
        self.requests.lock().push(request);

        if let Some(delay) = self.delays.get(&query).copied().or(extra) {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&query) {
            return Err(FetchError::Network(format!("mock {query} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl MapBackend for MockBackend {
    async fn knowledge_in_bounds(&self, bounds: BoundingBox) -> Result<KnowledgePage, FetchError> {
        self.serve(RecordedRequest::KnowledgeInBounds(bounds)).await?;
        Ok(self.knowledge.clone())
    }

    async fn knowledge_by_ids(
        &self,
        ids: &[EntityId],
        center: Option<LatLon>,
    ) -> Result<KnowledgePage, FetchError> {
        self.serve(RecordedRequest::KnowledgeByIds {
            ids: ids.to_vec(),
            center,
        })
        .await?;

        let mut items: Vec<KnowledgeRecord> = ids
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect();
        items.extend(self.over_return.iter().cloned());
        Ok(KnowledgePage::new(items, self.by_id_facets.clone()))
    }

    async fn geo_in_bounds(&self, bounds: BoundingBox) -> Result<GeoPage, FetchError> {
        self.serve(RecordedRequest::GeoInBounds(bounds)).await?;
        Ok(self.geo.clone())
    }

    async fn entity_tags(&self, id: &EntityId) -> Result<EntityTags, FetchError> {
        self.serve(RecordedRequest::Tags(id.clone())).await?;
        match self.tags.get(id) {
            Some(tags) => Ok(EntityTags {
                id: id.clone(),
                tags: tags.clone(),
            }),
            None => Err(FetchError::Backend(format!("item {id} doesn't exist"))),
        }
    }

    async fn nearby_candidates(
        &self,
        id: &EntityId,
        bounds: BoundingBox,
    ) -> Result<CandidateList, FetchError> {
        self.serve(RecordedRequest::Candidates(id.clone(), bounds))
            .await?;
        Ok(CandidateList {
            id: id.clone(),
            candidates: self.candidates.get(id).cloned().unwrap_or_default(),
            max_distance: None,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, FetchError> {
        self.serve(RecordedRequest::Search(query.to_string())).await?;
        Ok(self.hits.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_and_fails() {
        let backend = MockBackend::new()
            .with_tags("Q1", &["Tag:historic=castle"])
            .failing(Query::GeoInBounds);
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0);

        assert!(backend.geo_in_bounds(bounds).await.is_err());
        let tags = backend.entity_tags(&"Q1".into()).await.unwrap();
        assert_eq!(tags.tags, vec!["Tag:historic=castle".to_string()]);
        assert!(backend.entity_tags(&"Q2".into()).await.is_err());

        assert_eq!(backend.request_count(Query::Tags), 2);
        assert_eq!(backend.requests()[0], RecordedRequest::GeoInBounds(bounds));
    }

    #[tokio::test]
    async fn test_mock_by_id_over_returns() {
        let backend = MockBackend::new()
            .with_by_id(vec![KnowledgeRecord::new("Q2", "Mill")], vec![])
            .with_over_return(KnowledgeRecord::new("Q8", "Extra"));
        let page = backend
            .knowledge_by_ids(&["Q2".into(), "Q3".into()], None)
            .await
            .unwrap();
        let ids: Vec<&str> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Q2", "Q8"]);
    }
}
