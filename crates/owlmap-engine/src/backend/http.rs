//! HTTP backend for the map web API.
//!
//! | query             | endpoint                                   |
//! |-------------------|--------------------------------------------|
//! | knowledge/bounds  | `GET api/1/items?bounds=w,s,e,n`           |
//! | knowledge/ids     | `GET api/1/missing?qids=Q1,Q2&lat=&lon=`   |
//! | geo/bounds        | `GET api/1/osm?bounds=w,s,e,n`             |
//! | tags              | `GET api/1/item/<qid>/tags`                |
//! | candidates        | `GET api/1/item/<qid>/candidates?bounds=`  |
//! | search            | `GET api/1/search?q=`                      |
//!
//! Replies that carry an `error` field are reported as
//! [`FetchError::Backend`] even when the HTTP status is 200.

use super::{GeoPage, KnowledgePage, MapBackend};
use crate::config::{BackendConfig, ConfigError};
use crate::error::FetchError;
use crate::types::{BoundingBox, CandidateList, EntityId, EntityTags, LatLon, SearchHit};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

#[derive(Deserialize)]
struct SearchReply {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, FetchError> {
        let mut url = self
            .config
            .endpoint(path)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        debug!(%url, "backend request");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            return Err(FetchError::Backend(error.to_string()));
        }

        serde_json::from_value(body).map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }
}

fn join_ids(ids: &[EntityId]) -> String {
    ids.iter()
        .map(EntityId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl MapBackend for HttpBackend {
    async fn knowledge_in_bounds(&self, bounds: BoundingBox) -> Result<KnowledgePage, FetchError> {
        let url = self.url("api/1/items", &[("bounds", bounds.to_bbox_string())])?;
        self.get_json(url).await
    }

    async fn knowledge_by_ids(
        &self,
        ids: &[EntityId],
        center: Option<LatLon>,
    ) -> Result<KnowledgePage, FetchError> {
        let mut params = vec![("qids", join_ids(ids))];
        if let Some(center) = center {
            params.push(("lat", center.lat.to_string()));
            params.push(("lon", center.lon.to_string()));
        }
        let url = self.url("api/1/missing", &params)?;
        self.get_json(url).await
    }

    async fn geo_in_bounds(&self, bounds: BoundingBox) -> Result<GeoPage, FetchError> {
        let url = self.url("api/1/osm", &[("bounds", bounds.to_bbox_string())])?;
        self.get_json(url).await
    }

    async fn entity_tags(&self, id: &EntityId) -> Result<EntityTags, FetchError> {
        let url = self.url(&format!("api/1/item/{id}/tags"), &[])?;
        self.get_json(url).await
    }

    async fn nearby_candidates(
        &self,
        id: &EntityId,
        bounds: BoundingBox,
    ) -> Result<CandidateList, FetchError> {
        let url = self.url(
            &format!("api/1/item/{id}/candidates"),
            &[("bounds", bounds.to_bbox_string())],
        )?;
        self.get_json(url).await
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, FetchError> {
        let url = self.url("api/1/search", &[("q", query.to_string())])?;
        let reply: SearchReply = self.get_json(url).await?;
        Ok(reply.hits)
    }
}
