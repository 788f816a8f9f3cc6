//! Error types.
//!
//! None of these are fatal to a session: a failed fetch leaves the index and
//! facets as they were, a stale response is dropped, and an unknown focus
//! target leaves the detail session untouched.

use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The backend queries the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Query {
    KnowledgeInBounds,
    KnowledgeById,
    GeoInBounds,
    Tags,
    Candidates,
    Search,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Query::KnowledgeInBounds => "knowledge-in-bounds",
            Query::KnowledgeById => "knowledge-by-id",
            Query::GeoInBounds => "geo-in-bounds",
            Query::Tags => "tags",
            Query::Candidates => "candidates",
            Query::Search => "search",
        };
        f.write_str(name)
    }
}

/// A backend query that did not produce a usable response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("{query} query failed: {source}")]
    FetchFailure {
        query: Query,
        #[source]
        source: FetchError,
    },
    #[error("Stale response for {id} (epoch {epoch}, current {current})")]
    StaleResponse {
        id: EntityId,
        epoch: u64,
        current: u64,
    },
    #[error("No knowledge record for {0}")]
    UnknownFocusTarget(EntityId),
}

impl EngineError {
    pub fn fetch(query: Query, source: FetchError) -> Self {
        EngineError::FetchFailure { query, source }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, EngineError::StaleResponse { .. })
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
