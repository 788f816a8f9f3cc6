//! Detail session: the single focused entity and its candidate list.
//!
//! ```text
//!            focus(id)                 tags ok         candidates ok
//!   Closed ───────────► Open(id) ──────────────► Open(id, tags) ──────► OpenWithCandidates
//!      ▲                   │ │                                            ▲       │
//!      │                   │ └──────────── candidates ok ─────────────────┘       │ tags ok:
//!      │                   │  focus(other): epoch+1, Open(other)                  │ re-mark presets
//!      └──── close() ──────┘
//! ```
//!
//! Every focus change and close bumps the epoch. A lookup is issued with a
//! [`FocusTicket`] carrying the epoch it was issued under, and its response
//! is applied only while that epoch is still current. The last focus issued
//! wins, whatever order the replies arrive in.

use crate::error::{EngineError, Result};
use crate::index::EntityIndex;
use crate::types::{Candidate, CandidateList, EntityId, EntityTags};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identifies the focus a lookup was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusTicket {
    pub id: EntityId,
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetailState {
    Closed,
    Open {
        id: EntityId,
        /// Tag/key list once the tags lookup has landed.
        tags: Option<Vec<String>>,
    },
    OpenWithCandidates {
        id: EntityId,
        tags: Vec<String>,
        /// Ascending by supplied distance.
        candidates: Vec<Candidate>,
    },
}

impl DetailState {
    pub fn focused(&self) -> Option<&EntityId> {
        match self {
            DetailState::Closed => None,
            DetailState::Open { id, .. } | DetailState::OpenWithCandidates { id, .. } => Some(id),
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        match self {
            DetailState::OpenWithCandidates { candidates, .. } => candidates,
            _ => &[],
        }
    }

    pub fn tags(&self) -> Option<&[String]> {
        match self {
            DetailState::Closed => None,
            DetailState::Open { tags, .. } => tags.as_deref(),
            DetailState::OpenWithCandidates { tags, .. } => Some(tags),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusOutcome {
    /// Focus moved; lookups should be issued with the ticket.
    Opened(FocusTicket),
    /// Already focused on this id; nothing changed.
    Unchanged(FocusTicket),
}

impl FocusOutcome {
    pub fn ticket(&self) -> &FocusTicket {
        match self {
            FocusOutcome::Opened(t) | FocusOutcome::Unchanged(t) => t,
        }
    }
}

#[derive(Debug)]
pub struct DetailSession {
    state: DetailState,
    epoch: u64,
}

impl Default for DetailSession {
    fn default() -> Self {
        Self {
            state: DetailState::Closed,
            epoch: 0,
        }
    }
}

impl DetailSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DetailState {
        &self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn focused(&self) -> Option<&EntityId> {
        self.state.focused()
    }

    pub fn is_current(&self, ticket: &FocusTicket) -> bool {
        ticket.epoch == self.epoch && self.focused() == Some(&ticket.id)
    }

    /// Focus an entity. Refused, with the session left as it was, when the
    /// entity has no knowledge record.
    pub fn focus(&mut self, id: EntityId, index: &EntityIndex) -> Result<FocusOutcome> {
        if !index.has_knowledge(&id) {
            warn!(%id, "focus refused: no knowledge record");
            return Err(EngineError::UnknownFocusTarget(id));
        }

        if self.focused() == Some(&id) {
            return Ok(FocusOutcome::Unchanged(FocusTicket {
                id,
                epoch: self.epoch,
            }));
        }

        self.epoch += 1;
        self.state = DetailState::Open {
            id: id.clone(),
            tags: None,
        };
        debug!(%id, epoch = self.epoch, "detail opened");
        Ok(FocusOutcome::Opened(FocusTicket {
            id,
            epoch: self.epoch,
        }))
    }

    /// Close the session. Returns the id that was focused, if any.
    pub fn close(&mut self) -> Option<EntityId> {
        let previous = match std::mem::replace(&mut self.state, DetailState::Closed) {
            DetailState::Closed => return None,
            DetailState::Open { id, .. } | DetailState::OpenWithCandidates { id, .. } => id,
        };
        self.epoch += 1;
        debug!(id = %previous, epoch = self.epoch, "detail closed");
        Some(previous)
    }

    fn check(&self, ticket: &FocusTicket, response_id: &EntityId) -> Result<()> {
        if self.is_current(ticket) && &ticket.id == response_id {
            return Ok(());
        }
        debug!(
            id = %response_id,
            epoch = ticket.epoch,
            current = self.epoch,
            "discarding stale detail response"
        );
        Err(EngineError::StaleResponse {
            id: response_id.clone(),
            epoch: ticket.epoch,
            current: self.epoch,
        })
    }

    /// Apply the tags lookup issued under `ticket`. Candidates already in
    /// place are kept and their matched presets re-marked.
    pub fn apply_tags(&mut self, ticket: &FocusTicket, response: EntityTags) -> Result<()> {
        self.check(ticket, &response.id)?;
        match &mut self.state {
            DetailState::OpenWithCandidates {
                tags, candidates, ..
            } => {
                *tags = response.tags;
                for candidate in candidates.iter_mut() {
                    mark_matched(candidate, tags);
                }
            }
            state => {
                *state = DetailState::Open {
                    id: response.id,
                    tags: Some(response.tags),
                }
            }
        }
        Ok(())
    }

    /// Apply the candidates lookup issued under `ticket`: drop candidates
    /// already linked to another entity, mark matched presets and order by
    /// distance.
    pub fn apply_candidates(
        &mut self,
        ticket: &FocusTicket,
        response: CandidateList,
        index: &EntityIndex,
    ) -> Result<&[Candidate]> {
        self.check(ticket, &response.id)?;

        let tags = self.state.tags().map(<[String]>::to_vec).unwrap_or_default();
        let candidates = rank_candidates(&response.id, response.candidates, &tags, index);

        self.state = DetailState::OpenWithCandidates {
            id: response.id,
            tags,
            candidates,
        };
        Ok(self.state.candidates())
    }
}

/// Order candidates ascending by the distance the backend supplied. The
/// sort is stable, so equal distances keep backend order.
pub fn rank_candidates(
    focus: &EntityId,
    candidates: Vec<Candidate>,
    tags: &[String],
    index: &EntityIndex,
) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| match index.owner_of_geo(&c.identifier) {
            Some(owner) => owner == focus,
            None => true,
        })
        .map(|mut c| {
            mark_matched(&mut c, tags);
            c
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    ranked
}

fn mark_matched(candidate: &mut Candidate, tags: &[String]) {
    candidate.matched_presets = candidate
        .presets
        .iter()
        .filter(|p| tags.iter().any(|t| p.is_matched_by(t)))
        .cloned()
        .collect();
}
