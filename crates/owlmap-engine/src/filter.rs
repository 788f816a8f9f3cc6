//! Visibility filtering: type facets combined with link-status toggles.
//!
//! [`is_visible`] is a pure function of the entity and the selection.
//! [`FilterEngine`] remembers the last visible set so the renderer can be
//! handed a diff instead of a full redraw.

use crate::index::{Entity, EntityIndex, LinkStatus};
use crate::types::{EntityId, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

// ============================================================================
// Selection
// ============================================================================

/// Which type facets are ticked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeSelection {
    /// Every type, including ones first seen later in the session.
    All,
    /// Exactly these types.
    Only(BTreeSet<TypeId>),
}

impl TypeSelection {
    pub fn selects(&self, type_id: &TypeId) -> bool {
        match self {
            TypeSelection::All => true,
            TypeSelection::Only(set) => set.contains(type_id),
        }
    }
}

/// The user's current filter choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub types: TypeSelection,
    pub show_linked: bool,
    pub show_unlinked: bool,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            types: TypeSelection::All,
            show_linked: true,
            show_unlinked: true,
        }
    }
}

impl FilterSelection {
    pub fn with_types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeId>,
    {
        Self {
            types: TypeSelection::Only(types.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Both link toggles off: nothing is shown at all.
    pub fn is_master_off(&self) -> bool {
        !self.show_linked && !self.show_unlinked
    }

    /// Tick a single type and untick the rest.
    pub fn select_only(&mut self, type_id: TypeId) {
        self.types = TypeSelection::Only(BTreeSet::from([type_id]));
    }

    pub fn select_all(&mut self) {
        self.types = TypeSelection::All;
    }

    /// Flip one type. Leaving "all" mode keeps every other type in `known`
    /// ticked.
    pub fn toggle(&mut self, type_id: &TypeId, known: &[TypeId]) {
        match &mut self.types {
            TypeSelection::All => {
                let rest = known.iter().filter(|t| *t != type_id).cloned().collect();
                self.types = TypeSelection::Only(rest);
            }
            TypeSelection::Only(set) => {
                if !set.remove(type_id) {
                    set.insert(type_id.clone());
                }
            }
        }
    }
}

// ============================================================================
// Visibility rule
// ============================================================================

pub fn is_visible(entity: &Entity, selection: &FilterSelection) -> bool {
    if selection.is_master_off() {
        return false;
    }

    let status = entity.link_status();
    if entity.has_geo() && status == LinkStatus::Linked && !selection.show_linked {
        return false;
    }
    if !entity.has_geo() && !selection.show_unlinked {
        return false;
    }

    match entity.type_list() {
        Some(types) => types.iter().any(|t| selection.types.selects(t)),
        None => false,
    }
}

/// Every visible id, sorted.
pub fn visible_set(index: &EntityIndex, selection: &FilterSelection) -> BTreeSet<EntityId> {
    index
        .iter()
        .filter(|e| is_visible(e, selection))
        .map(|e| e.id().clone())
        .collect()
}

// ============================================================================
// Diffing engine
// ============================================================================

/// Ids that entered and left the visible set, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityDiff {
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

impl VisibilityDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct FilterEngine {
    visible: HashSet<EntityId>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shown(&self, id: &EntityId) -> bool {
        self.visible.contains(id)
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Currently shown ids, sorted.
    pub fn visible_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.visible.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Recompute from scratch and return what changed since the last call.
    pub fn recompute(&mut self, index: &EntityIndex, selection: &FilterSelection) -> VisibilityDiff {
        let next = visible_set(index, selection);

        let mut removed: Vec<EntityId> = self
            .visible
            .iter()
            .filter(|id| !next.contains(*id))
            .cloned()
            .collect();
        removed.sort();
        let added: Vec<EntityId> = next
            .iter()
            .filter(|id| !self.visible.contains(*id))
            .cloned()
            .collect();

        self.visible = next.into_iter().collect();
        VisibilityDiff { added, removed }
    }
}
