//! Load cycles and the "both loaded" edge.
//!
//! Every viewport load starts a new cycle with two independent completion
//! flags. The edge fires exactly once per cycle, when the second flag is set,
//! whichever source finished first. A failed fetch leaves its flag unset, so
//! a cycle with a failure never reaches the edge. Completions for an older
//! cycle never touch the current cycle's flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Monotonic load cycle number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleId(u64);

impl CycleId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two viewport sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Knowledge,
    Geo,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Knowledge => f.write_str("knowledge"),
            Source::Geo => f.write_str("geo"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    Pending,
    Loaded,
    Failed,
}

/// Result of reporting one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Flag recorded, still waiting on the other source.
    Waiting,
    /// This completion set the second flag.
    BothLoaded,
    /// Recorded as failed; the edge will not fire this cycle.
    Failed,
    /// Completion belongs to an older cycle, or was already reported.
    Stale,
}

#[derive(Debug)]
pub struct LoadCoordinator {
    cycle: u64,
    knowledge: SourceState,
    geo: SourceState,
    edge_fired: bool,
    resolution_done: bool,
}

impl Default for LoadCoordinator {
    fn default() -> Self {
        Self {
            cycle: 0,
            knowledge: SourceState::Pending,
            geo: SourceState::Pending,
            edge_fired: false,
            resolution_done: false,
        }
    }
}

impl LoadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new cycle, resetting both flags.
    pub fn begin(&mut self) -> CycleId {
        self.cycle += 1;
        self.knowledge = SourceState::Pending;
        self.geo = SourceState::Pending;
        self.edge_fired = false;
        self.resolution_done = false;
        debug!(cycle = self.cycle, "load cycle started");
        CycleId(self.cycle)
    }

    pub fn current(&self) -> CycleId {
        CycleId(self.cycle)
    }

    pub fn is_current(&self, cycle: CycleId) -> bool {
        cycle.0 == self.cycle && self.cycle > 0
    }

    pub fn state(&self, source: Source) -> SourceState {
        match source {
            Source::Knowledge => self.knowledge,
            Source::Geo => self.geo,
        }
    }

    pub fn both_loaded(&self) -> bool {
        self.knowledge == SourceState::Loaded && self.geo == SourceState::Loaded
    }

    /// Still waiting on at least one source of the current cycle.
    pub fn is_loading(&self) -> bool {
        self.cycle > 0 && !self.edge_fired
    }

    pub fn complete(&mut self, cycle: CycleId, source: Source, ok: bool) -> Completion {
        if !self.is_current(cycle) {
            debug!(%cycle, %source, "completion for an old cycle");
            return Completion::Stale;
        }

        let slot = match source {
            Source::Knowledge => &mut self.knowledge,
            Source::Geo => &mut self.geo,
        };
        if *slot != SourceState::Pending {
            return Completion::Stale;
        }

        if !ok {
            *slot = SourceState::Failed;
            return Completion::Failed;
        }
        *slot = SourceState::Loaded;

        if self.both_loaded() && !self.edge_fired {
            self.edge_fired = true;
            Completion::BothLoaded
        } else {
            Completion::Waiting
        }
    }

    /// Claim the cycle's single resolution pass. Returns `false` if it was
    /// already claimed, or the cycle is no longer current.
    pub fn claim_resolution(&mut self, cycle: CycleId) -> bool {
        if !self.is_current(cycle) || !self.edge_fired || self.resolution_done {
            return false;
        }
        self.resolution_done = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_fires_once_in_either_order() {
        for first in [Source::Knowledge, Source::Geo] {
            let second = match first {
                Source::Knowledge => Source::Geo,
                Source::Geo => Source::Knowledge,
            };
            let mut coordinator = LoadCoordinator::new();
            let cycle = coordinator.begin();
            assert!(coordinator.is_loading());
            assert_eq!(coordinator.complete(cycle, first, true), Completion::Waiting);
            assert_eq!(coordinator.complete(cycle, second, true), Completion::BothLoaded);
            assert_eq!(coordinator.complete(cycle, second, true), Completion::Stale);
            assert!(!coordinator.is_loading());
        }
    }

    #[test]
    fn test_failure_keeps_other_flag() {
        let mut coordinator = LoadCoordinator::new();
        let cycle = coordinator.begin();
        assert_eq!(coordinator.complete(cycle, Source::Geo, false), Completion::Failed);
        assert_eq!(
            coordinator.complete(cycle, Source::Knowledge, true),
            Completion::Waiting
        );
        assert_eq!(coordinator.state(Source::Knowledge), SourceState::Loaded);
        assert_eq!(coordinator.state(Source::Geo), SourceState::Failed);
        assert!(!coordinator.both_loaded());
        assert!(coordinator.is_loading());
    }

    #[test]
    fn test_old_cycle_is_stale() {
        let mut coordinator = LoadCoordinator::new();
        let old = coordinator.begin();
        let new = coordinator.begin();
        assert_eq!(coordinator.complete(old, Source::Geo, true), Completion::Stale);
        assert_eq!(coordinator.state(Source::Geo), SourceState::Pending);
        assert_eq!(coordinator.complete(new, Source::Geo, true), Completion::Waiting);
    }

    #[test]
    fn test_resolution_claimed_once() {
        let mut coordinator = LoadCoordinator::new();
        let cycle = coordinator.begin();
        assert!(!coordinator.claim_resolution(cycle));
        coordinator.complete(cycle, Source::Geo, true);
        coordinator.complete(cycle, Source::Knowledge, true);
        assert!(coordinator.claim_resolution(cycle));
        assert!(!coordinator.claim_resolution(cycle));
    }
}
