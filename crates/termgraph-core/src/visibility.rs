//! Visibility: which versions of a component a `StampCoordinate` can see.
//!
//! For every coordinate position the calculator precomputes a route: the set
//! of paths reachable through origin edges, each with the effective cutoff at
//! which it is still visible. Walking an origin edge replaces the cutoff with
//! the origin time, and an origin later than the current cutoff is not walked
//! at all:
//!
//! ```text
//!   position (dev, t=900)
//!     dev  ── origin @ 500 ──►  main        route: dev ≤ 900, main ≤ 500
//!      └──── origin @ 300 ──►  legacy ◄──┐  route: legacy ≤ 300 (best of both)
//!                        main ─ @ 200 ───┘
//! ```
//!
//! A path is revisited only when a strictly larger cutoff reaches it, which
//! keeps diamonds from double counting and terminates on misconfigured cycles.
//!
//! Among on-route versions the most recent ones win. An exact tie between
//! distinct stamps is a contradiction unless the coordinate uses `Path`
//! precedence and one stamp sits on a strictly earlier coordinate position.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ahash::AHashMap;

use crate::coordinate::{Precedence, StampCoordinate};
use crate::error::Result;
use crate::path::PathOrigins;
use crate::stamp::{Stamp, StampPool, StampSequence};
use crate::NodeId;

/// Result of a visibility computation for one component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleStamps {
    /// Latest visible versions, ascending by sequence.
    pub visible: Vec<StampSequence>,
    /// Groups of equally recent versions that could not be ordered.
    pub contradictions: Vec<BTreeSet<StampSequence>>,
}

impl VisibleStamps {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn is_contradicted(&self) -> bool {
        !self.contradictions.is_empty()
    }

    /// The single latest version, if the result is uncontradicted.
    pub fn latest(&self) -> Option<StampSequence> {
        match self.visible.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Per-coordinate routes, reusable across many components.
#[derive(Debug, Clone)]
pub struct RouteTable {
    coordinate: StampCoordinate,
    /// One entry per coordinate position: `path -> effective cutoff`.
    routes: Vec<AHashMap<NodeId, i64>>,
}

impl RouteTable {
    pub fn new(coordinate: &StampCoordinate, origins: &PathOrigins) -> Self {
        let routes = coordinate
            .positions()
            .iter()
            .map(|position| {
                let mut best: AHashMap<NodeId, i64> = AHashMap::new();
                let mut stack = vec![(position.path, position.time)];
                while let Some((path, cutoff)) = stack.pop() {
                    if best.get(&path).is_some_and(|&seen| seen >= cutoff) {
                        continue;
                    }
                    best.insert(path, cutoff);
                    for origin in origins.origins_of(path) {
                        if origin.time <= cutoff {
                            stack.push((origin.path, origin.time));
                        }
                    }
                }
                best
            })
            .collect();

        Self {
            coordinate: coordinate.clone(),
            routes,
        }
    }

    pub fn coordinate(&self) -> &StampCoordinate {
        &self.coordinate
    }

    /// Effective cutoff of `path` for the position at `index`.
    pub fn cutoff(&self, index: usize, path: NodeId) -> Option<i64> {
        self.routes.get(index)?.get(&path).copied()
    }

    /// Index of the first coordinate position whose route admits `stamp`.
    pub fn priority(&self, stamp: &Stamp) -> Option<usize> {
        if !self.coordinate.admits(stamp) {
            return None;
        }
        self.routes.iter().position(|route| {
            route
                .get(&stamp.path)
                .is_some_and(|&cutoff| stamp.time <= cutoff)
        })
    }

    pub fn is_on_route(&self, stamp: &Stamp) -> bool {
        self.priority(stamp).is_some()
    }

    /// Latest versions among already-resolved candidates.
    pub fn latest<I>(&self, candidates: I) -> VisibleStamps
    where
        I: IntoIterator<Item = (StampSequence, Stamp)>,
    {
        let mut best_time: Option<i64> = None;
        // sequence -> priority, for the versions at `best_time`
        let mut latest: BTreeMap<StampSequence, usize> = BTreeMap::new();

        for (seq, stamp) in candidates {
            let Some(priority) = self.priority(&stamp) else {
                continue;
            };
            match best_time {
                Some(t) if stamp.time < t => continue,
                Some(t) if stamp.time == t => {}
                _ => {
                    best_time = Some(stamp.time);
                    latest.clear();
                }
            }
            latest
                .entry(seq)
                .and_modify(|p| *p = (*p).min(priority))
                .or_insert(priority);
        }

        if latest.len() <= 1 {
            return VisibleStamps {
                visible: latest.into_keys().collect(),
                contradictions: Vec::new(),
            };
        }

        let tied: BTreeSet<StampSequence> = match self.coordinate.precedence() {
            Precedence::Time => latest.keys().copied().collect(),
            Precedence::Path => {
                let top = latest.values().copied().min().unwrap_or(0);
                latest
                    .iter()
                    .filter(|&(_, &p)| p == top)
                    .map(|(&s, _)| s)
                    .collect()
            }
        };

        if tied.len() == 1 {
            VisibleStamps {
                visible: tied.into_iter().collect(),
                contradictions: Vec::new(),
            }
        } else {
            VisibleStamps {
                visible: tied.iter().copied().collect(),
                contradictions: vec![tied],
            }
        }
    }
}

/// Resolves candidate stamps against the pool and a coordinate's routes.
pub struct VisibilityCalculator {
    pool: Arc<StampPool>,
    origins: Arc<PathOrigins>,
}

impl VisibilityCalculator {
    pub fn new(pool: Arc<StampPool>, origins: Arc<PathOrigins>) -> Self {
        Self { pool, origins }
    }

    pub fn pool(&self) -> &Arc<StampPool> {
        &self.pool
    }

    pub fn route_table(&self, coordinate: &StampCoordinate) -> RouteTable {
        RouteTable::new(coordinate, &self.origins)
    }

    /// Resolve candidates through their aliases, deduplicating on the
    /// canonical sequence.
    pub fn resolve_all<I>(&self, candidates: I) -> Result<Vec<(StampSequence, Stamp)>>
    where
        I: IntoIterator<Item = StampSequence>,
    {
        let mut resolved: BTreeMap<StampSequence, Stamp> = BTreeMap::new();
        for seq in candidates {
            let (canonical, stamp) = self.pool.resolve_canonical(seq)?;
            resolved.insert(canonical, stamp);
        }
        Ok(resolved.into_iter().collect())
    }

    pub fn compute_visible<I>(
        &self,
        candidates: I,
        coordinate: &StampCoordinate,
    ) -> Result<VisibleStamps>
    where
        I: IntoIterator<Item = StampSequence>,
    {
        let table = self.route_table(coordinate);
        self.compute_with(&table, candidates)
    }

    pub fn compute_with<I>(&self, table: &RouteTable, candidates: I) -> Result<VisibleStamps>
    where
        I: IntoIterator<Item = StampSequence>,
    {
        Ok(table.latest(self.resolve_all(candidates)?))
    }

    /// Every on-route version, oldest first (ties ordered by sequence).
    pub fn on_route<I>(
        &self,
        candidates: I,
        coordinate: &StampCoordinate,
    ) -> Result<Vec<StampSequence>>
    where
        I: IntoIterator<Item = StampSequence>,
    {
        let table = self.route_table(coordinate);
        let mut history: Vec<(i64, StampSequence)> = self
            .resolve_all(candidates)?
            .into_iter()
            .filter(|(_, stamp)| table.is_on_route(stamp))
            .map(|(seq, stamp)| (stamp.time, seq))
            .collect();
        history.sort_unstable();
        Ok(history.into_iter().map(|(_, seq)| seq).collect())
    }
}
