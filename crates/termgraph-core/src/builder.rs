//! TaxonomyGraphBuilder: turns adjacency records into a `Tree` for one
//! manifold coordinate.
//!
//! Build phases:
//!
//! 1. take an optimistic token from the store's guard;
//! 2. enumerate the assemblage and take a handle on each member's record;
//! 3. validate the token, and if a writer got in, take the handles again
//!    once while holding the full read lock;
//! 4. decode the records in parallel, each worker folding into its own
//!    `PartialGraph` and partials merging by set union;
//! 5. drop redundant edges, then look for cycles.
//!
//! Progress is one unit per scanned node plus `cycle_budget_percent` extra for
//! the final pass. Cancellation is checked between nodes and surfaces as
//! `CoreError::Canceled`; no partial tree is ever returned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::assemblage::IdSource;
use crate::config::{TermgraphConfig, DEFAULT_CYCLE_BUDGET_PERCENT};
use crate::coordinate::{ManifoldCoordinate, Premise, StampCoordinate};
use crate::edge::TaxonomyFlags;
use crate::error::{CoreError, Result};
use crate::progress::{CancelToken, Progress};
use crate::record::AdjacencyRecord;
use crate::stamp::StampSequence;
use crate::taxonomy::TaxonomyStore;
use crate::tree::{Contradiction, Tree};
use crate::visibility::{RouteTable, VisibilityCalculator};
use crate::NodeId;

// ============================================================================
// Edge selection
// ============================================================================

/// Which flag combinations become hierarchy edges for a manifold.
#[derive(Debug, Clone, Copy)]
struct EdgeView {
    premise: TaxonomyFlags,
    include_sememe: bool,
    include_non_dl: bool,
}

impl EdgeView {
    fn for_manifold(manifold: &ManifoldCoordinate) -> Self {
        let premise = match manifold.premise {
            Premise::Stated => TaxonomyFlags::STATED,
            Premise::Inferred => TaxonomyFlags::INFERRED,
        };
        Self {
            premise,
            include_sememe: manifold.include_sememe,
            include_non_dl: manifold.include_non_dl,
        }
    }

    fn admits(&self, flags: TaxonomyFlags) -> bool {
        flags.contains(self.premise)
            && !flags.contains(TaxonomyFlags::CONCEPT_STATUS)
            && (self.include_sememe || !flags.contains(TaxonomyFlags::SEMEME))
            && (self.include_non_dl || !flags.contains(TaxonomyFlags::NON_DL_REL))
    }
}

// ============================================================================
// Partial graphs
// ============================================================================

#[derive(Debug, Default)]
struct PartialGraph {
    nodes: RoaringBitmap,
    parents: AHashMap<NodeId, RoaringBitmap>,
    inactive: RoaringBitmap,
    contradictions: Vec<Contradiction>,
}

impl PartialGraph {
    /// Set union; associative and commutative, so rayon may merge in any shape.
    fn merge(mut self, other: PartialGraph) -> PartialGraph {
        self.nodes |= other.nodes;
        for (node, parents) in other.parents {
            *self.parents.entry(node).or_default() |= parents;
        }
        self.inactive |= other.inactive;
        self.contradictions.extend(other.contradictions);
        self
    }
}

struct ScanContext<'a> {
    view: EdgeView,
    /// Routes of the manifold's coordinate with every non-canceled status
    /// allowed, so a retirement is seen as the latest version.
    routes: &'a RouteTable,
    /// The manifold's own coordinate, for the final status check.
    allowed: &'a StampCoordinate,
    assemblage: NodeId,
    cancel: &'a CancelToken,
    progress: &'a Progress,
}

/// Record handles taken for one scan, in enumeration order.
type Snapshot = Vec<(NodeId, Option<AdjacencyRecord>)>;

/// Latest-version outcome for one group of stamps.
struct Outcome {
    allowed: bool,
    contradiction: Option<BTreeSet<StampSequence>>,
}

// ============================================================================
// Builder
// ============================================================================

pub struct TaxonomyGraphBuilder {
    store: Arc<TaxonomyStore>,
    calculator: Arc<VisibilityCalculator>,
    ids: Arc<dyn IdSource>,
    cycle_budget_percent: u64,
}

impl TaxonomyGraphBuilder {
    pub fn new(
        store: Arc<TaxonomyStore>,
        calculator: Arc<VisibilityCalculator>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            store,
            calculator,
            ids,
            cycle_budget_percent: DEFAULT_CYCLE_BUDGET_PERCENT,
        }
    }

    pub fn with_config(mut self, config: &TermgraphConfig) -> Self {
        self.cycle_budget_percent = config.cycle_budget_percent;
        self
    }

    pub fn with_cycle_budget_percent(mut self, percent: u64) -> Self {
        self.cycle_budget_percent = percent;
        self
    }

    pub fn store(&self) -> &Arc<TaxonomyStore> {
        &self.store
    }

    pub fn build(&self, manifold: &ManifoldCoordinate) -> Result<Tree> {
        self.build_with(manifold, &CancelToken::new(), &Progress::new())
    }

    pub fn build_with(
        &self,
        manifold: &ManifoldCoordinate,
        cancel: &CancelToken,
        progress: &Progress,
    ) -> Result<Tree> {
        let started = Instant::now();
        let routes = self
            .calculator
            .route_table(&manifold.stamp.with_any_status());
        let ctx = ScanContext {
            view: EdgeView::for_manifold(manifold),
            routes: &routes,
            allowed: &manifold.stamp,
            assemblage: manifold.assemblage,
            cancel,
            progress,
        };

        let guard = self.store.guard();
        let snapshot = match guard.try_optimistic_read() {
            Some(token) => {
                let snapshot = self.snapshot(&ctx)?;
                if guard.validate(token) {
                    snapshot
                } else {
                    tracing::debug!(
                        assemblage = manifold.assemblage,
                        "taxonomy changed during optimistic scan; rescanning under read lock"
                    );
                    let _read = guard.read();
                    self.snapshot(&ctx)?
                }
            }
            None => {
                let _read = guard.read();
                self.snapshot(&ctx)?
            }
        };
        let graph = self.fold(&snapshot, &ctx)?;
        cancel.check()?;

        let PartialGraph {
            mut nodes,
            mut parents,
            inactive,
            contradictions,
        } = graph;
        for ps in parents.values() {
            nodes |= ps;
        }

        let reserve = progress.total().saturating_sub(progress.completed());
        let removed = remove_redundant_edges(&mut parents, cancel)?;
        progress.tick(reserve / 2);
        let cycles = find_cycles(&nodes, &parents, cancel)?;
        progress.finish();

        for cycle in &cycles {
            tracing::warn!(assemblage = manifold.assemblage, cycle = ?cycle, "cycle in taxonomy");
        }
        for c in &contradictions {
            tracing::warn!(
                node = c.node,
                destination = ?c.destination,
                stamps = ?c.stamps,
                "contradictory latest versions"
            );
        }

        let tree = Tree::new(
            manifold.clone(),
            nodes,
            parents,
            cycles,
            contradictions,
            inactive,
            removed,
        );
        let summary = tree.summary();
        tracing::info!(
            assemblage = manifold.assemblage,
            premise = ?manifold.premise,
            nodes = summary.nodes,
            edges = summary.edges,
            redundant = summary.redundant_edges_removed,
            cycles = summary.cycles,
            contradictions = summary.contradictions,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "taxonomy built"
        );
        Ok(tree)
    }

    /// Enumerate the assemblage and take a handle on each member's record.
    /// Restarts the enumeration and the progress budget, so a rescan starts
    /// from a clean slate. Never touches the rayon pool: its workers may be
    /// parked on the write lock while this runs under the read lock.
    fn snapshot(&self, ctx: &ScanContext<'_>) -> Result<Snapshot> {
        let ids: Vec<NodeId> = self.ids.ids_for_assemblage(ctx.assemblage).collect();
        ctx.progress
            .reset(progress_budget(ids.len() as u64, self.cycle_budget_percent));
        tracing::debug!(
            assemblage = ctx.assemblage,
            nodes = ids.len(),
            "scanning taxonomy records"
        );

        let mut snapshot = Vec::with_capacity(ids.len());
        for node in ids {
            ctx.cancel.check()?;
            snapshot.push((node, self.store.record(node)?));
        }
        Ok(snapshot)
    }

    /// Decode and resolve every snapshotted record in parallel, each worker
    /// folding into its own `PartialGraph`.
    fn fold(
        &self,
        snapshot: &[(NodeId, Option<AdjacencyRecord>)],
        ctx: &ScanContext<'_>,
    ) -> Result<PartialGraph> {
        snapshot
            .par_iter()
            .try_fold(PartialGraph::default, |mut graph, (node, record)| {
                ctx.cancel.check()?;
                self.scan_node(*node, record.as_ref(), ctx, &mut graph)?;
                ctx.progress.tick(1);
                Ok(graph)
            })
            .try_reduce(PartialGraph::default, |a, b| Ok(a.merge(b)))
    }

    fn scan_node(
        &self,
        node: NodeId,
        record: Option<&AdjacencyRecord>,
        ctx: &ScanContext<'_>,
        graph: &mut PartialGraph,
    ) -> Result<()> {
        graph.nodes.insert(node);
        let Some(record) = record else {
            return Ok(());
        };

        let mut by_parent: BTreeMap<NodeId, Vec<StampSequence>> = BTreeMap::new();
        let mut status: Vec<StampSequence> = Vec::new();
        for edge in record.decode(node)? {
            if edge.flags.contains(TaxonomyFlags::CONCEPT_STATUS) {
                if edge.destination == node {
                    status.push(edge.stamp);
                }
            } else if ctx.view.admits(edge.flags) {
                by_parent.entry(edge.destination).or_default().push(edge.stamp);
            }
        }

        if !status.is_empty() {
            let outcome = self.latest(node, status, ctx)?;
            if let Some(stamps) = outcome.contradiction {
                graph.contradictions.push(Contradiction {
                    node,
                    destination: None,
                    stamps,
                });
            }
            if !outcome.allowed {
                graph.inactive.insert(node);
            }
        }

        for (parent, stamps) in by_parent {
            let outcome = self.latest(node, stamps, ctx)?;
            if let Some(stamps) = outcome.contradiction {
                graph.contradictions.push(Contradiction {
                    node,
                    destination: Some(parent),
                    stamps,
                });
            }
            if outcome.allowed {
                graph.parents.entry(node).or_default().insert(parent);
            }
        }
        Ok(())
    }

    /// Resolve one group's stamps and decide whether its latest visible
    /// version has a status the coordinate allows. With a contradiction, any
    /// allowed member keeps the group.
    fn latest(
        &self,
        node: NodeId,
        stamps: Vec<StampSequence>,
        ctx: &ScanContext<'_>,
    ) -> Result<Outcome> {
        let resolved = self.calculator.resolve_all(stamps).map_err(|err| match err {
            CoreError::UnknownStamp(seq) => {
                CoreError::integrity(node, format!("edge references unknown {seq}"))
            }
            other => other,
        })?;
        let visible = ctx.routes.latest(resolved.iter().copied());
        let allowed = visible.visible.iter().any(|seq| {
            resolved
                .binary_search_by_key(seq, |(s, _)| *s)
                .is_ok_and(|i| ctx.allowed.allows_status(resolved[i].1.status))
        });
        Ok(Outcome {
            allowed,
            contradiction: visible.contradictions.into_iter().next(),
        })
    }
}

fn progress_budget(nodes: u64, cycle_budget_percent: u64) -> u64 {
    nodes + (nodes * cycle_budget_percent).div_ceil(100)
}

// ============================================================================
// Redundant edges
// ============================================================================

/// Remove every direct parent edge already implied by another parent.
///
/// Nodes are visited in ascending id order and each node's parents are tried
/// in descending id order against the parents still kept, so among parents
/// that imply each other (only possible through a cycle) the lowest id
/// survives. Reachability is never lost: an edge is only dropped while an
/// alternative route to its parent remains in the graph.
fn remove_redundant_edges(
    parents: &mut AHashMap<NodeId, RoaringBitmap>,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut order: Vec<NodeId> = parents
        .iter()
        .filter(|(_, ps)| ps.len() > 1)
        .map(|(&n, _)| n)
        .collect();
    order.sort_unstable();

    let mut removed = 0;
    for node in order {
        cancel.check()?;
        let candidates: Vec<NodeId> = match parents.get(&node) {
            Some(ps) => ps.iter().rev().collect(),
            None => continue,
        };
        for candidate in candidates {
            let others: Vec<NodeId> = match parents.get(&node) {
                Some(ps) => ps.iter().filter(|&p| p != candidate).collect(),
                None => continue,
            };
            if !others.is_empty() && reaches(parents, &others, candidate, node) {
                if let Some(ps) = parents.get_mut(&node) {
                    ps.remove(candidate);
                }
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Whether `target` is reachable from any of `starts` without passing
/// through `excluded`.
fn reaches(
    parents: &AHashMap<NodeId, RoaringBitmap>,
    starts: &[NodeId],
    target: NodeId,
    excluded: NodeId,
) -> bool {
    let mut seen = RoaringBitmap::new();
    seen.insert(excluded);
    let mut stack: Vec<NodeId> = starts.to_vec();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(ps) = parents.get(&node) {
            stack.extend(ps.iter().filter(|p| !seen.contains(*p)));
        }
    }
    false
}

// ============================================================================
// Cycles
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Done,
}

/// Iterative depth-first search over parent edges, roots taken in ascending
/// order. Each back edge yields one cycle, listed from its entry node.
fn find_cycles(
    nodes: &RoaringBitmap,
    parents: &AHashMap<NodeId, RoaringBitmap>,
    cancel: &CancelToken,
) -> Result<Vec<Vec<NodeId>>> {
    let mut marks: AHashMap<NodeId, Mark> = AHashMap::new();
    let mut cycles = Vec::new();

    for root in nodes {
        if marks.contains_key(&root) {
            continue;
        }
        cancel.check()?;

        let mut path: Vec<NodeId> = vec![root];
        let mut stack: Vec<(Vec<NodeId>, usize)> = vec![(successors(parents, root), 0)];
        marks.insert(root, Mark::Open);

        while let Some((next, cursor)) = stack.last_mut() {
            if let Some(&n) = next.get(*cursor) {
                *cursor += 1;
                match marks.get(&n) {
                    None => {
                        marks.insert(n, Mark::Open);
                        path.push(n);
                        stack.push((successors(parents, n), 0));
                    }
                    Some(Mark::Open) => {
                        if let Some(start) = path.iter().position(|&p| p == n) {
                            cycles.push(path[start..].to_vec());
                        }
                    }
                    Some(Mark::Done) => {}
                }
            } else {
                if let Some(done) = path.pop() {
                    marks.insert(done, Mark::Done);
                }
                stack.pop();
            }
        }
    }
    Ok(cycles)
}

fn successors(parents: &AHashMap<NodeId, RoaringBitmap>, node: NodeId) -> Vec<NodeId> {
    parents
        .get(&node)
        .map(|ps| ps.iter().collect())
        .unwrap_or_default()
}
