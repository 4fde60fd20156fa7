//! Tree: an immutable hierarchy snapshot for one manifold coordinate.
//!
//! Edges point from a concept to its parents. The builder has already removed
//! redundant edges; cycles, contradictions and retired concepts are carried as
//! diagnostics so damaged data stays inspectable.

use std::collections::{BTreeSet, VecDeque};

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::coordinate::ManifoldCoordinate;
use crate::stamp::StampSequence;
use crate::NodeId;

/// Equally recent versions of one edge (or of a concept's own status) that the
/// coordinate could not order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Contradiction {
    pub node: NodeId,
    /// `None` when the contradiction is on the concept status itself.
    pub destination: Option<NodeId>,
    pub stamps: BTreeSet<StampSequence>,
}

/// Counts for reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub nodes: u64,
    pub edges: u64,
    pub roots: u64,
    pub redundant_edges_removed: u64,
    pub cycles: usize,
    pub contradictions: usize,
    pub inactive_concepts: u64,
}

#[derive(Debug, Clone)]
pub struct Tree {
    coordinate: ManifoldCoordinate,
    nodes: RoaringBitmap,
    parents: AHashMap<NodeId, RoaringBitmap>,
    children: AHashMap<NodeId, RoaringBitmap>,
    cycles: Vec<Vec<NodeId>>,
    contradictions: Vec<Contradiction>,
    inactive: RoaringBitmap,
    redundant_edges_removed: u64,
}

impl Tree {
    pub(crate) fn new(
        coordinate: ManifoldCoordinate,
        nodes: RoaringBitmap,
        parents: AHashMap<NodeId, RoaringBitmap>,
        cycles: Vec<Vec<NodeId>>,
        mut contradictions: Vec<Contradiction>,
        inactive: RoaringBitmap,
        redundant_edges_removed: u64,
    ) -> Self {
        let mut children: AHashMap<NodeId, RoaringBitmap> = AHashMap::new();
        for (&child, ps) in &parents {
            for parent in ps {
                children.entry(parent).or_default().insert(child);
            }
        }
        contradictions.sort();
        Self {
            coordinate,
            nodes,
            parents,
            children,
            cycles,
            contradictions,
            inactive,
            redundant_edges_removed,
        }
    }

    pub fn coordinate(&self) -> &ManifoldCoordinate {
        &self.coordinate
    }

    pub fn nodes(&self) -> &RoaringBitmap {
        &self.nodes
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    pub fn parents_of(&self, node: NodeId) -> RoaringBitmap {
        self.parents.get(&node).cloned().unwrap_or_default()
    }

    pub fn children_of(&self, node: NodeId) -> RoaringBitmap {
        self.children.get(&node).cloned().unwrap_or_default()
    }

    /// Every node reachable through parent edges, excluding `node` itself.
    pub fn ancestors_of(&self, node: NodeId) -> RoaringBitmap {
        closure(&self.parents, node)
    }

    /// Every node reachable through child edges, excluding `node` itself.
    pub fn descendants_of(&self, node: NodeId) -> RoaringBitmap {
        closure(&self.children, node)
    }

    /// Reflexive subsumption test.
    pub fn is_kind_of(&self, child: NodeId, parent: NodeId) -> bool {
        child == parent || self.ancestors_of(child).contains(parent)
    }

    /// Nodes with no parents.
    pub fn roots(&self) -> RoaringBitmap {
        self.nodes
            .iter()
            .filter(|n| self.parents.get(n).map_or(true, RoaringBitmap::is_empty))
            .collect()
    }

    pub fn edge_count(&self) -> u64 {
        self.parents.values().map(RoaringBitmap::len).sum()
    }

    /// Detected cycles, each listed in traversal order.
    pub fn cycles(&self) -> &[Vec<NodeId>] {
        &self.cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    pub fn contradictions(&self) -> &[Contradiction] {
        &self.contradictions
    }

    /// Concepts whose latest visible status the coordinate does not allow.
    pub fn inactive_concepts(&self) -> &RoaringBitmap {
        &self.inactive
    }

    pub fn redundant_edges_removed(&self) -> u64 {
        self.redundant_edges_removed
    }

    pub fn summary(&self) -> TreeSummary {
        TreeSummary {
            nodes: self.nodes.len(),
            edges: self.edge_count(),
            roots: self.roots().len(),
            redundant_edges_removed: self.redundant_edges_removed,
            cycles: self.cycles.len(),
            contradictions: self.contradictions.len(),
            inactive_concepts: self.inactive.len(),
        }
    }
}

fn closure(edges: &AHashMap<NodeId, RoaringBitmap>, start: NodeId) -> RoaringBitmap {
    let mut seen = RoaringBitmap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let Some(next) = edges.get(&node) else {
            continue;
        };
        for n in next {
            if seen.insert(n) {
                queue.push_back(n);
            }
        }
    }
    seen.remove(start);
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::{Premise, StampCoordinate};

    fn tree(edges: &[(NodeId, NodeId)]) -> Tree {
        let mut parents: AHashMap<NodeId, RoaringBitmap> = AHashMap::new();
        let mut nodes = RoaringBitmap::new();
        for &(child, parent) in edges {
            parents.entry(child).or_default().insert(parent);
            nodes.insert(child);
            nodes.insert(parent);
        }
        let coordinate = ManifoldCoordinate::new(StampCoordinate::latest_on(1), Premise::Stated, 0);
        Tree::new(
            coordinate,
            nodes,
            parents,
            Vec::new(),
            Vec::new(),
            RoaringBitmap::new(),
            0,
        )
    }

    #[test]
    fn navigation_follows_parent_and_child_edges() {
        // 4 -> 2 -> 1, 3 -> 1
        let t = tree(&[(4, 2), (2, 1), (3, 1)]);

        assert_eq!(t.parents_of(4).iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(t.children_of(1).iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(t.ancestors_of(4).iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(t.descendants_of(1).iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(t.roots().iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(t.edge_count(), 3);

        assert!(t.is_kind_of(4, 1));
        assert!(t.is_kind_of(3, 3));
        assert!(!t.is_kind_of(3, 2));
        assert!(t.parents_of(99).is_empty());
    }

    #[test]
    fn closures_terminate_on_cycles() {
        let t = tree(&[(1, 2), (2, 3), (3, 1)]);
        assert_eq!(t.ancestors_of(1).iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(t.descendants_of(1).iter().collect::<Vec<_>>(), vec![2, 3]);
        assert!(t.roots().is_empty());
    }

    #[test]
    fn summary_counts() {
        let t = tree(&[(2, 1), (3, 1)]);
        let summary = t.summary();
        assert_eq!(summary.nodes, 3);
        assert_eq!(summary.edges, 2);
        assert_eq!(summary.roots, 1);
        assert_eq!(summary.cycles, 0);
    }
}
