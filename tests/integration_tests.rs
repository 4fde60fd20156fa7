//! Integration tests for the complete Termgraph pipeline
//!
//! These tests drive the core end to end:
//! - Stamps → Commit → Alias resolution
//! - Path DAG → Visibility → Contradictions
//! - Adjacency records → Builder → Tree
//!
//! Run with: cargo test --test integration_tests

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use roaring::RoaringBitmap;
use termgraph_core::{
    AssemblageIndex, CancelToken, CoreError, IdSource, NodeId, PathOrigins, Precedence, Premise,
    Progress, StampCoordinate, StampPool, StampPosition, StampSequence, Status, TaxonomyEdge,
    TaxonomyFlags, TaxonomyGraphBuilder, TaxonomyStore, Termgraph, TermgraphConfig,
    VisibilityCalculator,
};

const MAIN: NodeId = 1;
const ALL: NodeId = 1000;

fn termgraph() -> Termgraph {
    Termgraph::new(TermgraphConfig {
        spine_size: 32,
        ..TermgraphConfig::default()
    })
    .expect("valid config")
}

fn is_a(tg: &Termgraph, child: NodeId, parent: NodeId, stamp: StampSequence) {
    tg.assemblages().extend(ALL, [child, parent]);
    tg.store()
        .append_edge(child, TaxonomyEdge::new(parent, stamp, TaxonomyFlags::STATED))
        .expect("append edge");
}

fn latest_stated(tg: &Termgraph) -> termgraph_core::ManifoldCoordinate {
    tg.manifold(StampCoordinate::latest_on(MAIN), Premise::Stated, ALL)
}

fn bits(set: &RoaringBitmap) -> Vec<NodeId> {
    set.iter().collect()
}

// ============================================================================
// Taxonomy builds
// ============================================================================

#[test]
fn test_redundant_edge_is_pruned_without_cycles() {
    const A: NodeId = 10;
    const B: NodeId = 11;
    const C: NodeId = 12;

    let tg = termgraph();
    let s = tg.pool().allocate_committed(Status::Active, 100, 1, 1, MAIN);
    is_a(&tg, A, B, s);
    is_a(&tg, B, C, s);
    is_a(&tg, A, C, s);

    let tree = tg.build(&latest_stated(&tg)).expect("build");
    assert_eq!(bits(&tree.parents_of(A)), vec![B]);
    assert_eq!(bits(&tree.parents_of(B)), vec![C]);
    assert!(tree.is_kind_of(A, C));
    assert!(!tree.has_cycles());
    assert_eq!(tree.redundant_edges_removed(), 1);
    assert_eq!(bits(&tree.roots()), vec![C]);
}

#[test]
fn test_cycle_is_reported_and_tree_still_returned() {
    const A: NodeId = 10;
    const B: NodeId = 11;
    const C: NodeId = 12;

    let tg = termgraph();
    let s = tg.pool().allocate_committed(Status::Active, 100, 1, 1, MAIN);
    is_a(&tg, A, B, s);
    is_a(&tg, B, C, s);
    is_a(&tg, A, C, s);
    is_a(&tg, B, A, s);

    let tree = tg.build(&latest_stated(&tg)).expect("best-effort tree");
    assert!(tree.has_cycles());
    let cycle: BTreeSet<NodeId> = tree.cycles()[0].iter().copied().collect();
    assert_eq!(cycle, BTreeSet::from([A, B]));
    assert!(tree.ancestors_of(A).contains(C));
    assert!(tree.contains(C));
}

#[test]
fn test_retired_edge_disappears_from_later_trees() {
    let tg = termgraph();
    let added = tg.pool().allocate_committed(Status::Active, 100, 1, 1, MAIN);
    let retired = tg.pool().allocate_committed(Status::Inactive, 200, 1, 1, MAIN);
    is_a(&tg, 2, 1, added);
    is_a(&tg, 2, 1, retired);

    let before = tg.manifold(
        StampCoordinate::new(vec![StampPosition::new(MAIN, 150)]),
        Premise::Stated,
        ALL,
    );
    assert_eq!(bits(&tg.build(&before).unwrap().parents_of(2)), vec![1]);
    assert!(tg.build(&latest_stated(&tg)).unwrap().parents_of(2).is_empty());
}

#[test]
fn test_malformed_record_is_a_data_integrity_error() {
    let tg = termgraph();
    tg.assemblages().add(ALL, 5);
    // destination 1, packed word with the sign bit set
    let mut bytes = 1u32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&0x8100_0001u32.to_le_bytes());
    tg.store().put_raw(5, &bytes).expect("raw bytes are accepted as-is");

    let err = tg.build(&latest_stated(&tg)).unwrap_err();
    assert!(matches!(err, CoreError::DataIntegrity { node: 5, .. }));
}

#[test]
fn test_canceled_build_returns_no_tree() {
    let tg = termgraph();
    let s = tg.pool().allocate_committed(Status::Active, 100, 1, 1, MAIN);
    for child in 2..50 {
        is_a(&tg, child, 1, s);
    }
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = tg
        .builder()
        .build_with(&latest_stated(&tg), &cancel, &Progress::new());
    assert_eq!(result.unwrap_err(), CoreError::Canceled);
}

#[test]
fn test_concurrent_loaders_then_build() {
    let tg = termgraph();
    let s = tg.pool().allocate_committed(Status::Active, 100, 1, 1, MAIN);

    (2..2000u32).into_par_iter().for_each(|child| {
        is_a(&tg, child, 1, s);
        is_a(&tg, child, child / 2, s);
    });

    let tree = tg.build(&latest_stated(&tg)).expect("build");
    assert_eq!(tree.nodes().len(), 1999);
    // every node reaches the root through its halving chain
    assert!(tree.is_kind_of(1999, 1));
    assert!(tree.is_kind_of(1024, 1));
    // the direct edge to the root survives only where halving lands on it
    assert_eq!(bits(&tree.parents_of(3)), vec![1]);
    assert_eq!(bits(&tree.parents_of(10)), vec![5]);
    assert!(!tree.has_cycles());
}

/// Writes one edge into the store the first time it is enumerated.
struct MeddlingIds {
    inner: AssemblageIndex,
    store: Arc<TaxonomyStore>,
    stamp: StampSequence,
    meddled: AtomicBool,
    calls: AtomicUsize,
}

impl IdSource for MeddlingIds {
    fn ids_for_assemblage(&self, assemblage: NodeId) -> Box<dyn Iterator<Item = NodeId> + '_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.meddled.swap(true, Ordering::SeqCst) {
            self.store
                .append_edge(3, TaxonomyEdge::new(1, self.stamp, TaxonomyFlags::STATED))
                .expect("append during scan");
        }
        self.inner.ids_for_assemblage(assemblage)
    }
}

#[test]
fn test_concurrent_write_forces_one_locked_rescan() {
    let pool = Arc::new(StampPool::new());
    let origins = Arc::new(PathOrigins::new());
    let store = Arc::new(TaxonomyStore::new());
    let stamp = pool.allocate_committed(Status::Active, 10, 1, 1, MAIN);
    store
        .append_edge(2, TaxonomyEdge::new(1, stamp, TaxonomyFlags::STATED))
        .unwrap();

    let inner = AssemblageIndex::new();
    inner.extend(ALL, [1, 2, 3]);
    let ids = Arc::new(MeddlingIds {
        inner,
        store: store.clone(),
        stamp,
        meddled: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });

    let calculator = Arc::new(VisibilityCalculator::new(pool, origins));
    let builder = TaxonomyGraphBuilder::new(store, calculator, ids.clone());
    let manifold = termgraph_core::ManifoldCoordinate::new(
        StampCoordinate::latest_on(MAIN),
        Premise::Stated,
        ALL,
    );

    let tree = builder.build(&manifold).expect("build");
    assert_eq!(ids.calls.load(Ordering::SeqCst), 2);
    assert_eq!(bits(&tree.children_of(1)), vec![2, 3]);
}

#[test]
fn test_build_completes_while_pool_hosted_writers_contend() {
    let tg = Arc::new(termgraph());
    let s = tg.pool().allocate_committed(Status::Active, 100, 1, 1, MAIN);
    for child in 2..2000 {
        is_a(&tg, child, 1, s);
    }

    // occupy every pool worker with writers queued on the store's write lock
    let writers = rayon::current_num_threads();
    let (done_tx, done_rx) = mpsc::channel();
    for w in 0..writers {
        let tg = Arc::clone(&tg);
        let done_tx = done_tx.clone();
        rayon::spawn(move || {
            for i in 0..500u32 {
                let child = 2 + (i * 7 + w as u32) % 1998;
                is_a(&tg, child, child / 2, s);
            }
            let _ = done_tx.send(());
        });
    }

    let (tx, rx) = mpsc::channel();
    let builder = Arc::clone(&tg);
    thread::spawn(move || {
        let _ = tx.send(builder.build(&latest_stated(&builder)));
    });

    let tree = rx
        .recv_timeout(Duration::from_secs(60))
        .expect("build finished")
        .expect("build succeeded");
    assert_eq!(tree.nodes().len(), 1999);
    assert!(tree.is_kind_of(1999, 1));
    for _ in 0..writers {
        done_rx
            .recv_timeout(Duration::from_secs(60))
            .expect("writer finished");
    }
}

// ============================================================================
// Stamps, commits and visibility
// ============================================================================

#[test]
fn test_commit_aliases_resolve_to_the_same_stamp() {
    let tg = termgraph();
    let rx = tg.commits().subscribe();
    let draft = tg.pool().allocate_uncommitted(Status::Active, 7, 8, MAIN);

    let record = tg
        .commits()
        .commit(&BTreeSet::from([draft]), 500, "promote")
        .expect("commit");
    let committed = record.aliases[&draft];

    assert_eq!(
        tg.pool().resolve(draft).unwrap(),
        tg.pool().resolve(committed).unwrap()
    );
    assert_eq!(tg.pool().resolve(committed).unwrap().time, 500);
    assert_eq!(rx.recv().unwrap().comment, "promote");

    let again = tg.commits().commit(&BTreeSet::from([draft]), 600, "");
    assert!(matches!(
        again,
        Err(CoreError::InvalidStampTransition { .. })
    ));
}

#[test]
fn test_cutoff_hides_later_versions() {
    let tg = termgraph();
    let early = tg.pool().allocate_committed(Status::Active, 10, 1, 1, MAIN);
    let late = tg.pool().allocate_committed(Status::Active, 30, 1, 1, MAIN);

    let coordinate = StampCoordinate::new(vec![StampPosition::new(MAIN, 20)]);
    let visible = tg
        .calculator()
        .compute_visible([early, late], &coordinate)
        .unwrap();
    assert_eq!(visible.visible, vec![early]);
    assert!(!visible.is_contradicted());
}

#[test]
fn test_equal_paths_at_the_same_time_contradict() {
    const LEFT: NodeId = 2;
    const RIGHT: NodeId = 3;

    let tg = termgraph();
    let a = tg.pool().allocate_committed(Status::Active, 40, 1, 1, LEFT);
    let b = tg.pool().allocate_committed(Status::Active, 40, 2, 1, RIGHT);
    let coordinate = StampCoordinate::new(vec![
        StampPosition::new(LEFT, 100),
        StampPosition::new(RIGHT, 100),
    ]);

    let visible = tg.calculator().compute_visible([a, b], &coordinate).unwrap();
    assert_eq!(visible.contradictions, vec![BTreeSet::from([a, b])]);

    let ordered = coordinate.with_precedence(Precedence::Path);
    let visible = tg.calculator().compute_visible([a, b], &ordered).unwrap();
    assert_eq!(visible.visible, vec![a]);
    assert!(!visible.is_contradicted());
}

#[test]
fn test_branch_sees_parent_history_up_to_its_origin() {
    const DEV: NodeId = 2;

    let tg = termgraph();
    tg.origins().add_origin(DEV, StampPosition::new(MAIN, 50));
    let before_branch = tg.pool().allocate_committed(Status::Active, 40, 1, 1, MAIN);
    let after_branch = tg.pool().allocate_committed(Status::Inactive, 60, 1, 1, MAIN);

    let on_dev = StampCoordinate::latest_on(DEV).with_statuses([Status::Active, Status::Inactive]);
    let visible = tg
        .calculator()
        .compute_visible([before_branch, after_branch], &on_dev)
        .unwrap();
    assert_eq!(visible.latest(), Some(before_branch));
}
