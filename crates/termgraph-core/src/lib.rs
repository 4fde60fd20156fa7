//! Termgraph: the concurrent versioning and taxonomy core of a bitemporal
//! terminology store.
//!
//! Every fact is a chain of stamped versions (status, time, author, module,
//! path). Consumers pick a point of view with a coordinate and get a
//! consistent slice of history:
//!
//! 1. **SpineStore**: growable, lock-minimal array keyed by dense node ids
//! 2. **StampPool / CommitLog**: stamps, commit-time aliasing, commit stream
//! 3. **VisibilityCalculator**: latest visible versions and contradictions
//!    over the path DAG
//! 4. **TaxonomyGraphBuilder**: flag-tagged adjacency records in, pruned and
//!    cycle-checked `Tree` snapshots out
//!
//! Collaborators (`StampPool`, `PathOrigins`, `IdSource`, ...) are passed in
//! explicitly. `Termgraph` wires a default set together from a
//! `TermgraphConfig`.

pub mod assemblage;
pub mod builder;
pub mod commit;
pub mod config;
pub mod coordinate;
pub mod edge;
pub mod error;
pub mod guard;
pub mod path;
pub mod progress;
pub mod record;
pub mod spine;
pub mod stamp;
pub mod taxonomy;
pub mod tree;
pub mod visibility;

use std::sync::Arc;

/// Dense component identifier, allocated outside this crate.
pub type NodeId = u32;

// Re-export key types
pub use assemblage::{AssemblageIndex, IdSource};
pub use builder::TaxonomyGraphBuilder;
pub use commit::{CommitLog, CommitRecord};
pub use config::TermgraphConfig;
pub use coordinate::{LanguageCoordinate, ManifoldCoordinate, Precedence, Premise, StampCoordinate};
pub use edge::{TaxonomyEdge, TaxonomyFlags};
pub use error::{CoreError, Result};
pub use guard::VersionedGuard;
pub use path::{PathOrigins, StampPosition};
pub use progress::{CancelToken, Progress};
pub use record::AdjacencyRecord;
pub use spine::SpineStore;
pub use stamp::{ComponentRef, Stamp, StampPool, StampSequence, StampState, Status};
pub use taxonomy::TaxonomyStore;
pub use tree::{Contradiction, Tree, TreeSummary};
pub use visibility::{RouteTable, VisibilityCalculator, VisibleStamps};

/// One taxonomy view with its stamp pool, path registry and membership index.
pub struct Termgraph {
    config: TermgraphConfig,
    pool: Arc<StampPool>,
    origins: Arc<PathOrigins>,
    commits: CommitLog,
    store: Arc<TaxonomyStore>,
    assemblages: Arc<AssemblageIndex>,
    calculator: Arc<VisibilityCalculator>,
    builder: TaxonomyGraphBuilder,
}

impl Termgraph {
    pub fn new(config: TermgraphConfig) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(StampPool::with_spine_size(config.spine_size));
        let origins = Arc::new(PathOrigins::new());
        let commits = CommitLog::with_history_limit(pool.clone(), config.commit_history_limit);
        let store = Arc::new(TaxonomyStore::with_spine_size(config.spine_size));
        let assemblages = Arc::new(AssemblageIndex::new());
        let calculator = Arc::new(VisibilityCalculator::new(pool.clone(), origins.clone()));
        let builder =
            TaxonomyGraphBuilder::new(store.clone(), calculator.clone(), assemblages.clone())
                .with_config(&config);

        tracing::debug!(spine_size = config.spine_size, "termgraph initialized");
        Ok(Self {
            config,
            pool,
            origins,
            commits,
            store,
            assemblages,
            calculator,
            builder,
        })
    }

    pub fn config(&self) -> &TermgraphConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<StampPool> {
        &self.pool
    }

    pub fn origins(&self) -> &Arc<PathOrigins> {
        &self.origins
    }

    pub fn commits(&self) -> &CommitLog {
        &self.commits
    }

    pub fn store(&self) -> &Arc<TaxonomyStore> {
        &self.store
    }

    pub fn assemblages(&self) -> &Arc<AssemblageIndex> {
        &self.assemblages
    }

    pub fn calculator(&self) -> &Arc<VisibilityCalculator> {
        &self.calculator
    }

    pub fn builder(&self) -> &TaxonomyGraphBuilder {
        &self.builder
    }

    /// Manifold coordinate with the configured edge policy.
    pub fn manifold(
        &self,
        stamp: StampCoordinate,
        premise: Premise,
        assemblage: NodeId,
    ) -> ManifoldCoordinate {
        self.config.manifold(stamp, premise, assemblage)
    }

    pub fn build(&self, manifold: &ManifoldCoordinate) -> Result<Tree> {
        self.builder.build(manifold)
    }
}
