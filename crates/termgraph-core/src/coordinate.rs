//! Coordinates: immutable query-time views over versioned data.

use std::collections::BTreeSet;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::path::StampPosition;
use crate::stamp::{Stamp, Status};
use crate::NodeId;

/// How to break an exact tie between equally recent visible versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Earlier coordinate positions win ties.
    Path,
    /// Ties stay unresolved and are reported as contradictions.
    Time,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StampCoordinate {
    statuses: BTreeSet<Status>,
    modules: Option<RoaringBitmap>,
    positions: Vec<StampPosition>,
    precedence: Precedence,
}

impl StampCoordinate {
    /// Active versions only, any module, `Time` precedence.
    pub fn new(positions: Vec<StampPosition>) -> Self {
        Self {
            statuses: BTreeSet::from([Status::Active]),
            modules: None,
            positions,
            precedence: Precedence::Time,
        }
    }

    /// Newest active view of a single path.
    pub fn latest_on(path: NodeId) -> Self {
        Self::new(vec![StampPosition::latest(path)])
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Same view with both active and inactive versions on-route. Canceled
    /// versions stay excluded: they void an edit rather than retire a fact.
    pub fn with_any_status(&self) -> Self {
        self.clone().with_statuses([Status::Active, Status::Inactive])
    }

    /// Restrict to these modules. An empty set means "no module filter".
    pub fn with_modules(mut self, modules: impl IntoIterator<Item = NodeId>) -> Self {
        let modules: RoaringBitmap = modules.into_iter().collect();
        self.modules = (!modules.is_empty()).then_some(modules);
        self
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn statuses(&self) -> &BTreeSet<Status> {
        &self.statuses
    }

    pub fn modules(&self) -> Option<&RoaringBitmap> {
        self.modules.as_ref()
    }

    pub fn positions(&self) -> &[StampPosition] {
        &self.positions
    }

    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    pub fn allows_status(&self, status: Status) -> bool {
        self.statuses.contains(&status)
    }

    pub fn allows_module(&self, module: NodeId) -> bool {
        self.modules.as_ref().map_or(true, |m| m.contains(module))
    }

    /// Status and module filters; the time/path check lives in the route table.
    pub(crate) fn admits(&self, stamp: &Stamp) -> bool {
        self.allows_status(stamp.status) && self.allows_module(stamp.module)
    }
}

/// Carried through to the `Tree` for description-aware consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCoordinate {
    pub language: NodeId,
    /// Dialect assemblages in preference order.
    pub dialects: Vec<NodeId>,
}

/// Which logic-graph premise a taxonomy is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Premise {
    Stated,
    Inferred,
}

/// One complete view: stamps, language, premise and edge policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifoldCoordinate {
    pub stamp: StampCoordinate,
    pub language: LanguageCoordinate,
    pub premise: Premise,
    /// Include edges derived from non-hierarchy semantics.
    pub include_sememe: bool,
    /// Include relationships outside description-logic scope.
    pub include_non_dl: bool,
    /// Assemblage whose members are enumerated for the build.
    pub assemblage: NodeId,
}

impl ManifoldCoordinate {
    pub fn new(stamp: StampCoordinate, premise: Premise, assemblage: NodeId) -> Self {
        Self {
            stamp,
            language: LanguageCoordinate::default(),
            premise,
            include_sememe: false,
            include_non_dl: false,
            assemblage,
        }
    }

    pub fn with_language(mut self, language: LanguageCoordinate) -> Self {
        self.language = language;
        self
    }

    pub fn with_sememe_edges(mut self, include: bool) -> Self {
        self.include_sememe = include;
        self
    }

    pub fn with_non_dl_edges(mut self, include: bool) -> Self {
        self.include_non_dl = include;
        self
    }
}
