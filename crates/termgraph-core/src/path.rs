//! Authoring paths and their origins.
//!
//! A path may branch off one or more parent paths at a given time. Those
//! origin edges make the set of paths a DAG in well-formed data; the
//! visibility code still tolerates misconfigured cycles.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::NodeId;

/// A point on a path: "path `path` as of `time`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampPosition {
    pub path: NodeId,
    pub time: i64,
}

impl StampPosition {
    pub const fn new(path: NodeId, time: i64) -> Self {
        Self { path, time }
    }

    /// The newest position on `path`, uncommitted work included.
    pub const fn latest(path: NodeId) -> Self {
        Self {
            path,
            time: i64::MAX,
        }
    }
}

#[derive(Debug, Default)]
pub struct PathOrigins {
    origins: DashMap<NodeId, Vec<StampPosition>>,
}

impl PathOrigins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `path` originates from `origin.path` at `origin.time`.
    /// Re-declaring the same origin is a no-op.
    pub fn add_origin(&self, path: NodeId, origin: StampPosition) {
        let mut entry = self.origins.entry(path).or_default();
        if !entry.contains(&origin) {
            entry.push(origin);
        }
    }

    pub fn origins_of(&self, path: NodeId) -> Vec<StampPosition> {
        self.origins
            .get(&path)
            .map(|o| o.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}
