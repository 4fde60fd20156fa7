//! Stamps: the provenance tuple attached to every version of every component.
//!
//! A stamp is allocated uncommitted (time = `UNCOMMITTED_TIME`) and becomes
//! committed when a commit binds a real time to it. Committing never rewrites
//! the uncommitted slot: it allocates a fresh committed stamp and publishes an
//! alias `old -> new`, so records already written with the old sequence keep
//! resolving correctly.
//!
//! ```text
//!   Uncommitted ──commit──► Committed
//!        │                      │
//!        └──────cancel──────────┴──► Canceled
//! ```
//!
//! All aliases of one commit are published under a single write of the
//! publish gate, and `resolve` reads under the same gate, so no reader can
//! observe a commit half-applied.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::commit::CommitRecord;
use crate::error::{CoreError, Result};
use crate::spine::SpineStore;
use crate::NodeId;

/// Sentinel time carried by uncommitted stamps.
pub const UNCOMMITTED_TIME: i64 = i64::MAX;

/// Handle into the `StampPool`. Sequence 0 is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StampSequence(u32);

impl StampSequence {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StampSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stamp#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Inactive,
    Canceled,
}

/// Lifecycle state derived from a stamp's status and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StampState {
    Uncommitted,
    Committed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub status: Status,
    pub time: i64,
    pub author: NodeId,
    pub module: NodeId,
    pub path: NodeId,
}

impl Stamp {
    pub fn is_uncommitted(&self) -> bool {
        self.time == UNCOMMITTED_TIME
    }

    pub fn state(&self) -> StampState {
        if self.status == Status::Canceled {
            StampState::Canceled
        } else if self.is_uncommitted() {
            StampState::Uncommitted
        } else {
            StampState::Committed
        }
    }
}

/// A component versioned by an uncommitted stamp, reported by its commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRef {
    Concept(NodeId),
    Semantic(NodeId),
}

pub struct StampPool {
    stamps: SpineStore<Stamp>,
    next_sequence: AtomicU32,
    aliases: RwLock<AHashMap<StampSequence, StampSequence>>,
    touched: DashMap<StampSequence, Vec<ComponentRef>>,
}

impl StampPool {
    pub fn new() -> Self {
        Self::with_spine_size(crate::spine::DEFAULT_SPINE_SIZE)
    }

    pub fn with_spine_size(spine_size: usize) -> Self {
        Self {
            stamps: SpineStore::with_spine_size(spine_size),
            next_sequence: AtomicU32::new(1),
            aliases: RwLock::new(AHashMap::new()),
            touched: DashMap::new(),
        }
    }

    /// Number of stamps allocated so far (committed copies included).
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    fn allocate(&self, stamp: Stamp) -> StampSequence {
        let seq = StampSequence(self.next_sequence.fetch_add(1, Ordering::AcqRel));
        // Sequences are u32, so the index is always non-negative.
        let _ = self.stamps.put(i64::from(seq.0), stamp);
        seq
    }

    /// Allocate a placeholder stamp awaiting a commit.
    pub fn allocate_uncommitted(
        &self,
        status: Status,
        author: NodeId,
        module: NodeId,
        path: NodeId,
    ) -> StampSequence {
        self.allocate(Stamp {
            status,
            time: UNCOMMITTED_TIME,
            author,
            module,
            path,
        })
    }

    /// Allocate an already-committed stamp (bulk import of existing history).
    pub fn allocate_committed(
        &self,
        status: Status,
        time: i64,
        author: NodeId,
        module: NodeId,
        path: NodeId,
    ) -> StampSequence {
        self.allocate(Stamp {
            status,
            time: time.min(UNCOMMITTED_TIME - 1),
            author,
            module,
            path,
        })
    }

    /// Alias target of `seq`, or `seq` itself. Never more than one hop.
    pub fn canonical(&self, seq: StampSequence) -> StampSequence {
        self.aliases.read().get(&seq).copied().unwrap_or(seq)
    }

    fn raw_stamp(&self, seq: StampSequence) -> Result<Stamp> {
        self.stamps
            .get(i64::from(seq.0))?
            .ok_or(CoreError::UnknownStamp(seq))
    }

    pub fn resolve(&self, seq: StampSequence) -> Result<Stamp> {
        let aliases = self.aliases.read();
        let target = aliases.get(&seq).copied().unwrap_or(seq);
        self.raw_stamp(target)
    }

    /// Resolve and return the canonical sequence alongside its stamp.
    pub fn resolve_canonical(&self, seq: StampSequence) -> Result<(StampSequence, Stamp)> {
        let aliases = self.aliases.read();
        let target = aliases.get(&seq).copied().unwrap_or(seq);
        Ok((target, self.raw_stamp(target)?))
    }

    /// Record that `component` has a version stamped with uncommitted `seq`.
    ///
    /// Holds the publish gate shared across the check and the insert, so a
    /// commit either sees the component or rejects the touch.
    pub fn touch(&self, seq: StampSequence, component: ComponentRef) -> Result<()> {
        let aliases = self.aliases.read();
        let target = aliases.get(&seq).copied().unwrap_or(seq);
        let state = self.raw_stamp(target)?.state();
        if state != StampState::Uncommitted {
            return Err(CoreError::InvalidStampTransition {
                stamp: seq,
                state,
                action: "touch",
            });
        }
        self.touched.entry(seq).or_default().push(component);
        drop(aliases);
        Ok(())
    }

    /// Commit a set of uncommitted stamps at `commit_time`.
    ///
    /// Every input is validated before anything is published, so a rejected
    /// commit leaves the pool untouched.
    pub fn commit(
        &self,
        sequences: &BTreeSet<StampSequence>,
        commit_time: i64,
        comment: impl Into<String>,
    ) -> Result<CommitRecord> {
        let commit_time = commit_time.min(UNCOMMITTED_TIME - 1);

        let mut pending: Vec<(StampSequence, Stamp)> = Vec::with_capacity(sequences.len());
        {
            let aliases = self.aliases.read();
            for &seq in sequences {
                if aliases.contains_key(&seq) {
                    return Err(CoreError::InvalidStampTransition {
                        stamp: seq,
                        state: StampState::Committed,
                        action: "commit",
                    });
                }
                let stamp = self.raw_stamp(seq)?;
                if stamp.state() != StampState::Uncommitted {
                    return Err(CoreError::InvalidStampTransition {
                        stamp: seq,
                        state: stamp.state(),
                        action: "commit",
                    });
                }
                pending.push((seq, stamp));
            }
        }

        let mut committed = BTreeSet::new();
        let mut alias_map = BTreeMap::new();
        let mut concepts = BTreeSet::new();
        let mut semantics = BTreeSet::new();

        let mut aliases = self.aliases.write();
        // Re-check under the gate: a racing commit or cancel may have claimed
        // an input since validation.
        for (old, stamp) in pending.iter_mut() {
            if aliases.contains_key(old) {
                return Err(CoreError::InvalidStampTransition {
                    stamp: *old,
                    state: StampState::Committed,
                    action: "commit",
                });
            }
            *stamp = self.raw_stamp(*old)?;
            if stamp.state() != StampState::Uncommitted {
                return Err(CoreError::InvalidStampTransition {
                    stamp: *old,
                    state: stamp.state(),
                    action: "commit",
                });
            }
        }
        for (old, stamp) in pending {
            let new = self.allocate(Stamp {
                time: commit_time,
                ..stamp
            });
            alias_map.insert(old, new);
            committed.insert(new);
            if let Some((_, components)) = self.touched.remove(&old) {
                for component in components {
                    match component {
                        ComponentRef::Concept(nid) => concepts.insert(nid),
                        ComponentRef::Semantic(nid) => semantics.insert(nid),
                    };
                }
            }
        }
        for (&old, &new) in &alias_map {
            aliases.insert(old, new);
        }
        drop(aliases);

        Ok(CommitRecord {
            commit_time,
            stamps: committed,
            aliases: alias_map,
            concepts,
            semantics,
            comment: comment.into(),
        })
    }

    /// Void an edit. Allowed from both the uncommitted and committed states.
    pub fn cancel(&self, seq: StampSequence) -> Result<Stamp> {
        let aliases = self.aliases.write();
        let target = aliases.get(&seq).copied().unwrap_or(seq);
        let stamp = self.raw_stamp(target)?;
        if stamp.state() == StampState::Canceled {
            return Err(CoreError::InvalidStampTransition {
                stamp: seq,
                state: StampState::Canceled,
                action: "cancel",
            });
        }
        let canceled = Stamp {
            status: Status::Canceled,
            ..stamp
        };
        self.stamps.put(i64::from(target.0), canceled)?;
        self.touched.remove(&target);
        drop(aliases);
        Ok(canceled)
    }
}

impl Default for StampPool {
    fn default() -> Self {
        Self::new()
    }
}
