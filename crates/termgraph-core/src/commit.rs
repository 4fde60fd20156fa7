//! Commit records and the commit notification stream.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stamp::{StampPool, StampSequence};
use crate::NodeId;

pub const DEFAULT_COMMIT_HISTORY_LIMIT: usize = 1024;

/// Immutable summary of one completed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_time: i64,
    /// Committed sequences (the alias targets).
    pub stamps: BTreeSet<StampSequence>,
    /// `uncommitted -> committed`
    pub aliases: BTreeMap<StampSequence, StampSequence>,
    pub concepts: BTreeSet<NodeId>,
    pub semantics: BTreeSet<NodeId>,
    pub comment: String,
}

#[derive(Default)]
struct LogState {
    history: VecDeque<Arc<CommitRecord>>,
    subscribers: Vec<mpsc::Sender<Arc<CommitRecord>>>,
}

/// Front door for commits: runs them against the `StampPool`, keeps a bounded
/// history and broadcasts each record to subscribers in commit order.
pub struct CommitLog {
    pool: Arc<StampPool>,
    history_limit: usize,
    state: Mutex<LogState>,
}

impl CommitLog {
    pub fn new(pool: Arc<StampPool>) -> Self {
        Self::with_history_limit(pool, DEFAULT_COMMIT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(pool: Arc<StampPool>, history_limit: usize) -> Self {
        Self {
            pool,
            history_limit,
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn pool(&self) -> &Arc<StampPool> {
        &self.pool
    }

    pub fn commit(
        &self,
        sequences: &BTreeSet<StampSequence>,
        commit_time: i64,
        comment: impl Into<String>,
    ) -> Result<Arc<CommitRecord>> {
        // held across the pool commit so history and broadcasts follow the
        // order in which commits were published
        let mut state = self.state.lock();
        let record = Arc::new(self.pool.commit(sequences, commit_time, comment)?);

        state.history.push_back(Arc::clone(&record));
        while state.history.len() > self.history_limit {
            state.history.pop_front();
        }
        let before = state.subscribers.len();
        state
            .subscribers
            .retain(|tx| tx.send(Arc::clone(&record)).is_ok());
        let dropped = before - state.subscribers.len();
        drop(state);

        if dropped > 0 {
            tracing::warn!(dropped, "dropped disconnected commit subscribers");
        }
        tracing::info!(
            commit_time = record.commit_time,
            stamps = record.stamps.len(),
            concepts = record.concepts.len(),
            semantics = record.semantics.len(),
            "commit published"
        );
        Ok(record)
    }

    /// Receive every record committed after this call.
    pub fn subscribe(&self) -> mpsc::Receiver<Arc<CommitRecord>> {
        let (tx, rx) = mpsc::channel();
        self.state.lock().subscribers.push(tx);
        rx
    }

    /// Retained records, oldest first.
    pub fn history(&self) -> Vec<Arc<CommitRecord>> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<Arc<CommitRecord>> {
        self.state.lock().history.back().cloned()
    }
}
