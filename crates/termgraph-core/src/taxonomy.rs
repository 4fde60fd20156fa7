//! TaxonomyStore: adjacency records for one taxonomy view plus the guard its
//! writers and builders share.
//!
//! Writers append inside a guard write section so that a builder's optimistic
//! scan can tell whether the records moved underneath it.

use crate::edge::TaxonomyEdge;
use crate::error::Result;
use crate::guard::VersionedGuard;
use crate::record::AdjacencyRecord;
use crate::spine::SpineStore;
use crate::NodeId;

pub struct TaxonomyStore {
    records: SpineStore<AdjacencyRecord>,
    guard: VersionedGuard,
}

impl TaxonomyStore {
    pub fn new() -> Self {
        Self::with_spine_size(crate::spine::DEFAULT_SPINE_SIZE)
    }

    pub fn with_spine_size(spine_size: usize) -> Self {
        Self {
            records: SpineStore::with_spine_size(spine_size),
            guard: VersionedGuard::new(),
        }
    }

    pub fn records(&self) -> &SpineStore<AdjacencyRecord> {
        &self.records
    }

    pub fn guard(&self) -> &VersionedGuard {
        &self.guard
    }

    /// Append edges to `origin`'s record and return the updated record.
    ///
    /// Edges are encoded before the write section opens, so a stamp that does
    /// not fit the word format leaves the store untouched.
    pub fn append_edges(&self, origin: NodeId, edges: &[TaxonomyEdge]) -> Result<AdjacencyRecord> {
        let addition = AdjacencyRecord::from_edges(edges)?;
        let _section = self.guard.write();
        self.records
            .accumulate_and_get(i64::from(origin), addition, |current, added| {
                current.append(&added)
            })
    }

    pub fn append_edge(&self, origin: NodeId, edge: TaxonomyEdge) -> Result<AdjacencyRecord> {
        self.append_edges(origin, &[edge])
    }

    /// Replace `origin`'s record with raw bytes from the persistence layer.
    /// Contents are validated when a builder decodes them.
    pub fn put_raw(&self, origin: NodeId, bytes: &[u8]) -> Result<()> {
        let record = AdjacencyRecord::from_le_bytes(origin, bytes)?;
        let _section = self.guard.write();
        self.records.put(i64::from(origin), record)
    }

    pub fn record(&self, origin: NodeId) -> Result<Option<AdjacencyRecord>> {
        self.records.get(i64::from(origin))
    }

    pub fn edges(&self, origin: NodeId) -> Result<Vec<TaxonomyEdge>> {
        match self.record(origin)? {
            Some(record) => record.decode(origin),
            None => Ok(Vec::new()),
        }
    }

    /// Nodes that own a record, ascending.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.records.len());
        self.records.for_each(|index, _| {
            if let Ok(node) = NodeId::try_from(index) {
                out.push(node);
            }
        });
        out
    }
}

impl Default for TaxonomyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::TaxonomyFlags;
    use crate::error::CoreError;
    use crate::stamp::StampSequence;

    #[test]
    fn appends_accumulate_and_bump_the_generation() {
        let store = TaxonomyStore::with_spine_size(8);
        let before = store.guard().generation();

        let stamp = StampSequence::new(3);
        store
            .append_edge(20, TaxonomyEdge::new(1, stamp, TaxonomyFlags::STATED))
            .unwrap();
        let record = store
            .append_edge(20, TaxonomyEdge::new(2, stamp, TaxonomyFlags::INFERRED))
            .unwrap();

        assert_eq!(record.len(), 2);
        assert_eq!(store.edges(20).unwrap().len(), 2);
        assert_eq!(store.guard().generation(), before + 4);
        assert_eq!(store.nodes(), vec![20]);
    }

    #[test]
    fn oversized_stamps_are_rejected_before_writing() {
        let store = TaxonomyStore::new();
        let edge = TaxonomyEdge::new(1, StampSequence::new(0x0100_0000), TaxonomyFlags::STATED);
        assert!(matches!(
            store.append_edge(5, edge),
            Err(CoreError::StampOutOfRange { .. })
        ));
        assert_eq!(store.record(5).unwrap(), None);
        assert_eq!(store.guard().generation(), 0);
    }
}
