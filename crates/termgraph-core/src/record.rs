//! Adjacency records: the append-only edge history of one node.
//!
//! A record is a flat run of u32 words, two per edge (see `edge` for the word
//! layout). Records are accepted as-is from the persistence layer and only
//! validated when decoded, so legacy damage surfaces at read time as a
//! `DataIntegrity` error naming the node.

use std::sync::Arc;

use crate::edge::TaxonomyEdge;
use crate::error::{CoreError, Result};
use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyRecord(Arc<[u32]>);

impl AdjacencyRecord {
    pub fn from_edges(edges: &[TaxonomyEdge]) -> Result<Self> {
        let mut words = Vec::with_capacity(edges.len() * 2);
        for edge in edges {
            words.extend_from_slice(&edge.to_words()?);
        }
        Ok(Self(words.into()))
    }

    /// Wrap raw words without validating them.
    pub fn from_words(words: Vec<u32>) -> Self {
        Self(words.into())
    }

    /// Little-endian words, as handed over by the persistence layer.
    pub fn from_le_bytes(node: NodeId, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(CoreError::integrity(
                node,
                format!("record length {} is not a whole number of words", bytes.len()),
            ));
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self::from_words(words))
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    pub fn words(&self) -> &[u32] {
        &self.0
    }

    /// Number of complete edges (a trailing half-edge is not counted).
    pub fn len(&self) -> usize {
        self.0.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenate `other` after `self`.
    pub fn append(&self, other: &Self) -> Self {
        let mut words = Vec::with_capacity(self.0.len() + other.0.len());
        words.extend_from_slice(&self.0);
        words.extend_from_slice(&other.0);
        Self(words.into())
    }

    /// Decode every edge, failing on the first malformed entry.
    pub fn decode(&self, node: NodeId) -> Result<Vec<TaxonomyEdge>> {
        if self.0.len() % 2 != 0 {
            return Err(CoreError::integrity(
                node,
                format!("odd word count {} (dangling half-edge)", self.0.len()),
            ));
        }
        self.0
            .chunks_exact(2)
            .map(|pair| {
                TaxonomyEdge::from_words(pair[0], pair[1]).map_err(|e| e.for_node(node))
            })
            .collect()
    }
}
