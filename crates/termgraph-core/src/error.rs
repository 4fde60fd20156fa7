//! Error taxonomy for the taxonomy/versioning core.
//!
//! Input-contract violations (bad index, unknown stamp, bad transition) fail
//! immediately. Structurally inconsistent data found while decoding adjacency
//! records is surfaced as `DataIntegrity`. Contradictions and cycles are not
//! errors: they travel inside `VisibleStamps` and `Tree`.

use crate::stamp::{StampSequence, StampState};
use crate::NodeId;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid spine index {index}: indices must be non-negative")]
    InvalidIndex { index: i64 },

    #[error("unknown stamp sequence {0}")]
    UnknownStamp(StampSequence),

    #[error("cannot {action} stamp {stamp}: stamp is {state:?}")]
    InvalidStampTransition {
        stamp: StampSequence,
        state: StampState,
        action: &'static str,
    },

    #[error("value {value:#x} does not fit in the 24 value bits of a taxonomy word")]
    StampOutOfRange { value: u32 },

    #[error("malformed adjacency record for node {node}: {detail}")]
    DataIntegrity { node: NodeId, detail: String },

    #[error("operation canceled")]
    Canceled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    pub(crate) fn integrity(node: NodeId, detail: impl Into<String>) -> Self {
        CoreError::DataIntegrity {
            node,
            detail: detail.into(),
        }
    }

    /// Attach the owning node to an integrity error raised without one.
    pub(crate) fn for_node(self, node: NodeId) -> Self {
        match self {
            CoreError::DataIntegrity { detail, .. } => CoreError::DataIntegrity { node, detail },
            other => other,
        }
    }
}
