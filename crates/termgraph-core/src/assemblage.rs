//! Id enumeration: which nodes belong to an assemblage.

use dashmap::DashMap;
use roaring::RoaringBitmap;

use crate::NodeId;

/// The persistence layer's `idsForAssemblage` primitive.
///
/// Each call starts a fresh, finite enumeration, so a scan can be restarted by
/// calling again.
pub trait IdSource: Send + Sync {
    fn ids_for_assemblage(&self, assemblage: NodeId) -> Box<dyn Iterator<Item = NodeId> + '_>;
}

/// In-memory membership index: `assemblage -> {members}`.
#[derive(Debug, Default)]
pub struct AssemblageIndex {
    members: DashMap<NodeId, RoaringBitmap>,
}

impl AssemblageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, assemblage: NodeId, member: NodeId) {
        self.members.entry(assemblage).or_default().insert(member);
    }

    pub fn extend(&self, assemblage: NodeId, members: impl IntoIterator<Item = NodeId>) {
        self.members.entry(assemblage).or_default().extend(members);
    }

    pub fn members(&self, assemblage: NodeId) -> RoaringBitmap {
        self.members
            .get(&assemblage)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }
}

impl IdSource for AssemblageIndex {
    fn ids_for_assemblage(&self, assemblage: NodeId) -> Box<dyn Iterator<Item = NodeId> + '_> {
        Box::new(self.members(assemblage).into_iter())
    }
}
