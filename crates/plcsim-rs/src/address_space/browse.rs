// crates/plcsim-rs/src/address_space/browse.rs

use crate::types::{NamespaceIndex, NodeClass, NodeId, ReferenceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowseDirection {
    #[default]
    Forward,
    Inverse,
    Both,
}

impl BrowseDirection {
    pub fn includes(self, is_forward: bool) -> bool {
        match self {
            Self::Forward => is_forward,
            Self::Inverse => !is_forward,
            Self::Both => true,
        }
    }
}

/// One reference returned by `Browse`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDescription {
    pub reference_type: ReferenceType,
    pub is_forward: bool,
    pub target: NodeId,
    pub browse_name: String,
    pub display_name: String,
    /// Unknown for targets owned by another manager.
    pub node_class: Option<NodeClass>,
}

/// Opaque token for the undelivered remainder of a browse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinuationPoint {
    pub namespace: NamespaceIndex,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrowseResult {
    pub references: Vec<ReferenceDescription>,
    pub continuation_point: Option<ContinuationPoint>,
}
