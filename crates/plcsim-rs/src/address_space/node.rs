// crates/plcsim-rs/src/address_space/node.rs

use super::value::{DataType, DataValue, Variant};
use crate::events::condition::{AlarmKind, ConditionState};
use crate::types::{
    ACCESS_LEVEL_CURRENT_READ, ACCESS_LEVEL_CURRENT_WRITE, EVENT_NOTIFIER_SUBSCRIBE_TO_EVENTS,
    NodeClass, NodeId, ReferenceType,
};

/// Stable handle of a node inside a `NodeGraph` arena.
///
/// Keys are only meaningful for the graph that issued them and become stale
/// once the node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(pub(crate) u32);

impl NodeKey {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a node represents in the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Plain organizing folder.
    Folder,
    /// A zone of the alarm topology. Notifier for its sub-areas and sources.
    Area,
    /// A simulated instrument, keyed by its configured path.
    Source { path: String },
    /// An alarm condition, a component of its source.
    Condition(ConditionState),
    Variable,
    /// A variable attached with `HasProperty`, e.g. `EURange`.
    Property,
    Method,
}

/// A single node of the address space.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_id: NodeId,
    pub class: NodeClass,
    pub browse_name: String,
    pub display_name: String,
    pub description: String,
    pub event_notifier: u8,
    pub kind: NodeKind,
    pub value: DataValue,
    pub data_type: DataType,
    pub access_level: u8,
    /// Fastest rate (ms) at which the value may be sampled.
    pub minimum_sampling_interval: f64,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) parent_reference: ReferenceType,
    pub(crate) children: Vec<NodeKey>,
}

impl Node {
    fn base(node_id: NodeId, class: NodeClass, name: &str, kind: NodeKind) -> Self {
        Self {
            node_id,
            class,
            browse_name: name.to_owned(),
            display_name: name.to_owned(),
            description: String::new(),
            event_notifier: 0,
            kind,
            value: DataValue::default(),
            data_type: DataType::BaseDataType,
            access_level: 0,
            minimum_sampling_interval: 0.0,
            parent: None,
            parent_reference: ReferenceType::Organizes,
            children: Vec::new(),
        }
    }

    pub fn folder(node_id: NodeId, name: &str) -> Self {
        Self::base(node_id, NodeClass::Object, name, NodeKind::Folder)
    }

    /// A folder that clients may subscribe to for events.
    pub fn notifier_folder(node_id: NodeId, name: &str) -> Self {
        let mut node = Self::folder(node_id, name);
        node.event_notifier = EVENT_NOTIFIER_SUBSCRIBE_TO_EVENTS;
        node
    }

    pub fn area(node_id: NodeId, name: &str) -> Self {
        let mut node = Self::base(node_id, NodeClass::Object, name, NodeKind::Area);
        node.event_notifier = EVENT_NOTIFIER_SUBSCRIBE_TO_EVENTS;
        node
    }

    pub fn source(node_id: NodeId, name: &str, path: &str) -> Self {
        let mut node = Self::base(
            node_id,
            NodeClass::Object,
            name,
            NodeKind::Source {
                path: path.to_owned(),
            },
        );
        node.event_notifier = EVENT_NOTIFIER_SUBSCRIBE_TO_EVENTS;
        node
    }

    pub fn condition(node_id: NodeId, kind: AlarmKind) -> Self {
        let state = ConditionState::new(kind);
        let mut node = Self::base(
            node_id,
            NodeClass::Object,
            kind.browse_name(),
            NodeKind::Condition(state),
        );
        node.description = format!("{} condition", kind.browse_name());
        node
    }

    /// A readable variable holding `value`. Writable when `writable` is set.
    pub fn variable(node_id: NodeId, name: &str, value: impl Into<Variant>, writable: bool) -> Self {
        let value = value.into();
        let mut node = Self::base(node_id, NodeClass::Variable, name, NodeKind::Variable);
        node.data_type = value.data_type().unwrap_or(DataType::BaseDataType);
        node.value = DataValue::new_now(value);
        node.access_level = ACCESS_LEVEL_CURRENT_READ;
        if writable {
            node.access_level |= ACCESS_LEVEL_CURRENT_WRITE;
        }
        node
    }

    /// A read-only property variable.
    pub fn property(node_id: NodeId, name: &str, value: impl Into<Variant>) -> Self {
        let mut node = Self::variable(node_id, name, value, false);
        node.kind = NodeKind::Property;
        node
    }

    pub fn method(node_id: NodeId, name: &str) -> Self {
        Self::base(node_id, NodeClass::Method, name, NodeKind::Method)
    }

    pub fn with_minimum_sampling_interval(mut self, interval_ms: f64) -> Self {
        self.minimum_sampling_interval = interval_ms;
        self
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn parent_reference(&self) -> ReferenceType {
        self.parent_reference
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn is_event_notifier(&self) -> bool {
        self.event_notifier & EVENT_NOTIFIER_SUBSCRIBE_TO_EVENTS != 0
    }

    pub fn is_writable(&self) -> bool {
        self.access_level & ACCESS_LEVEL_CURRENT_WRITE != 0
    }

    pub fn source_path(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Source { path } => Some(path),
            _ => None,
        }
    }

    pub fn condition_state(&self) -> Option<&ConditionState> {
        match &self.kind {
            NodeKind::Condition(state) => Some(state),
            _ => None,
        }
    }

    pub fn condition_state_mut(&mut self) -> Option<&mut ConditionState> {
        match &mut self.kind {
            NodeKind::Condition(state) => Some(state),
            _ => None,
        }
    }
}
