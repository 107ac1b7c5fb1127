// crates/plcsim-rs/src/address_space/graph.rs

use super::node::{Node, NodeKey};
use crate::PlcError;
use crate::types::{NodeId, ReferenceType};
use std::collections::HashMap;

/// A typed, non-owning reference from a node to another node, possibly one
/// owned by a different manager (e.g. the `Server` object).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub reference_type: ReferenceType,
    pub target: NodeId,
    pub is_forward: bool,
}

/// Arena of nodes.
///
/// Nodes live until the whole graph is cleared. Parent/child edges are
/// owning; typed references are plain lookups keyed by the source node and never keep
/// a node alive. Nodes inserted with `insert_component` are reachable only
/// through their parent (by browse name) and not through `key_of`.
#[derive(Debug, Default)]
pub struct NodeGraph {
    slots: Vec<Node>,
    by_id: HashMap<NodeId, NodeKey>,
    references: HashMap<NodeKey, Vec<Reference>>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, node: Node) -> NodeKey {
        self.slots.push(node);
        NodeKey((self.slots.len() - 1) as u32)
    }

    fn register(&mut self, node_id: &NodeId) -> Result<(), PlcError> {
        if self.by_id.contains_key(node_id) {
            return Err(PlcError::NodeIdExists(node_id.to_string()));
        }
        Ok(())
    }

    /// Inserts a node without a parent.
    pub fn insert_root(&mut self, node: Node) -> Result<NodeKey, PlcError> {
        self.register(&node.node_id)?;
        let node_id = node.node_id.clone();
        let key = self.allocate(node);
        self.by_id.insert(node_id, key);
        Ok(key)
    }

    /// Inserts a node as the last child of `parent`.
    pub fn insert_child(
        &mut self,
        parent: NodeKey,
        reference_type: ReferenceType,
        node: Node,
    ) -> Result<NodeKey, PlcError> {
        self.register(&node.node_id)?;
        let node_id = node.node_id.clone();
        let key = self.attach(parent, reference_type, node)?;
        self.by_id.insert(node_id, key);
        Ok(key)
    }

    /// Inserts a child that is only addressable through its parent's component path.
    pub fn insert_component(
        &mut self,
        parent: NodeKey,
        reference_type: ReferenceType,
        node: Node,
    ) -> Result<NodeKey, PlcError> {
        self.attach(parent, reference_type, node)
    }

    fn attach(
        &mut self,
        parent: NodeKey,
        reference_type: ReferenceType,
        mut node: Node,
    ) -> Result<NodeKey, PlcError> {
        if self.get(parent).is_none() {
            return Err(PlcError::NodeIdUnknown);
        }
        node.parent = Some(parent);
        node.parent_reference = reference_type;
        let key = self.allocate(node);
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.push(key);
        }
        Ok(key)
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.slots.get(key.index())
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.slots.get_mut(key.index())
    }

    /// Looks up a directly addressable node.
    pub fn key_of(&self, node_id: &NodeId) -> Option<NodeKey> {
        self.by_id.get(node_id).copied()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.get(key).is_some()
    }

    /// Finds a direct child by browse name.
    pub fn find_child(&self, parent: NodeKey, browse_name: &str) -> Option<NodeKey> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|child| self.get(*child).is_some_and(|n| n.browse_name == browse_name))
    }

    /// Follows a `/`-separated path of browse names starting at `root`.
    pub fn find_component(&self, root: NodeKey, path: &str) -> Option<NodeKey> {
        path.split('/').try_fold(root, |current, name| {
            if name.is_empty() {
                None
            } else {
                self.find_child(current, name)
            }
        })
    }

    pub fn add_reference(&mut self, key: NodeKey, reference: Reference) {
        let refs = self.references.entry(key).or_default();
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }

    pub fn remove_reference(&mut self, key: NodeKey, reference: &Reference) {
        if let Some(refs) = self.references.get_mut(&key) {
            refs.retain(|r| r != reference);
            if refs.is_empty() {
                self.references.remove(&key);
            }
        }
    }

    pub fn references(&self, key: NodeKey) -> &[Reference] {
        self.references.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_id.clear();
        self.references.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn sample() -> (NodeGraph, NodeKey, NodeKey, NodeKey) {
        let mut graph = NodeGraph::new();
        let root = graph
            .insert_root(Node::folder(NodeId::string(2, "Root"), "Root"))
            .unwrap();
        let child = graph
            .insert_child(
                root,
                ReferenceType::Organizes,
                Node::folder(NodeId::string(2, "Root/Child"), "Child"),
            )
            .unwrap();
        let leaf = graph
            .insert_component(
                child,
                ReferenceType::HasComponent,
                Node::variable(NodeId::string(2, "Root/Child?Leaf"), "Leaf", 1u32, false),
            )
            .unwrap();
        (graph, root, child, leaf)
    }

    #[test]
    fn test_find_component_by_path() {
        let (graph, root, child, leaf) = sample();
        assert_eq!(graph.find_child(root, "Child"), Some(child));
        assert_eq!(graph.find_component(root, "Child/Leaf"), Some(leaf));
        assert_eq!(graph.find_component(root, "Child/Missing"), None);
        assert_eq!(graph.find_component(root, "Child//Leaf"), None);
        // Components are not directly addressable.
        assert_eq!(graph.key_of(&NodeId::string(2, "Root/Child?Leaf")), None);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (mut graph, root, _, _) = sample();
        let result = graph.insert_child(
            root,
            ReferenceType::Organizes,
            Node::folder(NodeId::string(2, "Root/Child"), "Child"),
        );
        assert!(matches!(result, Err(PlcError::NodeIdExists(_))));
    }

    #[test]
    fn test_references_are_deduplicated() {
        let (mut graph, root, _, _) = sample();
        let reference = Reference {
            reference_type: ReferenceType::HasNotifier,
            target: NodeId::server(),
            is_forward: false,
        };
        graph.add_reference(root, reference.clone());
        graph.add_reference(root, reference.clone());
        assert_eq!(graph.references(root).len(), 1);
        graph.remove_reference(root, &reference);
        assert!(graph.references(root).is_empty());
    }
}
