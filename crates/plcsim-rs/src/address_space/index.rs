// crates/plcsim-rs/src/address_space/index.rs
//! Maps external identifiers onto graph keys.
//!
//! Alarm-topology identifiers are strings of the form
//! `{root-type}:{root-id}[?{component-path}]`. The root is looked up directly
//! in the area or source map and the optional component path is then followed
//! by browse name. Identifiers that do not parse are looked up in the graph's
//! own identifier map.

use super::graph::NodeGraph;
use super::node::NodeKey;
use crate::types::{NamespaceIndex, NodeId};
use std::collections::HashMap;
use std::fmt;

/// Kind of root a parsed identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootType {
    Area = 0,
    Source = 1,
}

/// A structured alarm-topology identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedNodeId {
    pub root_type: RootType,
    pub root_id: String,
    pub component_path: Option<String>,
}

impl ParsedNodeId {
    pub fn new(root_type: RootType, root_id: impl Into<String>) -> Self {
        Self {
            root_type,
            root_id: root_id.into(),
            component_path: None,
        }
    }

    pub fn with_component(mut self, path: impl Into<String>) -> Self {
        self.component_path = Some(path.into());
        self
    }

    /// Parses the textual form. Returns `None` for anything malformed.
    pub fn parse(text: &str) -> Option<Self> {
        let (root_type, rest) = text.split_once(':')?;
        let root_type = match root_type {
            "0" => RootType::Area,
            "1" => RootType::Source,
            _ => return None,
        };
        let (root_id, component_path) = match rest.split_once('?') {
            Some((root, path)) => (root, Some(path.to_owned())),
            None => (rest, None),
        };
        if root_id.is_empty() {
            return None;
        }
        Some(Self {
            root_type,
            root_id: root_id.to_owned(),
            component_path,
        })
    }

    /// The identifier of the hierarchy root this id points into.
    pub fn root(&self) -> ParsedNodeId {
        ParsedNodeId::new(self.root_type, self.root_id.clone())
    }

    pub fn construct(&self, namespace: NamespaceIndex) -> NodeId {
        NodeId::string(namespace, self.to_string())
    }
}

impl fmt::Display for ParsedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.root_type as u8, self.root_id)?;
        if let Some(path) = &self.component_path {
            write!(f, "?{path}")?;
        }
        Ok(())
    }
}

/// Per-request resolution state for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHandle {
    pub node_id: NodeId,
    pub parsed: Option<ParsedNodeId>,
    /// Root node the identifier was resolved against.
    pub root: NodeKey,
    validated: bool,
    node: Option<NodeKey>,
}

impl NodeHandle {
    /// The validated node, if validation succeeded.
    pub fn node(&self) -> Option<NodeKey> {
        self.node
    }

    /// Identifier of the hierarchy root, used as the component cache key.
    pub fn root_id(&self, namespace: NamespaceIndex) -> NodeId {
        match &self.parsed {
            Some(parsed) if parsed.component_path.is_some() => parsed.root().construct(namespace),
            _ => self.node_id.clone(),
        }
    }
}

/// Cache scoped to a single request batch. `None` marks a known-invalid id.
pub type OperationCache = HashMap<NodeId, Option<NodeKey>>;

/// A hierarchy root kept alive across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentCacheEntry {
    pub root: NodeKey,
    pub ref_count: usize,
}

#[derive(Debug, Default)]
pub struct AddressSpaceIndex {
    namespace: NamespaceIndex,
    areas: HashMap<String, NodeKey>,
    sources: HashMap<String, NodeKey>,
    component_cache: HashMap<NodeId, ComponentCacheEntry>,
}

impl AddressSpaceIndex {
    pub fn new(namespace: NamespaceIndex) -> Self {
        Self {
            namespace,
            ..Self::default()
        }
    }

    pub fn namespace(&self) -> NamespaceIndex {
        self.namespace
    }

    pub fn register_area(&mut self, path: &str, key: NodeKey) {
        self.areas.insert(path.to_owned(), key);
    }

    pub fn register_source(&mut self, path: &str, key: NodeKey) {
        self.sources.insert(path.to_owned(), key);
    }

    pub fn area(&self, path: &str) -> Option<NodeKey> {
        self.areas.get(path).copied()
    }

    pub fn source(&self, path: &str) -> Option<NodeKey> {
        self.sources.get(path).copied()
    }

    /// Sources in path order.
    pub fn sources(&self) -> Vec<(&str, NodeKey)> {
        let mut sources: Vec<_> = self
            .sources
            .iter()
            .map(|(path, key)| (path.as_str(), *key))
            .collect();
        sources.sort_unstable_by(|a, b| a.0.cmp(b.0));
        sources
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Parses `node_id` and finds its root. Does not follow component paths.
    pub fn resolve(&self, graph: &NodeGraph, node_id: &NodeId) -> Option<NodeHandle> {
        if node_id.namespace != self.namespace {
            return None;
        }
        if let Some(parsed) = node_id.as_str().and_then(ParsedNodeId::parse) {
            let root = match parsed.root_type {
                RootType::Area => self.area(&parsed.root_id),
                RootType::Source => self.source(&parsed.root_id),
            }?;
            let validated = parsed.component_path.is_none();
            return Some(NodeHandle {
                node_id: node_id.clone(),
                parsed: Some(parsed),
                root,
                validated,
                node: validated.then_some(root),
            });
        }
        let key = graph.key_of(node_id)?;
        Some(NodeHandle {
            node_id: node_id.clone(),
            parsed: None,
            root: key,
            validated: true,
            node: Some(key),
        })
    }

    /// Follows the handle's component path and records the outcome in `cache`.
    pub fn validate(
        &self,
        graph: &NodeGraph,
        handle: &mut NodeHandle,
        cache: &mut OperationCache,
    ) -> Option<NodeKey> {
        if handle.validated {
            return handle.node.filter(|key| graph.contains(*key));
        }
        if let Some(cached) = cache.get(&handle.node_id) {
            handle.validated = true;
            handle.node = *cached;
            return *cached;
        }
        let node = handle
            .parsed
            .as_ref()
            .and_then(|p| p.component_path.as_deref())
            .and_then(|path| graph.find_component(handle.root, path));
        cache.insert(handle.node_id.clone(), node);
        handle.validated = true;
        handle.node = node;
        node
    }

    /// Resolves and validates in one step.
    pub fn lookup(
        &self,
        graph: &NodeGraph,
        node_id: &NodeId,
        cache: &mut OperationCache,
    ) -> Option<NodeKey> {
        if let Some(cached) = cache.get(node_id) {
            return *cached;
        }
        match self.resolve(graph, node_id) {
            Some(mut handle) => self.validate(graph, &mut handle, cache),
            None => {
                cache.insert(node_id.clone(), None);
                None
            }
        }
    }

    /// Takes a reference on the handle's hierarchy root so the handle stays
    /// resolvable beyond the current request.
    pub fn add_to_component_cache(&mut self, handle: &NodeHandle) -> NodeKey {
        let root_id = handle.root_id(self.namespace);
        let entry = self
            .component_cache
            .entry(root_id)
            .or_insert(ComponentCacheEntry {
                root: handle.root,
                ref_count: 0,
            });
        entry.ref_count += 1;
        entry.root
    }

    /// Drops a reference taken by `add_to_component_cache`. Evicts at zero.
    pub fn remove_from_component_cache(&mut self, handle: &NodeHandle) {
        let root_id = handle.root_id(self.namespace);
        if let Some(entry) = self.component_cache.get_mut(&root_id) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 {
                self.component_cache.remove(&root_id);
            }
        }
    }

    /// Fast lookup used on every attribute request: namespace rejection, then
    /// the component cache, then full resolution.
    pub fn manager_handle(&self, graph: &NodeGraph, node_id: &NodeId) -> Option<NodeHandle> {
        if node_id.namespace != self.namespace {
            return None;
        }
        let parsed = node_id.as_str().and_then(ParsedNodeId::parse);
        if let Some(parsed) = &parsed {
            let root_id = parsed.root().construct(self.namespace);
            if let Some(entry) = self.component_cache.get(&root_id) {
                let node = match &parsed.component_path {
                    Some(path) => graph.find_component(entry.root, path),
                    None => Some(entry.root),
                };
                return Some(NodeHandle {
                    node_id: node_id.clone(),
                    parsed: Some(parsed.clone()),
                    root: entry.root,
                    validated: true,
                    node,
                });
            }
        }
        let mut handle = self.resolve(graph, node_id)?;
        let mut cache = OperationCache::new();
        self.validate(graph, &mut handle, &mut cache);
        Some(handle)
    }

    pub fn component_cache_len(&self) -> usize {
        self.component_cache.len()
    }

    pub fn component_ref_count(&self, root_id: &NodeId) -> Option<usize> {
        self.component_cache.get(root_id).map(|e| e.ref_count)
    }

    pub fn clear(&mut self) {
        self.areas.clear();
        self.sources.clear();
        self.component_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::node::Node;
    use crate::events::condition::AlarmKind;
    use crate::types::ReferenceType;

    const NS: NamespaceIndex = 3;

    fn topology() -> (NodeGraph, AddressSpaceIndex, NodeKey, NodeKey) {
        let mut graph = NodeGraph::new();
        let mut index = AddressSpaceIndex::new(NS);
        let area_id = ParsedNodeId::new(RootType::Area, "Green");
        let area = graph
            .insert_root(Node::area(area_id.construct(NS), "Green"))
            .unwrap();
        index.register_area("Green", area);
        let source_id = ParsedNodeId::new(RootType::Source, "Metals/WestTank");
        let source = graph
            .insert_root(Node::source(
                source_id.construct(NS),
                "WestTank",
                "Metals/WestTank",
            ))
            .unwrap();
        index.register_source("Metals/WestTank", source);
        let alarm = source_id.clone().with_component("HighAlarm");
        graph
            .insert_component(
                source,
                ReferenceType::HasComponent,
                Node::condition(alarm.construct(NS), AlarmKind::HighLevel),
            )
            .unwrap();
        (graph, index, area, source)
    }

    #[test]
    fn test_parse_and_construct() {
        let parsed = ParsedNodeId::parse("1:Metals/WestTank?HighAlarm").unwrap();
        assert_eq!(parsed.root_type, RootType::Source);
        assert_eq!(parsed.root_id, "Metals/WestTank");
        assert_eq!(parsed.component_path.as_deref(), Some("HighAlarm"));
        assert_eq!(parsed.to_string(), "1:Metals/WestTank?HighAlarm");

        assert_eq!(ParsedNodeId::parse("7:Green"), None);
        assert_eq!(ParsedNodeId::parse("0:"), None);
        assert_eq!(ParsedNodeId::parse("Green"), None);
    }

    #[test]
    fn test_resolve_rejects_foreign_namespace() {
        let (graph, index, _, _) = topology();
        assert!(index.resolve(&graph, &NodeId::string(2, "0:Green")).is_none());
        assert!(index.resolve(&graph, &NodeId::string(NS, "0:Blue")).is_none());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (graph, index, area, source) = topology();
        let mut cache = OperationCache::new();
        let id = NodeId::string(NS, "0:Green");
        assert_eq!(index.lookup(&graph, &id, &mut cache), Some(area));
        assert_eq!(index.lookup(&graph, &id, &mut OperationCache::new()), Some(area));
        let id = NodeId::string(NS, "1:Metals/WestTank");
        assert_eq!(index.lookup(&graph, &id, &mut cache), Some(source));
        assert_eq!(index.lookup(&graph, &id, &mut cache), Some(source));
    }

    #[test]
    fn test_validate_caches_negative_results() {
        let (graph, index, _, source) = topology();
        let mut cache = OperationCache::new();
        let bad = NodeId::string(NS, "1:Metals/WestTank?NoSuchAlarm");
        let mut handle = index.resolve(&graph, &bad).unwrap();
        assert!(handle.node().is_none());
        assert_eq!(index.validate(&graph, &mut handle, &mut cache), None);
        assert_eq!(cache.get(&bad), Some(&None));

        let good = NodeId::string(NS, "1:Metals/WestTank?HighAlarm");
        let key = index.lookup(&graph, &good, &mut cache).unwrap();
        assert_eq!(graph.get(key).unwrap().parent(), Some(source));
    }

    #[test]
    fn test_component_cache_balance() {
        let (graph, mut index, _, source) = topology();
        let id = NodeId::string(NS, "1:Metals/WestTank?HighAlarm");
        let root_id = NodeId::string(NS, "1:Metals/WestTank");
        let handle = index.resolve(&graph, &id).unwrap();
        for n in 1..=5 {
            assert_eq!(index.add_to_component_cache(&handle), source);
            assert_eq!(index.component_ref_count(&root_id), Some(n));
        }
        for _ in 0..5 {
            index.remove_from_component_cache(&handle);
        }
        assert_eq!(index.component_ref_count(&root_id), None);
        assert_eq!(index.component_cache_len(), 0);

        // Extra releases are ignored.
        index.remove_from_component_cache(&handle);
        assert_eq!(index.component_cache_len(), 0);
    }

    #[test]
    fn test_manager_handle_uses_component_cache() {
        let (graph, mut index, _, _) = topology();
        let id = NodeId::string(NS, "1:Metals/WestTank?HighAlarm");
        let handle = index.resolve(&graph, &id).unwrap();
        index.add_to_component_cache(&handle);
        let cached = index.manager_handle(&graph, &id).unwrap();
        assert!(cached.node().is_some());
        assert!(index.manager_handle(&graph, &NodeId::string(9, "0:Green")).is_none());
    }
}
