// crates/plcsim-rs/src/events/notifier.rs
//! `HasNotifier`/`HasEventSource` links and the observation bookkeeping that
//! decides whether an event has anyone to go to.
//!
//! Subscribing to a notifier marks it and everything reachable below it
//! through notifier links as observed (reference counted, once per
//! subscription). Raising an event walks the inverse links upwards from the
//! origin and hands the event to every event item attached on the way, once
//! per item.

use crate::PlcError;
use crate::address_space::graph::Reference;
use crate::address_space::{NodeGraph, NodeKey};
use crate::monitoring::{MonitoredItem, MonitoredItemRegistry};
use crate::types::{NodeId, ReferenceType};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

type Links = HashMap<NodeKey, Vec<(ReferenceType, NodeKey)>>;

#[derive(Debug, Default)]
pub struct NotifierGraph {
    forward: Links,
    inverse: Links,
    root_notifiers: Vec<NodeKey>,
    observed: HashMap<NodeKey, usize>,
    server_items: Vec<Arc<MonitoredItem>>,
}

fn server_reference() -> Reference {
    Reference {
        reference_type: ReferenceType::HasNotifier,
        target: NodeId::server(),
        is_forward: false,
    }
}

impl NotifierGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `HasNotifier` or `HasEventSource` link from `from` to `to`.
    /// Observers of `from` immediately observe `to` as well.
    pub fn add_link(&mut self, from: NodeKey, to: NodeKey, reference_type: ReferenceType) {
        let links = self.forward.entry(from).or_default();
        if links.iter().any(|(_, target)| *target == to) {
            return;
        }
        links.push((reference_type, to));
        self.inverse.entry(to).or_default().push((reference_type, from));
        let count = self.observed_count(from);
        if count > 0 {
            self.propagate(to, count as isize);
        }
    }

    pub fn forward_links(&self, key: NodeKey) -> &[(ReferenceType, NodeKey)] {
        self.forward.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn inverse_links(&self, key: NodeKey) -> &[(ReferenceType, NodeKey)] {
        self.inverse.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `start` and every node reachable from it through forward links.
    pub fn downward(&self, start: NodeKey) -> Vec<NodeKey> {
        let mut seen = HashSet::from([start]);
        let mut order = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for (_, next) in self.forward_links(current) {
                if seen.insert(*next) {
                    order.push(*next);
                    queue.push_back(*next);
                }
            }
        }
        order
    }

    fn propagate(&mut self, start: NodeKey, delta: isize) {
        for key in self.downward(start) {
            let count = self.observed.entry(key).or_default();
            *count = count.saturating_add_signed(delta);
            if *count == 0 {
                self.observed.remove(&key);
            }
        }
    }

    pub fn observed_count(&self, key: NodeKey) -> usize {
        self.observed.get(&key).copied().unwrap_or(0)
    }

    pub fn is_observed(&self, key: NodeKey) -> bool {
        self.observed_count(key) > 0
    }

    pub fn root_notifiers(&self) -> &[NodeKey] {
        &self.root_notifiers
    }

    pub fn server_items(&self) -> &[Arc<MonitoredItem>] {
        &self.server_items
    }

    /// Registers a node whose events go straight to the `Server` object.
    /// Existing server-wide subscriptions are extended to it at once.
    pub fn add_root_notifier(
        &mut self,
        graph: &mut NodeGraph,
        registry: &mut MonitoredItemRegistry,
        key: NodeKey,
    ) -> bool {
        if self.root_notifiers.contains(&key) {
            return false;
        }
        let Some(node) = graph.get(key) else {
            return false;
        };
        let is_server = node.node_id == NodeId::server();
        self.root_notifiers.push(key);
        if !is_server {
            graph.add_reference(key, server_reference());
        }
        for item in self.server_items.clone() {
            if let Err(e) = self.subscribe(graph, registry, key, &item, false) {
                log::warn!(
                    "Root notifier {} rejected server-wide item {}: {}",
                    graph.get(key).map(|n| n.browse_name.as_str()).unwrap_or("?"),
                    item.id(),
                    e
                );
            }
        }
        true
    }

    pub fn remove_root_notifier(
        &mut self,
        graph: &mut NodeGraph,
        registry: &mut MonitoredItemRegistry,
        key: NodeKey,
    ) -> bool {
        let Some(pos) = self.root_notifiers.iter().position(|k| *k == key) else {
            return false;
        };
        self.root_notifiers.remove(pos);
        for item in self.server_items.clone() {
            // Unsubscribing never fails.
            let _ = self.subscribe(graph, registry, key, &item, true);
        }
        graph.remove_reference(key, &server_reference());
        true
    }

    /// Attaches (or detaches) an event item to a notifier node.
    pub fn subscribe(
        &mut self,
        graph: &NodeGraph,
        registry: &mut MonitoredItemRegistry,
        key: NodeKey,
        item: &Arc<MonitoredItem>,
        unsubscribe: bool,
    ) -> Result<(), PlcError> {
        if unsubscribe {
            if registry.detach(key, item.id(), true) {
                self.propagate(key, -1);
            }
            return Ok(());
        }
        let node = graph.get(key).ok_or(PlcError::NodeIdUnknown)?;
        if !node.is_event_notifier() {
            return Err(PlcError::NotSupported);
        }
        if registry.event_items(key).iter().any(|i| i.id() == item.id()) {
            return Ok(());
        }
        registry.attach_event(key, Arc::clone(item));
        self.propagate(key, 1);
        Ok(())
    }

    /// Applies `subscribe` to every root notifier, now and for roots added later.
    pub fn subscribe_to_all(
        &mut self,
        graph: &NodeGraph,
        registry: &mut MonitoredItemRegistry,
        item: &Arc<MonitoredItem>,
        unsubscribe: bool,
    ) {
        if unsubscribe {
            self.server_items.retain(|i| i.id() != item.id());
        } else if !self.server_items.iter().any(|i| i.id() == item.id()) {
            self.server_items.push(Arc::clone(item));
        }
        for key in self.root_notifiers.clone() {
            if let Err(e) = self.subscribe(graph, registry, key, item, unsubscribe) {
                log::warn!("Server-wide item {} skipped a root notifier: {}", item.id(), e);
            }
        }
    }

    /// Event items that must receive an event raised at `origin`.
    pub fn event_targets(
        &self,
        graph: &NodeGraph,
        registry: &MonitoredItemRegistry,
        origin: NodeKey,
    ) -> Vec<Arc<MonitoredItem>> {
        if !self.is_observed(origin) {
            return Vec::new();
        }
        let mut targets: Vec<Arc<MonitoredItem>> = Vec::new();
        let mut seen = HashSet::from([origin]);
        let mut queue = VecDeque::from([origin]);
        while let Some(current) = queue.pop_front() {
            for item in registry.event_items(current) {
                if !targets.iter().any(|t| t.id() == item.id()) {
                    targets.push(Arc::clone(item));
                }
            }
            let parent = graph
                .get(current)
                .and_then(|n| n.parent())
                .filter(|p| graph.get(*p).is_some_and(|n| n.is_event_notifier()));
            let ancestors = self
                .inverse_links(current)
                .iter()
                .map(|(_, from)| *from)
                .chain(parent);
            for next in ancestors {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        targets
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.inverse.clear();
        self.root_notifiers.clear();
        self.observed.clear();
        self.server_items.clear();
    }
}
