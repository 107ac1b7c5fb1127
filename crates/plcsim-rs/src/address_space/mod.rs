// crates/plcsim-rs/src/address_space/mod.rs
//! The in-memory address space of one node manager: the node arena, the
//! identifier index, the notifier graph and the monitored items, together
//! with the attribute, event and browse operations that need all of them.

pub mod browse;
pub mod graph;
pub mod index;
pub mod node;
pub mod value;

pub use browse::{
    BrowseDirection, BrowseResult, ContinuationPoint, ReferenceDescription,
};
pub use graph::{NodeGraph, Reference};
pub use index::{AddressSpaceIndex, NodeHandle, OperationCache, ParsedNodeId, RootType};
pub use node::{Node, NodeKey, NodeKind};
pub use value::{DataType, DataValue, Variant};

use crate::PlcError;
use crate::config::ServerLimits;
use crate::events::{EventId, EventIdGen, EventNotification, NotifierGraph};
use crate::monitoring::registry::ItemEntry;
use crate::monitoring::{MonitoredItem, MonitoredItemRegistry};
use crate::types::{AttributeId, NamespaceIndex, NodeClass, ReferenceType};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug)]
pub struct AddressSpace {
    pub graph: NodeGraph,
    pub index: AddressSpaceIndex,
    pub notifiers: NotifierGraph,
    pub monitoring: MonitoredItemRegistry,
    continuation_points: BTreeMap<u64, Vec<ReferenceDescription>>,
    next_continuation_point: u64,
    event_ids: EventIdGen,
    limits: ServerLimits,
}

impl AddressSpace {
    pub fn new(namespace: NamespaceIndex, limits: ServerLimits) -> Self {
        Self {
            graph: NodeGraph::new(),
            index: AddressSpaceIndex::new(namespace),
            notifiers: NotifierGraph::new(),
            monitoring: MonitoredItemRegistry::new(),
            continuation_points: BTreeMap::new(),
            next_continuation_point: 1,
            event_ids: EventIdGen::new(),
            limits,
        }
    }

    pub fn namespace(&self) -> NamespaceIndex {
        self.index.namespace()
    }

    pub fn limits(&self) -> &ServerLimits {
        &self.limits
    }

    pub fn value(&self, key: NodeKey) -> Option<&DataValue> {
        self.graph
            .get(key)
            .filter(|n| n.class == NodeClass::Variable)
            .map(|n| &n.value)
    }

    /// Replaces a variable's value and notifies its data items.
    pub fn set_value(&mut self, key: NodeKey, value: DataValue) -> Result<(), PlcError> {
        let node = self.graph.get_mut(key).ok_or(PlcError::NodeIdUnknown)?;
        if node.class != NodeClass::Variable {
            return Err(PlcError::NotSupported);
        }
        node.value = value;
        self.monitoring
            .notify_data_change(key, AttributeId::Value, &node.value);
        Ok(())
    }

    pub fn read_attribute(&self, key: NodeKey, attribute: AttributeId) -> Result<DataValue, PlcError> {
        let node = self.graph.get(key).ok_or(PlcError::NodeIdUnknown)?;
        let is_variable = node.class == NodeClass::Variable;
        let value: Variant = match attribute {
            AttributeId::NodeId => node.node_id.to_string().into(),
            AttributeId::NodeClass => Variant::Int32(match node.class {
                NodeClass::Object => 1,
                NodeClass::Variable => 2,
                NodeClass::Method => 4,
            }),
            AttributeId::BrowseName => node.browse_name.clone().into(),
            AttributeId::DisplayName => node.display_name.clone().into(),
            AttributeId::Description => node.description.clone().into(),
            AttributeId::EventNotifier if node.class == NodeClass::Object => {
                Variant::UInt32(u32::from(node.event_notifier))
            }
            AttributeId::Value if is_variable => return Ok(node.value.clone()),
            AttributeId::DataType if is_variable => format!("{:?}", node.data_type).into(),
            AttributeId::AccessLevel if is_variable => Variant::UInt32(u32::from(node.access_level)),
            AttributeId::MinimumSamplingInterval if is_variable => {
                Variant::Double(node.minimum_sampling_interval)
            }
            _ => return Err(PlcError::AttributeIdInvalid),
        };
        Ok(DataValue::new_now(value))
    }

    /// Client write of a variable's value, checked against access level and type.
    pub fn write_value(&mut self, key: NodeKey, value: Variant) -> Result<(), PlcError> {
        let node = self.graph.get(key).ok_or(PlcError::NodeIdUnknown)?;
        if node.class != NodeClass::Variable {
            return Err(PlcError::AttributeIdInvalid);
        }
        if !node.is_writable() {
            return Err(PlcError::NotWritable);
        }
        if node.data_type != DataType::BaseDataType && value.data_type() != Some(node.data_type) {
            return Err(PlcError::TypeMismatch);
        }
        self.set_value(key, DataValue::new_now(value))
    }

    pub fn next_event_id(&mut self) -> EventId {
        self.event_ids.next_id()
    }

    /// Hands `event` to every event item observing `origin`. Returns the
    /// number of items reached; unobserved origins cost nothing.
    pub fn report_event(&self, origin: NodeKey, event: &EventNotification) -> usize {
        let targets = self
            .notifiers
            .event_targets(&self.graph, &self.monitoring, origin);
        targets
            .iter()
            .filter(|item| item.enqueue_event(event))
            .count()
    }

    /// Raises a simple event from `origin`.
    pub fn raise_event(&mut self, origin: NodeKey, message: String, severity: u16) -> usize {
        if !self.notifiers.is_observed(origin) {
            return 0;
        }
        let Some(node) = self.graph.get(origin) else {
            return 0;
        };
        let event = EventNotification::base(
            self.event_ids.next_id(),
            node.node_id.clone(),
            &node.browse_name,
            message,
            severity,
        );
        self.report_event(origin, &event)
    }

    /// Builds the event describing a condition's current state. The event
    /// originates from the condition's source.
    fn condition_event(&mut self, condition: NodeKey) -> Option<(NodeKey, EventNotification)> {
        let node = self.graph.get(condition)?;
        let state = node.condition_state()?;
        let source_key = node.parent()?;
        let source = self.graph.get(source_key)?;
        let event = EventNotification::condition(
            self.event_ids.next_id(),
            source.node_id.clone(),
            &source.browse_name,
            state,
        );
        Some((source_key, event))
    }

    /// Reports a condition state change. Disabled conditions stay silent.
    pub fn report_condition(&mut self, condition: NodeKey) -> usize {
        let enabled = self
            .graph
            .get(condition)
            .and_then(Node::condition_state)
            .is_some_and(|s| s.enabled);
        if !enabled {
            return 0;
        }
        let observed = self
            .graph
            .get(condition)
            .and_then(Node::parent)
            .is_some_and(|source| self.notifiers.is_observed(source));
        if !observed {
            return 0;
        }
        match self.condition_event(condition) {
            Some((origin, event)) => self.report_event(origin, &event),
            None => 0,
        }
    }

    /// Snapshots of every retained condition at or below `start`.
    pub fn condition_snapshots(&mut self, start: NodeKey) -> Vec<EventNotification> {
        let mut conditions = Vec::new();
        let mut seen = HashSet::new();
        for key in self.notifiers.downward(start) {
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            let candidates = std::iter::once(key).chain(node.children().iter().copied());
            for candidate in candidates {
                let retained = self
                    .graph
                    .get(candidate)
                    .and_then(Node::condition_state)
                    .is_some_and(|s| s.retain);
                if retained && seen.insert(candidate) {
                    conditions.push(candidate);
                }
            }
        }
        conditions
            .into_iter()
            .filter_map(|c| self.condition_event(c).map(|(_, event)| event))
            .collect()
    }

    /// Queues current condition snapshots into each item. Items neither
    /// owned here nor subscribed server-wide are skipped.
    pub fn condition_refresh(&mut self, items: &[Arc<MonitoredItem>]) -> usize {
        let mut delivered = 0;
        for item in items {
            let starts: Vec<NodeKey> = if self
                .notifiers
                .server_items()
                .iter()
                .any(|i| i.id() == item.id())
            {
                self.notifiers.root_notifiers().to_vec()
            } else if let Some(entry) = self.monitoring.get(item.id()) {
                vec![entry.node]
            } else {
                continue;
            };
            let mut sent = HashSet::new();
            for start in starts {
                for snapshot in self.condition_snapshots(start) {
                    let key = (snapshot.source_node.clone(), snapshot.condition_name.clone());
                    if sent.insert(key) && item.enqueue_event(&snapshot) {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    fn describe(&self, target: NodeKey, reference_type: ReferenceType, is_forward: bool) -> Option<ReferenceDescription> {
        let node = self.graph.get(target)?;
        Some(ReferenceDescription {
            reference_type,
            is_forward,
            target: node.node_id.clone(),
            browse_name: node.browse_name.clone(),
            display_name: node.display_name.clone(),
            node_class: Some(node.class),
        })
    }

    /// All references of `key` matching the direction and type filter.
    pub fn references(
        &self,
        key: NodeKey,
        direction: BrowseDirection,
        reference_type: Option<ReferenceType>,
    ) -> Result<Vec<ReferenceDescription>, PlcError> {
        let node = self.graph.get(key).ok_or(PlcError::NodeIdUnknown)?;
        let mut refs = Vec::new();
        if direction.includes(true) {
            refs.extend(node.children().iter().filter_map(|child| {
                let child_ref = self.graph.get(*child)?.parent_reference();
                self.describe(*child, child_ref, true)
            }));
            refs.extend(
                self.notifiers
                    .forward_links(key)
                    .iter()
                    .filter_map(|(rt, target)| self.describe(*target, *rt, true)),
            );
        }
        if direction.includes(false) {
            if let Some(parent) = node.parent() {
                refs.extend(self.describe(parent, node.parent_reference(), false));
            }
            refs.extend(
                self.notifiers
                    .inverse_links(key)
                    .iter()
                    .filter_map(|(rt, source)| self.describe(*source, *rt, false)),
            );
        }
        refs.extend(
            self.graph
                .references(key)
                .iter()
                .filter(|r| direction.includes(r.is_forward))
                .map(|r| ReferenceDescription {
                    reference_type: r.reference_type,
                    is_forward: r.is_forward,
                    target: r.target.clone(),
                    browse_name: String::new(),
                    display_name: String::new(),
                    node_class: None,
                }),
        );
        if let Some(filter) = reference_type {
            refs.retain(|r| r.reference_type.is_subtype_of(filter));
        }
        Ok(refs)
    }

    /// Browses a node. Results beyond `max_references` (0 = unlimited) are
    /// kept behind a continuation point.
    pub fn browse(
        &mut self,
        key: NodeKey,
        direction: BrowseDirection,
        reference_type: Option<ReferenceType>,
        max_references: usize,
    ) -> Result<BrowseResult, PlcError> {
        let refs = self.references(key, direction, reference_type)?;
        Ok(self.page(refs, max_references))
    }

    /// Resumes (or releases, when `release` is set) a continuation point.
    pub fn browse_next(
        &mut self,
        continuation_point: ContinuationPoint,
        max_references: usize,
        release: bool,
    ) -> Result<BrowseResult, PlcError> {
        if continuation_point.namespace != self.namespace() {
            return Err(PlcError::ContinuationPointInvalid);
        }
        let remaining = self
            .continuation_points
            .remove(&continuation_point.id)
            .ok_or(PlcError::ContinuationPointInvalid)?;
        if release {
            return Ok(BrowseResult::default());
        }
        Ok(self.page(remaining, max_references))
    }

    fn page(&mut self, mut refs: Vec<ReferenceDescription>, max_references: usize) -> BrowseResult {
        if max_references == 0 || refs.len() <= max_references {
            return BrowseResult {
                references: refs,
                continuation_point: None,
            };
        }
        let rest = refs.split_off(max_references);
        while self.continuation_points.len() >= self.limits.max_browse_continuation_points.max(1) {
            self.continuation_points.pop_first();
        }
        let id = self.next_continuation_point;
        self.next_continuation_point += 1;
        self.continuation_points.insert(id, rest);
        BrowseResult {
            references: refs,
            continuation_point: Some(ContinuationPoint {
                namespace: self.namespace(),
                id,
            }),
        }
    }

    pub fn continuation_point_count(&self) -> usize {
        self.continuation_points.len()
    }

    /// Drops every node, link, item and cache. Returns the released items.
    pub fn clear(&mut self) -> Vec<ItemEntry> {
        let released = self.monitoring.clear();
        self.notifiers.clear();
        self.index.clear();
        self.graph.clear();
        self.continuation_points.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::condition::AlarmKind;
    use crate::monitoring::{ItemSettings, MonitoringMode, Notification, ItemFilter};
    use crate::types::{NodeId, StatusCode};

    struct Fixture {
        space: AddressSpace,
        area: NodeKey,
        source: NodeKey,
        alarm: NodeKey,
        counter: NodeKey,
    }

    fn fixture() -> Fixture {
        let mut space = AddressSpace::new(3, ServerLimits::default());
        let area_id = ParsedNodeId::new(RootType::Area, "Green");
        let area = space
            .graph
            .insert_root(Node::area(area_id.construct(3), "Green"))
            .unwrap();
        space.index.register_area("Green", area);
        let source_id = ParsedNodeId::new(RootType::Source, "Metals/WestTank");
        let source = space
            .graph
            .insert_root(Node::source(source_id.construct(3), "WestTank", "Metals/WestTank"))
            .unwrap();
        space.index.register_source("Metals/WestTank", source);
        let alarm = space
            .graph
            .insert_component(
                source,
                ReferenceType::HasComponent,
                Node::condition(
                    source_id.with_component("HighAlarm").construct(3),
                    AlarmKind::HighLevel,
                ),
            )
            .unwrap();
        space
            .notifiers
            .add_link(area, source, ReferenceType::HasEventSource);
        let counter = space
            .graph
            .insert_child(
                area,
                ReferenceType::HasComponent,
                Node::variable(NodeId::string(3, "Counter"), "Counter", 0u32, true),
            )
            .unwrap();
        Fixture {
            space,
            area,
            source,
            alarm,
            counter,
        }
    }

    fn event_item(id: u32) -> Arc<MonitoredItem> {
        Arc::new(MonitoredItem::event_item(id, NodeId::string(3, "0:Green"), 100))
    }

    #[test]
    fn test_read_attributes() {
        let f = fixture();
        let name = f.space.read_attribute(f.area, AttributeId::BrowseName).unwrap();
        assert_eq!(name.value, Variant::from("Green"));
        assert_eq!(
            f.space.read_attribute(f.area, AttributeId::Value),
            Err(PlcError::AttributeIdInvalid)
        );
        let value = f.space.read_attribute(f.counter, AttributeId::Value).unwrap();
        assert_eq!(value.value, Variant::UInt32(0));
        assert_eq!(value.status, StatusCode::GOOD);
    }

    #[test]
    fn test_write_checks_type() {
        let mut f = fixture();
        assert_eq!(
            f.space.write_value(f.counter, Variant::Double(1.0)),
            Err(PlcError::TypeMismatch)
        );
        f.space.write_value(f.counter, Variant::UInt32(9)).unwrap();
        assert_eq!(f.space.value(f.counter).unwrap().value, Variant::UInt32(9));
    }

    #[test]
    fn test_set_value_notifies_data_items() {
        let mut f = fixture();
        let item = Arc::new(MonitoredItem::new(
            5,
            NodeId::string(3, "Counter"),
            AttributeId::Value,
            5,
            ItemSettings {
                mode: MonitoringMode::Reporting,
                sampling_interval: 0.0,
                queue_size: 10,
                discard_oldest: true,
                filter: ItemFilter::None,
            },
        ));
        let handle = f
            .space
            .index
            .resolve(&f.space.graph, &NodeId::string(3, "Counter"))
            .unwrap();
        f.space.monitoring.insert(Arc::clone(&item), f.counter, handle);
        f.space.set_value(f.counter, DataValue::new_now(4u32)).unwrap();
        assert!(matches!(
            item.take_notifications().as_slice(),
            [Notification::Data(dv)] if dv.value == Variant::UInt32(4)
        ));
    }

    #[test]
    fn test_condition_events_reach_area() {
        let mut f = fixture();
        let item = event_item(1);
        assert_eq!(f.space.report_condition(f.alarm), 0);
        f.space
            .notifiers
            .subscribe(&f.space.graph, &mut f.space.monitoring, f.area, &item, false)
            .unwrap();
        f.space
            .graph
            .get_mut(f.alarm)
            .and_then(Node::condition_state_mut)
            .unwrap()
            .activate(600, "high")
            .unwrap();
        assert_eq!(f.space.report_condition(f.alarm), 1);
        let events = item.take_notifications();
        assert!(matches!(
            events.as_slice(),
            [Notification::Event(e)] if e.condition_name.as_deref() == Some("HighAlarm") && e.severity == 600
        ));
    }

    #[test]
    fn test_condition_refresh_sends_retained_only() {
        let mut f = fixture();
        let item = event_item(1);
        f.space
            .notifiers
            .subscribe(&f.space.graph, &mut f.space.monitoring, f.area, &item, false)
            .unwrap();
        // Owned by the registry so refresh can find its node.
        let handle = f
            .space
            .index
            .resolve(&f.space.graph, &NodeId::string(3, "0:Green"))
            .unwrap();
        f.space.monitoring.insert(Arc::clone(&item), f.area, handle);
        assert_eq!(f.space.condition_refresh(&[Arc::clone(&item)]), 0);

        f.space
            .graph
            .get_mut(f.alarm)
            .and_then(Node::condition_state_mut)
            .unwrap()
            .activate(300, "high")
            .unwrap();
        assert_eq!(f.space.condition_refresh(&[Arc::clone(&item)]), 1);
        let events = item.take_notifications();
        assert!(matches!(
            events.as_slice(),
            [Notification::Event(e)] if e.source_node == f.space.graph.get(f.source).unwrap().node_id
        ));
    }

    #[test]
    fn test_browse_with_continuation_point() {
        let mut f = fixture();
        let all = f
            .space
            .browse(f.area, BrowseDirection::Forward, None, 0)
            .unwrap();
        assert_eq!(all.references.len(), 2);
        assert!(all.continuation_point.is_none());

        let first = f
            .space
            .browse(f.area, BrowseDirection::Forward, None, 1)
            .unwrap();
        assert_eq!(first.references.len(), 1);
        let cp = first.continuation_point.unwrap();
        let rest = f.space.browse_next(cp, 1, false).unwrap();
        assert_eq!(rest.references.len(), 1);
        assert!(rest.continuation_point.is_none());
        assert_eq!(
            f.space.browse_next(cp, 1, false),
            Err(PlcError::ContinuationPointInvalid)
        );

        let only_sources = f
            .space
            .browse(
                f.area,
                BrowseDirection::Forward,
                Some(ReferenceType::HasEventSource),
                0,
            )
            .unwrap();
        assert_eq!(only_sources.references.len(), 1);
        assert_eq!(
            only_sources.references[0].target,
            NodeId::string(3, "1:Metals/WestTank")
        );
    }

    #[test]
    fn test_browse_release_frees_point() {
        let mut f = fixture();
        let first = f
            .space
            .browse(f.area, BrowseDirection::Forward, None, 1)
            .unwrap();
        let cp = first.continuation_point.unwrap();
        assert_eq!(f.space.continuation_point_count(), 1);
        let released = f.space.browse_next(cp, 0, true).unwrap();
        assert!(released.references.is_empty());
        assert_eq!(f.space.continuation_point_count(), 0);
    }
}
