// crates/plcsim-rs/src/monitoring/registry.rs

use super::filter::{
    AggregateFilter, DataChangeFilter, DeadbandType, ItemFilter, MonitoringFilter,
    is_supported_aggregate,
};
use super::item::{MonitoredItem, MonitoredItemId};
use crate::PlcError;
use crate::address_space::index::NodeHandle;
use crate::address_space::{DataValue, NodeGraph, NodeKey, Variant};
use crate::config::ServerLimits;
use crate::types::AttributeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Replacement for an "infinite" sampling interval: one year, in milliseconds.
pub const ONE_YEAR_MS: f64 = 365.0 * 24.0 * 3600.0 * 1000.0;

/// Items attached to one node. Exists only while at least one item is attached.
#[derive(Debug, Default)]
pub struct MonitoredNode {
    pub data_items: Vec<Arc<MonitoredItem>>,
    pub event_items: Vec<Arc<MonitoredItem>>,
}

impl MonitoredNode {
    pub fn is_empty(&self) -> bool {
        self.data_items.is_empty() && self.event_items.is_empty()
    }
}

/// An item owned by this registry and the handle it keeps cached.
#[derive(Debug)]
pub struct ItemEntry {
    pub item: Arc<MonitoredItem>,
    pub node: NodeKey,
    pub handle: NodeHandle,
}

#[derive(Debug, Default)]
pub struct MonitoredItemRegistry {
    items: HashMap<MonitoredItemId, ItemEntry>,
    nodes: HashMap<NodeKey, MonitoredNode>,
}

impl MonitoredItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of an item. Data items are attached to their node;
    /// event items are attached by the notifier graph.
    pub fn insert(&mut self, item: Arc<MonitoredItem>, node: NodeKey, handle: NodeHandle) {
        if !item.is_event_item() {
            self.attach_data(node, Arc::clone(&item));
        }
        self.items.insert(item.id(), ItemEntry { item, node, handle });
    }

    /// Releases an owned item and detaches its data subscription.
    pub fn remove(&mut self, id: MonitoredItemId) -> Option<ItemEntry> {
        let entry = self.items.remove(&id)?;
        if !entry.item.is_event_item() {
            self.detach(entry.node, id, false);
        }
        Some(entry)
    }

    pub fn get(&self, id: MonitoredItemId) -> Option<&ItemEntry> {
        self.items.get(&id)
    }

    pub fn attach_data(&mut self, node: NodeKey, item: Arc<MonitoredItem>) {
        self.nodes.entry(node).or_default().data_items.push(item);
    }

    pub fn attach_event(&mut self, node: NodeKey, item: Arc<MonitoredItem>) {
        let monitored = self.nodes.entry(node).or_default();
        if !monitored.event_items.iter().any(|i| i.id() == item.id()) {
            monitored.event_items.push(item);
        }
    }

    /// Detaches an item from a node, dropping the node entry once it is empty.
    /// Returns true if the item was attached.
    pub fn detach(&mut self, node: NodeKey, id: MonitoredItemId, event: bool) -> bool {
        let Some(monitored) = self.nodes.get_mut(&node) else {
            return false;
        };
        let list = if event {
            &mut monitored.event_items
        } else {
            &mut monitored.data_items
        };
        let before = list.len();
        list.retain(|i| i.id() != id);
        let removed = list.len() != before;
        if monitored.is_empty() {
            self.nodes.remove(&node);
        }
        removed
    }

    pub fn event_items(&self, node: NodeKey) -> &[Arc<MonitoredItem>] {
        self.nodes
            .get(&node)
            .map(|n| n.event_items.as_slice())
            .unwrap_or(&[])
    }

    /// Delivers a new value of `node` to its data items on the given attribute.
    pub fn notify_data_change(&self, node: NodeKey, attribute: AttributeId, value: &DataValue) {
        if let Some(monitored) = self.nodes.get(&node) {
            for item in monitored
                .data_items
                .iter()
                .filter(|i| i.attribute_id() == attribute)
            {
                item.enqueue_data(value, false);
            }
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn monitored_node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Drops every item and node entry. Returns the released owned items.
    pub fn clear(&mut self) -> Vec<ItemEntry> {
        self.nodes.clear();
        self.items.drain().map(|(_, entry)| entry).collect()
    }
}

/// Applies the sampling policy: infinite becomes one year, and the interval
/// is never below the node's or the server's minimum.
pub fn revise_sampling_interval(requested: f64, node_minimum: f64, limits: &ServerLimits) -> f64 {
    let requested = if requested.is_infinite() || requested > ONE_YEAR_MS {
        ONE_YEAR_MS
    } else if requested.is_nan() || requested < 0.0 {
        0.0
    } else {
        requested
    };
    requested
        .max(node_minimum)
        .max(limits.min_sampling_interval_ms)
}

/// Clamps a queue size into `[1, max_queue_size]`.
pub fn revise_queue_size(requested: u32, limits: &ServerLimits) -> usize {
    requested.clamp(1, limits.max_queue_size.max(1)) as usize
}

/// Validates a requested filter against the node and attribute and converts
/// it into the filter the item applies.
pub fn validate_filter(
    graph: &NodeGraph,
    node: NodeKey,
    attribute: AttributeId,
    filter: &MonitoringFilter,
    sampling_interval: f64,
    queue_size: usize,
    limits: &ServerLimits,
) -> Result<ItemFilter, PlcError> {
    match filter {
        MonitoringFilter::None => Ok(ItemFilter::None),
        MonitoringFilter::Event => {
            if attribute == AttributeId::EventNotifier {
                Ok(ItemFilter::Event)
            } else {
                Err(PlcError::FilterNotAllowed)
            }
        }
        MonitoringFilter::DataChange(filter) => validate_deadband(graph, node, attribute, filter),
        MonitoringFilter::Aggregate(filter) => {
            if attribute != AttributeId::Value {
                return Err(PlcError::FilterNotAllowed);
            }
            revise_aggregate(filter, sampling_interval, queue_size, limits, SystemTime::now())
                .map(ItemFilter::Aggregate)
        }
    }
}

fn validate_deadband(
    graph: &NodeGraph,
    key: NodeKey,
    attribute: AttributeId,
    filter: &DataChangeFilter,
) -> Result<ItemFilter, PlcError> {
    if filter.deadband_type == DeadbandType::None {
        return Ok(ItemFilter::None);
    }
    let node = graph.get(key).ok_or(PlcError::NodeIdUnknown)?;
    if attribute != AttributeId::Value || !node.value.value.is_numeric() {
        return Err(PlcError::FilterNotAllowed);
    }
    if !filter.deadband_value.is_finite() || filter.deadband_value < 0.0 {
        return Err(PlcError::FilterNotAllowed);
    }
    match filter.deadband_type {
        DeadbandType::None => Ok(ItemFilter::None),
        DeadbandType::Absolute => Ok(ItemFilter::Deadband(filter.deadband_value)),
        DeadbandType::Percent => {
            if filter.deadband_value > 100.0 {
                return Err(PlcError::FilterNotAllowed);
            }
            let range = graph
                .find_child(key, "EURange")
                .and_then(|k| graph.get(k))
                .and_then(|n| match n.value.value {
                    Variant::Range { low, high } => Some(high - low),
                    _ => None,
                })
                .ok_or(PlcError::FilterNotAllowed)?;
            Ok(ItemFilter::Deadband(filter.deadband_value / 100.0 * range.abs()))
        }
    }
}

/// Revises an aggregate filter. Unknown aggregates are not supported.
pub fn revise_aggregate(
    filter: &AggregateFilter,
    sampling_interval: f64,
    queue_size: usize,
    limits: &ServerLimits,
    now: SystemTime,
) -> Result<AggregateFilter, PlcError> {
    if !is_supported_aggregate(&filter.aggregate_type) {
        return Err(PlcError::NotSupported);
    }
    let processing_interval = filter
        .processing_interval
        .max(sampling_interval)
        .max(limits.min_processing_interval_ms);
    let window = Duration::from_secs_f64(
        (queue_size as f64 * processing_interval / 1000.0).min(ONE_YEAR_MS / 1000.0),
    );
    let earliest = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
    let start_time = if filter.start_time < earliest {
        earliest
    } else {
        filter.start_time
    };
    Ok(AggregateFilter {
        aggregate_type: filter.aggregate_type.clone(),
        start_time,
        processing_interval,
    })
}
