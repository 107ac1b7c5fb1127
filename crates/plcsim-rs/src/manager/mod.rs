// crates/plcsim-rs/src/manager/mod.rs
//! The contract between a node manager and the server host, split into the
//! capabilities the host needs: identifier resolution, attribute access and
//! the subscription lifecycle.

pub mod alarm;
pub mod base;
pub mod plc;

use crate::PlcError;
use crate::address_space::{
    BrowseDirection, BrowseResult, ContinuationPoint, DataValue, NodeHandle, ReferenceDescription,
    Variant,
};
use crate::monitoring::{
    ItemFilter, MonitoredItem, MonitoredItemId, MonitoringMode, MonitoringParameters, Notification,
};
use crate::types::{AttributeId, NamespaceIndex, NodeClass, NodeId, ReferenceType};
use std::collections::HashMap;
use std::sync::Arc;

/// Result slot of one batch item. `None` leaves the item for another manager.
pub type BatchResult<T> = Option<Result<T, PlcError>>;

/// References a manager adds to nodes it does not own, keyed by the target
/// node (e.g. the `ObjectsFolder` organizing the manager's root folder).
pub type ExternalReferences = HashMap<NodeId, Vec<ReferenceDescription>>;

/// Publishes a manager's root object under `ObjectsFolder` and as an event
/// notifier of the `Server` object.
pub(crate) fn register_root(external: &mut ExternalReferences, target: NodeId, name: &str) {
    let reference = |reference_type| ReferenceDescription {
        reference_type,
        is_forward: true,
        target: target.clone(),
        browse_name: name.to_owned(),
        display_name: name.to_owned(),
        node_class: Some(NodeClass::Object),
    };
    external
        .entry(NodeId::objects_folder())
        .or_default()
        .push(reference(ReferenceType::Organizes));
    external
        .entry(NodeId::server())
        .or_default()
        .push(reference(ReferenceType::HasNotifier));
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadValueId {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    pub fn value(node_id: NodeId) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteValue {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
    pub value: Variant,
}

impl WriteValue {
    pub fn value(node_id: NodeId, value: impl Into<Variant>) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrowseDescription {
    pub node_id: NodeId,
    pub direction: BrowseDirection,
    /// Only references of this type or its subtypes.
    pub reference_type: Option<ReferenceType>,
    /// Zero means unlimited.
    pub max_references: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallMethodRequest {
    pub object_id: NodeId,
    pub method_id: NodeId,
    pub input_arguments: Vec<Variant>,
}

/// A monitored item to create. The host allocates `item_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateRequest {
    pub item_id: MonitoredItemId,
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
    pub mode: MonitoringMode,
    pub parameters: MonitoringParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemModifyRequest {
    pub item_id: MonitoredItemId,
    pub parameters: MonitoringParameters,
}

/// Settings the manager actually applied to an item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateResult {
    pub item_id: MonitoredItemId,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: usize,
    pub filter: ItemFilter,
}

/// Runtime state of one load-node group, as reported to diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDiagnostics {
    pub name: String,
    pub node_type: &'static str,
    pub randomize: bool,
    pub step_size: f64,
    pub min: f64,
    pub max: f64,
    pub remaining_updates: i64,
    pub updates_enabled: bool,
    pub bad_status_cursor: usize,
}

/// Point-in-time view of a manager.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManagerDiagnostics {
    pub name: String,
    pub namespace: NamespaceIndex,
    pub node_count: usize,
    pub component_cache_len: usize,
    pub monitored_item_count: usize,
    pub monitored_node_count: usize,
    pub root_notifier_count: usize,
    pub continuation_point_count: usize,
    pub groups: Vec<GroupDiagnostics>,
    /// Next position of the deterministic alarm driver.
    pub alarm_cursor: Option<usize>,
    pub running: bool,
}

/// Maps identifiers of one namespace to nodes.
pub trait Resolver {
    fn namespace_index(&self) -> NamespaceIndex;

    /// Cheap namespace check followed by cache or index lookup. Called on
    /// every attribute request.
    fn manager_handle(&self, node_id: &NodeId) -> Option<NodeHandle>;
}

/// Batch attribute services. Items in foreign namespaces come back as `None`.
pub trait AttributeReadWriter {
    fn read(&self, requests: &[ReadValueId]) -> Vec<BatchResult<DataValue>>;
    fn write(&self, requests: &[WriteValue]) -> Vec<BatchResult<()>>;
    fn browse(&self, requests: &[BrowseDescription]) -> Vec<BatchResult<BrowseResult>>;
    fn browse_next(
        &self,
        continuation_point: ContinuationPoint,
        max_references: usize,
        release: bool,
    ) -> BatchResult<BrowseResult>;
    fn call(&self, requests: &[CallMethodRequest]) -> Vec<BatchResult<Vec<Variant>>>;
}

/// Event subscriptions and monitored items.
pub trait SubscriptionSink {
    fn subscribe_to_events(
        &self,
        node_id: &NodeId,
        item: &Arc<MonitoredItem>,
        unsubscribe: bool,
    ) -> BatchResult<()>;

    /// Subscribes `item` to every root notifier, including ones added later.
    fn subscribe_to_all_events(&self, item: &Arc<MonitoredItem>, unsubscribe: bool);

    /// Queues condition snapshots into the items. Returns the number queued.
    fn condition_refresh(&self, items: &[Arc<MonitoredItem>]) -> usize;

    fn create_monitored_items(
        &self,
        requests: &[MonitoredItemCreateRequest],
    ) -> Vec<BatchResult<MonitoredItemCreateResult>>;

    fn modify_monitored_items(
        &self,
        requests: &[MonitoredItemModifyRequest],
    ) -> Vec<BatchResult<MonitoredItemCreateResult>>;

    fn delete_monitored_items(&self, ids: &[MonitoredItemId]) -> Vec<BatchResult<()>>;

    fn set_monitoring_mode(
        &self,
        mode: MonitoringMode,
        ids: &[MonitoredItemId],
    ) -> Vec<BatchResult<()>>;

    fn monitored_item(&self, id: MonitoredItemId) -> Option<Arc<MonitoredItem>>;

    /// Drains the queue of an owned item.
    fn take_notifications(&self, id: MonitoredItemId) -> Option<Vec<Notification>> {
        self.monitored_item(id).map(|item| item.take_notifications())
    }
}

/// A node manager as seen by the host.
pub trait NodeManager: Resolver + AttributeReadWriter + SubscriptionSink + Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds the address space and registers references into nodes owned
    /// elsewhere. Fails if it already exists or the configuration is invalid.
    fn create_address_space(&self, external: &mut ExternalReferences) -> Result<(), PlcError>;

    /// Stops every timer, then drops every node, item and cache. Safe to
    /// call at any time, including after a failed create.
    fn delete_address_space(&self);

    fn start_simulation(&self) -> Result<(), PlcError>;

    fn stop_simulation(&self);

    /// Runs one tick of a simulation task on the calling thread.
    fn fire(&self, task: &str) -> Result<bool, PlcError>;

    fn diagnostics(&self) -> ManagerDiagnostics;
}
