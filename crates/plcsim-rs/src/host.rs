// crates/plcsim-rs/src/host.rs
//! A minimal in-process host: owns the node managers, routes batch requests
//! to the manager claiming each item, and fans server-wide event items out
//! to every manager.

use crate::PlcError;
use crate::address_space::{BrowseResult, ContinuationPoint, DataValue, ReferenceDescription, Variant};
use crate::config::{ServerLimits, SimulationConfig};
use crate::events::{EventId, EventNotification};
use crate::log::{LogContext, sim_error, sim_info, sim_warn};
use crate::manager::alarm::AlarmNodeManager;
use crate::manager::plc::PlcNodeManager;
use crate::manager::{
    BatchResult, BrowseDescription, CallMethodRequest, ExternalReferences, ManagerDiagnostics,
    MonitoredItemCreateRequest, MonitoredItemCreateResult, MonitoredItemModifyRequest, NodeManager,
    ReadValueId, WriteValue,
};
use crate::monitoring::registry::revise_queue_size;
use crate::monitoring::{
    ItemFilter, ItemSettings, MonitoredItem, MonitoredItemId, MonitoringFilter, MonitoringMode,
    Notification,
};
use crate::types::{AttributeId, NodeId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const HOST_CTX: LogContext = LogContext::new("host", "router", 0);

/// Routes every request of a batch to the managers in registration order.
/// The first manager returning `Some` for an item claims it.
fn route<M: ?Sized, T>(
    managers: &[Box<M>],
    len: usize,
    mut op: impl FnMut(&M) -> Vec<BatchResult<T>>,
) -> Vec<Result<T, PlcError>> {
    let mut slots: Vec<Option<Result<T, PlcError>>> = (0..len).map(|_| None).collect();
    for manager in managers {
        if slots.iter().all(Option::is_some) {
            break;
        }
        for (slot, result) in slots.iter_mut().zip(op(&**manager)) {
            if slot.is_none() {
                *slot = result;
            }
        }
    }
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(PlcError::NodeIdUnknown)))
        .collect()
}

pub struct ServerHost {
    managers: Vec<Box<dyn NodeManager>>,
    limits: ServerLimits,
    external: Mutex<ExternalReferences>,
    /// Event items on the `Server` object, shared with every manager.
    server_items: Mutex<HashMap<MonitoredItemId, Arc<MonitoredItem>>>,
    /// Browse remainders of namespace 0 nodes.
    continuation_points: Mutex<BTreeMap<u64, Vec<ReferenceDescription>>>,
    next_continuation_point: AtomicU64,
    next_item_id: AtomicU32,
    next_event_id: AtomicU64,
}

impl ServerHost {
    pub fn new(limits: ServerLimits) -> Self {
        Self {
            managers: Vec::new(),
            limits,
            external: Mutex::new(HashMap::new()),
            server_items: Mutex::new(HashMap::new()),
            continuation_points: Mutex::new(BTreeMap::new()),
            next_continuation_point: AtomicU64::new(1),
            next_item_id: AtomicU32::new(1),
            next_event_id: AtomicU64::new(1),
        }
    }

    /// A host with the PLC and alarm managers registered, not yet started.
    pub fn with_config(config: &SimulationConfig) -> Result<Self, PlcError> {
        let mut host = Self::new(config.limits);
        host.add_manager(Box::new(PlcNodeManager::new(config.clone())))?;
        host.add_manager(Box::new(AlarmNodeManager::new(config.clone())))?;
        Ok(host)
    }

    /// Registers a manager. Namespaces must be unique and non-zero.
    pub fn add_manager(&mut self, manager: Box<dyn NodeManager>) -> Result<(), PlcError> {
        let namespace = manager.namespace_index();
        if namespace == 0 || self.managers.iter().any(|m| m.namespace_index() == namespace) {
            return Err(PlcError::InvalidConfiguration(format!(
                "namespace {namespace} of manager '{}' is reserved or taken",
                manager.name()
            )));
        }
        self.managers.push(manager);
        Ok(())
    }

    pub fn managers(&self) -> impl Iterator<Item = &dyn NodeManager> {
        self.managers.iter().map(|m| m.as_ref())
    }

    pub fn manager(&self, name: &str) -> Option<&dyn NodeManager> {
        self.managers().find(|m| m.name() == name)
    }

    /// Builds every address space. A failure tears down whatever was built.
    pub fn start(&self) -> Result<(), PlcError> {
        let mut external = self.external.lock();
        for manager in &self.managers {
            if let Err(e) = manager.create_address_space(&mut external) {
                sim_error!(
                    HOST_CTX,
                    "Manager '{}' failed to create its address space: {}",
                    manager.name(),
                    e
                );
                drop(external);
                self.shutdown();
                return Err(e);
            }
        }
        sim_info!(HOST_CTX, "{} managers started", self.managers.len());
        Ok(())
    }

    /// Stops every timer first, then deletes the address spaces.
    pub fn shutdown(&self) {
        for manager in &self.managers {
            manager.stop_simulation();
        }
        for manager in &self.managers {
            manager.delete_address_space();
        }
        self.server_items.lock().clear();
        self.external.lock().clear();
        self.continuation_points.lock().clear();
    }

    pub fn read(&self, requests: &[ReadValueId]) -> Vec<Result<DataValue, PlcError>> {
        route(&self.managers, requests.len(), |m| m.read(requests))
    }

    pub fn write(&self, requests: &[WriteValue]) -> Vec<Result<(), PlcError>> {
        route(&self.managers, requests.len(), |m| m.write(requests))
    }

    pub fn call(&self, requests: &[CallMethodRequest]) -> Vec<Result<Vec<Variant>, PlcError>> {
        route(&self.managers, requests.len(), |m| m.call(requests))
    }

    pub fn browse(&self, requests: &[BrowseDescription]) -> Vec<Result<BrowseResult, PlcError>> {
        let mut results = route(&self.managers, requests.len(), |m| m.browse(requests));
        for (request, result) in requests.iter().zip(results.iter_mut()) {
            if request.node_id.namespace == 0 {
                *result = self.browse_external(request);
            }
        }
        results
    }

    pub fn browse_next(
        &self,
        continuation_point: ContinuationPoint,
        max_references: usize,
        release: bool,
    ) -> Result<BrowseResult, PlcError> {
        if continuation_point.namespace == 0 {
            let remaining = self
                .continuation_points
                .lock()
                .remove(&continuation_point.id)
                .ok_or(PlcError::ContinuationPointInvalid)?;
            if release {
                return Ok(BrowseResult::default());
            }
            return Ok(self.page(remaining, max_references));
        }
        self.managers
            .iter()
            .find_map(|m| m.browse_next(continuation_point, max_references, release))
            .unwrap_or(Err(PlcError::ContinuationPointInvalid))
    }

    fn browse_external(&self, request: &BrowseDescription) -> Result<BrowseResult, PlcError> {
        let external = self.external.lock();
        let references = external.get(&request.node_id).ok_or(PlcError::NodeIdUnknown)?;
        let matching: Vec<_> = references
            .iter()
            .filter(|r| request.direction.includes(r.is_forward))
            .filter(|r| {
                request
                    .reference_type
                    .is_none_or(|t| r.reference_type.is_subtype_of(t))
            })
            .cloned()
            .collect();
        drop(external);
        Ok(self.page(matching, request.max_references))
    }

    fn page(&self, mut refs: Vec<ReferenceDescription>, max_references: usize) -> BrowseResult {
        if max_references == 0 || refs.len() <= max_references {
            return BrowseResult {
                references: refs,
                continuation_point: None,
            };
        }
        let rest = refs.split_off(max_references);
        let id = self.next_continuation_point.fetch_add(1, Ordering::Relaxed);
        let mut points = self.continuation_points.lock();
        while points.len() >= self.limits.max_browse_continuation_points.max(1) {
            points.pop_first();
        }
        points.insert(id, rest);
        BrowseResult {
            references: refs,
            continuation_point: Some(ContinuationPoint { namespace: 0, id }),
        }
    }

    // --- Monitored Items ---

    /// Creates monitored items. Ids are assigned here; any id in the
    /// requests is overwritten. Event items on the `Server` object are
    /// subscribed to every manager, including notifiers added later.
    pub fn create_monitored_items(
        &self,
        requests: &[MonitoredItemCreateRequest],
    ) -> Vec<Result<MonitoredItemCreateResult, PlcError>> {
        let requests: Vec<MonitoredItemCreateRequest> = requests
            .iter()
            .cloned()
            .map(|mut r| {
                r.item_id = self.next_item_id.fetch_add(1, Ordering::Relaxed);
                r
            })
            .collect();
        let mut results = route(&self.managers, requests.len(), |m| {
            m.create_monitored_items(&requests)
        });
        for (request, result) in requests.iter().zip(results.iter_mut()) {
            if request.node_id.namespace == 0 {
                *result = self.create_server_item(request);
            }
        }
        results
    }

    fn create_server_item(
        &self,
        request: &MonitoredItemCreateRequest,
    ) -> Result<MonitoredItemCreateResult, PlcError> {
        if request.node_id != NodeId::server() {
            return Err(PlcError::NodeIdUnknown);
        }
        if request.attribute_id != AttributeId::EventNotifier {
            return Err(PlcError::AttributeIdInvalid);
        }
        if !matches!(
            request.parameters.filter,
            MonitoringFilter::None | MonitoringFilter::Event
        ) {
            return Err(PlcError::FilterNotAllowed);
        }
        let queue_size = revise_queue_size(request.parameters.queue_size, &self.limits);
        let item = Arc::new(MonitoredItem::new(
            request.item_id,
            NodeId::server(),
            AttributeId::EventNotifier,
            request.parameters.client_handle,
            ItemSettings {
                mode: request.mode,
                sampling_interval: 0.0,
                queue_size,
                discard_oldest: request.parameters.discard_oldest,
                filter: ItemFilter::Event,
            },
        ));
        for manager in &self.managers {
            manager.subscribe_to_all_events(&item, false);
        }
        self.server_items.lock().insert(item.id(), item);
        log::debug!("Server event item {} created", request.item_id);
        Ok(MonitoredItemCreateResult {
            item_id: request.item_id,
            revised_sampling_interval: 0.0,
            revised_queue_size: queue_size,
            filter: ItemFilter::Event,
        })
    }

    pub fn modify_monitored_items(
        &self,
        requests: &[MonitoredItemModifyRequest],
    ) -> Vec<Result<MonitoredItemCreateResult, PlcError>> {
        let mut results = route(&self.managers, requests.len(), |m| {
            m.modify_monitored_items(requests)
        });
        let server_items = self.server_items.lock();
        for (request, result) in requests.iter().zip(results.iter_mut()) {
            let Some(item) = server_items.get(&request.item_id) else {
                continue;
            };
            if !matches!(
                request.parameters.filter,
                MonitoringFilter::None | MonitoringFilter::Event
            ) {
                *result = Err(PlcError::FilterNotAllowed);
                continue;
            }
            let queue_size = revise_queue_size(request.parameters.queue_size, &self.limits);
            item.modify(ItemSettings {
                mode: item.mode(),
                sampling_interval: 0.0,
                queue_size,
                discard_oldest: request.parameters.discard_oldest,
                filter: ItemFilter::Event,
            });
            *result = Ok(MonitoredItemCreateResult {
                item_id: request.item_id,
                revised_sampling_interval: 0.0,
                revised_queue_size: queue_size,
                filter: ItemFilter::Event,
            });
        }
        results
    }

    pub fn delete_monitored_items(&self, ids: &[MonitoredItemId]) -> Vec<Result<(), PlcError>> {
        let mut results = route(&self.managers, ids.len(), |m| m.delete_monitored_items(ids));
        let mut server_items = self.server_items.lock();
        for (id, result) in ids.iter().zip(results.iter_mut()) {
            if let Some(item) = server_items.remove(id) {
                for manager in &self.managers {
                    manager.subscribe_to_all_events(&item, true);
                }
                *result = Ok(());
            } else if result.is_err() {
                *result = Err(PlcError::MonitoredItemIdInvalid);
            }
        }
        results
    }

    pub fn set_monitoring_mode(
        &self,
        mode: MonitoringMode,
        ids: &[MonitoredItemId],
    ) -> Vec<Result<(), PlcError>> {
        let mut results = route(&self.managers, ids.len(), |m| m.set_monitoring_mode(mode, ids));
        let server_items = self.server_items.lock();
        for (id, result) in ids.iter().zip(results.iter_mut()) {
            if let Some(item) = server_items.get(id) {
                item.set_mode(mode);
                *result = Ok(());
            } else if result.is_err() {
                *result = Err(PlcError::MonitoredItemIdInvalid);
            }
        }
        results
    }

    fn find_item(&self, id: MonitoredItemId) -> Option<Arc<MonitoredItem>> {
        if let Some(item) = self.server_items.lock().get(&id) {
            return Some(Arc::clone(item));
        }
        self.managers.iter().find_map(|m| m.monitored_item(id))
    }

    /// Drains the notifications queued for an item.
    pub fn take_notifications(&self, id: MonitoredItemId) -> Result<Vec<Notification>, PlcError> {
        self.find_item(id)
            .map(|item| item.take_notifications())
            .ok_or(PlcError::MonitoredItemIdInvalid)
    }

    /// Queues `RefreshStart`, the snapshot of every retained condition the
    /// item can see and `RefreshEnd`. Returns the number of snapshots.
    pub fn condition_refresh(&self, id: MonitoredItemId) -> Result<usize, PlcError> {
        let item = self.find_item(id).ok_or(PlcError::MonitoredItemIdInvalid)?;
        if !item.is_event_item() {
            return Err(PlcError::MonitoredItemIdInvalid);
        }
        let items = [Arc::clone(&item)];
        item.enqueue_event(&EventNotification::refresh_marker(self.event_id(), true));
        let delivered: usize = self
            .managers
            .iter()
            .map(|m| m.condition_refresh(&items))
            .sum();
        item.enqueue_event(&EventNotification::refresh_marker(self.event_id(), false));
        if item.overflowed() {
            sim_warn!(HOST_CTX, "Condition refresh overflowed the queue of item {}", id);
        }
        Ok(delivered)
    }

    fn event_id(&self) -> EventId {
        EventId(self.next_event_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn server_item_count(&self) -> usize {
        self.server_items.lock().len()
    }

    pub fn diagnostics(&self) -> Vec<ManagerDiagnostics> {
        self.managers.iter().map(|m| m.diagnostics()).collect()
    }
}

impl Drop for ServerHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::BrowseDirection;
    use crate::monitoring::MonitoringParameters;
    use crate::types::ReferenceType;

    fn config() -> SimulationConfig {
        SimulationConfig {
            autostart: false,
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    fn server_event_request() -> MonitoredItemCreateRequest {
        MonitoredItemCreateRequest {
            item_id: 0,
            node_id: NodeId::server(),
            attribute_id: AttributeId::EventNotifier,
            mode: MonitoringMode::Reporting,
            parameters: MonitoringParameters {
                filter: MonitoringFilter::Event,
                queue_size: 100,
                ..MonitoringParameters::default()
            },
        }
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let mut host = ServerHost::new(ServerLimits::default());
        host.add_manager(Box::new(PlcNodeManager::new(config())))
            .unwrap();
        let err = host
            .add_manager(Box::new(PlcNodeManager::new(config())))
            .unwrap_err();
        assert!(matches!(err, PlcError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_objects_folder_lists_manager_roots() {
        let host = ServerHost::with_config(&config()).unwrap();
        host.start().unwrap();
        let results = host.browse(&[BrowseDescription {
            node_id: NodeId::objects_folder(),
            direction: BrowseDirection::Forward,
            reference_type: Some(ReferenceType::Organizes),
            max_references: 2,
        }]);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.references.len(), 2);
        assert_eq!(first.references[0].browse_name, "OpcPlc");
        let cp = first.continuation_point.unwrap();
        let rest = host.browse_next(cp, 0, false).unwrap();
        assert!(!rest.references.is_empty());
        assert!(rest.continuation_point.is_none());
        assert!(matches!(
            host.browse_next(cp, 0, false),
            Err(PlcError::ContinuationPointInvalid)
        ));
    }

    #[test]
    fn test_unclaimed_items_report_unknown() {
        let host = ServerHost::with_config(&config()).unwrap();
        host.start().unwrap();
        let results = host.read(&[ReadValueId::value(NodeId::string(42, "Nowhere"))]);
        assert!(matches!(results[0], Err(PlcError::NodeIdUnknown)));
    }

    #[test]
    fn test_refresh_is_bracketed() {
        let host = ServerHost::with_config(&config()).unwrap();
        host.start().unwrap();
        let created = host.create_monitored_items(&[server_event_request()]);
        let id = created[0].as_ref().unwrap().item_id;
        assert_eq!(host.server_item_count(), 1);

        host.condition_refresh(id).unwrap();
        let events: Vec<_> = host
            .take_notifications(id)
            .unwrap()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Event(e) => Some(e.event_type),
                Notification::Data(_) => None,
            })
            .collect();
        assert_eq!(events.first(), Some(&crate::events::EventType::RefreshStart));
        assert_eq!(events.last(), Some(&crate::events::EventType::RefreshEnd));
    }

    #[test]
    fn test_server_item_delete_unsubscribes() {
        let host = ServerHost::with_config(&config()).unwrap();
        host.start().unwrap();
        let created = host.create_monitored_items(&[server_event_request()]);
        let id = created[0].as_ref().unwrap().item_id;
        assert!(host.delete_monitored_items(&[id])[0].is_ok());
        assert_eq!(host.server_item_count(), 0);
        assert!(matches!(
            host.delete_monitored_items(&[id])[0],
            Err(PlcError::MonitoredItemIdInvalid)
        ));
        host.manager("plc").unwrap().fire("Events").unwrap();
        assert!(host.take_notifications(id).is_err());
    }

    #[test]
    fn test_shutdown_is_repeatable() {
        let host = ServerHost::with_config(&config()).unwrap();
        host.start().unwrap();
        host.shutdown();
        host.shutdown();
        let browsed = host.browse(&[BrowseDescription {
            node_id: NodeId::objects_folder(),
            direction: BrowseDirection::Forward,
            reference_type: None,
            max_references: 0,
        }]);
        assert!(matches!(browsed[0], Err(PlcError::NodeIdUnknown)));
        assert!(host.diagnostics().iter().all(|d| d.node_count == 0));
    }
}
