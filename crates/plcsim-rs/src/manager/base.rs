// crates/plcsim-rs/src/manager/base.rs
//! Request handling shared by every node manager: batch routing by
//! namespace, identifier resolution, monitored item lifecycle and the lock
//! discipline between request threads and simulation timers.

use super::{
    BatchResult, BrowseDescription, CallMethodRequest, ManagerDiagnostics,
    MonitoredItemCreateRequest, MonitoredItemCreateResult, MonitoredItemModifyRequest, ReadValueId,
    WriteValue,
};
use crate::PlcError;
use crate::address_space::{
    AddressSpace, BrowseResult, ContinuationPoint, DataValue, NodeHandle, NodeKey, OperationCache,
    Variant,
};
use crate::config::ServerLimits;
use crate::log::{LogContext, sim_info};
use crate::monitoring::registry::{
    revise_queue_size, revise_sampling_interval, validate_filter,
};
use crate::monitoring::{
    ItemFilter, ItemSettings, MonitoredItem, MonitoredItemId, MonitoringFilter, MonitoringMode,
    MonitoringParameters,
};
use crate::simulation::SimulationScheduler;
use crate::types::{AttributeId, NamespaceIndex, NodeId, StatusCode};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

/// Everything guarded by the manager lock.
#[derive(Debug)]
pub struct ManagerState<S> {
    pub space: AddressSpace,
    /// Simulation runtime. `None` until the address space is created.
    pub sim: Option<S>,
}

/// The shared machinery of a node manager.
///
/// Lock order is scheduler, then state. Timer callbacks take the state lock
/// only, so the scheduler can be stopped (and its threads joined) as long as
/// the caller does not hold the state lock.
pub struct ManagerBase<S> {
    pub(crate) ctx: LogContext,
    namespace: NamespaceIndex,
    state: Arc<Mutex<ManagerState<S>>>,
    scheduler: Mutex<SimulationScheduler>,
}

impl<S: Send + 'static> ManagerBase<S> {
    pub fn new(ctx: LogContext, limits: ServerLimits) -> Self {
        Self {
            ctx,
            namespace: ctx.namespace,
            state: Arc::new(Mutex::new(ManagerState {
                space: AddressSpace::new(ctx.namespace, limits),
                sim: None,
            })),
            scheduler: Mutex::new(SimulationScheduler::new(ctx)),
        }
    }

    pub fn namespace(&self) -> NamespaceIndex {
        self.namespace
    }

    pub fn lock(&self) -> MutexGuard<'_, ManagerState<S>> {
        self.state.lock()
    }

    pub fn is_created(&self) -> bool {
        self.state.lock().sim.is_some()
    }

    /// Registers a periodic task that runs with the manager lock held.
    /// Ticks are skipped while no address space exists.
    pub fn add_task(
        &self,
        name: &str,
        period: Duration,
        mut task: impl FnMut(&mut ManagerState<S>) -> Result<(), PlcError> + Send + 'static,
    ) {
        let state = Arc::clone(&self.state);
        self.scheduler.lock().add_task(name, period, move || {
            let mut guard = state.lock();
            if guard.sim.is_none() {
                return Ok(());
            }
            task(&mut guard)
        });
    }

    pub fn start(&self) -> Result<(), PlcError> {
        self.scheduler.lock().start()
    }

    pub fn stop(&self) {
        self.scheduler.lock().stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_running()
    }

    pub fn fire(&self, task: &str) -> Result<bool, PlcError> {
        self.scheduler.lock().fire(task)
    }

    /// Disables and joins every timer, then clears the address space.
    pub fn delete(&self) {
        self.scheduler.lock().clear();
        let mut state = self.state.lock();
        state.sim = None;
        let released = state.space.clear();
        sim_info!(
            self.ctx,
            "Address space deleted, {} monitored items released",
            released.len()
        );
    }

    /// Base fields of the manager diagnostics.
    pub fn diagnostics(&self, name: &str) -> ManagerDiagnostics {
        let running = self.is_running();
        let state = self.state.lock();
        let space = &state.space;
        ManagerDiagnostics {
            name: name.to_owned(),
            namespace: self.namespace,
            node_count: space.graph.len(),
            component_cache_len: space.index.component_cache_len(),
            monitored_item_count: space.monitoring.item_count(),
            monitored_node_count: space.monitoring.monitored_node_count(),
            root_notifier_count: space.notifiers.root_notifiers().len(),
            continuation_point_count: space.continuation_point_count(),
            running,
            ..ManagerDiagnostics::default()
        }
    }

    pub fn manager_handle(&self, node_id: &NodeId) -> Option<NodeHandle> {
        if node_id.namespace != self.namespace {
            return None;
        }
        let state = self.state.lock();
        state.space.index.manager_handle(&state.space.graph, node_id)
    }

    /// Runs `op` for every owned item of a batch under one lock, with a
    /// resolution cache scoped to the batch.
    fn batch<R, T>(
        &self,
        requests: &[R],
        node_id: impl Fn(&R) -> &NodeId,
        mut op: impl FnMut(&mut ManagerState<S>, &mut OperationCache, &R) -> Result<T, PlcError>,
    ) -> Vec<BatchResult<T>> {
        let mut state = self.state.lock();
        let mut cache = OperationCache::new();
        requests
            .iter()
            .map(|request| {
                (node_id(request).namespace == self.namespace)
                    .then(|| op(&mut *state, &mut cache, request))
            })
            .collect()
    }

    pub fn read(&self, requests: &[ReadValueId]) -> Vec<BatchResult<DataValue>> {
        self.batch(requests, |r| &r.node_id, |state, cache, request| {
            let space = &state.space;
            let key = space
                .index
                .lookup(&space.graph, &request.node_id, cache)
                .ok_or(PlcError::NodeIdUnknown)?;
            space.read_attribute(key, request.attribute_id)
        })
    }

    /// Writes values through `hook`, which may intercept nodes with side
    /// effects before they are written.
    pub fn write(
        &self,
        requests: &[WriteValue],
        mut hook: impl FnMut(&mut ManagerState<S>, NodeKey, &Variant) -> Result<(), PlcError>,
    ) -> Vec<BatchResult<()>> {
        self.batch(requests, |r| &r.node_id, |state, cache, request| {
            let key = state
                .space
                .index
                .lookup(&state.space.graph, &request.node_id, cache)
                .ok_or(PlcError::NodeIdUnknown)?;
            if request.attribute_id != AttributeId::Value {
                return Err(PlcError::NotWritable);
            }
            hook(state, key, &request.value)
        })
    }

    pub fn browse(&self, requests: &[BrowseDescription]) -> Vec<BatchResult<BrowseResult>> {
        self.batch(requests, |r| &r.node_id, |state, cache, request| {
            let key = state
                .space
                .index
                .lookup(&state.space.graph, &request.node_id, cache)
                .ok_or(PlcError::NodeIdUnknown)?;
            state.space.browse(
                key,
                request.direction,
                request.reference_type,
                request.max_references,
            )
        })
    }

    pub fn browse_next(
        &self,
        continuation_point: ContinuationPoint,
        max_references: usize,
        release: bool,
    ) -> BatchResult<BrowseResult> {
        if continuation_point.namespace != self.namespace {
            return None;
        }
        Some(
            self.state
                .lock()
                .space
                .browse_next(continuation_point, max_references, release),
        )
    }

    /// Resolves the object of each call and hands it to `handler`.
    pub fn call(
        &self,
        requests: &[CallMethodRequest],
        mut handler: impl FnMut(
            &mut ManagerState<S>,
            NodeKey,
            &CallMethodRequest,
        ) -> Result<Vec<Variant>, PlcError>,
    ) -> Vec<BatchResult<Vec<Variant>>> {
        self.batch(requests, |r| &r.object_id, |state, cache, request| {
            let object = state
                .space
                .index
                .lookup(&state.space.graph, &request.object_id, cache)
                .ok_or(PlcError::NodeIdUnknown)?;
            handler(state, object, request)
        })
    }

    pub fn subscribe_to_events(
        &self,
        node_id: &NodeId,
        item: &Arc<MonitoredItem>,
        unsubscribe: bool,
    ) -> BatchResult<()> {
        if node_id.namespace != self.namespace {
            return None;
        }
        let mut state = self.state.lock();
        let space = &mut state.space;
        let mut cache = OperationCache::new();
        let Some(key) = space.index.lookup(&space.graph, node_id, &mut cache) else {
            return Some(Err(PlcError::NodeIdUnknown));
        };
        Some(
            space
                .notifiers
                .subscribe(&space.graph, &mut space.monitoring, key, item, unsubscribe),
        )
    }

    pub fn subscribe_to_all_events(&self, item: &Arc<MonitoredItem>, unsubscribe: bool) {
        let mut state = self.state.lock();
        let space = &mut state.space;
        space
            .notifiers
            .subscribe_to_all(&space.graph, &mut space.monitoring, item, unsubscribe);
    }

    pub fn condition_refresh(&self, items: &[Arc<MonitoredItem>]) -> usize {
        self.state.lock().space.condition_refresh(items)
    }

    pub fn monitored_item(&self, id: MonitoredItemId) -> Option<Arc<MonitoredItem>> {
        self.state
            .lock()
            .space
            .monitoring
            .get(id)
            .map(|entry| Arc::clone(&entry.item))
    }

    pub fn create_monitored_items(
        &self,
        requests: &[MonitoredItemCreateRequest],
    ) -> Vec<BatchResult<MonitoredItemCreateResult>> {
        self.batch(requests, |r| &r.node_id, |state, _, request| {
            create_item(&mut state.space, request)
        })
    }

    pub fn modify_monitored_items(
        &self,
        requests: &[MonitoredItemModifyRequest],
    ) -> Vec<BatchResult<MonitoredItemCreateResult>> {
        let state = self.state.lock();
        let space = &state.space;
        requests
            .iter()
            .map(|request| {
                let entry = space.monitoring.get(request.item_id)?;
                Some(revise_settings(
                    space,
                    entry.node,
                    entry.item.attribute_id(),
                    &request.parameters,
                    entry.item.mode(),
                )
                .map(|settings| {
                    let result = MonitoredItemCreateResult {
                        item_id: request.item_id,
                        revised_sampling_interval: settings.sampling_interval,
                        revised_queue_size: settings.queue_size,
                        filter: settings.filter.clone(),
                    };
                    entry.item.modify(settings);
                    result
                }))
            })
            .collect()
    }

    /// Releases items and their component cache references. Unknown ids are
    /// left for another manager.
    pub fn delete_monitored_items(&self, ids: &[MonitoredItemId]) -> Vec<BatchResult<()>> {
        let mut state = self.state.lock();
        let space = &mut state.space;
        ids.iter()
            .map(|id| {
                let entry = space.monitoring.remove(*id)?;
                if entry.item.is_event_item() {
                    // Unsubscribing never fails.
                    let _ = space.notifiers.subscribe(
                        &space.graph,
                        &mut space.monitoring,
                        entry.node,
                        &entry.item,
                        true,
                    );
                }
                space.index.remove_from_component_cache(&entry.handle);
                Some(Ok(()))
            })
            .collect()
    }

    /// Changes the mode of owned items. Leaving `Disabled` re-samples data items.
    pub fn set_monitoring_mode(
        &self,
        mode: MonitoringMode,
        ids: &[MonitoredItemId],
    ) -> Vec<BatchResult<()>> {
        let state = self.state.lock();
        let space = &state.space;
        ids.iter()
            .map(|id| {
                let entry = space.monitoring.get(*id)?;
                let previous = entry.item.set_mode(mode);
                if previous == MonitoringMode::Disabled
                    && mode != MonitoringMode::Disabled
                    && !entry.item.is_event_item()
                {
                    let sample = space
                        .read_attribute(entry.node, entry.item.attribute_id())
                        .unwrap_or_else(|e| DataValue::from_status(e.status_code()));
                    entry.item.enqueue_data(&sample, true);
                }
                Some(Ok(()))
            })
            .collect()
    }
}

/// Revised settings for an item on `node`.
fn revise_settings(
    space: &AddressSpace,
    node: NodeKey,
    attribute: AttributeId,
    parameters: &MonitoringParameters,
    mode: MonitoringMode,
) -> Result<ItemSettings, PlcError> {
    let limits = *space.limits();
    let minimum = space
        .graph
        .get(node)
        .ok_or(PlcError::NodeIdUnknown)?
        .minimum_sampling_interval;
    let sampling_interval = revise_sampling_interval(parameters.sampling_interval, minimum, &limits);
    let queue_size = revise_queue_size(parameters.queue_size, &limits);
    let filter = if attribute == AttributeId::EventNotifier {
        match parameters.filter {
            MonitoringFilter::None | MonitoringFilter::Event => ItemFilter::Event,
            _ => return Err(PlcError::FilterNotAllowed),
        }
    } else {
        validate_filter(
            &space.graph,
            node,
            attribute,
            &parameters.filter,
            sampling_interval,
            queue_size,
            &limits,
        )?
    };
    Ok(ItemSettings {
        mode,
        sampling_interval,
        queue_size,
        discard_oldest: parameters.discard_oldest,
        filter,
    })
}

fn create_item(
    space: &mut AddressSpace,
    request: &MonitoredItemCreateRequest,
) -> Result<MonitoredItemCreateResult, PlcError> {
    if space.monitoring.get(request.item_id).is_some() {
        return Err(PlcError::MonitoredItemIdInvalid);
    }
    let handle = space
        .index
        .manager_handle(&space.graph, &request.node_id)
        .ok_or(PlcError::NodeIdUnknown)?;
    let key = handle.node().ok_or(PlcError::NodeIdInvalid)?;
    let is_event = request.attribute_id == AttributeId::EventNotifier;
    let initial = if is_event {
        None
    } else {
        match space.read_attribute(key, request.attribute_id) {
            Ok(value) => Some(value),
            Err(PlcError::AttributeIdInvalid) => return Err(PlcError::AttributeIdInvalid),
            Err(_) => None,
        }
    };
    let settings = revise_settings(
        space,
        key,
        request.attribute_id,
        &request.parameters,
        request.mode,
    )?;
    let result = MonitoredItemCreateResult {
        item_id: request.item_id,
        revised_sampling_interval: settings.sampling_interval,
        revised_queue_size: settings.queue_size,
        filter: settings.filter.clone(),
    };
    let item = Arc::new(MonitoredItem::new(
        request.item_id,
        request.node_id.clone(),
        request.attribute_id,
        request.parameters.client_handle,
        settings,
    ));
    if is_event {
        space
            .notifiers
            .subscribe(&space.graph, &mut space.monitoring, key, &item, false)?;
    }
    space.index.add_to_component_cache(&handle);
    space.monitoring.insert(Arc::clone(&item), key, handle);
    if !is_event {
        let initial = initial
            .unwrap_or_else(|| DataValue::from_status(StatusCode::BAD_WAITING_FOR_INITIAL_DATA));
        item.enqueue_data(&initial, true);
    }
    log::debug!("Monitored item {} created on {}", request.item_id, request.node_id);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{Node, ParsedNodeId, RootType};
    use crate::events::condition::AlarmKind;
    use crate::monitoring::Notification;
    use crate::types::ReferenceType;

    const CTX: LogContext = LogContext::new("test", "base", 3);

    fn manager() -> ManagerBase<()> {
        let base = ManagerBase::new(CTX, ServerLimits::default());
        {
            let mut state = base.lock();
            let space = &mut state.space;
            let source_id = ParsedNodeId::new(RootType::Source, "Metals/WestTank");
            let source = space
                .graph
                .insert_root(Node::source(source_id.construct(3), "WestTank", "Metals/WestTank"))
                .unwrap();
            space.index.register_source("Metals/WestTank", source);
            space
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
                .graph
                .insert_root(Node::variable(NodeId::string(3, "Level"), "Level", 1.5, true))
                .unwrap();
            state.sim = Some(());
        }
        base
    }

    fn create_request(item_id: u32, node_id: NodeId, attribute_id: AttributeId) -> MonitoredItemCreateRequest {
        MonitoredItemCreateRequest {
            item_id,
            node_id,
            attribute_id,
            mode: MonitoringMode::Reporting,
            parameters: MonitoringParameters {
                queue_size: 5,
                ..MonitoringParameters::default()
            },
        }
    }

    #[test]
    fn test_foreign_items_are_left_untouched() {
        let base = manager();
        let results = base.read(&[
            ReadValueId::value(NodeId::string(2, "Level")),
            ReadValueId::value(NodeId::string(3, "Level")),
            ReadValueId::value(NodeId::string(3, "Missing")),
        ]);
        assert!(results[0].is_none());
        assert_eq!(results[1].clone().unwrap().unwrap().value, Variant::Double(1.5));
        assert_eq!(results[2], Some(Err(PlcError::NodeIdUnknown)));
    }

    #[test]
    fn test_write_goes_through_hook() {
        let base = manager();
        let results = base.write(
            &[
                WriteValue::value(NodeId::string(3, "Level"), 2.5),
                WriteValue {
                    node_id: NodeId::string(3, "Level"),
                    attribute_id: AttributeId::BrowseName,
                    value: "Other".into(),
                },
            ],
            |state, key, value| state.space.write_value(key, value.clone()),
        );
        assert_eq!(results[0], Some(Ok(())));
        assert_eq!(results[1], Some(Err(PlcError::NotWritable)));
    }

    #[test]
    fn test_component_cache_balanced_by_item_lifecycle() {
        let base = manager();
        let root_id = NodeId::string(3, "1:Metals/WestTank");
        let alarm_id = NodeId::string(3, "1:Metals/WestTank?HighAlarm");
        let requests: Vec<_> = (1..=3)
            .map(|id| create_request(id, alarm_id.clone(), AttributeId::DisplayName))
            .collect();
        let created = base.create_monitored_items(&requests);
        assert!(created.iter().all(|r| matches!(r, Some(Ok(_)))));
        assert_eq!(base.lock().space.index.component_ref_count(&root_id), Some(3));

        let deleted = base.delete_monitored_items(&[1, 2, 3, 99]);
        assert_eq!(deleted[..3], [Some(Ok(())), Some(Ok(())), Some(Ok(()))]);
        assert!(deleted[3].is_none());
        assert_eq!(base.lock().space.index.component_ref_count(&root_id), None);
        assert_eq!(base.lock().space.index.component_cache_len(), 0);
    }

    #[test]
    fn test_create_rejects_bad_component_path_and_duplicates() {
        let base = manager();
        let results = base.create_monitored_items(&[
            create_request(1, NodeId::string(3, "1:Metals/WestTank?NoSuchAlarm"), AttributeId::Value),
            create_request(2, NodeId::string(3, "Level"), AttributeId::Value),
            create_request(2, NodeId::string(3, "Level"), AttributeId::Value),
        ]);
        assert_eq!(results[0], Some(Err(PlcError::NodeIdInvalid)));
        assert!(matches!(results[1], Some(Ok(_))));
        assert_eq!(results[2], Some(Err(PlcError::MonitoredItemIdInvalid)));
    }

    #[test]
    fn test_leaving_disabled_resamples() {
        let base = manager();
        base.create_monitored_items(&[create_request(7, NodeId::string(3, "Level"), AttributeId::Value)]);
        let item = base.monitored_item(7).unwrap();
        assert_eq!(item.take_notifications().len(), 1);
        base.set_monitoring_mode(MonitoringMode::Disabled, &[7]);
        base.set_monitoring_mode(MonitoringMode::Reporting, &[7]);
        assert!(matches!(
            item.take_notifications().as_slice(),
            [Notification::Data(dv)] if dv.value == Variant::Double(1.5)
        ));
    }

    #[test]
    fn test_event_item_requires_notifier() {
        let base = manager();
        let results = base.create_monitored_items(&[
            create_request(1, NodeId::string(3, "Level"), AttributeId::EventNotifier),
            create_request(2, NodeId::string(3, "1:Metals/WestTank"), AttributeId::EventNotifier),
        ]);
        assert_eq!(results[0], Some(Err(PlcError::NotSupported)));
        assert!(matches!(&results[1], Some(Ok(r)) if r.filter == ItemFilter::Event));
        let source = base.lock().space.index.source("Metals/WestTank").unwrap();
        assert!(base.lock().space.notifiers.is_observed(source));
        base.delete_monitored_items(&[2]);
        assert!(!base.lock().space.notifiers.is_observed(source));
    }

    #[test]
    fn test_delete_is_safe_twice() {
        let base = manager();
        base.delete();
        base.delete();
        assert!(!base.is_created());
        assert_eq!(base.lock().space.graph.len(), 0);
    }
}
