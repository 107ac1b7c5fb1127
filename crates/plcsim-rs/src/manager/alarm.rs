// crates/plcsim-rs/src/manager/alarm.rs
//! The alarm node manager: a forest of areas forwarding the events of the
//! sources they contain, each source carrying its alarm conditions.

use super::base::{ManagerBase, ManagerState};
use super::{
    AttributeReadWriter, BatchResult, BrowseDescription, CallMethodRequest, ExternalReferences,
    ManagerDiagnostics, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    MonitoredItemModifyRequest, NodeManager, ReadValueId, Resolver, SubscriptionSink, WriteValue,
    register_root,
};
use crate::PlcError;
use crate::address_space::{
    AddressSpace, BrowseResult, ContinuationPoint, DataValue, Node, NodeHandle, NodeKey,
    ParsedNodeId, RootType, Variant,
};
use crate::config::{AreaConfig, SimulationConfig, validate_area};
use crate::events::condition::AlarmKind;
use crate::log::{LogContext, sim_debug, sim_info};
use crate::monitoring::{MonitoredItem, MonitoredItemId, MonitoringMode};
use crate::simulation::{AlarmSimulation, DeterministicAlarmDriver, make_rng};
use crate::types::{NamespaceIndex, NodeId, ReferenceType};
use std::sync::Arc;

/// Scheduler task names.
pub mod tasks {
    pub const RANDOM_ALARMS: &str = "Alarms";
    pub const DETERMINISTIC_ALARMS: &str = "DeterministicAlarms";
}

/// Methods callable on a condition.
pub mod methods {
    pub const ACKNOWLEDGE: &str = "Acknowledge";
    pub const CONFIRM: &str = "Confirm";
    pub const ENABLE: &str = "Enable";
    pub const DISABLE: &str = "Disable";
}

#[derive(Debug)]
pub struct AlarmRuntime {
    pub sim: AlarmSimulation,
    pub root_areas: Vec<NodeKey>,
}

pub struct AlarmNodeManager {
    base: ManagerBase<AlarmRuntime>,
    config: SimulationConfig,
}

/// Adds an area subtree. `parent` is the enclosing area and its path.
fn build_area(
    space: &mut AddressSpace,
    parent: Option<(NodeKey, &str)>,
    area: &AreaConfig,
) -> Result<NodeKey, PlcError> {
    let namespace = space.namespace();
    let path = match parent {
        Some((_, parent_path)) => format!("{parent_path}/{}", area.name),
        None => area.name.clone(),
    };
    if space.index.area(&path).is_some() {
        return Err(PlcError::NodeIdExists(path));
    }
    let node = Node::area(
        ParsedNodeId::new(RootType::Area, path.as_str()).construct(namespace),
        &area.name,
    );
    let key = match parent {
        Some((parent_key, _)) => {
            let key = space
                .graph
                .insert_child(parent_key, ReferenceType::Organizes, node)?;
            space
                .notifiers
                .add_link(parent_key, key, ReferenceType::HasNotifier);
            key
        }
        None => space.graph.insert_root(node)?,
    };
    space.index.register_area(&path, key);
    for source_path in &area.sources {
        let source = ensure_source(space, source_path)?;
        space
            .notifiers
            .add_link(key, source, ReferenceType::HasEventSource);
    }
    for sub_area in &area.areas {
        build_area(space, Some((key, path.as_str())), sub_area)?;
    }
    Ok(key)
}

/// The source for `path`, created with its conditions on first use.
fn ensure_source(space: &mut AddressSpace, path: &str) -> Result<NodeKey, PlcError> {
    if let Some(existing) = space.index.source(path) {
        return Ok(existing);
    }
    let namespace = space.namespace();
    let id = ParsedNodeId::new(RootType::Source, path);
    let name = path.rsplit('/').next().unwrap_or(path);
    let key = space
        .graph
        .insert_root(Node::source(id.construct(namespace), name, path))?;
    space.index.register_source(path, key);
    for kind in AlarmKind::for_source(path) {
        let condition = Node::condition(
            id.clone().with_component(kind.browse_name()).construct(namespace),
            *kind,
        );
        space
            .graph
            .insert_component(key, ReferenceType::HasComponent, condition)?;
    }
    Ok(key)
}

fn with_runtime<T>(
    state: &mut ManagerState<AlarmRuntime>,
    f: impl FnOnce(&mut AddressSpace, &mut AlarmRuntime) -> Result<T, PlcError>,
) -> Result<T, PlcError> {
    let ManagerState { space, sim } = state;
    let rt = sim.as_mut().ok_or(PlcError::NodeIdUnknown)?;
    f(space, rt)
}

fn call_method(
    state: &mut ManagerState<AlarmRuntime>,
    object: NodeKey,
    request: &CallMethodRequest,
) -> Result<Vec<Variant>, PlcError> {
    let space = &mut state.space;
    if request.method_id.namespace != space.namespace() {
        return Err(PlcError::MethodInvalid);
    }
    let method = request.method_id.as_str().ok_or(PlcError::MethodInvalid)?;
    let comment = match request.input_arguments.first() {
        Some(Variant::String(text)) => text.as_str(),
        _ => "",
    };
    let condition = space
        .graph
        .get_mut(object)
        .and_then(Node::condition_state_mut)
        .ok_or(PlcError::MethodInvalid)?;
    let report = match method {
        methods::ACKNOWLEDGE => condition.acknowledge(comment).map(|_| true),
        methods::CONFIRM => condition.confirm(comment).map(|_| true),
        methods::ENABLE => condition.enable().map(|_| true),
        methods::DISABLE => condition.disable().map(|_| false),
        _ => Err(PlcError::MethodInvalid),
    }?;
    if report {
        space.report_condition(object);
    }
    Ok(Vec::new())
}

impl AlarmNodeManager {
    pub fn new(config: SimulationConfig) -> Self {
        let ctx = LogContext::new("alarm", "manager", config.alarm_namespace);
        Self {
            base: ManagerBase::new(ctx, config.limits),
            config,
        }
    }

    pub fn area_id(&self, path: &str) -> NodeId {
        ParsedNodeId::new(RootType::Area, path).construct(self.base.namespace())
    }

    pub fn source_id(&self, path: &str) -> NodeId {
        ParsedNodeId::new(RootType::Source, path).construct(self.base.namespace())
    }

    /// Identifier of a condition, e.g. `HighAlarm` of `Metals/WestTank`.
    pub fn condition_id(&self, source_path: &str, condition: &str) -> NodeId {
        ParsedNodeId::new(RootType::Source, source_path)
            .with_component(condition)
            .construct(self.base.namespace())
    }

    pub fn method_id(&self, method: &str) -> NodeId {
        NodeId::string(self.base.namespace(), method)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut ManagerState<AlarmRuntime>) -> R) -> R {
        f(&mut self.base.lock())
    }

    /// Adds a top-level area while the manager runs. Server-wide event
    /// subscriptions extend to it immediately.
    pub fn add_root_area(&self, area: &AreaConfig) -> Result<NodeId, PlcError> {
        validate_area(area)?;
        let mut state = self.base.lock();
        let ManagerState { space, sim } = &mut *state;
        let rt = sim.as_mut().ok_or(PlcError::NodeIdUnknown)?;
        let key = build_area(space, None, area)?;
        space
            .notifiers
            .add_root_notifier(&mut space.graph, &mut space.monitoring, key);
        rt.root_areas.push(key);
        sim_info!(self.base.ctx, "Root area '{}' added", area.name);
        Ok(self.area_id(&area.name))
    }

    fn build(&self, space: &mut AddressSpace) -> Result<AlarmRuntime, PlcError> {
        let mut root_areas = Vec::with_capacity(self.config.areas.len());
        for area in &self.config.areas {
            let key = build_area(space, None, area)?;
            space
                .notifiers
                .add_root_notifier(&mut space.graph, &mut space.monitoring, key);
            root_areas.push(key);
        }
        let driver = DeterministicAlarmDriver::resolve(
            &self.config.deterministic_alarms,
            &space.index,
            &self.base.ctx.with_component("alarms"),
        );
        sim_debug!(
            self.base.ctx,
            "Deterministic alarms cycle over {} sources",
            driver.len()
        );
        Ok(AlarmRuntime {
            sim: AlarmSimulation::new(
                driver,
                make_rng(self.config.seed, 1),
                self.base.ctx.with_component("alarms"),
            ),
            root_areas,
        })
    }

    fn register_tasks(&self) {
        self.base
            .add_task(tasks::RANDOM_ALARMS, self.config.alarm_rate, |state| {
                with_runtime(state, |space, rt| {
                    rt.sim.random_tick(space);
                    Ok(())
                })
            });
        self.base.add_task(
            tasks::DETERMINISTIC_ALARMS,
            self.config.deterministic_alarm_rate,
            |state| {
                with_runtime(state, |space, rt| {
                    rt.sim.deterministic_tick(space);
                    Ok(())
                })
            },
        );
    }
}

impl Resolver for AlarmNodeManager {
    fn namespace_index(&self) -> NamespaceIndex {
        self.base.namespace()
    }

    fn manager_handle(&self, node_id: &NodeId) -> Option<NodeHandle> {
        self.base.manager_handle(node_id)
    }
}

impl AttributeReadWriter for AlarmNodeManager {
    fn read(&self, requests: &[ReadValueId]) -> Vec<BatchResult<DataValue>> {
        self.base.read(requests)
    }

    fn write(&self, requests: &[WriteValue]) -> Vec<BatchResult<()>> {
        self.base.write(requests, |state, key, value| {
            state.space.write_value(key, value.clone())
        })
    }

    fn browse(&self, requests: &[BrowseDescription]) -> Vec<BatchResult<BrowseResult>> {
        self.base.browse(requests)
    }

    fn browse_next(
        &self,
        continuation_point: ContinuationPoint,
        max_references: usize,
        release: bool,
    ) -> BatchResult<BrowseResult> {
        self.base
            .browse_next(continuation_point, max_references, release)
    }

    fn call(&self, requests: &[CallMethodRequest]) -> Vec<BatchResult<Vec<Variant>>> {
        self.base.call(requests, call_method)
    }
}

impl SubscriptionSink for AlarmNodeManager {
    fn subscribe_to_events(
        &self,
        node_id: &NodeId,
        item: &Arc<MonitoredItem>,
        unsubscribe: bool,
    ) -> BatchResult<()> {
        self.base.subscribe_to_events(node_id, item, unsubscribe)
    }

    fn subscribe_to_all_events(&self, item: &Arc<MonitoredItem>, unsubscribe: bool) {
        self.base.subscribe_to_all_events(item, unsubscribe);
    }

    fn condition_refresh(&self, items: &[Arc<MonitoredItem>]) -> usize {
        self.base.condition_refresh(items)
    }

    fn create_monitored_items(
        &self,
        requests: &[MonitoredItemCreateRequest],
    ) -> Vec<BatchResult<MonitoredItemCreateResult>> {
        self.base.create_monitored_items(requests)
    }

    fn modify_monitored_items(
        &self,
        requests: &[MonitoredItemModifyRequest],
    ) -> Vec<BatchResult<MonitoredItemCreateResult>> {
        self.base.modify_monitored_items(requests)
    }

    fn delete_monitored_items(&self, ids: &[MonitoredItemId]) -> Vec<BatchResult<()>> {
        self.base.delete_monitored_items(ids)
    }

    fn set_monitoring_mode(
        &self,
        mode: MonitoringMode,
        ids: &[MonitoredItemId],
    ) -> Vec<BatchResult<()>> {
        self.base.set_monitoring_mode(mode, ids)
    }

    fn monitored_item(&self, id: MonitoredItemId) -> Option<Arc<MonitoredItem>> {
        self.base.monitored_item(id)
    }
}

impl NodeManager for AlarmNodeManager {
    fn name(&self) -> &'static str {
        "alarm"
    }

    fn create_address_space(&self, external: &mut ExternalReferences) -> Result<(), PlcError> {
        if self.base.is_created() {
            return Err(PlcError::AddressSpaceExists);
        }
        self.config.validate()?;
        {
            let mut state = self.base.lock();
            match self.build(&mut state.space) {
                Ok(runtime) => {
                    sim_info!(
                        self.base.ctx,
                        "Address space created: {} areas, {} sources",
                        state.space.index.area_count(),
                        state.space.index.source_count()
                    );
                    state.sim = Some(runtime);
                }
                Err(e) => {
                    state.space.clear();
                    return Err(e);
                }
            }
        }
        for area in &self.config.areas {
            register_root(external, self.area_id(&area.name), &area.name);
        }
        self.register_tasks();
        if self.config.autostart {
            self.base.start()?;
        }
        Ok(())
    }

    fn delete_address_space(&self) {
        self.base.delete();
    }

    fn start_simulation(&self) -> Result<(), PlcError> {
        self.base.start()
    }

    fn stop_simulation(&self) {
        self.base.stop();
    }

    fn fire(&self, task: &str) -> Result<bool, PlcError> {
        self.base.fire(task)
    }

    fn diagnostics(&self) -> ManagerDiagnostics {
        let mut diagnostics = self.base.diagnostics(self.name());
        diagnostics.alarm_cursor = self
            .base
            .lock()
            .sim
            .as_ref()
            .map(|rt| rt.sim.driver.cursor());
        diagnostics
    }
}
