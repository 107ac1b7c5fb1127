// crates/plcsim-rs/src/manager/plc.rs
//! The PLC node manager: load-node groups with their control variables,
//! telemetry signals, simulation methods and a periodic simple event.

use super::base::{ManagerBase, ManagerState};
use super::{
    AttributeReadWriter, BatchResult, BrowseDescription, CallMethodRequest, ExternalReferences,
    GroupDiagnostics, ManagerDiagnostics, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    MonitoredItemModifyRequest, NodeManager, ReadValueId, Resolver, SubscriptionSink, WriteValue,
    register_root,
};
use crate::PlcError;
use crate::address_space::{
    AddressSpace, BrowseResult, ContinuationPoint, DataValue, Node, NodeHandle, NodeKey, Variant,
};
use crate::config::SimulationConfig;
use crate::log::{LogContext, sim_info};
use crate::monitoring::{MonitoredItem, MonitoredItemId, MonitoringMode};
use crate::simulation::generators::GeneratorState;
use crate::simulation::plc::{ControlSetting, GroupControl, GroupNodes, NodeGroup, TelemetryNodes};
use crate::simulation::{PlcSimulation, make_rng};
use crate::types::{NamespaceIndex, NodeId, ReferenceType};
use std::collections::HashMap;
use std::sync::Arc;

pub const ROOT_FOLDER: &str = "OpcPlc";
pub const TELEMETRY_FOLDER: &str = "Telemetry";

/// Scheduler task names.
pub mod tasks {
    pub const SLOW_NODES: &str = "SlowNodes";
    pub const FAST_NODES: &str = "FastNodes";
    pub const VERY_FAST_NODES: &str = "VeryFastNodes";
    pub const STEP_UP: &str = "StepUp";
    pub const ALTERNATING_BOOLEAN: &str = "AlternatingBoolean";
    pub const RANDOM: &str = "RandomData";
    pub const SPIKE_AND_DIP: &str = "SpikeAndDip";
    pub const TRENDS: &str = "Trends";
    pub const EVENTS: &str = "Events";
}

fn group_task(group: NodeGroup) -> &'static str {
    match group {
        NodeGroup::Slow => tasks::SLOW_NODES,
        NodeGroup::Fast => tasks::FAST_NODES,
        NodeGroup::VeryFast => tasks::VERY_FAST_NODES,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlcMethod {
    StartUpdate(NodeGroup),
    StopUpdate(NodeGroup),
    ResetStepUp,
    StartStepUp,
    StopStepUp,
    ResetTrend,
}

const METHODS: [(&str, PlcMethod); 8] = [
    ("StartUpdateSlowNodes", PlcMethod::StartUpdate(NodeGroup::Slow)),
    ("StopUpdateSlowNodes", PlcMethod::StopUpdate(NodeGroup::Slow)),
    ("StartUpdateFastNodes", PlcMethod::StartUpdate(NodeGroup::Fast)),
    ("StopUpdateFastNodes", PlcMethod::StopUpdate(NodeGroup::Fast)),
    ("ResetStepUp", PlcMethod::ResetStepUp),
    ("StartStepUp", PlcMethod::StartStepUp),
    ("StopStepUp", PlcMethod::StopStepUp),
    ("ResetTrend", PlcMethod::ResetTrend),
];

/// Simulation state owned by the PLC manager lock.
#[derive(Debug)]
pub struct PlcRuntime {
    pub sim: PlcSimulation,
    pub root: NodeKey,
    controls: HashMap<NodeKey, GroupControl>,
    methods: HashMap<NodeKey, PlcMethod>,
}

pub struct PlcNodeManager {
    base: ManagerBase<PlcRuntime>,
    config: SimulationConfig,
}

impl PlcNodeManager {
    pub fn new(config: SimulationConfig) -> Self {
        let ctx = LogContext::new("plc", "manager", config.plc_namespace);
        Self {
            base: ManagerBase::new(ctx, config.limits),
            config,
        }
    }

    /// Identifier of a node of this manager by name, e.g. `SlowUInt1`.
    pub fn node_id(&self, name: &str) -> NodeId {
        NodeId::string(self.base.namespace(), name)
    }

    /// Runs `f` with the manager lock held. Test and diagnostics hook.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ManagerState<PlcRuntime>) -> R) -> R {
        f(&mut self.base.lock())
    }

    fn register_tasks(&self) {
        let telemetry_period = self.config.telemetry.cycle_length;
        for group in NodeGroup::ALL {
            let config = self.config.groups()[group.index()];
            if config.count == 0 && config.bad_nodes == 0 {
                continue;
            }
            self.base.add_task(group_task(group), config.rate, move |state| {
                with_runtime(state, |space, rt| rt.sim.tick_group(group, space).map(|_| ()))
            });
        }
        self.base.add_task(tasks::STEP_UP, telemetry_period, |state| {
            with_runtime(state, |space, rt| rt.sim.tick_step_up(space))
        });
        self.base
            .add_task(tasks::ALTERNATING_BOOLEAN, telemetry_period, |state| {
                with_runtime(state, |space, rt| rt.sim.tick_alternating(space))
            });
        self.base.add_task(tasks::RANDOM, telemetry_period, |state| {
            with_runtime(state, |space, rt| rt.sim.tick_random(space))
        });
        self.base.add_task(tasks::SPIKE_AND_DIP, telemetry_period, |state| {
            with_runtime(state, |space, rt| rt.sim.tick_spike_and_dip(space))
        });
        self.base.add_task(tasks::TRENDS, telemetry_period, |state| {
            with_runtime(state, |space, rt| rt.sim.tick_trends(space))
        });
        self.base.add_task(tasks::EVENTS, self.config.event_rate, |state| {
            with_runtime(state, |space, rt| {
                rt.sim.event_tick(space, rt.root);
                Ok(())
            })
        });
    }
}

fn with_runtime<T>(
    state: &mut ManagerState<PlcRuntime>,
    f: impl FnOnce(&mut AddressSpace, &mut PlcRuntime) -> Result<T, PlcError>,
) -> Result<T, PlcError> {
    let ManagerState { space, sim } = state;
    let rt = sim.as_mut().ok_or(PlcError::NodeIdUnknown)?;
    f(space, rt)
}

struct Builder<'a> {
    space: &'a mut AddressSpace,
    namespace: NamespaceIndex,
}

impl Builder<'_> {
    fn id(&self, name: &str) -> NodeId {
        NodeId::string(self.namespace, name)
    }

    fn variable(
        &mut self,
        parent: NodeKey,
        name: &str,
        value: impl Into<Variant>,
        writable: bool,
    ) -> Result<NodeKey, PlcError> {
        let node = Node::variable(self.id(name), name, value, writable);
        self.space
            .graph
            .insert_child(parent, ReferenceType::HasComponent, node)
    }

    /// A telemetry variable with its `EURange` property.
    fn ranged(
        &mut self,
        parent: NodeKey,
        name: &str,
        value: impl Into<Variant>,
        low: f64,
        high: f64,
    ) -> Result<NodeKey, PlcError> {
        let key = self.variable(parent, name, value, false)?;
        let range = Node::property(
            self.id(&format!("{name}_EURange")),
            "EURange",
            Variant::Range { low, high },
        );
        self.space
            .graph
            .insert_child(key, ReferenceType::HasProperty, range)?;
        Ok(key)
    }

    fn build(&mut self, config: &SimulationConfig) -> Result<PlcRuntime, PlcError> {
        let root = self
            .space
            .graph
            .insert_root(Node::notifier_folder(self.id(ROOT_FOLDER), ROOT_FOLDER))?;
        let telemetry = self.space.graph.insert_child(
            root,
            ReferenceType::Organizes,
            Node::folder(self.id(TELEMETRY_FOLDER), TELEMETRY_FOLDER),
        )?;

        let mut controls = HashMap::new();
        let mut group_nodes: [GroupNodes; 3] = Default::default();
        for group in NodeGroup::ALL {
            let cfg = config.groups()[group.index()];
            let initial = GeneratorState::from_config(cfg).initial_value();
            let interval = cfg.rate.as_secs_f64() * 1000.0;
            let nodes = &mut group_nodes[group.index()];
            let type_name = cfg.node_type.type_name();
            for n in 1..=cfg.count {
                let name = format!("{}{}{}", cfg.name, type_name, n);
                let node = Node::variable(self.id(&name), &name, initial.clone(), false)
                    .with_minimum_sampling_interval(interval);
                nodes.nodes.push(self.space.graph.insert_child(
                    telemetry,
                    ReferenceType::HasComponent,
                    node,
                )?);
            }
            for n in 1..=cfg.bad_nodes {
                let name = format!("Bad{}{}{}", cfg.name, type_name, n);
                let node = Node::variable(self.id(&name), &name, initial.clone(), false)
                    .with_minimum_sampling_interval(interval);
                nodes.bad_nodes.push(self.space.graph.insert_child(
                    telemetry,
                    ReferenceType::HasComponent,
                    node,
                )?);
            }
            let counter = self.variable(telemetry, &format!("{}NumberOfUpdates", cfg.name), -1i32, true)?;
            let step = self.variable(telemetry, &format!("{}StepSize", cfg.name), cfg.step_size, true)?;
            let randomize = self.variable(telemetry, &format!("{}Randomize", cfg.name), cfg.randomize, true)?;
            group_nodes[group.index()].number_of_updates = Some(counter);
            controls.insert(counter, (group, ControlSetting::NumberOfUpdates));
            controls.insert(step, (group, ControlSetting::StepSize));
            controls.insert(randomize, (group, ControlSetting::Randomize));
        }

        let amplitude = crate::simulation::telemetry::SIMULATION_MAX_AMPLITUDE * 10.0;
        let nodes = TelemetryNodes {
            step_up: self.ranged(telemetry, "StepUp", 0u32, 0.0, f64::from(u32::MAX))?,
            alternating_boolean: self.variable(telemetry, "AlternatingBoolean", false, false)?,
            random_signed: self.ranged(
                telemetry,
                "RandomSignedInt32",
                0i32,
                f64::from(i32::MIN),
                f64::from(i32::MAX),
            )?,
            random_unsigned: self.ranged(
                telemetry,
                "RandomUnsignedInt32",
                0u32,
                0.0,
                f64::from(u32::MAX),
            )?,
            spike: self.ranged(telemetry, "SpikeData", 0.0, -amplitude, amplitude)?,
            dip: self.ranged(telemetry, "DipData", 0.0, -amplitude, amplitude)?,
            positive_trend: self.ranged(telemetry, "PositiveTrendData", 0.0, 0.0, 1000.0)?,
            negative_trend: self.ranged(telemetry, "NegativeTrendData", 0.0, -1000.0, 1000.0)?,
        };

        let mut methods = HashMap::new();
        for (name, method) in METHODS {
            let key = self.space.graph.insert_child(
                root,
                ReferenceType::HasComponent,
                Node::method(self.id(name), name),
            )?;
            methods.insert(key, method);
        }

        let space = &mut *self.space;
        space
            .notifiers
            .add_root_notifier(&mut space.graph, &mut space.monitoring, root);

        Ok(PlcRuntime {
            sim: PlcSimulation::new(config, group_nodes, nodes, make_rng(config.seed, 0)),
            root,
            controls,
            methods,
        })
    }
}

fn call_method(
    state: &mut ManagerState<PlcRuntime>,
    object: NodeKey,
    request: &CallMethodRequest,
) -> Result<Vec<Variant>, PlcError> {
    with_runtime(state, |space, rt| {
        let key = space
            .graph
            .key_of(&request.method_id)
            .ok_or(PlcError::MethodInvalid)?;
        let method = rt.methods.get(&key).copied().ok_or(PlcError::MethodInvalid)?;
        if space.graph.get(key).and_then(Node::parent) != Some(object) {
            return Err(PlcError::MethodInvalid);
        }
        match method {
            PlcMethod::StartUpdate(group) => rt.sim.group_mut(group).set_updates_enabled(true),
            PlcMethod::StopUpdate(group) => rt.sim.group_mut(group).set_updates_enabled(false),
            PlcMethod::ResetStepUp => rt.sim.reset_step_up(space)?,
            PlcMethod::StartStepUp => rt.sim.start_step_up(),
            PlcMethod::StopStepUp => rt.sim.stop_step_up(),
            PlcMethod::ResetTrend => rt.sim.reset_trends(),
        }
        Ok(Vec::new())
    })
}

fn write_value(
    state: &mut ManagerState<PlcRuntime>,
    key: NodeKey,
    value: &Variant,
) -> Result<(), PlcError> {
    let ManagerState { space, sim } = state;
    let control = sim.as_ref().and_then(|rt| rt.controls.get(&key).copied());
    if let (Some(control), Some(rt)) = (control, sim.as_mut()) {
        let declared = space.graph.get(key).map(|n| n.data_type);
        if value.data_type() != declared {
            return Err(PlcError::TypeMismatch);
        }
        rt.sim.apply_control(control, value)?;
    }
    space.write_value(key, value.clone())
}

impl Resolver for PlcNodeManager {
    fn namespace_index(&self) -> NamespaceIndex {
        self.base.namespace()
    }

    fn manager_handle(&self, node_id: &NodeId) -> Option<NodeHandle> {
        self.base.manager_handle(node_id)
    }
}

impl AttributeReadWriter for PlcNodeManager {
    fn read(&self, requests: &[ReadValueId]) -> Vec<BatchResult<DataValue>> {
        self.base.read(requests)
    }

    fn write(&self, requests: &[WriteValue]) -> Vec<BatchResult<()>> {
        self.base.write(requests, write_value)
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

impl SubscriptionSink for PlcNodeManager {
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

impl NodeManager for PlcNodeManager {
    fn name(&self) -> &'static str {
        "plc"
    }

    fn create_address_space(&self, external: &mut ExternalReferences) -> Result<(), PlcError> {
        if self.base.is_created() {
            return Err(PlcError::AddressSpaceExists);
        }
        self.config.validate()?;
        let root_id = {
            let mut state = self.base.lock();
            let namespace = self.base.namespace();
            let built = Builder {
                space: &mut state.space,
                namespace,
            }
            .build(&self.config);
            match built {
                Ok(runtime) => {
                    state.sim = Some(runtime);
                    sim_info!(
                        self.base.ctx,
                        "Address space created with {} nodes",
                        state.space.graph.len()
                    );
                }
                Err(e) => {
                    state.space.clear();
                    return Err(e);
                }
            }
            NodeId::string(namespace, ROOT_FOLDER)
        };
        register_root(external, root_id, ROOT_FOLDER);
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
        if let Some(rt) = &self.base.lock().sim {
            diagnostics.groups = rt
                .sim
                .groups()
                .iter()
                .map(|g| GroupDiagnostics {
                    name: g.name.clone(),
                    node_type: g.node_type.type_name(),
                    randomize: g.randomize(),
                    step_size: g.step_size(),
                    min: g.min,
                    max: g.max,
                    remaining_updates: g.remaining_updates(),
                    updates_enabled: g.updates_enabled(),
                    bad_status_cursor: g.bad_status_cursor(),
                })
                .collect();
        }
        diagnostics
    }
}
