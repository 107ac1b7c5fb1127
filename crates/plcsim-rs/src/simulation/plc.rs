// crates/plcsim-rs/src/simulation/plc.rs
//! Runtime state of the PLC manager's simulation: the three load-node
//! groups, the telemetry variables and the simple event counter.

use super::generators::GeneratorState;
use super::telemetry::{OutlierGenerator, TrendGenerator};
use super::variable::SimulatedVariable;
use crate::PlcError;
use crate::address_space::{AddressSpace, DataValue, NodeKey, Variant};
use crate::config::{SimulationConfig, TelemetryConfig};
use rand::Rng;
use rand::rngs::StdRng;
use std::time::SystemTime;

/// Severity of the events raised by the event timer.
pub const SIMPLE_EVENT_SEVERITY: u16 = 500;

/// The three load-node groups, in update order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeGroup {
    Slow = 0,
    Fast = 1,
    VeryFast = 2,
}

impl NodeGroup {
    pub const ALL: [NodeGroup; 3] = [Self::Slow, Self::Fast, Self::VeryFast];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Nodes written by one group tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupNodes {
    pub nodes: Vec<NodeKey>,
    pub bad_nodes: Vec<NodeKey>,
    /// Mirrors the group's remaining update budget.
    pub number_of_updates: Option<NodeKey>,
}

/// Keys of the telemetry variables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryNodes {
    pub step_up: NodeKey,
    pub alternating_boolean: NodeKey,
    pub random_signed: NodeKey,
    pub random_unsigned: NodeKey,
    pub spike: NodeKey,
    pub dip: NodeKey,
    pub positive_trend: NodeKey,
    pub negative_trend: NodeKey,
}

#[derive(Debug)]
struct Telemetry {
    step_up: SimulatedVariable<u32>,
    alternating: SimulatedVariable<bool>,
    alternating_ticks: u32,
    half_cycle: u32,
    random_signed: SimulatedVariable<i32>,
    random_unsigned: SimulatedVariable<u32>,
    spike: SimulatedVariable<f64>,
    spike_gen: OutlierGenerator,
    dip: SimulatedVariable<f64>,
    dip_gen: OutlierGenerator,
    positive_trend: SimulatedVariable<f64>,
    positive_gen: TrendGenerator,
    negative_trend: SimulatedVariable<f64>,
    negative_gen: TrendGenerator,
}

#[derive(Debug)]
pub struct PlcSimulation {
    groups: [GeneratorState; 3],
    group_nodes: [GroupNodes; 3],
    telemetry: Telemetry,
    event_index: u64,
    rng: StdRng,
}

impl PlcSimulation {
    pub fn new(
        config: &SimulationConfig,
        group_nodes: [GroupNodes; 3],
        nodes: TelemetryNodes,
        mut rng: StdRng,
    ) -> Self {
        let groups = config.groups().map(GeneratorState::from_config);
        let telemetry = Telemetry::new(&config.telemetry, nodes, &mut rng);
        Self {
            groups,
            group_nodes,
            telemetry,
            event_index: 0,
            rng,
        }
    }

    pub fn group(&self, group: NodeGroup) -> &GeneratorState {
        &self.groups[group.index()]
    }

    pub fn group_mut(&mut self, group: NodeGroup) -> &mut GeneratorState {
        &mut self.groups[group.index()]
    }

    pub fn groups(&self) -> &[GeneratorState; 3] {
        &self.groups
    }

    pub fn group_nodes(&self, group: NodeGroup) -> &GroupNodes {
        &self.group_nodes[group.index()]
    }

    pub fn event_index(&self) -> u64 {
        self.event_index
    }

    /// Updates every node of a group once. Returns how many good nodes were
    /// written; zero when the group is stopped or out of budget.
    pub fn tick_group(&mut self, group: NodeGroup, space: &mut AddressSpace) -> Result<usize, PlcError> {
        let state = &mut self.groups[group.index()];
        let nodes = &self.group_nodes[group.index()];
        let rng = &mut self.rng;
        let budget_before = state.remaining_updates();
        if !state.begin_tick() {
            return Ok(0);
        }
        for &key in &nodes.nodes {
            let current = space.value(key).map(|v| v.value.clone()).unwrap_or_default();
            let next = state.next_value(rng, &current)?;
            space.set_value(key, DataValue::new_now(next))?;
        }
        if !nodes.bad_nodes.is_empty() {
            let (status, with_value) = state.next_bad_status();
            for &key in &nodes.bad_nodes {
                let current = space.value(key).map(|v| v.value.clone()).unwrap_or_default();
                let value = if with_value {
                    state.next_value(rng, &current)?
                } else {
                    current
                };
                space.set_value(
                    key,
                    DataValue {
                        value,
                        status,
                        source_timestamp: Some(SystemTime::now()),
                    },
                )?;
            }
        }
        if state.remaining_updates() != budget_before {
            if let Some(counter) = nodes.number_of_updates {
                let remaining = i32::try_from(state.remaining_updates()).unwrap_or(i32::MAX);
                space.set_value(counter, DataValue::new_now(remaining))?;
            }
        }
        Ok(nodes.nodes.len())
    }

    /// Raises the next simple event from `origin`.
    pub fn event_tick(&mut self, space: &mut AddressSpace, origin: NodeKey) -> usize {
        let message = format!("Event with index {}", self.event_index);
        self.event_index += 1;
        space.raise_event(origin, message, SIMPLE_EVENT_SEVERITY)
    }

    pub fn tick_step_up(&mut self, space: &mut AddressSpace) -> Result<(), PlcError> {
        self.telemetry.step_up.update(space, |v| v.wrapping_add(1))
    }

    /// Toggles the alternating boolean once every half cycle.
    pub fn tick_alternating(&mut self, space: &mut AddressSpace) -> Result<(), PlcError> {
        let t = &mut self.telemetry;
        t.alternating_ticks += 1;
        if t.alternating_ticks < t.half_cycle {
            return Ok(());
        }
        t.alternating_ticks = 0;
        t.alternating.update(space, |v| !v)
    }

    pub fn tick_random(&mut self, space: &mut AddressSpace) -> Result<(), PlcError> {
        let signed: i32 = self.rng.random();
        let unsigned: u32 = self.rng.random();
        self.telemetry.random_signed.update(space, |_| signed)?;
        self.telemetry.random_unsigned.update(space, |_| unsigned)
    }

    pub fn tick_spike_and_dip(&mut self, space: &mut AddressSpace) -> Result<(), PlcError> {
        let t = &mut self.telemetry;
        let spike = t.spike_gen.next_value(&mut self.rng);
        let dip = t.dip_gen.next_value(&mut self.rng);
        t.spike.update(space, |_| spike)?;
        t.dip.update(space, |_| dip)
    }

    pub fn tick_trends(&mut self, space: &mut AddressSpace) -> Result<(), PlcError> {
        let t = &mut self.telemetry;
        let positive = t.positive_gen.next_value();
        let negative = t.negative_gen.next_value();
        t.positive_trend.update(space, |_| positive)?;
        t.negative_trend.update(space, |_| negative)
    }

    pub fn reset_trends(&mut self) {
        self.telemetry.positive_gen.reset(&mut self.rng);
        self.telemetry.negative_gen.reset(&mut self.rng);
    }

    pub fn reset_step_up(&mut self, space: &mut AddressSpace) -> Result<(), PlcError> {
        self.telemetry.step_up.reset(space)
    }

    pub fn start_step_up(&mut self) {
        self.telemetry.step_up.start();
    }

    pub fn stop_step_up(&mut self) {
        self.telemetry.step_up.stop();
    }

    pub fn step_up(&self) -> u32 {
        *self.telemetry.step_up.value()
    }

    /// Applies a write to one of a group's control variables. The value is
    /// checked and applied before the node itself is written.
    pub fn apply_control(&mut self, control: GroupControl, value: &Variant) -> Result<(), PlcError> {
        let (group, setting) = control;
        let state = &mut self.groups[group.index()];
        match setting {
            ControlSetting::NumberOfUpdates => {
                let remaining = value.as_i32().ok_or(PlcError::TypeMismatch)?;
                state.set_remaining_updates(i64::from(remaining));
            }
            ControlSetting::StepSize => {
                let step = match value {
                    Variant::Double(v) => *v,
                    _ => return Err(PlcError::TypeMismatch),
                };
                state.set_step_size(step)?;
            }
            ControlSetting::Randomize => {
                let randomize = value.as_bool().ok_or(PlcError::TypeMismatch)?;
                state.set_randomize(randomize)?;
            }
        }
        Ok(())
    }
}

/// A writable variable that steers a node group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSetting {
    NumberOfUpdates,
    StepSize,
    Randomize,
}

pub type GroupControl = (NodeGroup, ControlSetting);

impl Telemetry {
    fn new(config: &TelemetryConfig, nodes: TelemetryNodes, rng: &mut StdRng) -> Self {
        Self {
            step_up: SimulatedVariable::new(nodes.step_up, 0),
            alternating: SimulatedVariable::new(nodes.alternating_boolean, false),
            alternating_ticks: 0,
            half_cycle: (config.cycle_count / 2).max(1),
            random_signed: SimulatedVariable::new(nodes.random_signed, 0),
            random_unsigned: SimulatedVariable::new(nodes.random_unsigned, 0),
            spike: SimulatedVariable::new(nodes.spike, 0.0),
            spike_gen: OutlierGenerator::spike(rng, config.cycle_count),
            dip: SimulatedVariable::new(nodes.dip, 0.0),
            dip_gen: OutlierGenerator::dip(rng, config.cycle_count),
            positive_trend: SimulatedVariable::new(nodes.positive_trend, 0.0),
            positive_gen: TrendGenerator::positive(rng, config.cycle_count),
            negative_trend: SimulatedVariable::new(nodes.negative_trend, 0.0),
            negative_gen: TrendGenerator::negative(rng, config.cycle_count),
        }
    }
}
