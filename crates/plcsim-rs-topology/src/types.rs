// crates/plcsim-rs-topology/src/types.rs

//! The public topology type and its conversion into simulator configuration.

use plcsim_rs::config::{default_deterministic_alarms, default_topology};
use plcsim_rs::{AreaConfig, SimulationConfig};

/// A parsed alarm topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Root areas, each with its nested areas and sources.
    pub areas: Vec<AreaConfig>,

    /// Sources visited by the deterministic alarm timer, in order.
    /// `None` when the document has no `<DeterministicAlarms>` block.
    pub deterministic_alarms: Option<Vec<String>>,
}

impl Topology {
    /// The topology compiled into the simulator.
    pub fn builtin() -> Self {
        Self {
            areas: default_topology(),
            deterministic_alarms: Some(default_deterministic_alarms()),
        }
    }

    /// Replaces the areas of `config`. The deterministic list is replaced
    /// only when the document carried one.
    pub fn apply_to(self, config: &mut SimulationConfig) {
        config.areas = self.areas;
        if let Some(list) = self.deterministic_alarms {
            config.deterministic_alarms = list;
        }
    }

    /// Number of areas at every depth.
    pub fn area_count(&self) -> usize {
        fn count(areas: &[AreaConfig]) -> usize {
            areas.iter().map(|a| 1 + count(&a.areas)).sum()
        }
        count(&self.areas)
    }
}
