// src/lib.rs

#![doc = "Reads and writes the alarm topology of the simulator as XML."]
#![doc = ""]
#![doc = "It supports:"]
#![doc = "- `load_topology_from_str` / `load_topology_from_file`: parsing a `<SimulationTopology>` document."]
#![doc = "- `save_topology_to_string`: serializing a topology back into XML."]
#![doc = "- `Topology::apply_to`: replacing the topology of a `SimulationConfig`."]

// --- Crate Modules ---

mod builder;
mod error;
mod model;
mod parser;
mod types;

// --- Public API Re-exports ---

pub use builder::save_topology_to_string;
pub use error::TopologyError;
pub use parser::{load_topology_from_file, load_topology_from_str};
pub use types::Topology;
