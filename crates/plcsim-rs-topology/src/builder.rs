// crates/plcsim-rs-topology/src/builder.rs

use crate::error::TopologyError;
use crate::model;
use crate::types::Topology;
use plcsim_rs::AreaConfig;
use serde::Serialize;
use std::fmt::Write;

/// Serializes a `Topology` into a `<SimulationTopology>` XML document.
///
/// Within an area, nested areas are written before its sources.
///
/// # Errors
/// Returns a `TopologyError` if serialization fails.
pub fn save_topology_to_string(topology: &Topology) -> Result<String, TopologyError> {
    let document = model::SimulationTopology {
        area: topology.areas.iter().map(build_area).collect(),
        deterministic_alarms: topology
            .deterministic_alarms
            .as_ref()
            .map(|list| model::SourceList {
                source: list.iter().map(|p| source_ref(p)).collect(),
            }),
    };

    let mut buffer = String::new();
    writeln!(&mut buffer, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;

    let mut serializer = quick_xml::se::Serializer::new(&mut buffer);
    serializer.indent(' ', 2);

    document.serialize(serializer)?;
    Ok(buffer)
}

fn build_area(area: &AreaConfig) -> model::Area {
    model::Area {
        name: area.name.clone(),
        area: area.areas.iter().map(build_area).collect(),
        source: area.sources.iter().map(|p| source_ref(p)).collect(),
    }
}

fn source_ref(path: &str) -> model::SourceRef {
    model::SourceRef { path: path.to_owned() }
}
