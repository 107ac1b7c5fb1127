// crates/plcsim-rs-topology/src/parser.rs

use crate::error::TopologyError;
use crate::model;
use crate::types::Topology;
use log::{debug, info};
use plcsim_rs::AreaConfig;
use std::fs;
use std::path::Path;

/// Parses a `<SimulationTopology>` document.
///
/// # Errors
/// Returns a `TopologyError` if the XML is malformed, or if an area has an
/// empty name or a source an empty path.
pub fn load_topology_from_str(xml_content: &str) -> Result<Topology, TopologyError> {
    let document: model::SimulationTopology = quick_xml::de::from_str(xml_content)?;

    if document.area.is_empty() {
        return Err(TopologyError::Validation(
            "the topology has no root area".into(),
        ));
    }
    let areas = document
        .area
        .iter()
        .map(|a| convert_area(a, ""))
        .collect::<Result<Vec<_>, _>>()?;

    let deterministic_alarms = document
        .deterministic_alarms
        .map(|list| {
            list.source
                .into_iter()
                .map(|s| validate_path(s.path, "DeterministicAlarms"))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let topology = Topology {
        areas,
        deterministic_alarms,
    };
    debug!(
        "Parsed topology with {} areas ({} at the root)",
        topology.area_count(),
        topology.areas.len()
    );
    Ok(topology)
}

/// Reads and parses a topology file.
pub fn load_topology_from_file(path: impl AsRef<Path>) -> Result<Topology, TopologyError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let topology = load_topology_from_str(&content)?;
    info!("Loaded topology from {}", path.display());
    Ok(topology)
}

/// `parent` is the slash-joined path of the enclosing areas, for error messages.
fn convert_area(area: &model::Area, parent: &str) -> Result<AreaConfig, TopologyError> {
    let here = if parent.is_empty() {
        area.name.clone()
    } else {
        format!("{parent}/{}", area.name)
    };
    if area.name.trim().is_empty() {
        return Err(TopologyError::Validation(format!(
            "area with an empty name below '{parent}'"
        )));
    }
    if area.name.contains(['/', '?']) {
        return Err(TopologyError::Validation(format!(
            "area name '{here}' contains a reserved character"
        )));
    }
    let mut config = AreaConfig::new(area.name.clone());
    for source in &area.source {
        config.sources.push(validate_path(source.path.clone(), &here)?);
    }
    for sub_area in &area.area {
        config.areas.push(convert_area(sub_area, &here)?);
    }
    Ok(config)
}

fn validate_path(path: String, owner: &str) -> Result<String, TopologyError> {
    if path.trim().is_empty() {
        return Err(TopologyError::Validation(format!(
            "empty source path in '{owner}'"
        )));
    }
    if path.contains('?') || path.starts_with('/') || path.ends_with('/') {
        return Err(TopologyError::Validation(format!(
            "malformed source path '{path}' in '{owner}'"
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_areas_keep_order() {
        let xml = r#"<SimulationTopology>
            <Area name="Plant">
                <Source path="Line/FirstTank"/>
                <Area name="Hall"><Source path="Line/PumpMotor"/></Area>
                <Source path="Line/SecondTank"/>
            </Area>
        </SimulationTopology>"#;
        let topology = load_topology_from_str(xml).unwrap();
        let plant = &topology.areas[0];
        assert_eq!(plant.sources, ["Line/FirstTank", "Line/SecondTank"]);
        assert_eq!(plant.areas[0].name, "Hall");
        assert_eq!(topology.deterministic_alarms, None);
        assert_eq!(topology.area_count(), 2);
    }

    #[test]
    fn test_rejects_empty_names() {
        let xml = r#"<SimulationTopology><Area name=""/></SimulationTopology>"#;
        assert!(matches!(
            load_topology_from_str(xml),
            Err(TopologyError::Validation(_))
        ));
        let xml = r#"<SimulationTopology><Area name="A"><Source path=" "/></Area></SimulationTopology>"#;
        assert!(matches!(
            load_topology_from_str(xml),
            Err(TopologyError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_document_without_areas() {
        let xml = r#"<SimulationTopology></SimulationTopology>"#;
        assert!(matches!(
            load_topology_from_str(xml),
            Err(TopologyError::Validation(_))
        ));
    }
}
