// crates/plcsim-rs-topology/src/model.rs

//! Internal `serde` model mirroring the XML layout one-to-one.

use serde::{Deserialize, Serialize};

/// Represents the `<SimulationTopology>` root element.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename = "SimulationTopology")]
pub struct SimulationTopology {
    #[serde(rename = "Area", default, skip_serializing_if = "Vec::is_empty")]
    pub area: Vec<Area>,

    #[serde(
        rename = "DeterministicAlarms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deterministic_alarms: Option<SourceList>,
}

/// Represents `<Area name="...">`, which may nest further areas.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Area {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "Area", default, skip_serializing_if = "Vec::is_empty")]
    pub area: Vec<Area>,

    #[serde(rename = "Source", default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<SourceRef>,
}

/// Represents `<Source path="Metals/WestTank"/>`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SourceRef {
    #[serde(rename = "@path")]
    pub path: String,
}

/// Represents `<DeterministicAlarms>`, an ordered list of sources.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SourceList {
    #[serde(rename = "Source", default)]
    pub source: Vec<SourceRef>,
}
