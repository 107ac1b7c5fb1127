// crates/plcsim-rs/src/config.rs
//! Static simulation configuration, created once at startup and passed into
//! the node managers, the scheduler and the generators.

use crate::PlcError;
use log::error;
use std::time::Duration;

/// Value type of the nodes in a slow/fast node group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    UInt,
    Double,
    Bool,
    UIntArray,
}

impl NodeType {
    /// Name fragment used when building node names such as `SlowUInt1`.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt => "UInt",
            Self::Double => "Double",
            Self::Bool => "Bool",
            Self::UIntArray => "UIntArray",
        }
    }
}

/// Parameters of one group of load nodes (slow, fast or very fast).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGroupConfig {
    /// Group name, e.g. `Slow`. Prefixes node and control variable names.
    pub name: String,
    pub count: u32,
    pub node_type: NodeType,
    pub randomize: bool,
    pub step_size: f64,
    pub min: f64,
    pub max: f64,
    pub rate: Duration,
    pub bad_nodes: u32,
}

impl NodeGroupConfig {
    pub fn new(name: impl Into<String>, count: u32, rate: Duration) -> Self {
        Self {
            name: name.into(),
            count,
            node_type: NodeType::UInt,
            randomize: false,
            step_size: 1.0,
            min: 0.0,
            max: f64::from(u32::MAX),
            rate,
            bad_nodes: 0,
        }
    }

    /// Checks the ranges before any node of the group is created.
    pub fn validate(&self) -> Result<(), PlcError> {
        if self.name.is_empty() {
            return Err(PlcError::InvalidConfiguration(
                "node group without a name".into(),
            ));
        }
        if !self.min.is_finite() || !self.max.is_finite() || !(self.max - self.min).is_finite() {
            return Err(PlcError::InvalidConfiguration(format!(
                "node group '{}' has a non-finite range [{}, {}]",
                self.name, self.min, self.max
            )));
        }
        if !self.step_size.is_finite() || self.step_size < 0.0 {
            return Err(PlcError::InvalidConfiguration(format!(
                "node group '{}' has an invalid step size {}",
                self.name, self.step_size
            )));
        }
        if self.min > self.max {
            return Err(PlcError::InvalidConfiguration(format!(
                "node group '{}' has min {} above max {}",
                self.name, self.min, self.max
            )));
        }
        if self.rate.is_zero() {
            return Err(PlcError::InvalidConfiguration(format!(
                "node group '{}' has a zero update rate",
                self.name
            )));
        }
        match self.node_type {
            NodeType::UInt => {
                if self.min < 0.0 || self.max > f64::from(u32::MAX) {
                    return Err(PlcError::InvalidConfiguration(format!(
                        "node group '{}' has an unsigned range outside [0, {}]",
                        self.name,
                        u32::MAX
                    )));
                }
                if self.step_size.fract() != 0.0 {
                    return Err(PlcError::InvalidConfiguration(format!(
                        "node group '{}' has a fractional step {} for unsigned nodes",
                        self.name, self.step_size
                    )));
                }
                if self.randomize && self.min == self.max {
                    return Err(PlcError::DegenerateRange {
                        group: self.name.clone(),
                    });
                }
            }
            NodeType::Double => {
                if self.randomize && self.min == self.max {
                    return Err(PlcError::DegenerateRange {
                        group: self.name.clone(),
                    });
                }
                let positive = self.min >= 0.0 && self.max > 0.0;
                let negative = self.max <= 0.0 && self.min < 0.0;
                if !self.randomize && !positive && !negative {
                    return Err(PlcError::RangeError {
                        min: self.min,
                        max: self.max,
                    });
                }
            }
            NodeType::Bool | NodeType::UIntArray => {}
        }
        Ok(())
    }
}

/// Parameters of the telemetry generators (spike, dip, trends, alternating boolean).
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Number of samples that make up one full cycle.
    pub cycle_count: u32,
    /// Period between two samples.
    pub cycle_length: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            cycle_count: 50,
            cycle_length: Duration::from_millis(100),
        }
    }
}

/// One area of the alarm topology. Areas nest; sources are given by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaConfig {
    pub name: String,
    pub areas: Vec<AreaConfig>,
    pub sources: Vec<String>,
}

impl AreaConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            areas: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn with_area(mut self, area: AreaConfig) -> Self {
        self.areas.push(area);
        self
    }

    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.sources.push(path.into());
        self
    }
}

/// Policy ceilings enforced on monitored items and browse requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerLimits {
    pub max_queue_size: u32,
    pub min_sampling_interval_ms: f64,
    pub min_processing_interval_ms: f64,
    pub max_browse_continuation_points: usize,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            min_sampling_interval_ms: 0.0,
            min_processing_interval_ms: 100.0,
            max_browse_continuation_points: 100,
        }
    }
}

/// Complete startup configuration of the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub slow: NodeGroupConfig,
    pub fast: NodeGroupConfig,
    pub very_fast: NodeGroupConfig,
    pub telemetry: TelemetryConfig,
    pub event_rate: Duration,
    pub alarm_rate: Duration,
    pub deterministic_alarm_rate: Duration,
    pub areas: Vec<AreaConfig>,
    pub deterministic_alarms: Vec<String>,
    /// Seeds every random generator when set, for reproducible runs.
    pub seed: Option<u64>,
    pub limits: ServerLimits,
    pub plc_namespace: u16,
    pub alarm_namespace: u16,
    /// Start the timers as soon as the address space is built.
    pub autostart: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            slow: NodeGroupConfig::new("Slow", 1, Duration::from_secs(10)),
            fast: NodeGroupConfig::new("Fast", 1, Duration::from_secs(1)),
            very_fast: NodeGroupConfig::new("VeryFast", 0, Duration::from_millis(100)),
            telemetry: TelemetryConfig::default(),
            event_rate: Duration::from_millis(1000),
            alarm_rate: Duration::from_millis(1000),
            deterministic_alarm_rate: Duration::from_millis(5000),
            areas: default_topology(),
            deterministic_alarms: default_deterministic_alarms(),
            seed: None,
            limits: ServerLimits::default(),
            plc_namespace: 2,
            alarm_namespace: 3,
            autostart: true,
        }
    }
}

impl SimulationConfig {
    pub fn groups(&self) -> [&NodeGroupConfig; 3] {
        [&self.slow, &self.fast, &self.very_fast]
    }

    /// Rejects static configuration bugs before any node is created.
    pub fn validate(&self) -> Result<(), PlcError> {
        for group in self.groups() {
            if let Err(e) = group.validate() {
                error!("Rejected node group '{}': {}", group.name, e);
                return Err(e);
            }
        }
        if self.telemetry.cycle_count == 0 || self.telemetry.cycle_length.is_zero() {
            return Err(PlcError::InvalidConfiguration(
                "telemetry cycle count and length must be non-zero".into(),
            ));
        }
        if self.plc_namespace == self.alarm_namespace || self.plc_namespace == 0 {
            return Err(PlcError::InvalidConfiguration(format!(
                "namespaces {} and {} must be distinct and non-zero",
                self.plc_namespace, self.alarm_namespace
            )));
        }
        for area in &self.areas {
            validate_area(area)?;
        }
        if self.deterministic_alarms.iter().any(String::is_empty) {
            return Err(PlcError::InvalidConfiguration(
                "empty deterministic alarm source path".into(),
            ));
        }
        Ok(())
    }
}

/// Rejects empty names and identifier separators in an area subtree.
pub fn validate_area(area: &AreaConfig) -> Result<(), PlcError> {
    if area.name.is_empty() || area.name.contains('/') || area.name.contains('?') {
        return Err(PlcError::InvalidConfiguration(format!(
            "invalid area name '{}'",
            area.name
        )));
    }
    if let Some(bad) = area
        .sources
        .iter()
        .find(|p| p.is_empty() || p.contains('?'))
    {
        return Err(PlcError::InvalidConfiguration(format!(
            "invalid source path '{bad}' in area '{}'",
            area.name
        )));
    }
    area.areas.iter().try_for_each(validate_area)
}

/// The built-in alarm topology.
pub fn default_topology() -> Vec<AreaConfig> {
    vec![
        AreaConfig::new("Green")
            .with_area(
                AreaConfig::new("East").with_area(
                    AreaConfig::new("Blue")
                        .with_source("Metals/SouthMotor")
                        .with_source("Colours/EastTank"),
                ),
            )
            .with_area(
                AreaConfig::new("North")
                    .with_source("Metals/NorthMotor")
                    .with_source("Metals/WestTank"),
            ),
        AreaConfig::new("Yellow")
            .with_area(
                AreaConfig::new("West")
                    .with_source("Metals/WestTank")
                    .with_source("Colours/WestTank"),
            )
            .with_area(
                AreaConfig::new("South")
                    .with_source("Colours/NorthMotor")
                    .with_source("Paper/CentralMotor"),
            ),
    ]
}

/// Sources visited by the deterministic alarm timer, in order.
pub fn default_deterministic_alarms() -> Vec<String> {
    [
        "Metals/WestTank",
        "Metals/SouthMotor",
        "Colours/EastTank",
        "Colours/NorthMotor",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_degenerate_random_range_rejected() {
        let mut config = SimulationConfig::default();
        config.fast.randomize = true;
        config.fast.min = 7.0;
        config.fast.max = 7.0;
        assert_eq!(
            config.validate(),
            Err(PlcError::DegenerateRange {
                group: "Fast".into()
            })
        );
    }

    #[test]
    fn test_mixed_sign_double_ramp_rejected() {
        let mut group = NodeGroupConfig::new("Slow", 2, Duration::from_secs(1));
        group.node_type = NodeType::Double;
        group.min = -10.0;
        group.max = 10.0;
        assert_eq!(
            group.validate(),
            Err(PlcError::RangeError {
                min: -10.0,
                max: 10.0
            })
        );
        // The same range is fine when randomized.
        group.randomize = true;
        assert_eq!(group.validate(), Ok(()));
    }

    #[test]
    fn test_non_finite_double_bounds_rejected() {
        let mut group = NodeGroupConfig::new("Fast", 1, Duration::from_secs(1));
        group.node_type = NodeType::Double;
        group.randomize = true;
        for (min, max) in [
            (0.0, f64::INFINITY),
            (f64::NEG_INFINITY, 1.0),
            (f64::NAN, 1.0),
            (0.0, f64::NAN),
            (-f64::MAX, f64::MAX),
        ] {
            group.min = min;
            group.max = max;
            assert!(
                matches!(group.validate(), Err(PlcError::InvalidConfiguration(_))),
                "[{min}, {max}] was accepted"
            );
        }
    }

    #[test]
    fn test_fractional_uint_step_rejected() {
        let mut config = SimulationConfig::default();
        config.slow.step_size = 0.5;
        assert!(matches!(
            config.validate(),
            Err(PlcError::InvalidConfiguration(_))
        ));
        config.slow.node_type = NodeType::Double;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_default_topology_shares_west_tank() {
        fn collect<'a>(areas: &'a [AreaConfig], out: &mut Vec<&'a str>) {
            for area in areas {
                out.extend(area.sources.iter().map(String::as_str));
                collect(&area.areas, out);
            }
        }
        let topology = default_topology();
        let mut paths = Vec::new();
        collect(&topology, &mut paths);
        assert_eq!(
            paths.iter().filter(|p| **p == "Metals/WestTank").count(),
            2
        );
    }

    #[test]
    fn test_invalid_area_name_rejected() {
        let mut config = SimulationConfig::default();
        config.areas.push(AreaConfig::new("Bad/Name"));
        assert!(matches!(
            config.validate(),
            Err(PlcError::InvalidConfiguration(_))
        ));
    }
}
