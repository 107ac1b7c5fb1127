//! Defines the data structures sent from the simulation to the monitor.
//!
//! They are built from the managers' diagnostics on the simulation side and
//! serialized to JSON for the web frontend.

use plcsim_rs::manager::{GroupDiagnostics, ManagerDiagnostics};
use serde::Serialize;

/// Generator state of one load-node group.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GroupInfo {
    pub manager: String,
    pub name: String,
    pub node_type: String,
    pub randomize: bool,
    pub step_size: f64,
    pub min: f64,
    pub max: f64,
    /// Ticks left before the group stops. Negative means unlimited.
    pub remaining_updates: i64,
    pub updates_enabled: bool,
    /// Next entry of the bad-status table used by the group's bad nodes.
    pub bad_status_cursor: usize,
}

impl GroupInfo {
    fn new(manager: &str, group: &GroupDiagnostics) -> Self {
        Self {
            manager: manager.to_owned(),
            name: group.name.clone(),
            node_type: group.node_type.to_owned(),
            randomize: group.randomize,
            step_size: group.step_size,
            min: group.min,
            max: group.max,
            remaining_updates: group.remaining_updates,
            updates_enabled: group.updates_enabled,
            bad_status_cursor: group.bad_status_cursor,
        }
    }
}

/// Counters of one node manager.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ManagerInfo {
    pub name: String,
    pub namespace: u16,
    pub running: bool,
    pub node_count: usize,
    pub component_cache_len: usize,
    pub monitored_item_count: usize,
    pub monitored_node_count: usize,
    pub root_notifier_count: usize,
    pub continuation_point_count: usize,
    /// Next position of the deterministic alarm driver, if the manager has one.
    pub alarm_cursor: Option<usize>,
}

impl From<&ManagerDiagnostics> for ManagerInfo {
    fn from(d: &ManagerDiagnostics) -> Self {
        Self {
            name: d.name.clone(),
            namespace: d.namespace,
            running: d.running,
            node_count: d.node_count,
            component_cache_len: d.component_cache_len,
            monitored_item_count: d.monitored_item_count,
            monitored_node_count: d.monitored_node_count,
            root_notifier_count: d.root_notifier_count,
            continuation_point_count: d.continuation_point_count,
            alarm_cursor: d.alarm_cursor,
        }
    }
}

/// The packet pushed to the monitor on every publisher tick.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct DiagnosticSnapshot {
    /// Increases by one per snapshot.
    pub sequence: u64,
    pub uptime_ms: u64,
    pub managers: Vec<ManagerInfo>,
    pub groups: Vec<GroupInfo>,
    /// Event items on the `Server` object.
    pub server_item_count: usize,
}

impl DiagnosticSnapshot {
    pub fn from_diagnostics(
        sequence: u64,
        uptime_ms: u64,
        diagnostics: &[ManagerDiagnostics],
        server_item_count: usize,
    ) -> Self {
        Self {
            sequence,
            uptime_ms,
            managers: diagnostics.iter().map(ManagerInfo::from).collect(),
            groups: diagnostics
                .iter()
                .flat_map(|d| d.groups.iter().map(|g| GroupInfo::new(&d.name, g)))
                .collect(),
            server_item_count,
        }
    }

    /// Sum of the component cache sizes of every manager.
    pub fn component_cache_len(&self) -> usize {
        self.managers.iter().map(|m| m.component_cache_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plc_diagnostics() -> ManagerDiagnostics {
        ManagerDiagnostics {
            name: "plc".into(),
            namespace: 2,
            node_count: 40,
            running: true,
            groups: vec![GroupDiagnostics {
                name: "Slow".into(),
                node_type: "UInt",
                randomize: false,
                step_size: 1.0,
                min: 0.0,
                max: 100.0,
                remaining_updates: -1,
                updates_enabled: true,
                bad_status_cursor: 3,
            }],
            ..ManagerDiagnostics::default()
        }
    }

    #[test]
    fn test_snapshot_flattens_groups() {
        let alarm = ManagerDiagnostics {
            name: "alarm".into(),
            namespace: 3,
            component_cache_len: 2,
            alarm_cursor: Some(1),
            ..ManagerDiagnostics::default()
        };
        let snapshot = DiagnosticSnapshot::from_diagnostics(7, 1500, &[plc_diagnostics(), alarm], 1);
        assert_eq!(snapshot.managers.len(), 2);
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.groups[0].manager, "plc");
        assert_eq!(snapshot.component_cache_len(), 2);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = DiagnosticSnapshot::from_diagnostics(1, 0, &[plc_diagnostics()], 0);
        let json: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["managers"][0]["name"], "plc");
        assert_eq!(json["managers"][0]["alarm_cursor"], serde_json::Value::Null);
        assert_eq!(json["groups"][0]["node_type"], "UInt");
        assert_eq!(json["groups"][0]["remaining_updates"], -1);
    }
}
