// crates/plcsim-rs/src/simulation/alarms.rs
//! Alarm traffic: a randomized walk over every condition and a
//! deterministic round robin over a fixed list of sources.

use crate::address_space::{AddressSpace, AddressSpaceIndex, Node, NodeKey};
use crate::log::{LogContext, sim_debug, sim_warn};
use rand::Rng;
use rand::rngs::StdRng;

/// Chance per tick that a condition changes state in the random walk.
pub const ALARM_CHANGE_PROBABILITY: f64 = 0.1;
/// Severity range of randomly activated conditions.
pub const ALARM_SEVERITY_RANGE: std::ops::RangeInclusive<u16> = 100..=1000;
/// Severity used by the deterministic driver.
pub const DETERMINISTIC_SEVERITY: u16 = 500;

/// Visits a fixed, ordered list of sources one per tick, wrapping around.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeterministicAlarmDriver {
    sources: Vec<(String, NodeKey)>,
    cursor: usize,
}

impl DeterministicAlarmDriver {
    /// Maps source paths to their nodes, skipping paths that do not resolve.
    pub fn resolve(paths: &[String], index: &AddressSpaceIndex, ctx: &LogContext) -> Self {
        let sources = paths
            .iter()
            .filter_map(|path| match index.source(path) {
                Some(key) => Some((path.clone(), key)),
                None => {
                    sim_warn!(ctx, "Deterministic alarm source '{}' not found, skipping", path);
                    None
                }
            })
            .collect();
        Self { sources, cursor: 0 }
    }

    /// The source to trigger this tick. Advances the cursor.
    pub fn next_source(&mut self) -> Option<(&str, NodeKey)> {
        if self.sources.is_empty() {
            return None;
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.sources.len();
        let (path, key) = &self.sources[index];
        Some((path.as_str(), *key))
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(path, _)| path.as_str())
    }
}

/// First condition component of a source, in creation order.
pub fn first_condition(space: &AddressSpace, source: NodeKey) -> Option<NodeKey> {
    conditions_of(space, source).into_iter().next()
}

pub fn conditions_of(space: &AddressSpace, source: NodeKey) -> Vec<NodeKey> {
    space
        .graph
        .get(source)
        .map(|node| {
            node.children()
                .iter()
                .copied()
                .filter(|c| space.graph.get(*c).and_then(Node::condition_state).is_some())
                .collect()
        })
        .unwrap_or_default()
}

/// State of the alarm manager's two timers.
#[derive(Debug)]
pub struct AlarmSimulation {
    pub driver: DeterministicAlarmDriver,
    rng: StdRng,
    ctx: LogContext,
}

impl AlarmSimulation {
    pub fn new(driver: DeterministicAlarmDriver, rng: StdRng, ctx: LogContext) -> Self {
        Self { driver, rng, ctx }
    }

    /// One deterministic tick: toggles the first condition of the next
    /// source. Returns the path visited.
    pub fn deterministic_tick(&mut self, space: &mut AddressSpace) -> Option<String> {
        let (path, source) = self.driver.next_source()?;
        let path = path.to_owned();
        let Some(condition) = first_condition(space, source) else {
            sim_warn!(self.ctx, "Source '{}' has no conditions", path);
            return Some(path);
        };
        let toggled = space
            .graph
            .get_mut(condition)
            .and_then(Node::condition_state_mut)
            .map(|state| state.toggle(DETERMINISTIC_SEVERITY));
        match toggled {
            Some(Ok(())) => {
                let delivered = space.report_condition(condition);
                sim_debug!(self.ctx, "Deterministic alarm on '{}' reached {} items", path, delivered);
            }
            Some(Err(e)) => sim_debug!(self.ctx, "Deterministic alarm on '{}' skipped: {}", path, e),
            None => {}
        }
        Some(path)
    }

    /// One random tick over every source. Returns the number of conditions changed.
    pub fn random_tick(&mut self, space: &mut AddressSpace) -> usize {
        let sources: Vec<NodeKey> = space.index.sources().into_iter().map(|(_, k)| k).collect();
        let mut changed = 0;
        for source in sources {
            for condition in conditions_of(space, source) {
                if !self.rng.random_bool(ALARM_CHANGE_PROBABILITY) {
                    continue;
                }
                let severity = self.rng.random_range(ALARM_SEVERITY_RANGE);
                let Some(state) = space
                    .graph
                    .get_mut(condition)
                    .and_then(Node::condition_state_mut)
                else {
                    continue;
                };
                if state.toggle(severity).is_ok() {
                    changed += 1;
                    space.report_condition(condition);
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::NodeGraph;
    use crate::types::NodeId;

    fn index_with(paths: &[&str]) -> AddressSpaceIndex {
        let mut graph = NodeGraph::new();
        let mut index = AddressSpaceIndex::new(3);
        for path in paths {
            let key = graph
                .insert_root(Node::source(NodeId::string(3, format!("1:{path}")), path, path))
                .unwrap();
            index.register_source(path, key);
        }
        index
    }

    #[test]
    fn test_round_robin_cycle() {
        let paths: Vec<String> = ["A/OneTank", "B/TwoMotor", "C/ThreeTank"]
            .into_iter()
            .map(String::from)
            .collect();
        let index = index_with(&["A/OneTank", "B/TwoMotor", "C/ThreeTank"]);
        let ctx = LogContext::new("test", "alarms", 3);
        let mut driver = DeterministicAlarmDriver::resolve(&paths, &index, &ctx);
        let k = driver.len();
        for _ in 0..3 {
            let start = driver.cursor();
            let visited: Vec<String> = (0..k)
                .filter_map(|_| driver.next_source().map(|(p, _)| p.to_owned()))
                .collect();
            assert_eq!(visited, paths);
            assert_eq!(driver.cursor(), start);
        }
    }

    #[test]
    fn test_unknown_paths_are_skipped() {
        let paths: Vec<String> = ["A/OneTank", "Nowhere/Tank", "C/ThreeTank"]
            .into_iter()
            .map(String::from)
            .collect();
        let index = index_with(&["A/OneTank", "C/ThreeTank"]);
        let ctx = LogContext::new("test", "alarms", 3);
        let mut driver = DeterministicAlarmDriver::resolve(&paths, &index, &ctx);
        assert_eq!(driver.paths().collect::<Vec<_>>(), vec!["A/OneTank", "C/ThreeTank"]);
        assert_eq!(driver.next_source().map(|(p, _)| p), Some("A/OneTank"));
        assert_eq!(driver.next_source().map(|(p, _)| p), Some("C/ThreeTank"));
        assert_eq!(driver.next_source().map(|(p, _)| p), Some("A/OneTank"));
    }

    #[test]
    fn test_empty_driver_yields_nothing() {
        let mut driver = DeterministicAlarmDriver::default();
        assert!(driver.is_empty());
        assert!(driver.next_source().is_none());
        assert_eq!(driver.cursor(), 0);
    }
}
