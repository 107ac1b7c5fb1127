// crates/plcsim-rs/src/monitoring/filter.rs

use crate::types::{NodeId, ids};
use std::time::SystemTime;

/// How a data change deadband is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DeadbandType {
    #[default]
    None,
    Absolute,
    /// Percentage of the node's `EURange`.
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataChangeFilter {
    pub deadband_type: DeadbandType,
    pub deadband_value: f64,
}

/// Requests server-side aggregation of a value over fixed processing intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateFilter {
    pub aggregate_type: NodeId,
    pub start_time: SystemTime,
    /// Processing interval in milliseconds.
    pub processing_interval: f64,
}

/// Filter requested by a client when creating or modifying an item.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MonitoringFilter {
    #[default]
    None,
    DataChange(DataChangeFilter),
    Aggregate(AggregateFilter),
    /// Selects events. Only valid on the `EventNotifier` attribute.
    Event,
}

/// A validated filter as applied by a monitored item.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ItemFilter {
    #[default]
    None,
    /// Absolute deadband; percent deadbands are converted on validation.
    Deadband(f64),
    Aggregate(AggregateFilter),
    Event,
}

/// Aggregates the server knows how to describe.
pub const SUPPORTED_AGGREGATES: [u32; 6] = [
    ids::AGGREGATE_INTERPOLATIVE,
    ids::AGGREGATE_AVERAGE,
    ids::AGGREGATE_TOTAL,
    ids::AGGREGATE_MINIMUM,
    ids::AGGREGATE_MAXIMUM,
    ids::AGGREGATE_COUNT,
];

pub fn is_supported_aggregate(aggregate_type: &NodeId) -> bool {
    aggregate_type.namespace == 0
        && SUPPORTED_AGGREGATES
            .iter()
            .any(|id| *aggregate_type == NodeId::numeric(0, *id))
}
