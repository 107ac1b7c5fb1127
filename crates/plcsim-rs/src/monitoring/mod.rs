// crates/plcsim-rs/src/monitoring/mod.rs
//! Monitored items: per-node subscriptions with queueing, filtering and the
//! sampling/queue-size policy enforced by the server.

pub mod filter;
pub mod item;
pub mod registry;

pub use filter::{AggregateFilter, DataChangeFilter, DeadbandType, ItemFilter, MonitoringFilter};
pub use item::{ItemSettings, MonitoredItem, MonitoredItemId, MonitoringMode, Notification};
pub use registry::{MonitoredItemRegistry, MonitoredNode};

/// Parameters requested by a client for a new or modified item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringParameters {
    pub client_handle: u32,
    /// Requested sampling interval in milliseconds. Infinity is allowed.
    pub sampling_interval: f64,
    pub filter: MonitoringFilter,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

impl Default for MonitoringParameters {
    fn default() -> Self {
        Self {
            client_handle: 0,
            sampling_interval: 0.0,
            filter: MonitoringFilter::None,
            queue_size: 1,
            discard_oldest: true,
        }
    }
}
