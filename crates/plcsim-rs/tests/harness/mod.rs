// crates/plcsim-rs/tests/harness/mod.rs
//! Shared helpers for the integration tests.
#![allow(dead_code)]

use plcsim_rs::events::{EventNotification, EventType};
use plcsim_rs::manager::MonitoredItemCreateRequest;
use plcsim_rs::monitoring::{MonitoredItemId, MonitoringFilter, MonitoringMode, MonitoringParameters, Notification};
use plcsim_rs::{AttributeId, NodeId, SimulationConfig};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Seeded configuration whose timers only run when fired by the test.
pub fn manual_config() -> SimulationConfig {
    SimulationConfig {
        autostart: false,
        seed: Some(42),
        ..SimulationConfig::default()
    }
}

pub fn event_request(item_id: MonitoredItemId, node_id: NodeId) -> MonitoredItemCreateRequest {
    MonitoredItemCreateRequest {
        item_id,
        node_id,
        attribute_id: AttributeId::EventNotifier,
        mode: MonitoringMode::Reporting,
        parameters: MonitoringParameters {
            client_handle: item_id,
            filter: MonitoringFilter::Event,
            queue_size: 1000,
            ..MonitoringParameters::default()
        },
    }
}

pub fn value_request(item_id: MonitoredItemId, node_id: NodeId) -> MonitoredItemCreateRequest {
    MonitoredItemCreateRequest {
        item_id,
        node_id,
        attribute_id: AttributeId::Value,
        mode: MonitoringMode::Reporting,
        parameters: MonitoringParameters {
            client_handle: item_id,
            queue_size: 100,
            ..MonitoringParameters::default()
        },
    }
}

/// The events among `notifications`, refresh markers excluded.
pub fn events(notifications: Vec<Notification>) -> Vec<EventNotification> {
    notifications
        .into_iter()
        .filter_map(|n| match n {
            Notification::Event(e)
                if !matches!(e.event_type, EventType::RefreshStart | EventType::RefreshEnd) =>
            {
                Some(e)
            }
            _ => None,
        })
        .collect()
}
