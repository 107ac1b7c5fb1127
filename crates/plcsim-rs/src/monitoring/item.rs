// crates/plcsim-rs/src/monitoring/item.rs

use super::filter::ItemFilter;
use crate::address_space::DataValue;
use crate::events::EventNotification;
use crate::types::{AttributeId, NodeId};
use parking_lot::Mutex;
use std::collections::VecDeque;

pub type MonitoredItemId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitoringMode {
    /// Nothing is sampled or queued.
    Disabled,
    /// Values are queued but not handed to the consumer.
    Sampling,
    #[default]
    Reporting,
}

/// One queued entry of a monitored item.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Data(DataValue),
    Event(EventNotification),
}

/// Runtime parameters of an item, after revision.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSettings {
    pub mode: MonitoringMode,
    pub sampling_interval: f64,
    pub queue_size: usize,
    pub discard_oldest: bool,
    pub filter: ItemFilter,
}

#[derive(Debug)]
struct ItemState {
    settings: ItemSettings,
    queue: VecDeque<Notification>,
    overflow: bool,
    last_value: Option<DataValue>,
}

/// A client's registration of interest in a node's value or events.
///
/// Items may be shared between managers (server-wide event items), so the
/// queue has its own lock.
#[derive(Debug)]
pub struct MonitoredItem {
    id: MonitoredItemId,
    node_id: NodeId,
    attribute_id: AttributeId,
    client_handle: u32,
    state: Mutex<ItemState>,
}

impl MonitoredItem {
    pub fn new(
        id: MonitoredItemId,
        node_id: NodeId,
        attribute_id: AttributeId,
        client_handle: u32,
        settings: ItemSettings,
    ) -> Self {
        Self {
            id,
            node_id,
            attribute_id,
            client_handle,
            state: Mutex::new(ItemState {
                settings,
                queue: VecDeque::new(),
                overflow: false,
                last_value: None,
            }),
        }
    }

    /// An event item with default settings, as created for server-wide subscriptions.
    pub fn event_item(id: MonitoredItemId, node_id: NodeId, queue_size: usize) -> Self {
        Self::new(
            id,
            node_id,
            AttributeId::EventNotifier,
            id,
            ItemSettings {
                mode: MonitoringMode::Reporting,
                sampling_interval: 0.0,
                queue_size: queue_size.max(1),
                discard_oldest: true,
                filter: ItemFilter::Event,
            },
        )
    }

    pub fn id(&self) -> MonitoredItemId {
        self.id
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn attribute_id(&self) -> AttributeId {
        self.attribute_id
    }

    pub fn client_handle(&self) -> u32 {
        self.client_handle
    }

    pub fn is_event_item(&self) -> bool {
        self.attribute_id == AttributeId::EventNotifier
    }

    pub fn mode(&self) -> MonitoringMode {
        self.state.lock().settings.mode
    }

    /// Applies revised settings. The queue is trimmed if it shrank.
    pub fn modify(&self, settings: ItemSettings) {
        let mut state = self.state.lock();
        state.settings = settings;
        let limit = state.settings.queue_size;
        while state.queue.len() > limit {
            if state.settings.discard_oldest {
                state.queue.pop_front();
            } else {
                state.queue.pop_back();
            }
            state.overflow = true;
        }
    }

    /// Changes the monitoring mode and returns the previous one.
    pub fn set_mode(&self, mode: MonitoringMode) -> MonitoringMode {
        let mut state = self.state.lock();
        let previous = state.settings.mode;
        state.settings.mode = mode;
        if mode == MonitoringMode::Disabled {
            state.queue.clear();
            state.last_value = None;
        }
        previous
    }

    /// Queues a data value unless the mode or the filter suppresses it.
    pub fn enqueue_data(&self, value: &DataValue, ignore_filter: bool) -> bool {
        let mut state = self.state.lock();
        if state.settings.mode == MonitoringMode::Disabled {
            return false;
        }
        if !ignore_filter && !passes_filter(&state.settings.filter, state.last_value.as_ref(), value)
        {
            return false;
        }
        state.last_value = Some(value.clone());
        push(&mut state, Notification::Data(value.clone()));
        true
    }

    pub fn enqueue_event(&self, event: &EventNotification) -> bool {
        let mut state = self.state.lock();
        if state.settings.mode == MonitoringMode::Disabled {
            return false;
        }
        push(&mut state, Notification::Event(event.clone()));
        true
    }

    /// Drains the queue. Items in `Sampling` mode keep their entries.
    pub fn take_notifications(&self) -> Vec<Notification> {
        let mut state = self.state.lock();
        if state.settings.mode != MonitoringMode::Reporting {
            return Vec::new();
        }
        state.overflow = false;
        state.queue.drain(..).collect()
    }

    /// True if an entry was dropped since the queue was last drained.
    pub fn overflowed(&self) -> bool {
        self.state.lock().overflow
    }
}

fn push(state: &mut ItemState, notification: Notification) {
    if state.queue.len() < state.settings.queue_size {
        state.queue.push_back(notification);
        return;
    }
    state.overflow = true;
    if state.settings.discard_oldest {
        state.queue.pop_front();
        state.queue.push_back(notification);
    } else if let Some(newest) = state.queue.back_mut() {
        *newest = notification;
    }
}

fn passes_filter(filter: &ItemFilter, last: Option<&DataValue>, value: &DataValue) -> bool {
    let Some(last) = last else {
        return true;
    };
    if last.status != value.status {
        return true;
    }
    match (filter, last.value.as_f64(), value.value.as_f64()) {
        (ItemFilter::Deadband(deadband), Some(old), Some(new)) => (new - old).abs() > *deadband,
        _ => last.value != value.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::Variant;
    use crate::types::StatusCode;

    fn item(queue_size: usize, discard_oldest: bool, filter: ItemFilter) -> MonitoredItem {
        MonitoredItem::new(
            1,
            NodeId::string(2, "SlowUInt1"),
            AttributeId::Value,
            10,
            ItemSettings {
                mode: MonitoringMode::Reporting,
                sampling_interval: 100.0,
                queue_size,
                discard_oldest,
                filter,
            },
        )
    }

    fn values(notifications: Vec<Notification>) -> Vec<Variant> {
        notifications
            .into_iter()
            .filter_map(|n| match n {
                Notification::Data(dv) => Some(dv.value),
                Notification::Event(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_discard_oldest() {
        let item = item(2, true, ItemFilter::None);
        for v in 1u32..=3 {
            item.enqueue_data(&DataValue::new_now(v), false);
        }
        assert!(item.overflowed());
        assert_eq!(
            values(item.take_notifications()),
            vec![Variant::UInt32(2), Variant::UInt32(3)]
        );
        assert!(!item.overflowed());
    }

    #[test]
    fn test_discard_newest_overwrites_tail() {
        let item = item(2, false, ItemFilter::None);
        for v in 1u32..=3 {
            item.enqueue_data(&DataValue::new_now(v), false);
        }
        assert_eq!(
            values(item.take_notifications()),
            vec![Variant::UInt32(1), Variant::UInt32(3)]
        );
    }

    #[test]
    fn test_deadband_suppresses_small_changes() {
        let item = item(10, true, ItemFilter::Deadband(5.0));
        for v in [10.0, 12.0, 16.0, 16.5] {
            item.enqueue_data(&DataValue::new_now(v), false);
        }
        assert_eq!(
            values(item.take_notifications()),
            vec![Variant::Double(10.0), Variant::Double(16.0)]
        );

        // A status change always passes.
        let mut bad = DataValue::new_now(16.1);
        bad.status = StatusCode::UNCERTAIN_LAST_USABLE_VALUE;
        assert!(item.enqueue_data(&bad, false));
    }

    #[test]
    fn test_unchanged_value_not_reported() {
        let item = item(10, true, ItemFilter::None);
        assert!(item.enqueue_data(&DataValue::new_now(true), false));
        assert!(!item.enqueue_data(&DataValue::new_now(true), false));
        assert!(item.enqueue_data(&DataValue::new_now(true), true));
    }

    #[test]
    fn test_sampling_mode_holds_notifications() {
        let item = item(10, true, ItemFilter::None);
        item.set_mode(MonitoringMode::Sampling);
        item.enqueue_data(&DataValue::new_now(1u32), false);
        assert!(item.take_notifications().is_empty());
        item.set_mode(MonitoringMode::Reporting);
        assert_eq!(item.take_notifications().len(), 1);

        item.set_mode(MonitoringMode::Disabled);
        assert!(!item.enqueue_data(&DataValue::new_now(2u32), false));
    }
}
