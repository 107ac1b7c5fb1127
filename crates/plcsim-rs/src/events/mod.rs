// crates/plcsim-rs/src/events/mod.rs
//! Event payloads, alarm condition state and the notifier graph that routes
//! events to observing ancestors.

pub mod condition;
pub mod notifier;

use crate::types::NodeId;
use condition::{AlarmKind, ConditionState};
use std::time::SystemTime;

pub use notifier::NotifierGraph;

/// Unique (per manager) identifier of a raised event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

/// Mints monotonically increasing event ids.
#[derive(Debug, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A simple event without condition state.
    Base,
    /// A state change (or refresh snapshot) of an alarm condition.
    Condition(AlarmKind),
    RefreshStart,
    RefreshEnd,
}

/// A single event delivered to event monitored items.
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    pub event_id: EventId,
    pub event_type: EventType,
    /// Node the event originates from (the source for condition events).
    pub source_node: NodeId,
    pub source_name: String,
    pub condition_name: Option<String>,
    pub time: SystemTime,
    pub message: String,
    pub severity: u16,
    pub state: Option<ConditionState>,
}

impl EventNotification {
    pub fn base(
        event_id: EventId,
        source_node: NodeId,
        source_name: &str,
        message: impl Into<String>,
        severity: u16,
    ) -> Self {
        Self {
            event_id,
            event_type: EventType::Base,
            source_node,
            source_name: source_name.to_owned(),
            condition_name: None,
            time: SystemTime::now(),
            message: message.into(),
            severity,
            state: None,
        }
    }

    /// A snapshot of a condition's current state.
    pub fn condition(
        event_id: EventId,
        source_node: NodeId,
        source_name: &str,
        state: &ConditionState,
    ) -> Self {
        Self {
            event_id,
            event_type: EventType::Condition(state.kind),
            source_node,
            source_name: source_name.to_owned(),
            condition_name: Some(state.kind.browse_name().to_owned()),
            time: SystemTime::now(),
            message: state.message.clone(),
            severity: state.severity,
            state: Some(state.clone()),
        }
    }

    /// The marker pair sent around a condition refresh.
    pub fn refresh_marker(event_id: EventId, start: bool) -> Self {
        Self {
            event_id,
            event_type: if start {
                EventType::RefreshStart
            } else {
                EventType::RefreshEnd
            },
            source_node: NodeId::server(),
            source_name: "Server".into(),
            condition_name: None,
            time: SystemTime::now(),
            message: String::new(),
            severity: 0,
            state: None,
        }
    }
}
