// crates/plcsim-rs/src/lib.rs
//! Core of the PLC simulator: an in-memory address space of areas, sources,
//! variables and alarm conditions, the event notifier graph that forwards
//! alarm traffic to observers, and the timer-driven engine that keeps the
//! values moving.

// --- Foundation Modules ---
pub mod error;
pub mod log;
pub mod types;
pub mod config;

// --- Address Space ---
pub mod address_space;
pub mod events;
pub mod monitoring;

// --- Simulation Engine ---
pub mod simulation;

// --- Node Managers ---
pub mod manager;
pub mod host;

// --- Top-level Exports ---
pub use address_space::{AddressSpace, DataValue, Node, NodeGraph, NodeKey, Variant};
pub use config::{AreaConfig, NodeGroupConfig, NodeType, ServerLimits, SimulationConfig};
pub use error::PlcError;
pub use host::ServerHost;
pub use manager::alarm::AlarmNodeManager;
pub use manager::plc::PlcNodeManager;
pub use manager::{AttributeReadWriter, NodeManager, Resolver, SubscriptionSink};
pub use types::{AttributeId, Identifier, NodeClass, NodeId, StatusCode};
