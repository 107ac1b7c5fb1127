// crates/plcsim-rs/src/simulation/mod.rs
//! Value generators and the timer machinery that drives them.

pub mod alarms;
pub mod generators;
pub mod plc;
pub mod scheduler;
pub mod telemetry;
pub mod timer;
pub mod variable;

pub use alarms::{AlarmSimulation, DeterministicAlarmDriver};
pub use generators::{BAD_STATUS_SEQUENCE, GeneratorState};
pub use plc::{ControlSetting, NodeGroup, PlcSimulation};
pub use scheduler::SimulationScheduler;
pub use variable::SimulatedVariable;

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Random generator for one consumer. Seeded runs derive a distinct but
/// reproducible stream per `stream`.
pub fn make_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_os_rng(),
    }
}
