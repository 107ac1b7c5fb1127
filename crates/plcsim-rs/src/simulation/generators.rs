// crates/plcsim-rs/src/simulation/generators.rs
//! Next-value functions for the slow/fast load nodes and the per-group state
//! that drives them.

use crate::PlcError;
use crate::address_space::Variant;
use crate::config::{NodeGroupConfig, NodeType};
use crate::types::StatusCode;
use rand::Rng;

/// Length of the buffer held by `UIntArray` nodes.
pub const UINT_ARRAY_LEN: usize = 32;

/// Quality pattern applied to "bad" nodes, one entry per tick. The flag
/// tells whether a new value is still written along with the status.
pub const BAD_STATUS_SEQUENCE: [(StatusCode, bool); 10] = [
    (StatusCode::GOOD, true),
    (StatusCode::GOOD, true),
    (StatusCode::GOOD, true),
    (StatusCode::UNCERTAIN_LAST_USABLE_VALUE, true),
    (StatusCode::GOOD, true),
    (StatusCode::GOOD, true),
    (StatusCode::GOOD, true),
    (StatusCode::UNCERTAIN_LAST_USABLE_VALUE, true),
    (StatusCode::BAD_DATA_LOST, true),
    (StatusCode::BAD_NO_COMMUNICATION, false),
];

/// Ramp for unsigned nodes. Wraps to `min` instead of passing `max`.
pub fn next_uint_ramp(current: u32, min: u32, max: u32, step: u32) -> u32 {
    let wrapped = current.checked_rem(max).unwrap_or(0);
    if wrapped < min || u64::from(wrapped) + u64::from(step) > u64::from(max) {
        min
    } else {
        wrapped + step
    }
}

/// Uniform draw over `[min, max]` that never repeats `current` when the range
/// holds more than one value.
pub fn next_uint_random<R: Rng + ?Sized>(rng: &mut R, current: u32, min: u32, max: u32) -> u32 {
    if max <= min {
        return min;
    }
    loop {
        let value = rng.random_range(min..=max);
        if value != current {
            return value;
        }
    }
}

/// Ramp for double nodes. Non-negative ranges count up from `min`,
/// non-positive ranges count down from `max`. Ranges spanning zero have no
/// ramp direction.
pub fn next_double_ramp(current: f64, min: f64, max: f64, step: f64) -> Result<f64, PlcError> {
    if min >= 0.0 && max > 0.0 {
        let wrapped = current % max;
        Ok(if wrapped < min || wrapped + step > max {
            min
        } else {
            wrapped + step
        })
    } else if max <= 0.0 && min < 0.0 {
        let wrapped = current % min;
        Ok(if wrapped > max || wrapped - step < min {
            max
        } else {
            wrapped - step
        })
    } else {
        Err(PlcError::RangeError { min, max })
    }
}

/// Uniform draw over `[min, max]`, rejecting repeats. Ranges spanning zero
/// pick the negative or positive half with a fair coin first.
pub fn next_double_random<R: Rng + ?Sized>(rng: &mut R, current: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return min;
    }
    loop {
        let value = if min < 0.0 && max > 0.0 {
            if rng.random_bool(0.5) {
                rng.random_range(min..0.0)
            } else {
                rng.random_range(0.0..=max)
            }
        } else {
            rng.random_range(min..=max)
        };
        if value != current {
            return value;
        }
    }
}

pub fn next_bool(current: Option<bool>) -> bool {
    current.is_none_or(|v| !v)
}

/// Increments every element, allocating the buffer on first use.
pub fn next_uint_array(current: Option<&[u32]>) -> Vec<u32> {
    let mut buffer = match current {
        Some(values) if values.len() == UINT_ARRAY_LEN => values.to_vec(),
        _ => vec![0; UINT_ARRAY_LEN],
    };
    for value in &mut buffer {
        *value = value.wrapping_add(1);
    }
    buffer
}

/// Runtime state of one node group (slow, fast or very fast).
///
/// Lives under the manager lock. `remaining_updates` counts down once per
/// tick while positive; negative means unlimited and zero stops updates.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorState {
    pub name: String,
    pub node_type: NodeType,
    randomize: bool,
    step_size: f64,
    pub min: f64,
    pub max: f64,
    remaining_updates: i64,
    updates_enabled: bool,
    bad_status_cursor: usize,
}

impl GeneratorState {
    pub fn from_config(config: &NodeGroupConfig) -> Self {
        Self {
            name: config.name.clone(),
            node_type: config.node_type,
            randomize: config.randomize,
            step_size: config.step_size,
            min: config.min,
            max: config.max,
            remaining_updates: -1,
            updates_enabled: true,
            bad_status_cursor: 0,
        }
    }

    pub fn randomize(&self) -> bool {
        self.randomize
    }

    /// Switches between ramp and random generation, rejecting settings the
    /// range cannot support.
    pub fn set_randomize(&mut self, randomize: bool) -> Result<(), PlcError> {
        let mut candidate = self.to_config();
        candidate.randomize = randomize;
        candidate.validate()?;
        self.randomize = randomize;
        Ok(())
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Unsigned groups only take whole steps.
    pub fn set_step_size(&mut self, step_size: f64) -> Result<(), PlcError> {
        if !step_size.is_finite() || step_size < 0.0 {
            return Err(PlcError::OutOfRange);
        }
        if self.node_type == NodeType::UInt
            && (step_size.fract() != 0.0 || step_size > f64::from(u32::MAX))
        {
            return Err(PlcError::OutOfRange);
        }
        self.step_size = step_size;
        Ok(())
    }

    pub fn remaining_updates(&self) -> i64 {
        self.remaining_updates
    }

    pub fn set_remaining_updates(&mut self, remaining: i64) {
        self.remaining_updates = remaining;
    }

    pub fn updates_enabled(&self) -> bool {
        self.updates_enabled
    }

    pub fn set_updates_enabled(&mut self, enabled: bool) {
        self.updates_enabled = enabled;
    }

    pub fn bad_status_cursor(&self) -> usize {
        self.bad_status_cursor
    }

    fn to_config(&self) -> NodeGroupConfig {
        NodeGroupConfig {
            name: self.name.clone(),
            count: 0,
            node_type: self.node_type,
            randomize: self.randomize,
            step_size: self.step_size,
            min: self.min,
            max: self.max,
            rate: std::time::Duration::from_secs(1),
            bad_nodes: 0,
        }
    }

    /// Consumes one tick of the update budget. False means the tick must do nothing.
    pub fn begin_tick(&mut self) -> bool {
        if !self.updates_enabled || self.remaining_updates == 0 {
            return false;
        }
        if self.remaining_updates > 0 {
            self.remaining_updates -= 1;
        }
        true
    }

    /// Returns the next entry of `BAD_STATUS_SEQUENCE` and advances the cursor.
    pub fn next_bad_status(&mut self) -> (StatusCode, bool) {
        let entry = BAD_STATUS_SEQUENCE[self.bad_status_cursor];
        self.bad_status_cursor = (self.bad_status_cursor + 1) % BAD_STATUS_SEQUENCE.len();
        entry
    }

    /// Value a node of this group starts with.
    pub fn initial_value(&self) -> Variant {
        match self.node_type {
            NodeType::UInt => Variant::UInt32(self.min as u32),
            NodeType::Double if self.max <= 0.0 && self.min < 0.0 => Variant::Double(self.max),
            NodeType::Double => Variant::Double(self.min),
            NodeType::Bool => Variant::Boolean(true),
            NodeType::UIntArray => Variant::UInt32Array(vec![0; UINT_ARRAY_LEN]),
        }
    }

    pub fn next_value<R: Rng + ?Sized>(&self, rng: &mut R, current: &Variant) -> Result<Variant, PlcError> {
        Ok(match self.node_type {
            NodeType::UInt => {
                let (min, max) = (self.min as u32, self.max as u32);
                let current = current.as_u32().unwrap_or(min);
                if self.randomize {
                    Variant::UInt32(next_uint_random(rng, current, min, max))
                } else {
                    Variant::UInt32(next_uint_ramp(current, min, max, self.step_size as u32))
                }
            }
            NodeType::Double => {
                let current = current.as_f64().unwrap_or(self.min);
                if self.randomize {
                    Variant::Double(next_double_random(rng, current, self.min, self.max))
                } else {
                    Variant::Double(next_double_ramp(current, self.min, self.max, self.step_size)?)
                }
            }
            NodeType::Bool => Variant::Boolean(next_bool(current.as_bool())),
            NodeType::UIntArray => {
                let current = match current {
                    Variant::UInt32Array(values) => Some(values.as_slice()),
                    _ => None,
                };
                Variant::UInt32Array(next_uint_array(current))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    #[test]
    fn test_uint_ramp_steps_and_wraps() {
        assert_eq!(next_uint_ramp(0, 0, 10, 3), 3);
        assert_eq!(next_uint_ramp(9, 0, 10, 3), 0);
        // Values below min snap to min.
        assert_eq!(next_uint_ramp(1, 5, 10, 1), 5);
        // max == 0 does not divide by zero.
        assert_eq!(next_uint_ramp(7, 0, 0, 1), 0);
        // No overflow near u32::MAX.
        assert_eq!(next_uint_ramp(u32::MAX - 1, 0, u32::MAX, 5), 0);
    }

    #[test]
    fn test_uint_ramp_wraps_within_one_period() {
        for (min, max, step) in [(0u32, 100u32, 7u32), (3, 20, 4), (10, 1000, 37), (0, u32::MAX, 1 << 20 | 1)] {
            let steps = (max - min).div_ceil(step);
            let mut value = min;
            for _ in 0..steps {
                value = next_uint_ramp(value, min, max, step);
                assert!(value <= max);
            }
            assert!(
                value < min + step,
                "range [{min}, {max}] step {step} ended at {value}"
            );
        }
    }

    #[test]
    fn test_double_ramp_shapes() {
        assert_eq!(next_double_ramp(0.0, 0.0, 10.0, 2.5), Ok(2.5));
        assert_eq!(next_double_ramp(9.0, 0.0, 10.0, 2.5), Ok(0.0));
        assert_eq!(next_double_ramp(-10.0, -10.0, -1.0, 4.0), Ok(-1.0));
        assert_eq!(next_double_ramp(-1.0, -10.0, -1.0, 4.0), Ok(-5.0));
        assert_eq!(next_double_ramp(-9.0, -10.0, -1.0, 4.0), Ok(-1.0));
        assert_eq!(
            next_double_ramp(0.0, -5.0, 5.0, 1.0),
            Err(PlcError::RangeError { min: -5.0, max: 5.0 })
        );
    }

    #[test]
    fn test_random_draws_never_repeat() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut last = 0u32;
        for _ in 0..1000 {
            let next = next_uint_random(&mut rng, last, 0, 1);
            assert_ne!(next, last);
            last = next;
        }
        let mut last = 0.0;
        for _ in 0..1000 {
            let next = next_double_random(&mut rng, last, -1.0, 1.0);
            assert_ne!(next, last);
            assert!((-1.0..=1.0).contains(&next));
            last = next;
        }
        let mut last = u32::MAX;
        for _ in 0..1000 {
            let next = next_uint_random(&mut rng, last, u32::MAX - 1, u32::MAX);
            assert_ne!(next, last);
            last = next;
        }
        let mut last = 2.0;
        for _ in 0..1000 {
            let next = next_double_random(&mut rng, last, 2.0, 3.0);
            assert_ne!(next, last);
            assert!((2.0..=3.0).contains(&next));
            last = next;
        }
    }

    #[test]
    fn test_uint_step_must_be_whole() {
        let config = NodeGroupConfig::new("Slow", 1, Duration::from_secs(1));
        let mut state = GeneratorState::from_config(&config);
        assert_eq!(state.set_step_size(0.5), Err(PlcError::OutOfRange));
        assert_eq!(state.step_size(), 1.0);
        assert_eq!(state.set_step_size(3.0), Ok(()));
        assert_eq!(
            state.next_value(&mut StdRng::seed_from_u64(1), &Variant::UInt32(3)),
            Ok(Variant::UInt32(6))
        );

        let mut config = config;
        config.node_type = NodeType::Double;
        let mut state = GeneratorState::from_config(&config);
        assert_eq!(state.set_step_size(0.5), Ok(()));
    }

    #[test]
    fn test_bool_and_array() {
        assert!(next_bool(None));
        assert!(!next_bool(Some(true)));
        let first = next_uint_array(None);
        assert_eq!(first, vec![1; UINT_ARRAY_LEN]);
        assert_eq!(next_uint_array(Some(first.as_slice())), vec![2; UINT_ARRAY_LEN]);
    }

    #[test]
    fn test_bad_status_cycle_repeats() {
        let config = NodeGroupConfig::new("Slow", 1, Duration::from_secs(1));
        let mut state = GeneratorState::from_config(&config);
        let first: Vec<_> = (0..10).map(|_| state.next_bad_status()).collect();
        assert_eq!(first, BAD_STATUS_SEQUENCE);
        let second: Vec<_> = (0..10).map(|_| state.next_bad_status()).collect();
        assert_eq!(first, second);
        assert_eq!(state.bad_status_cursor(), 0);
    }

    #[test]
    fn test_update_budget() {
        let config = NodeGroupConfig::new("Fast", 1, Duration::from_secs(1));
        let mut state = GeneratorState::from_config(&config);
        state.set_remaining_updates(2);
        assert!(state.begin_tick());
        assert!(state.begin_tick());
        assert!(!state.begin_tick());
        assert_eq!(state.remaining_updates(), 0);
        state.set_remaining_updates(-1);
        assert!(state.begin_tick());
        assert_eq!(state.remaining_updates(), -1);
        state.set_updates_enabled(false);
        assert!(!state.begin_tick());
    }

    #[test]
    fn test_set_randomize_validates_range() {
        let mut config = NodeGroupConfig::new("Slow", 1, Duration::from_secs(1));
        config.min = 5.0;
        config.max = 5.0;
        let mut state = GeneratorState::from_config(&config);
        assert_eq!(
            state.set_randomize(true),
            Err(PlcError::DegenerateRange {
                group: "Slow".into()
            })
        );
        assert!(!state.randomize());
    }
}
