// crates/plcsim-rs/src/simulation/variable.rs

use crate::PlcError;
use crate::address_space::{AddressSpace, DataValue, NodeKey, Variant};

/// A variable node whose value is produced by a generator on every tick of
/// its own timer, and which can be paused and reset.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedVariable<T> {
    key: NodeKey,
    value: T,
    initial: T,
    running: bool,
}

impl<T> SimulatedVariable<T>
where
    T: Clone + Into<Variant>,
{
    pub fn new(key: NodeKey, initial: T) -> Self {
        Self {
            key,
            value: initial.clone(),
            initial,
            running: true,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Computes the next value and publishes it. Paused variables keep their value.
    pub fn update(
        &mut self,
        space: &mut AddressSpace,
        next: impl FnOnce(&T) -> T,
    ) -> Result<(), PlcError> {
        if !self.running {
            return Ok(());
        }
        self.value = next(&self.value);
        self.publish(space)
    }

    /// Restores the initial value and publishes it.
    pub fn reset(&mut self, space: &mut AddressSpace) -> Result<(), PlcError> {
        self.value = self.initial.clone();
        self.publish(space)
    }

    fn publish(&self, space: &mut AddressSpace) -> Result<(), PlcError> {
        space.set_value(self.key, DataValue::new_now(self.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::Node;
    use crate::config::ServerLimits;
    use crate::types::NodeId;

    #[test]
    fn test_update_publishes_unless_stopped() {
        let mut space = AddressSpace::new(2, ServerLimits::default());
        let key = space
            .graph
            .insert_root(Node::variable(NodeId::string(2, "StepUp"), "StepUp", 0u32, false))
            .unwrap();
        let mut step_up = SimulatedVariable::new(key, 0u32);
        step_up.update(&mut space, |v| v + 1).unwrap();
        step_up.update(&mut space, |v| v + 1).unwrap();
        assert_eq!(space.value(key).unwrap().value, Variant::UInt32(2));

        step_up.stop();
        step_up.update(&mut space, |v| v + 1).unwrap();
        assert_eq!(*step_up.value(), 2);

        step_up.reset(&mut space).unwrap();
        assert_eq!(space.value(key).unwrap().value, Variant::UInt32(0));
    }
}
