// crates/plcsim-rs/src/simulation/scheduler.rs

use super::timer::{PeriodicTimer, SharedTick, TickFn, run_tick};
use crate::PlcError;
use crate::log::{LogContext, sim_debug, sim_info, sim_warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct Task {
    name: String,
    period: Duration,
    callback: SharedTick,
}

/// Owns the periodic simulation tasks of one node manager.
///
/// Tasks are registered while the address space is built and run on their
/// own timer threads once `start` is called. Each callback takes the
/// manager lock itself.
pub struct SimulationScheduler {
    ctx: LogContext,
    tasks: Vec<Task>,
    timers: Vec<PeriodicTimer>,
}

impl SimulationScheduler {
    pub fn new(ctx: LogContext) -> Self {
        Self {
            ctx: ctx.with_component("scheduler"),
            tasks: Vec::new(),
            timers: Vec::new(),
        }
    }

    /// Registers a task. A zero period registers it without a timer, so it
    /// only runs through `fire`.
    pub fn add_task(
        &mut self,
        name: &str,
        period: Duration,
        callback: impl FnMut() -> Result<(), PlcError> + Send + 'static,
    ) {
        let callback: TickFn = Box::new(callback);
        self.tasks.push(Task {
            name: name.to_owned(),
            period,
            callback: Arc::new(Mutex::new(callback)),
        });
    }

    /// Starts a timer per task. Idempotent while running.
    pub fn start(&mut self) -> Result<(), PlcError> {
        if self.is_running() {
            return Ok(());
        }
        let mut failure = None;
        for task in self.tasks.iter().filter(|t| !t.period.is_zero()) {
            match PeriodicTimer::spawn(
                &task.name,
                task.period,
                Arc::clone(&task.callback),
                self.ctx.with_component("timer"),
            ) {
                Ok(timer) => self.timers.push(timer),
                Err(e) => {
                    sim_warn!(self.ctx, "Could not start timer '{}': {}", task.name, e);
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            self.stop();
            return Err(e);
        }
        sim_info!(self.ctx, "Started {} simulation timers", self.timers.len());
        Ok(())
    }

    /// Runs one tick of the named task on the calling thread.
    pub fn fire(&self, name: &str) -> Result<bool, PlcError> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| PlcError::InvalidConfiguration(format!("no task named '{name}'")))?;
        Ok(run_tick(&task.name, &task.callback, &self.ctx))
    }

    /// Disables every timer, then waits for the threads. Idempotent.
    pub fn stop(&mut self) {
        if self.timers.is_empty() {
            return;
        }
        for timer in &self.timers {
            timer.disable();
        }
        for mut timer in self.timers.drain(..) {
            timer.stop();
        }
        sim_debug!(self.ctx, "Simulation timers stopped");
    }

    /// Stops the timers and forgets every task.
    pub fn clear(&mut self) {
        self.stop();
        self.tasks.clear();
    }

    pub fn is_running(&self) -> bool {
        !self.timers.is_empty()
    }
}

impl Drop for SimulationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
