// crates/plcsim-rs/src/simulation/timer.rs

use crate::PlcError;
use crate::log::{LogContext, sim_error, sim_trace, sim_warn};
use crossbeam_channel::{Sender, bounded, select, tick};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback run on every tick of a timer.
pub type TickFn = Box<dyn FnMut() -> Result<(), PlcError> + Send>;

pub(crate) type SharedTick = Arc<Mutex<TickFn>>;

/// Runs one tick, containing errors and panics so the timer keeps firing.
/// Returns true if the tick completed without error.
pub(crate) fn run_tick(name: &str, tick: &SharedTick, ctx: &LogContext) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut callback = tick.lock();
        (*callback)()
    }));
    match outcome {
        Ok(Ok(())) => {
            sim_trace!(ctx, "Timer '{}' ticked", name);
            true
        }
        Ok(Err(e)) => {
            sim_error!(ctx, "Timer '{}' tick failed: {}", name, e);
            false
        }
        Err(_) => {
            sim_error!(ctx, "Timer '{}' tick panicked", name);
            false
        }
    }
}

/// A periodic task running on its own thread.
///
/// Clearing the enabled flag stops the timer before its next tick; a tick
/// already running completes.
pub struct PeriodicTimer {
    name: String,
    enabled: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    ctx: LogContext,
}

impl PeriodicTimer {
    pub fn spawn(
        name: &str,
        period: Duration,
        callback: SharedTick,
        ctx: LogContext,
    ) -> Result<Self, PlcError> {
        let enabled = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticker = tick(period);
        let flag = Arc::clone(&enabled);
        let thread_name = name.to_owned();
        let handle = thread::Builder::new()
            .name(format!("sim-{name}"))
            .spawn(move || {
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if !flag.load(Ordering::Acquire) {
                                break;
                            }
                            run_tick(&thread_name, &callback, &ctx);
                        }
                    }
                }
            })
            .map_err(|e| PlcError::TimerSpawn(e.to_string()))?;
        Ok(Self {
            name: name.to_owned(),
            enabled,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            ctx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prevents any further tick without waiting for the thread.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Disables the timer and joins its thread. Safe to call twice.
    pub fn stop(&mut self) {
        self.disable();
        // Dropping the sender wakes the thread.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                sim_warn!(self.ctx, "Timer '{}' thread ended abnormally", self.name);
            }
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const CTX: LogContext = LogContext::new("test", "timer", 0);

    fn shared(callback: impl FnMut() -> Result<(), PlcError> + Send + 'static) -> SharedTick {
        Arc::new(Mutex::new(Box::new(callback)))
    }

    #[test]
    fn test_run_tick_contains_failures() {
        let failing = shared(|| Err(PlcError::NotSupported));
        assert!(!run_tick("failing", &failing, &CTX));
        let panicking = shared(|| panic!("generator fault"));
        assert!(!run_tick("panicking", &panicking, &CTX));
        // The callback is still usable after a panic.
        assert!(!run_tick("panicking", &panicking, &CTX));
    }

    #[test]
    fn test_timer_fires_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut timer = PeriodicTimer::spawn(
            "counter",
            Duration::from_millis(5),
            shared(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            CTX,
        )
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        timer.stop();
        timer.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_failing_tick_keeps_timer_alive() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut timer = PeriodicTimer::spawn(
            "flaky",
            Duration::from_millis(5),
            shared(move || {
                if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    panic!("every other tick fails");
                }
                Ok(())
            }),
            CTX,
        )
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        timer.stop();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }
}
