// crates/plcsim-rs/src/simulation/telemetry.rs
//! Phase-driven generators for the telemetry nodes: a sine wave with a
//! periodic outlier (spike or dip) and flat-then-ramping trends.

use rand::Rng;
use std::f64::consts::PI;

pub const SIMULATION_MAX_AMPLITUDE: f64 = 100.0;
pub const TREND_BASE_VALUE: f64 = 100.0;
/// Trends start ramping after a random number of cycles below this bound.
pub const TREND_ANOMALY_PHASES: u32 = 10;

/// Sine wave with one amplified outlier per cycle at a random position.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierGenerator {
    cycle_count: u32,
    cycle_in_phase: u32,
    anomaly_cycle: u32,
    outlier: f64,
}

impl OutlierGenerator {
    /// Positive outliers.
    pub fn spike<R: Rng + ?Sized>(rng: &mut R, cycle_count: u32) -> Self {
        Self::new(rng, cycle_count, SIMULATION_MAX_AMPLITUDE * 10.0)
    }

    /// Negative outliers.
    pub fn dip<R: Rng + ?Sized>(rng: &mut R, cycle_count: u32) -> Self {
        Self::new(rng, cycle_count, -SIMULATION_MAX_AMPLITUDE * 10.0)
    }

    fn new<R: Rng + ?Sized>(rng: &mut R, cycle_count: u32, outlier: f64) -> Self {
        let cycle_count = cycle_count.max(1);
        Self {
            cycle_count,
            cycle_in_phase: cycle_count,
            anomaly_cycle: rng.random_range(0..cycle_count),
            outlier,
        }
    }

    pub fn anomaly_cycle(&self) -> u32 {
        self.anomaly_cycle
    }

    pub fn next_value<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let mut value = SIMULATION_MAX_AMPLITUDE
            * (2.0 * PI * f64::from(self.cycle_in_phase) / f64::from(self.cycle_count)).sin();
        self.cycle_in_phase -= 1;
        if self.cycle_in_phase == 0 {
            self.cycle_in_phase = self.cycle_count;
            self.anomaly_cycle = rng.random_range(0..self.cycle_count);
        }
        if self.cycle_in_phase == self.anomaly_cycle {
            value = self.outlier;
        }
        value
    }
}

/// Holds `TREND_BASE_VALUE` until a random phase, then ramps by a tenth per
/// completed cycle in its direction.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendGenerator {
    cycle_count: u32,
    cycle_in_phase: u32,
    phase: u32,
    anomaly_phase: u32,
    direction: f64,
}

impl TrendGenerator {
    pub fn positive<R: Rng + ?Sized>(rng: &mut R, cycle_count: u32) -> Self {
        Self::new(rng, cycle_count, 1.0)
    }

    pub fn negative<R: Rng + ?Sized>(rng: &mut R, cycle_count: u32) -> Self {
        Self::new(rng, cycle_count, -1.0)
    }

    fn new<R: Rng + ?Sized>(rng: &mut R, cycle_count: u32, direction: f64) -> Self {
        let mut trend = Self {
            cycle_count: cycle_count.max(1),
            cycle_in_phase: 0,
            phase: 0,
            anomaly_phase: 0,
            direction,
        };
        trend.reset(rng);
        trend
    }

    /// Restarts the flat section with a fresh random anomaly phase.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cycle_in_phase = self.cycle_count;
        self.phase = 0;
        self.anomaly_phase = rng.random_range(0..TREND_ANOMALY_PHASES);
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn anomaly_phase(&self) -> u32 {
        self.anomaly_phase
    }

    pub fn next_value(&mut self) -> f64 {
        self.cycle_in_phase -= 1;
        if self.cycle_in_phase == 0 {
            self.cycle_in_phase = self.cycle_count;
            self.phase += 1;
        }
        if self.phase >= self.anomaly_phase {
            // One whole unit every ten phases.
            TREND_BASE_VALUE + self.direction * f64::from((self.phase - self.anomaly_phase) / 10)
        } else {
            TREND_BASE_VALUE
        }
    }
}
