//! Fixed timestep driver
//!
//! Turns variable wall-clock frame times into whole `sim_dt` advances, the
//! way a render loop feeds a simulation. Calls are fully serialized: the
//! driver owns both the system and the stepper.

use super::collision::CollisionSystem;
use super::stepper::{AdvanceReport, CollisionStepper};
use crate::consts::{FRAME_DT, MAX_SUBSTEPS};
use crate::error::{Result, SimError};
use crate::settings::StepperConfig;

/// Longest frame time accepted per update (seconds)
pub const MAX_FRAME_TIME: f64 = 0.1;

#[derive(Debug)]
pub struct Simulation<S: CollisionSystem> {
    system: S,
    stepper: CollisionStepper,
    sim_dt: f64,
    max_substeps: u32,
    accumulator: f64,
    /// Completed advances
    ticks: u64,
    /// Advances that stopped short (stall or attempt limit)
    short_ticks: u64,
}

impl<S: CollisionSystem> Simulation<S> {
    pub fn new(system: S, config: StepperConfig) -> Result<Self> {
        Ok(Self {
            system,
            stepper: CollisionStepper::new(config)?,
            sim_dt: FRAME_DT,
            max_substeps: MAX_SUBSTEPS,
            accumulator: 0.0,
            ticks: 0,
            short_ticks: 0,
        })
    }

    /// Override the fixed step and the per-update cap
    pub fn with_timestep(mut self, sim_dt: f64, max_substeps: u32) -> Result<Self> {
        if !sim_dt.is_finite() || sim_dt <= 0.0 {
            return Err(SimError::InvalidTimeStep(sim_dt));
        }
        if max_substeps == 0 {
            return Err(SimError::invalid_config("max_substeps must be at least 1"));
        }
        self.sim_dt = sim_dt;
        self.max_substeps = max_substeps;
        Ok(self)
    }

    /// Feed elapsed wall time; returns how many advances ran
    pub fn update(&mut self, elapsed: f64) -> Result<u32> {
        self.accumulator += elapsed.clamp(0.0, MAX_FRAME_TIME);

        let mut substeps = 0;
        while self.accumulator >= self.sim_dt && substeps < self.max_substeps {
            self.tick()?;
            self.accumulator -= self.sim_dt;
            substeps += 1;
        }
        Ok(substeps)
    }

    /// Run exactly one `sim_dt` advance
    pub fn tick(&mut self) -> Result<AdvanceReport> {
        let report = self.stepper.advance(&mut self.system, self.sim_dt)?;
        self.ticks += 1;
        if !report.is_complete() {
            self.short_ticks += 1;
        }
        Ok(report)
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    /// Direct access for interactive edits (drags go through the mask)
    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }

    pub fn stepper(&self) -> &CollisionStepper {
        &self.stepper
    }

    pub fn time(&self) -> f64 {
        self.stepper.time()
    }

    pub fn sim_dt(&self) -> f64 {
        self.sim_dt
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn short_ticks(&self) -> u64 {
        self.short_ticks
    }
}
