//! Stepper settings
//!
//! Tunables for the collision stepper and the choice of fixed-step solver.
//! Persisted as JSON so separate simulations can run with their own tuning.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Result, SimError};
use crate::sim::solver::{Euler, Integrator, ModifiedEuler, RungeKutta4};

/// Fixed-step solver choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SolverKind {
    Euler,
    ModifiedEuler,
    #[default]
    RungeKutta4,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Euler => "Euler",
            SolverKind::ModifiedEuler => "ModifiedEuler",
            SolverKind::RungeKutta4 => "RungeKutta4",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "euler" => Some(SolverKind::Euler),
            "modifiedeuler" | "modified-euler" | "heun" => Some(SolverKind::ModifiedEuler),
            "rungekutta4" | "runge-kutta" | "rk4" => Some(SolverKind::RungeKutta4),
            _ => None,
        }
    }

    /// Global order of accuracy
    pub fn order(&self) -> u32 {
        match self {
            SolverKind::Euler => 1,
            SolverKind::ModifiedEuler => 2,
            SolverKind::RungeKutta4 => 4,
        }
    }

    /// Create a fresh solver with empty scratch buffers
    pub fn build(&self) -> Box<dyn Integrator> {
        match self {
            SolverKind::Euler => Box::new(Euler::new()),
            SolverKind::ModifiedEuler => Box::new(ModifiedEuler::new()),
            SolverKind::RungeKutta4 => Box::new(RungeKutta4::new()),
        }
    }
}

/// Collision stepper tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepperConfig {
    /// Trial step at or below which a collision is resolved instead of bisected
    pub tolerance: f64,
    /// Consecutive resolutions without an accepted step before stalling
    pub stall_limit: u32,
    /// Sub-step attempts allowed per advance
    pub max_attempts: u32,
    /// Fixed-step solver
    pub solver: SolverKind,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            stall_limit: DEFAULT_STALL_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            solver: SolverKind::default(),
        }
    }
}

impl StepperConfig {
    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_stall_limit(mut self, stall_limit: u32) -> Self {
        self.stall_limit = stall_limit;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Reject tunings the stepper cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SimError::invalid_config(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        if self.stall_limit == 0 {
            return Err(SimError::invalid_config("stall_limit must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(SimError::invalid_config("max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Parse and validate; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded stepper config from {}", path.display());
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        log::info!("Stepper config saved to {}", path.display());
        Ok(())
    }
}
