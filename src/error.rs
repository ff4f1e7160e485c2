//! Error types for the integrator and stepper

use thiserror::Error;

/// Errors raised by the integrators, the stepper and config loading
///
/// Numerical blow-up is not an error: NaN and infinity flow into the state
/// vector for the caller to inspect.
#[derive(Debug, Error)]
pub enum SimError {
    /// Integrability mask does not match the state vector
    #[error("mask length {mask} does not match state length {state}")]
    MaskLength {
        state: usize,
        mask: usize,
    },

    /// State vector changed length while a step was in flight
    #[error("state length changed from {expected} to {found}")]
    StateLength {
        /// Length at snapshot time
        expected: usize,
        /// Length at rollback
        found: usize,
    },

    /// Non-positive or non-finite time step
    #[error("invalid time step: {0}")]
    InvalidTimeStep(f64),

    /// Stepper configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read or written
    #[error("config i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Config JSON could not be parsed or produced
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Broken system contract (mask or state length)
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::MaskLength { .. } | Self::StateLength { .. })
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SimError>;
