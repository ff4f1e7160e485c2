//! rk-collide - Runge-Kutta integration with collision-aware stepping
//!
//! Core modules:
//! - `sim`: State contract, fixed-step solvers and the collision stepper
//! - `models`: Reference physical systems (oscillator, bouncing ball, ball box)
//! - `settings`: Stepper tuning, loadable from JSON
//! - `error`: Error type shared by the above

pub mod error;
pub mod models;
pub mod settings;
pub mod sim;

pub use error::{Result, SimError};
pub use settings::{SolverKind, StepperConfig};

/// Default tuning constants
pub mod consts {
    /// Step size at or below which a detected collision is resolved in place.
    /// Kept tiny: a coarse value hands stale post-step collision data to the
    /// resolver for multi-body contacts.
    pub const DEFAULT_TOLERANCE: f64 = 1e-4;
    /// Consecutive in-place resolutions without progress before giving up
    pub const DEFAULT_STALL_LIMIT: u32 = 10;
    /// Maximum sub-step attempts per advance to prevent spiral of death
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 100_000;
    /// Rebound speed under which the reference models settle a contact
    pub const REST_SPEED: f64 = 1e-2;

    /// Fixed frame timestep used by the demo driver (60 Hz)
    pub const FRAME_DT: f64 = 1.0 / 60.0;
    /// Maximum driver advances per update
    pub const MAX_SUBSTEPS: u32 = 8;
}

/// True when every value is neither NaN nor infinite
#[inline]
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}
