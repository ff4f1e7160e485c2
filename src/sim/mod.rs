//! Integration and collision stepping
//!
//! Everything here is single threaded and deterministic:
//! - Fixed-step solvers with no hidden state beyond scratch buffers
//! - No clocks, no RNG
//! - A system is only mutated through `&mut` borrows held by the caller

pub mod collision;
pub mod driver;
pub mod solver;
pub mod stepper;
pub mod system;

pub use collision::{CollisionSystem, Detection};
pub use driver::Simulation;
pub use solver::{Euler, Integrator, ModifiedEuler, RungeKutta4};
pub use stepper::{AdvanceReport, CollisionStepper, StopReason};
pub use system::StateSystem;
