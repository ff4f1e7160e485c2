//! State contract consumed by the integrators
//!
//! A system owns its state vector. Solvers read and write it only through
//! this trait and never keep a diverging copy.

/// A physical system described by a first-order ODE `x' = f(x)`
pub trait StateSystem {
    /// Current state vector (fixed length for the life of the system)
    fn state(&self) -> &[f64];

    /// Mutable view of the state vector
    fn state_mut(&mut self) -> &mut [f64];

    /// Derivative evaluation.
    ///
    /// Fills every entry of `rates` from `input` alone, never from the stored
    /// state, so solvers can evaluate at intermediate points. `rates` has the
    /// same length as `input`. Degenerate inputs may yield NaN or infinity.
    fn evaluate(&self, input: &[f64], rates: &mut [f64]);

    /// Which state components a solver may overwrite this step.
    ///
    /// Re-read on every step; a component is typically switched off while
    /// something external (a drag) drives it.
    fn integrable(&self) -> &[bool];
}
