//! Collision-safe adaptive advance
//!
//! Covers a requested interval with fixed-step solver calls, treating every
//! detected collision as something to resolve before the step is trusted.
//!
//! Per attempt: snapshot the state, take a tentative step of size `h`, let
//! the model refresh derived geometry and look for collisions.
//! - Collision with `h > tolerance`: roll back, halve `h`, retry.
//! - Collision with `h <= tolerance`: roll back, resolve against the
//!   pre-collision state, then retry with `h` reset to the remaining time.
//! - No collision: accept. Above tolerance `h` is halved, so consecutive
//!   trial steps bisect toward the collision instant; at or below it `h` is held.
//!
//! Consecutive resolutions without an accepted step are capped by
//! `stall_limit`. Hitting the cap ends the advance early with partial
//! progress; it is not an error.

use serde::{Deserialize, Serialize};

use super::collision::CollisionSystem;
use super::solver::Integrator;
use crate::error::{Result, SimError};
use crate::settings::StepperConfig;

/// Why an advance stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopReason {
    /// The whole interval was covered
    #[default]
    Completed,
    /// Too many consecutive resolutions without progress
    Stalled,
    /// Ran out of sub-step attempts
    AttemptLimit,
}

/// Bookkeeping for one call to [`CollisionStepper::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvanceReport {
    /// Interval the caller asked for
    pub requested: f64,
    /// Interval actually covered by accepted steps
    pub advanced: f64,
    /// Tentative steps taken
    pub attempts: u32,
    /// Tentative steps rolled back because of a collision
    pub rejected: u32,
    /// Calls into the model's collision resolution
    pub resolutions: u32,
    pub stop: StopReason,
}

impl AdvanceReport {
    fn new(requested: f64) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    /// True when the full interval was covered
    pub fn is_complete(&self) -> bool {
        self.stop == StopReason::Completed
    }

    /// Requested time that was not covered
    pub fn shortfall(&self) -> f64 {
        (self.requested - self.advanced).max(0.0)
    }
}

/// Drives a [`CollisionSystem`] forward in time
pub struct CollisionStepper {
    config: StepperConfig,
    solver: Box<dyn Integrator>,
    /// Pre-step copy of the state for rollback
    snapshot: Vec<f64>,
    /// Simulation clock
    time: f64,
    last_report: AdvanceReport,
}

impl std::fmt::Debug for CollisionStepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionStepper")
            .field("config", &self.config)
            .field("solver", &self.solver.name())
            .field("time", &self.time)
            .field("last_report", &self.last_report)
            .finish()
    }
}

impl CollisionStepper {
    /// Create a stepper using the solver named in `config`
    pub fn new(config: StepperConfig) -> Result<Self> {
        let solver = config.solver.build();
        Self::with_solver(config, solver)
    }

    /// Create a stepper around a caller supplied solver (`config.solver` is ignored)
    pub fn with_solver(config: StepperConfig, solver: Box<dyn Integrator>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            solver,
            snapshot: Vec::new(),
            time: 0.0,
            last_report: AdvanceReport::default(),
        })
    }

    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    /// Total simulated time covered by accepted steps
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Zero the clock and forget the last report
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.last_report = AdvanceReport::default();
    }

    /// Time covered by the most recent advance
    pub fn last_time_advanced(&self) -> f64 {
        self.last_report.advanced
    }

    pub fn last_report(&self) -> &AdvanceReport {
        &self.last_report
    }

    /// Advance `system` by `time_step`, resolving collisions along the way.
    ///
    /// Returns early with `StopReason::Stalled` or `StopReason::AttemptLimit`
    /// when progress is impossible; check [`AdvanceReport::advanced`]. Errors
    /// are reserved for invalid arguments and broken system contracts. Time
    /// covered before an error stays on the clock and in [`Self::last_report`].
    pub fn advance<S: CollisionSystem>(
        &mut self,
        system: &mut S,
        time_step: f64,
    ) -> Result<AdvanceReport> {
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(SimError::InvalidTimeStep(time_step));
        }

        let mut report = AdvanceReport::new(time_step);
        let outcome = self.cover(system, &mut report);
        self.last_report = report;
        outcome.map(|()| report)
    }

    /// Retry loop behind `advance`, filling in `report` as it goes
    fn cover<S: CollisionSystem>(
        &mut self,
        system: &mut S,
        report: &mut AdvanceReport,
    ) -> Result<()> {
        let time_step = report.requested;
        let tolerance = self.config.tolerance;
        let mut h = time_step;
        let mut streak = 0u32;

        while report.advanced < time_step {
            if report.attempts >= self.config.max_attempts {
                log::warn!(
                    "Gave up after {} attempts at t={:.6}, covered {:.6} of {:.6}",
                    report.attempts,
                    self.time,
                    report.advanced,
                    time_step
                );
                report.stop = StopReason::AttemptLimit;
                break;
            }
            report.attempts += 1;

            // Never step past the end of the interval
            h = h.min(time_step - report.advanced);

            self.snapshot.clear();
            self.snapshot.extend_from_slice(system.state());

            self.solver.step(&mut *system, h)?;
            system.modify_objects();

            if let Some(collisions) = system.find_collisions().into_report() {
                report.rejected += 1;
                self.restore(system)?;
                system.modify_objects();

                if h <= tolerance {
                    streak += 1;
                    report.resolutions += 1;
                    log::debug!(
                        "Resolving {} collision(s) at t={:.6} (h={:e}, streak {})",
                        collisions.len(),
                        self.time,
                        h,
                        streak
                    );
                    system.handle_collisions(&collisions);
                    h = time_step - report.advanced;
                    if streak < self.config.stall_limit {
                        continue;
                    }
                    log::warn!(
                        "Stalled at t={:.6} after {} resolutions, covered {:.6} of {:.6}",
                        self.time,
                        streak,
                        report.advanced,
                        time_step
                    );
                    report.stop = StopReason::Stalled;
                    break;
                }
                log::trace!("Collision inside h={:e} at t={:.6}, bisecting", h, self.time);
            } else {
                streak = 0;
                report.advanced += h;
                self.time += h;
                if h <= tolerance {
                    continue;
                }
            }
            h /= 2.0;
        }
        Ok(())
    }

    /// Roll the state back to the snapshot
    fn restore<S: CollisionSystem>(&self, system: &mut S) -> Result<()> {
        let state = system.state_mut();
        if state.len() != self.snapshot.len() {
            return Err(SimError::StateLength {
                expected: self.snapshot.len(),
                found: state.len(),
            });
        }
        state.copy_from_slice(&self.snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Oscillator;
    use crate::settings::SolverKind;
    use crate::sim::collision::Detection;
    use crate::sim::solver::RungeKutta4;
    use crate::sim::system::StateSystem;

    /// Pathological model: always colliding, resolution never helps
    struct Stuck {
        vars: Vec<f64>,
        mask: Vec<bool>,
        handled: u32,
        refreshed: u32,
    }

    impl Stuck {
        fn new() -> Self {
            Self {
                vars: vec![0.0, 1.0],
                mask: vec![true, true],
                handled: 0,
                refreshed: 0,
            }
        }
    }

    impl StateSystem for Stuck {
        fn state(&self) -> &[f64] {
            &self.vars
        }
        fn state_mut(&mut self) -> &mut [f64] {
            &mut self.vars
        }
        fn evaluate(&self, input: &[f64], rates: &mut [f64]) {
            rates[0] = input[1];
            rates[1] = 0.0;
        }
        fn integrable(&self) -> &[bool] {
            &self.mask
        }
    }

    impl CollisionSystem for Stuck {
        type Collision = &'static str;

        fn modify_objects(&mut self) {
            self.refreshed += 1;
        }

        fn find_collisions(&mut self) -> Detection<Self::Collision> {
            Detection::single("stuck")
        }

        fn handle_collisions(&mut self, report: &[Self::Collision]) {
            assert_eq!(report, ["stuck"]);
            self.handled += 1;
        }
    }

    #[test]
    fn test_no_collision_matches_single_step() {
        let mut direct = Oscillator::new(2.0, 1.0, 0.0);
        RungeKutta4::new().step(&mut direct, 0.1).unwrap();

        let mut osc = Oscillator::new(2.0, 1.0, 0.0);
        let mut stepper = CollisionStepper::new(StepperConfig::default()).unwrap();
        let report = stepper.advance(&mut osc, 0.1).unwrap();

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.advanced, 0.1);
        assert_eq!(stepper.time(), 0.1);
        assert_eq!(stepper.last_time_advanced(), 0.1);
        assert_eq!(osc.state(), direct.state());
    }

    #[test]
    fn test_clock_accumulates_without_drift() {
        let mut osc = Oscillator::new(1.0, 1.0, 0.0);
        let mut stepper = CollisionStepper::new(StepperConfig::default()).unwrap();
        for _ in 0..1000 {
            stepper.advance(&mut osc, 0.01).unwrap();
        }
        assert!((stepper.time() - 10.0).abs() < 1e-9);
        let exact = osc.exact(stepper.time());
        assert!((osc.position() - exact[0]).abs() < 1e-8);
    }

    #[test]
    fn test_stall_after_exactly_stall_limit_resolutions() {
        let mut stuck = Stuck::new();
        let mut stepper = CollisionStepper::new(StepperConfig::default()).unwrap();
        let report = stepper.advance(&mut stuck, 1.0).unwrap();

        assert_eq!(report.stop, StopReason::Stalled);
        assert_eq!(report.resolutions, 10);
        assert_eq!(stuck.handled, 10);
        assert!(report.advanced < 1.0);
        assert_eq!(stepper.last_time_advanced(), 0.0);
        assert_eq!(stepper.time(), 0.0);
        // Every attempt was rolled back
        assert_eq!(report.rejected, report.attempts);
        assert_eq!(stuck.vars, vec![0.0, 1.0]);
    }

    #[test]
    fn test_stall_limit_of_one() {
        let mut stuck = Stuck::new();
        let config = StepperConfig::default().with_stall_limit(1);
        let mut stepper = CollisionStepper::new(config).unwrap();
        let report = stepper.advance(&mut stuck, 1.0).unwrap();
        assert_eq!(report.stop, StopReason::Stalled);
        assert_eq!(stuck.handled, 1);
        // 1.0 halves to 2^-14 <= 1e-4 on the fifteenth attempt
        assert_eq!(report.attempts, 15);
    }

    #[test]
    fn test_zero_tolerance_resolves_after_underflow() {
        let mut stuck = Stuck::new();
        let config = StepperConfig::default()
            .with_tolerance(0.0)
            .with_stall_limit(1);
        let mut stepper = CollisionStepper::new(config).unwrap();
        let report = stepper.advance(&mut stuck, 1.0).unwrap();
        assert_eq!(report.stop, StopReason::Stalled);
        assert_eq!(stuck.handled, 1);
        assert!(report.attempts > 1000);
    }

    #[test]
    fn test_attempt_limit() {
        let mut stuck = Stuck::new();
        let config = StepperConfig::default().with_max_attempts(5);
        let mut stepper = CollisionStepper::new(config).unwrap();
        let report = stepper.advance(&mut stuck, 1.0).unwrap();
        assert_eq!(report.stop, StopReason::AttemptLimit);
        assert_eq!(report.attempts, 5);
        assert_eq!(stuck.handled, 0);
    }

    #[test]
    fn test_rollback_refreshes_derived_state() {
        let mut stuck = Stuck::new();
        let config = StepperConfig::default().with_max_attempts(3);
        let mut stepper = CollisionStepper::new(config).unwrap();
        stepper.advance(&mut stuck, 1.0).unwrap();
        // Once after each tentative step and once after each rollback
        assert_eq!(stuck.refreshed, 6);
    }

    #[test]
    fn test_invalid_time_step() {
        let mut osc = Oscillator::new(1.0, 1.0, 0.0);
        let mut stepper = CollisionStepper::new(StepperConfig::default()).unwrap();
        for dt in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                stepper.advance(&mut osc, dt),
                Err(SimError::InvalidTimeStep(_))
            ));
        }
        assert_eq!(stepper.time(), 0.0);
    }

    /// Drops a mask entry after its first accepted step
    struct Shrinking {
        vars: Vec<f64>,
        mask: Vec<bool>,
        queries: u32,
    }

    impl StateSystem for Shrinking {
        fn state(&self) -> &[f64] {
            &self.vars
        }
        fn state_mut(&mut self) -> &mut [f64] {
            &mut self.vars
        }
        fn evaluate(&self, _input: &[f64], rates: &mut [f64]) {
            rates.fill(1.0);
        }
        fn integrable(&self) -> &[bool] {
            &self.mask
        }
    }

    impl CollisionSystem for Shrinking {
        type Collision = ();

        fn find_collisions(&mut self) -> Detection<()> {
            self.queries += 1;
            if self.queries == 1 {
                return Detection::single(());
            }
            self.mask.pop();
            Detection::NoEvent
        }

        fn handle_collisions(&mut self, _report: &[()]) {}
    }

    #[test]
    fn test_error_keeps_partial_progress() {
        let mut shrinking = Shrinking {
            vars: vec![0.0, 0.0],
            mask: vec![true, true],
            queries: 0,
        };
        let mut stepper = CollisionStepper::new(StepperConfig::default()).unwrap();
        // Rejected at h=1, accepted at h=0.5, then the mask no longer fits
        let err = stepper.advance(&mut shrinking, 1.0).unwrap_err();
        assert!(matches!(err, SimError::MaskLength { state: 2, mask: 1 }));
        assert_eq!(stepper.time(), 0.5);
        assert_eq!(stepper.last_time_advanced(), 0.5);
        assert_eq!(stepper.last_report().attempts, 3);
        assert_eq!(stepper.last_report().rejected, 1);
        assert_eq!(shrinking.vars, vec![0.5, 0.5]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StepperConfig::default().with_stall_limit(0);
        assert!(CollisionStepper::new(config).is_err());
    }

    #[test]
    fn test_mask_mismatch_is_an_error() {
        let mut stuck = Stuck::new();
        stuck.mask.pop();
        let mut stepper = CollisionStepper::new(StepperConfig::default()).unwrap();
        let err = stepper.advance(&mut stuck, 0.1).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_solver_choice() {
        let config = StepperConfig::default().with_solver(SolverKind::Euler);
        let mut stepper = CollisionStepper::new(config).unwrap();
        assert_eq!(stepper.solver_name(), "Euler");

        let mut osc = Oscillator::new(1.0, 1.0, 0.0);
        stepper.advance(&mut osc, 0.5).unwrap();
        assert_eq!(osc.position(), 1.0);
        assert_eq!(osc.velocity(), -0.5);
    }

    #[test]
    fn test_reset_and_set_time() {
        let mut osc = Oscillator::new(1.0, 1.0, 0.0);
        let mut stepper = CollisionStepper::new(StepperConfig::default()).unwrap();
        stepper.set_time(5.0);
        stepper.advance(&mut osc, 0.25).unwrap();
        assert_eq!(stepper.time(), 5.25);
        stepper.reset();
        assert_eq!(stepper.time(), 0.0);
        assert_eq!(stepper.last_time_advanced(), 0.0);
    }
}
