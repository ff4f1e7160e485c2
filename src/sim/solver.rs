//! Fixed-step explicit solvers
//!
//! Each solver advances a [`StateSystem`] by exactly one increment `h`.
//! Intermediate stages are evaluated for every component; only the final
//! write honours the integrability mask. Stage buffers are private and only
//! reallocated when the state length changes.
//!
//! Nothing here checks for NaN or infinity: a diverging derivative ends up
//! in the state vector where the caller can reject it.

use super::system::StateSystem;
use crate::error::{Result, SimError};

/// A single-step ODE solver
pub trait Integrator {
    /// Human readable solver name
    fn name(&self) -> &'static str;

    /// Global order of accuracy
    fn order(&self) -> u32;

    /// Advance the system state by `h`.
    ///
    /// Fails before touching the state if the mask and state lengths differ.
    fn step(&mut self, system: &mut dyn StateSystem, h: f64) -> Result<()>;
}

/// Check the mask contract and return the state length
fn checked_len(system: &dyn StateSystem) -> Result<usize> {
    let state = system.state().len();
    let mask = system.integrable().len();
    if state != mask {
        return Err(SimError::MaskLength { state, mask });
    }
    Ok(state)
}

/// Resize scratch buffers only when the state length changed
fn fit(buffers: &mut [&mut Vec<f64>], n: usize) {
    for buf in buffers.iter_mut() {
        if buf.len() != n {
            buf.clear();
            buf.resize(n, 0.0);
        }
    }
}

/// Copy the mask so the state can be borrowed mutably afterwards
fn copy_mask(system: &dyn StateSystem, mask: &mut Vec<bool>) {
    mask.clear();
    mask.extend_from_slice(system.integrable());
}

/// Forward Euler: `x += f(x) * h`
#[derive(Debug, Default)]
pub struct Euler {
    k1: Vec<f64>,
    mask: Vec<bool>,
}

impl Euler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Integrator for Euler {
    fn name(&self) -> &'static str {
        "Euler"
    }

    fn order(&self) -> u32 {
        1
    }

    fn step(&mut self, system: &mut dyn StateSystem, h: f64) -> Result<()> {
        let n = checked_len(system)?;
        fit(&mut [&mut self.k1], n);

        system.evaluate(system.state(), &mut self.k1);

        copy_mask(system, &mut self.mask);
        let x = system.state_mut();
        for i in 0..n {
            if self.mask[i] {
                x[i] += self.k1[i] * h;
            }
        }
        Ok(())
    }
}

/// Modified Euler (Heun): average of the slopes at both ends of the step
#[derive(Debug, Default)]
pub struct ModifiedEuler {
    k1: Vec<f64>,
    k2: Vec<f64>,
    inp: Vec<f64>,
    mask: Vec<bool>,
}

impl ModifiedEuler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Integrator for ModifiedEuler {
    fn name(&self) -> &'static str {
        "ModifiedEuler"
    }

    fn order(&self) -> u32 {
        2
    }

    fn step(&mut self, system: &mut dyn StateSystem, h: f64) -> Result<()> {
        let n = checked_len(system)?;
        fit(&mut [&mut self.k1, &mut self.k2, &mut self.inp], n);

        let x = system.state();
        system.evaluate(x, &mut self.k1);
        for i in 0..n {
            self.inp[i] = x[i] + self.k1[i] * h;
        }
        system.evaluate(&self.inp, &mut self.k2);

        copy_mask(system, &mut self.mask);
        let x = system.state_mut();
        for i in 0..n {
            if self.mask[i] {
                x[i] += (self.k1[i] + self.k2[i]) * h / 2.0;
            }
        }
        Ok(())
    }
}

/// Classical fourth-order Runge-Kutta
///
/// ```text
/// k1 = f(x)
/// k2 = f(x + k1*h/2)
/// k3 = f(x + k2*h/2)
/// k4 = f(x + k3*h)
/// x += (k1 + 2*k2 + 2*k3 + k4) * h / 6
/// ```
#[derive(Debug, Default)]
pub struct RungeKutta4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    inp: Vec<f64>,
    mask: Vec<bool>,
}

impl RungeKutta4 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Integrator for RungeKutta4 {
    fn name(&self) -> &'static str {
        "RungeKutta4"
    }

    fn order(&self) -> u32 {
        4
    }

    fn step(&mut self, system: &mut dyn StateSystem, h: f64) -> Result<()> {
        let n = checked_len(system)?;
        fit(
            &mut [
                &mut self.k1,
                &mut self.k2,
                &mut self.k3,
                &mut self.k4,
                &mut self.inp,
            ],
            n,
        );

        let x = system.state();
        system.evaluate(x, &mut self.k1);

        for i in 0..n {
            self.inp[i] = x[i] + self.k1[i] * h / 2.0;
        }
        system.evaluate(&self.inp, &mut self.k2);

        for i in 0..n {
            self.inp[i] = x[i] + self.k2[i] * h / 2.0;
        }
        system.evaluate(&self.inp, &mut self.k3);

        for i in 0..n {
            self.inp[i] = x[i] + self.k3[i] * h;
        }
        system.evaluate(&self.inp, &mut self.k4);

        copy_mask(system, &mut self.mask);
        let x = system.state_mut();
        for i in 0..n {
            if self.mask[i] {
                x[i] += (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]) * h / 6.0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x' = v, v' = -x, plus a counter of evaluations
    struct Spring {
        x: Vec<f64>,
        mask: Vec<bool>,
        evals: std::cell::Cell<u32>,
    }

    impl Spring {
        fn new(x0: f64, v0: f64) -> Self {
            Self {
                x: vec![x0, v0],
                mask: vec![true, true],
                evals: std::cell::Cell::new(0),
            }
        }
    }

    impl StateSystem for Spring {
        fn state(&self) -> &[f64] {
            &self.x
        }
        fn state_mut(&mut self) -> &mut [f64] {
            &mut self.x
        }
        fn evaluate(&self, input: &[f64], rates: &mut [f64]) {
            self.evals.set(self.evals.get() + 1);
            rates[0] = input[1];
            rates[1] = -input[0];
        }
        fn integrable(&self) -> &[bool] {
            &self.mask
        }
    }

    /// Global error at t = 1 integrating with `steps` equal steps
    fn global_error(solver: &mut dyn Integrator, steps: u32) -> f64 {
        let mut spring = Spring::new(1.0, 0.0);
        let h = 1.0 / steps as f64;
        for _ in 0..steps {
            solver.step(&mut spring, h).unwrap();
        }
        let (x, v) = (1.0_f64.cos(), -1.0_f64.sin());
        ((spring.x[0] - x).powi(2) + (spring.x[1] - v).powi(2)).sqrt()
    }

    #[test]
    fn test_rk4_global_convergence_ratio() {
        let coarse = global_error(&mut RungeKutta4::new(), 20);
        let fine = global_error(&mut RungeKutta4::new(), 40);
        let ratio = coarse / fine;
        assert!(ratio > 14.5 && ratio < 17.5, "ratio {ratio}");
    }

    #[test]
    fn test_rk4_local_error_is_fifth_order() {
        let local = |h: f64| {
            let mut spring = Spring::new(1.0, 0.0);
            RungeKutta4::new().step(&mut spring, h).unwrap();
            ((spring.x[0] - h.cos()).powi(2) + (spring.x[1] + h.sin()).powi(2)).sqrt()
        };
        let ratio = local(0.1) / local(0.05);
        assert!(ratio > 28.0 && ratio < 36.0, "ratio {ratio}");
    }

    #[test]
    fn test_lower_order_solvers_converge() {
        let ratio = global_error(&mut Euler::new(), 200) / global_error(&mut Euler::new(), 400);
        assert!(ratio > 1.8 && ratio < 2.2, "euler ratio {ratio}");

        let ratio = global_error(&mut ModifiedEuler::new(), 100)
            / global_error(&mut ModifiedEuler::new(), 200);
        assert!(ratio > 3.6 && ratio < 4.4, "heun ratio {ratio}");
    }

    #[test]
    fn test_rk4_evaluates_four_times() {
        let mut spring = Spring::new(1.0, 0.0);
        let mut rk = RungeKutta4::new();
        rk.step(&mut spring, 0.1).unwrap();
        assert_eq!(spring.evals.get(), 4);
        rk.step(&mut spring, 0.1).unwrap();
        assert_eq!(spring.evals.get(), 8);
    }

    #[test]
    fn test_masked_component_untouched() {
        let mut spring = Spring::new(1.0, 0.5);
        spring.mask[0] = false;
        for solver in [
            &mut Euler::new() as &mut dyn Integrator,
            &mut ModifiedEuler::new() as &mut dyn Integrator,
            &mut RungeKutta4::new() as &mut dyn Integrator,
        ] {
            solver.step(&mut spring, 0.25).unwrap();
            assert_eq!(spring.x[0].to_bits(), 1.0_f64.to_bits());
        }
        assert_ne!(spring.x[1], 0.5);
    }

    #[test]
    fn test_mask_length_mismatch_fails_before_writing() {
        let mut spring = Spring::new(1.0, 0.5);
        spring.mask.pop();
        let err = RungeKutta4::new().step(&mut spring, 0.1).unwrap_err();
        assert!(matches!(err, SimError::MaskLength { state: 2, mask: 1 }));
        assert_eq!(spring.x, vec![1.0, 0.5]);
        assert_eq!(spring.evals.get(), 0);
    }

    #[test]
    fn test_rk4_is_deterministic() {
        let mut a = Spring::new(0.3, -0.7);
        let mut b = Spring::new(0.3, -0.7);
        let mut rk = RungeKutta4::new();
        for _ in 0..50 {
            rk.step(&mut a, 0.013).unwrap();
        }
        let mut rk = RungeKutta4::new();
        for _ in 0..50 {
            rk.step(&mut b, 0.013).unwrap();
        }
        assert_eq!(a.x[0].to_bits(), b.x[0].to_bits());
        assert_eq!(a.x[1].to_bits(), b.x[1].to_bits());
    }

    #[test]
    fn test_divergence_propagates_as_nan() {
        struct Blowup(Vec<f64>, Vec<bool>);
        impl StateSystem for Blowup {
            fn state(&self) -> &[f64] {
                &self.0
            }
            fn state_mut(&mut self) -> &mut [f64] {
                &mut self.0
            }
            fn evaluate(&self, input: &[f64], rates: &mut [f64]) {
                rates[0] = 1.0 / input[0] - f64::INFINITY;
            }
            fn integrable(&self) -> &[bool] {
                &self.1
            }
        }
        let mut sys = Blowup(vec![0.0], vec![true]);
        RungeKutta4::new().step(&mut sys, 0.1).unwrap();
        assert!(sys.0[0].is_nan());
    }

    #[test]
    fn test_buffers_follow_state_length() {
        let mut rk = RungeKutta4::new();
        let mut spring = Spring::new(1.0, 0.0);
        rk.step(&mut spring, 0.1).unwrap();
        assert_eq!(rk.k1.len(), 2);
        spring.x.push(0.0);
        spring.mask.push(true);
        // evaluate only writes the first two rates; the third stays zero
        rk.step(&mut spring, 0.1).unwrap();
        assert_eq!(rk.inp.len(), 3);
        assert_eq!(spring.x[2], 0.0);
    }
}
