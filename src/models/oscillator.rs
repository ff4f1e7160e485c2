//! Simple harmonic oscillator
//!
//! `x'' = -w^2 x` with a closed-form solution, used to check solver accuracy.
//! Never reports collisions.

use std::convert::Infallible;

use serde::{Deserialize, Serialize};

use crate::sim::{CollisionSystem, Detection, StateSystem};

/// State layout: `[x, v]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Oscillator {
    /// Angular frequency
    pub omega: f64,
    vars: Vec<f64>,
    mask: Vec<bool>,
    /// Initial `[x, v]` for the exact solution
    initial: [f64; 2],
}

impl Oscillator {
    pub fn new(omega: f64, x0: f64, v0: f64) -> Self {
        Self {
            omega,
            vars: vec![x0, v0],
            mask: vec![true, true],
            initial: [x0, v0],
        }
    }

    pub fn position(&self) -> f64 {
        self.vars[0]
    }

    pub fn velocity(&self) -> f64 {
        self.vars[1]
    }

    /// Exact `[x, v]` at time `t` from the initial conditions
    pub fn exact(&self, t: f64) -> [f64; 2] {
        let [x0, v0] = self.initial;
        let w = self.omega;
        let (s, c) = (w * t).sin_cos();
        [x0 * c + v0 / w * s, -x0 * w * s + v0 * c]
    }

    /// Energy per unit mass
    pub fn energy(&self) -> f64 {
        0.5 * (self.vars[1].powi(2) + (self.omega * self.vars[0]).powi(2))
    }

    /// Stop integrating component `i` (e.g. while it is dragged)
    pub fn pin(&mut self, i: usize) {
        self.mask[i] = false;
    }

    pub fn release(&mut self, i: usize) {
        self.mask[i] = true;
    }

    /// Move the mass directly, as a drag handler would
    pub fn set_position(&mut self, x: f64) {
        self.vars[0] = x;
    }
}

impl StateSystem for Oscillator {
    fn state(&self) -> &[f64] {
        &self.vars
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.vars
    }

    fn evaluate(&self, input: &[f64], rates: &mut [f64]) {
        rates[0] = input[1];
        rates[1] = -self.omega * self.omega * input[0];
    }

    fn integrable(&self) -> &[bool] {
        &self.mask
    }
}

impl CollisionSystem for Oscillator {
    type Collision = Infallible;

    fn find_collisions(&mut self) -> Detection<Infallible> {
        Detection::NoEvent
    }

    fn handle_collisions(&mut self, _report: &[Infallible]) {}
}
