//! Ball bouncing on a floor at height zero
//!
//! One dimensional: the ball falls under gravity and collides whenever its
//! height goes negative. Resolution reflects a downward velocity, or settles
//! the ball on the floor once the rebound would be slower than `rest_speed`.
//! A settled ball feels no net force until something lifts it.

use serde::{Deserialize, Serialize};

use crate::consts::REST_SPEED;
use crate::sim::{CollisionSystem, Detection, StateSystem};

/// Collision record taken from the tentative (penetrating) state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorContact {
    /// How far below the floor the tentative state was
    pub depth: f64,
    /// Vertical velocity in the tentative state
    pub speed: f64,
}

fn on_floor(y: f64, vy: f64) -> bool {
    y <= 0.0 && vy <= 0.0
}

/// State layout: `[y, vy]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BouncingBall {
    /// Downward acceleration (positive)
    pub gravity: f64,
    /// Coefficient of restitution, 1.0 is perfectly elastic
    pub elasticity: f64,
    /// Rebound speed below which the ball settles instead of bouncing
    pub rest_speed: f64,
    vars: Vec<f64>,
    mask: Vec<bool>,
    /// Bounces applied so far
    pub bounces: u32,
}

impl BouncingBall {
    pub fn new(height: f64, velocity: f64) -> Self {
        Self {
            gravity: 9.8,
            elasticity: 1.0,
            rest_speed: REST_SPEED,
            vars: vec![height, velocity],
            mask: vec![true, true],
            bounces: 0,
        }
    }

    pub fn with_gravity(mut self, gravity: f64) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_elasticity(mut self, elasticity: f64) -> Self {
        self.elasticity = elasticity;
        self
    }

    pub fn with_rest_speed(mut self, rest_speed: f64) -> Self {
        self.rest_speed = rest_speed;
        self
    }

    pub fn height(&self) -> f64 {
        self.vars[0]
    }

    pub fn velocity(&self) -> f64 {
        self.vars[1]
    }

    /// On the floor and not moving away from it
    pub fn is_resting(&self) -> bool {
        on_floor(self.vars[0], self.vars[1])
    }

    /// Energy per unit mass
    pub fn energy(&self) -> f64 {
        self.gravity * self.vars[0] + 0.5 * self.vars[1] * self.vars[1]
    }

    /// Hold the ball at its current height (dragged)
    pub fn pin(&mut self) {
        self.mask[0] = false;
        self.mask[1] = false;
    }

    pub fn release(&mut self) {
        self.mask[0] = true;
        self.mask[1] = true;
    }

    /// Drag handler: move the ball and zero its velocity
    pub fn drag_to(&mut self, height: f64) {
        self.vars[0] = height;
        self.vars[1] = 0.0;
    }
}

impl StateSystem for BouncingBall {
    fn state(&self) -> &[f64] {
        &self.vars
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.vars
    }

    fn evaluate(&self, input: &[f64], rates: &mut [f64]) {
        rates[0] = input[1];
        // The floor carries the weight of a settled ball
        rates[1] = if on_floor(input[0], input[1]) {
            0.0
        } else {
            -self.gravity
        };
    }

    fn integrable(&self) -> &[bool] {
        &self.mask
    }
}

impl CollisionSystem for BouncingBall {
    type Collision = FloorContact;

    fn find_collisions(&mut self) -> Detection<FloorContact> {
        let y = self.vars[0];
        if y < 0.0 {
            Detection::single(FloorContact {
                depth: -y,
                speed: self.vars[1],
            })
        } else {
            Detection::NoEvent
        }
    }

    fn handle_collisions(&mut self, report: &[FloorContact]) {
        if report.is_empty() {
            return;
        }
        let vy = self.vars[1];
        let rebound = if vy < 0.0 { -self.elasticity * vy } else { vy };
        if rebound < self.rest_speed {
            self.vars[0] = 0.0;
            self.vars[1] = 0.0;
        } else if vy < 0.0 {
            self.vars[1] = rebound;
            self.bounces += 1;
        }
    }
}
