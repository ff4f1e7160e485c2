//! Equal-mass balls bouncing inside a rectangular box
//!
//! Exercises multi-body contacts: several balls can touch each other and the
//! walls within the same step. Ball centres are cached as `DVec2` in
//! `modify_objects` and detection reads only that cache.
//!
//! A wall hit whose rebound would be slower than `rest_speed`, on a wall that
//! gravity presses the ball into, settles the ball on that wall: it slides
//! along it with the normal weight carried by the wall. Resting contact
//! between balls is not modelled, so stacks only work with elastic pairs.
//! Pinned balls (position not integrable) act as infinite mass.

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::REST_SPEED;
use crate::error::{Result, SimError};
use crate::sim::{CollisionSystem, Detection, StateSystem};

/// State components per ball: `x, y, vx, vy`
pub const VARS_PER_BALL: usize = 4;

/// Distance from a wall still counted as resting on it
const CONTACT_SLOP: f64 = 1e-9;

/// Box wall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wall {
    Left,
    Right,
    Bottom,
    Top,
}

impl Wall {
    pub const ALL: [Wall; 4] = [Wall::Left, Wall::Right, Wall::Bottom, Wall::Top];

    /// Inward unit normal
    pub fn normal(&self) -> DVec2 {
        match self {
            Wall::Left => DVec2::X,
            Wall::Right => DVec2::NEG_X,
            Wall::Bottom => DVec2::Y,
            Wall::Top => DVec2::NEG_Y,
        }
    }
}

/// A collision found on a tentative state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxCollision {
    /// Ball overlaps a wall while moving into it
    Wall { ball: usize, wall: Wall },
    /// Two balls overlap while approaching
    Pair { a: usize, b: usize },
    /// Ball ended up entirely outside the box (step far too long)
    Escaped { ball: usize, wall: Wall },
}

/// Axis aligned container
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxBounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl BoxBounds {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    /// How far a circle reaches past `wall` (positive when overlapping)
    fn penetration(&self, wall: Wall, pos: DVec2, radius: f64) -> f64 {
        match wall {
            Wall::Left => self.min.x - (pos.x - radius),
            Wall::Right => pos.x + radius - self.max.x,
            Wall::Bottom => self.min.y - (pos.y - radius),
            Wall::Top => pos.y + radius - self.max.y,
        }
    }

    /// Circle centre moved along the wall normal so it just touches `wall`
    fn place_on(&self, wall: Wall, pos: DVec2, radius: f64) -> DVec2 {
        match wall {
            Wall::Left => DVec2::new(self.min.x + radius, pos.y),
            Wall::Right => DVec2::new(self.max.x - radius, pos.y),
            Wall::Bottom => DVec2::new(pos.x, self.min.y + radius),
            Wall::Top => DVec2::new(pos.x, self.max.y - radius),
        }
    }

    /// Wall the circle has completely passed through, if any
    fn escaped(&self, pos: DVec2, radius: f64) -> Option<Wall> {
        Wall::ALL
            .into_iter()
            .find(|&wall| self.penetration(wall, pos, radius) > 2.0 * radius)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallBox {
    pub radius: f64,
    pub bounds: BoxBounds,
    pub gravity: DVec2,
    /// Coefficient of restitution for walls and pairs
    pub elasticity: f64,
    /// Wall rebound speed below which a ball settles instead of bouncing
    pub rest_speed: f64,
    vars: Vec<f64>,
    mask: Vec<bool>,
    /// Ball centres derived from `vars`
    #[serde(skip)]
    centres: Vec<DVec2>,
}

impl BallBox {
    /// Build from explicit positions and velocities
    pub fn new(radius: f64, bounds: BoxBounds, balls: &[(DVec2, DVec2)]) -> Self {
        let mut vars = Vec::with_capacity(balls.len() * VARS_PER_BALL);
        for (pos, vel) in balls {
            vars.extend_from_slice(&[pos.x, pos.y, vel.x, vel.y]);
        }
        let mut model = Self {
            radius,
            bounds,
            gravity: DVec2::ZERO,
            elasticity: 1.0,
            rest_speed: REST_SPEED,
            mask: vec![true; vars.len()],
            vars,
            centres: Vec::new(),
        };
        model.modify_objects();
        model
    }

    /// Seeded random layout: one ball per grid cell with jitter, random velocity
    pub fn scatter(
        seed: u64,
        count: usize,
        radius: f64,
        bounds: BoxBounds,
        max_speed: f64,
    ) -> Result<Self> {
        let cols = (count as f64).sqrt().ceil().max(1.0) as usize;
        let rows = count.div_ceil(cols).max(1);
        let cell = bounds.size() / DVec2::new(cols as f64, rows as f64);
        if cell.x <= 2.0 * radius || cell.y <= 2.0 * radius {
            return Err(SimError::invalid_config(format!(
                "{count} balls of radius {radius} do not fit in a {}x{} box",
                bounds.size().x,
                bounds.size().y
            )));
        }

        let mut rng = Pcg32::seed_from_u64(seed);
        // Half the free room in a cell, so neighbours can never overlap
        let jitter = (cell / 2.0 - DVec2::splat(radius)) * 0.5;
        let balls: Vec<_> = (0..count)
            .map(|i| {
                let (col, row) = (i % cols, i / cols);
                let centre = bounds.min + cell * DVec2::new(col as f64 + 0.5, row as f64 + 0.5);
                let offset = DVec2::new(
                    rng.random_range(-1.0..=1.0) * jitter.x,
                    rng.random_range(-1.0..=1.0) * jitter.y,
                );
                let angle = rng.random_range(0.0..std::f64::consts::TAU);
                let speed = rng.random_range(0.0..=max_speed);
                (centre + offset, DVec2::from_angle(angle) * speed)
            })
            .collect();

        Ok(Self::new(radius, bounds, &balls))
    }

    pub fn with_gravity(mut self, gravity: DVec2) -> Self {
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

    pub fn ball_count(&self) -> usize {
        self.vars.len() / VARS_PER_BALL
    }

    pub fn position(&self, ball: usize) -> DVec2 {
        let i = ball * VARS_PER_BALL;
        DVec2::new(self.vars[i], self.vars[i + 1])
    }

    pub fn velocity(&self, ball: usize) -> DVec2 {
        let i = ball * VARS_PER_BALL;
        DVec2::new(self.vars[i + 2], self.vars[i + 3])
    }

    fn set_position(&mut self, ball: usize, pos: DVec2) {
        let i = ball * VARS_PER_BALL;
        self.vars[i] = pos.x;
        self.vars[i + 1] = pos.y;
    }

    fn set_velocity(&mut self, ball: usize, vel: DVec2) {
        let i = ball * VARS_PER_BALL;
        self.vars[i + 2] = vel.x;
        self.vars[i + 3] = vel.y;
    }

    pub fn kinetic_energy(&self) -> f64 {
        (0..self.ball_count())
            .map(|b| 0.5 * self.velocity(b).length_squared())
            .sum()
    }

    /// Potential relative to the box origin
    pub fn potential_energy(&self) -> f64 {
        (0..self.ball_count())
            .map(|b| -self.gravity.dot(self.position(b) - self.bounds.min))
            .sum()
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy() + self.potential_energy()
    }

    /// Hold a ball in place (being dragged)
    pub fn pin(&mut self, ball: usize) {
        let i = ball * VARS_PER_BALL;
        self.mask[i..i + VARS_PER_BALL].fill(false);
    }

    pub fn release(&mut self, ball: usize) {
        let i = ball * VARS_PER_BALL;
        self.mask[i..i + VARS_PER_BALL].fill(true);
    }

    /// Position is held by the mask, so the ball cannot move
    pub fn is_pinned(&self, ball: usize) -> bool {
        let i = ball * VARS_PER_BALL;
        !self.mask[i] && !self.mask[i + 1]
    }

    /// Velocity the ball actually moves with (zero while pinned)
    fn moving_velocity(&self, ball: usize) -> DVec2 {
        if self.is_pinned(ball) {
            DVec2::ZERO
        } else {
            self.velocity(ball)
        }
    }

    /// Gravity left over once the walls a ball rests on carry their share
    fn acceleration(&self, pos: DVec2, vel: DVec2) -> DVec2 {
        let mut acc = self.gravity;
        for wall in Wall::ALL {
            let n = wall.normal();
            let push = acc.dot(n);
            if push < 0.0
                && vel.dot(n) <= 0.0
                && self.bounds.penetration(wall, pos, self.radius) >= -CONTACT_SLOP
            {
                acc -= n * push;
            }
        }
        acc
    }

    /// True when no ball overlaps a wall or another ball
    pub fn is_separated(&self) -> bool {
        let r = self.radius;
        (0..self.ball_count()).all(|a| {
            let pa = self.position(a);
            Wall::ALL
                .into_iter()
                .all(|wall| self.bounds.penetration(wall, pa, r) <= 0.0)
                && (a + 1..self.ball_count())
                    .all(|b| pa.distance(self.position(b)) >= 2.0 * r)
        })
    }

    fn resolve_wall(&mut self, ball: usize, wall: Wall) {
        if self.is_pinned(ball) {
            return;
        }
        let n = wall.normal();
        let vel = self.velocity(ball);
        let into = vel.dot(n);
        let rebound = if into < 0.0 { -into * self.elasticity } else { into };

        if rebound < self.rest_speed && self.gravity.dot(n) < 0.0 {
            let pos = self.bounds.place_on(wall, self.position(ball), self.radius);
            self.set_position(ball, pos);
            self.set_velocity(ball, vel - n * into);
        } else if into < 0.0 {
            self.set_velocity(ball, vel - n * into * (1.0 + self.elasticity));
        }
    }

    fn resolve_pair(&mut self, a: usize, b: usize) {
        let (pinned_a, pinned_b) = (self.is_pinned(a), self.is_pinned(b));
        if pinned_a && pinned_b {
            return;
        }
        let n = (self.position(b) - self.position(a)).normalize_or_zero();
        let (va, vb) = (self.moving_velocity(a), self.moving_velocity(b));
        let closing = (va - vb).dot(n);
        if closing <= 0.0 {
            return;
        }

        let impulse = n * closing * (1.0 + self.elasticity);
        if pinned_a {
            self.set_velocity(b, vb + impulse);
        } else if pinned_b {
            self.set_velocity(a, va - impulse);
        } else {
            self.set_velocity(a, va - impulse / 2.0);
            self.set_velocity(b, vb + impulse / 2.0);
        }
    }
}

impl StateSystem for BallBox {
    fn state(&self) -> &[f64] {
        &self.vars
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.vars
    }

    fn evaluate(&self, input: &[f64], rates: &mut [f64]) {
        for (x, dx) in input
            .chunks_exact(VARS_PER_BALL)
            .zip(rates.chunks_exact_mut(VARS_PER_BALL))
        {
            let acc = self.acceleration(DVec2::new(x[0], x[1]), DVec2::new(x[2], x[3]));
            dx[0] = x[2];
            dx[1] = x[3];
            dx[2] = acc.x;
            dx[3] = acc.y;
        }
    }

    fn integrable(&self) -> &[bool] {
        &self.mask
    }
}

impl CollisionSystem for BallBox {
    type Collision = BoxCollision;

    fn modify_objects(&mut self) {
        self.centres.clear();
        self.centres.extend(
            self.vars
                .chunks_exact(VARS_PER_BALL)
                .map(|x| DVec2::new(x[0], x[1])),
        );
    }

    fn find_collisions(&mut self) -> Detection<BoxCollision> {
        let r = self.radius;
        let mut report = Vec::new();

        for (ball, &pos) in self.centres.iter().enumerate() {
            if self.is_pinned(ball) {
                continue;
            }
            if let Some(wall) = self.bounds.escaped(pos, r) {
                return Detection::single(BoxCollision::Escaped { ball, wall });
            }
            let vel = self.velocity(ball);
            for wall in Wall::ALL {
                if self.bounds.penetration(wall, pos, r) > 0.0 && vel.dot(wall.normal()) < 0.0 {
                    report.push(BoxCollision::Wall { ball, wall });
                }
            }
        }

        for a in 0..self.centres.len() {
            for b in a + 1..self.centres.len() {
                let offset = self.centres[b] - self.centres[a];
                if offset.length() < 2.0 * r {
                    let closing =
                        (self.moving_velocity(a) - self.moving_velocity(b)).dot(offset);
                    if closing > 0.0 {
                        report.push(BoxCollision::Pair { a, b });
                    }
                }
            }
        }

        Detection::from_report(report)
    }

    fn handle_collisions(&mut self, report: &[BoxCollision]) {
        for collision in report {
            match *collision {
                BoxCollision::Wall { ball, wall } | BoxCollision::Escaped { ball, wall } => {
                    self.resolve_wall(ball, wall)
                }
                BoxCollision::Pair { a, b } => self.resolve_pair(a, b),
            }
        }
    }
}
