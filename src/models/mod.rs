//! Reference physical systems
//!
//! Small models that implement the collision contract. Used by the demo
//! binary and the tests; a real application brings its own.

pub mod ball_box;
pub mod bouncing;
pub mod oscillator;

pub use ball_box::{BallBox, BoxBounds, BoxCollision, Wall};
pub use bouncing::{BouncingBall, FloorContact};
pub use oscillator::Oscillator;
