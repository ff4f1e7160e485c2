//! rk-collide demo entry point
//!
//! Runs a box of bouncing balls through the collision stepper at a fixed
//! frame rate and prints a JSON summary. An optional first argument names a
//! JSON stepper config file.

use glam::DVec2;
use serde::Serialize;

use rk_collide::consts::*;
use rk_collide::models::{BallBox, BoxBounds};
use rk_collide::sim::{AdvanceReport, Simulation, StateSystem};
use rk_collide::{Result, StepperConfig, all_finite};

/// Seconds of simulated time to run
const RUN_SECONDS: f64 = 10.0;
const BALL_COUNT: usize = 12;
const SEED: u64 = 42;

#[derive(Debug, Serialize)]
struct Summary {
    solver: &'static str,
    balls: usize,
    ticks: u64,
    short_ticks: u64,
    sim_time: f64,
    initial_energy: f64,
    final_energy: f64,
    last_advance: AdvanceReport,
}

fn main() {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => StepperConfig::load(path)?,
        None => StepperConfig::default(),
    };
    log::info!(
        "Solver {}, tolerance {:e}, stall limit {}",
        config.solver.as_str(),
        config.tolerance,
        config.stall_limit
    );

    let bounds = BoxBounds::new(DVec2::ZERO, DVec2::new(10.0, 10.0));
    let balls = BallBox::scatter(SEED, BALL_COUNT, 0.3, bounds, 6.0)?
        .with_gravity(DVec2::new(0.0, -9.8));
    let initial_energy = balls.total_energy();

    let mut sim = Simulation::new(balls, config)?;
    let frames = (RUN_SECONDS / FRAME_DT).round() as u64;
    for frame in 0..frames {
        sim.update(FRAME_DT)?;
        if !all_finite(sim.system().state()) {
            log::error!("State diverged at t={:.3}", sim.time());
            break;
        }
        if frame % 120 == 0 {
            log::info!(
                "t={:.3} energy={:.4} short ticks={}",
                sim.time(),
                sim.system().total_energy(),
                sim.short_ticks()
            );
        }
    }

    let summary = Summary {
        solver: sim.stepper().solver_name(),
        balls: sim.system().ball_count(),
        ticks: sim.ticks(),
        short_ticks: sim.short_ticks(),
        sim_time: sim.time(),
        initial_energy,
        final_energy: sim.system().total_energy(),
        last_advance: *sim.stepper().last_report(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
