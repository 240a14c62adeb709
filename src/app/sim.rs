use std::time::Duration;

use glam::{Quat, Vec3};

use crate::renderer::Scene;

/// 60 simulation steps per second.
pub const SIMULATION_STEP: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// One full turn every 255 steps.
pub const SPIN_PER_STEP: f32 = std::f32::consts::TAU / 255.0;

/// Fixed-timestep accumulator. Simulation advances in whole steps regardless
/// of how quickly frames are presented.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: Duration,
    accumulator: Duration,
    max_backlog: Duration,
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(SIMULATION_STEP)
    }
}

impl FixedTimestep {
    pub fn new(step: Duration) -> Self {
        debug_assert!(!step.is_zero());
        Self {
            step,
            accumulator: Duration::ZERO,
            max_backlog: Duration::from_millis(250),
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Adds `elapsed` wall time and returns how many whole steps are due.
    ///
    /// Stalls longer than the backlog limit are dropped rather than replayed.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator = (self.accumulator + elapsed).min(self.max_backlog);

        let mut steps = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            steps += 1;
        }
        steps
    }
}

/// The spinning-model simulation run on the render thread.
#[derive(Debug, Clone)]
pub struct Spinner {
    angle: f32,
    per_step: f32,
    model_location: Vec3,
}

impl Default for Spinner {
    fn default() -> Self {
        Self {
            angle: 0.0,
            per_step: SPIN_PER_STEP,
            model_location: Vec3::new(0.0, 0.0, 5.0),
        }
    }
}

impl Spinner {
    pub fn step(&mut self, steps: u32) {
        self.angle = (self.angle + self.per_step * steps as f32) % std::f32::consts::TAU;
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn scene(&self) -> Scene {
        Scene {
            camera_location: Vec3::ZERO,
            model_location: self.model_location,
            model_rotation: Quat::from_rotation_y(self.angle),
        }
    }
}
