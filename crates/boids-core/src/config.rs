use boids_index::GridJitter;
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::FlockError;

/// Tunable parameters for the flocking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlockingConfig {
    /// Number of agents the population manager spawns and each tick processes.
    pub population_size: usize,
    /// Radius of the spherical world boundary.
    pub cage_radius: f32,
    /// Neighbor lattice cell edge, and width of the boundary avoidance band.
    pub sense_distance: f32,
    /// Constant agent speed in world units per second.
    pub speed: f32,
    /// Weight of the push away from the local centroid when crowded.
    pub separation_weight: f32,
    /// Weight of the constant pull toward the local centroid.
    pub cohesion_weight: f32,
    /// Weight of the pull toward the local average heading.
    pub alignment_weight: f32,
    /// Weight of the inward push applied inside the boundary band.
    pub obstacle_weight: f32,
    /// Cosmetic uniform scale assigned at spawn.
    pub agent_scale: f32,
    /// Optional seed for the lattice jitter RNG.
    pub rng_seed: Option<u64>,
    /// Lattice placement policy.
    pub grid_jitter: GridJitter,
    /// Size of the bounded worker pool; `None` uses the global rayon pool.
    pub worker_threads: Option<usize>,
    /// Maximum number of recent tick summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for FlockingConfig {
    fn default() -> Self {
        Self {
            population_size: 300_000,
            cage_radius: 20.0,
            sense_distance: 10.0,
            speed: 5.0,
            separation_weight: 30.0,
            cohesion_weight: 15.0,
            alignment_weight: 20.0,
            obstacle_weight: 8.0,
            agent_scale: 0.1,
            rng_seed: None,
            grid_jitter: GridJitter::Randomized,
            worker_threads: None,
            history_capacity: 256,
        }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl FlockingConfig {
    /// Checks every parameter the pipeline relies on.
    pub fn validate(&self) -> Result<(), FlockError> {
        boids_index::check_cell_radius(self.sense_distance)?;
        if !positive(self.cage_radius) {
            return Err(FlockError::InvalidConfig(
                "cage_radius must be positive and finite",
            ));
        }
        if !positive(self.speed) {
            return Err(FlockError::InvalidConfig(
                "speed must be positive and finite",
            ));
        }
        if [
            self.separation_weight,
            self.cohesion_weight,
            self.alignment_weight,
            self.obstacle_weight,
        ]
        .iter()
        .any(|weight| !weight.is_finite() || *weight < 0.0)
        {
            return Err(FlockError::InvalidConfig(
                "force weights must be finite and non-negative",
            ));
        }
        if !positive(self.agent_scale) {
            return Err(FlockError::InvalidConfig(
                "agent_scale must be positive and finite",
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(FlockError::InvalidConfig(
                "worker_threads must be non-zero when set",
            ));
        }
        if self.history_capacity == 0 {
            return Err(FlockError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Squared cage radius, used by the boundary test.
    #[must_use]
    pub fn cage_radius_sq(&self) -> f32 {
        self.cage_radius * self.cage_radius
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
