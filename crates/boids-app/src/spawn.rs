//! One-shot population generator used by the headless driver and tests.

use boids_core::{AgentTransform, FlockingConfig, Population};
use glam::{EulerRot, Quat, Vec3};
use rand::Rng;

/// Scatter `config.population_size` agents uniformly through the cube
/// enclosing the cage, each facing a random direction.
pub fn spawn_population<R: Rng>(config: &FlockingConfig, rng: &mut R) -> Population {
    let mut population = Population::with_capacity(config.population_size);
    for _ in 0..config.population_size {
        population.push(random_agent(config, rng));
    }
    population
}

fn random_agent<R: Rng>(config: &FlockingConfig, rng: &mut R) -> AgentTransform {
    let extent = config.cage_radius;
    let position = Vec3::new(
        rng.random_range(-extent..=extent),
        rng.random_range(-extent..=extent),
        rng.random_range(-extent..=extent),
    );
    let mut angle = || rng.random_range(-360.0_f32..=360.0).to_radians();
    let (x, y, z) = (angle(), angle(), angle());
    let orientation = Quat::from_euler(EulerRot::XYZ, x, y, z).normalize();
    AgentTransform::new(position, orientation, config.agent_scale)
}
