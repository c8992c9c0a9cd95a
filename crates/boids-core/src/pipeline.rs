//! The four-stage flocking tick: snapshot, hash, aggregate, integrate.
//!
//! Each stage is a data-parallel fan-out and finishes completely before the
//! next one starts. All scratch buffers live in a [`TickContext`] that is
//! created for one tick and dropped when it returns.

use boids_index::{CellPartition, LatticeFrame, SpatialHashGrid};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::aggregate::{CellTable, aggregate_cells};
use crate::config::FlockingConfig;
use crate::forces::{flocking_force, integrate_velocity, look_rotation, obstacle_force};
use crate::population::{Population, UP};
use crate::snapshot::AgentSnapshot;

/// Aggregate statistics gathered while running a tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TickStats {
    /// Agents processed.
    pub agent_count: usize,
    /// Distinct lattice cells holding at least one agent.
    pub occupied_cells: usize,
    /// Member count of the most crowded cell.
    pub largest_cell: u32,
    /// Agents alone in their cell (no flocking force this tick).
    pub isolated_agents: usize,
    /// Length of the mean heading, from 0 (disordered) to 1 (fully aligned).
    pub polarization: f32,
}

/// Per-tick scratch state produced by stages one to three.
#[derive(Debug)]
pub struct TickContext {
    snapshot: AgentSnapshot,
    grid: SpatialHashGrid,
    cells: CellTable,
}

impl TickContext {
    /// Snapshot the population, hash it under `frame`, and aggregate cells.
    #[must_use]
    pub fn prepare(population: &Population, frame: &LatticeFrame) -> Self {
        let snapshot = AgentSnapshot::capture(population);
        trace!(agents = snapshot.len(), "captured agent snapshot");

        let grid = SpatialHashGrid::build(snapshot.positions(), frame);
        trace!(
            buckets = grid.bucket_count(),
            occupied = grid.occupied_buckets().len(),
            "hashed agents into grid"
        );

        let cells = aggregate_cells(&grid, &snapshot);
        trace!(cells = cells.len(), "aggregated cells");

        Self {
            snapshot,
            grid,
            cells,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &AgentSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn grid(&self) -> &SpatialHashGrid {
        &self.grid
    }

    #[must_use]
    pub fn cells(&self) -> &CellTable {
        &self.cells
    }

    /// Steering force acting on `agent` this tick.
    #[must_use]
    pub fn force_on(&self, agent: usize, config: &FlockingConfig) -> glam::Vec3 {
        let position = self.snapshot.positions()[agent];
        let heading = self.snapshot.headings()[agent];
        flocking_force(position, heading, self.cells.cell_for(agent), config)
            + obstacle_force(position, config)
    }

    /// Stage four: compute forces and write new positions and orientations.
    pub fn integrate(&self, population: &mut Population, delta_time: f32, config: &FlockingConfig) {
        assert_eq!(
            population.len(),
            self.snapshot.len(),
            "population changed size during a tick"
        );
        let (positions, orientations) = population.transforms_mut();
        positions
            .par_iter_mut()
            .zip(orientations.par_iter_mut())
            .enumerate()
            .for_each(|(agent, (position, orientation))| {
                let heading = self.snapshot.headings()[agent];
                let force = self.force_on(agent, config);
                let velocity = integrate_velocity(heading, force, config.speed, delta_time);
                *position = self.snapshot.positions()[agent] + velocity * delta_time;
                *orientation = look_rotation(velocity, *orientation * UP, *orientation);
            });
        trace!(agents = self.snapshot.len(), "integrated agents");
    }

    /// Summary of the cell layout and heading order captured this tick.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        let agent_count = self.snapshot.len();
        let cells = self.cells.cells();
        let largest_cell = cells.iter().map(|cell| cell.member_count).max().unwrap_or(0);
        let isolated_agents = cells.iter().filter(|cell| cell.member_count == 1).count();
        let polarization = if agent_count == 0 {
            0.0
        } else {
            let heading_total: glam::Vec3 = cells.iter().map(|cell| cell.heading_sum).sum();
            heading_total.length() / agent_count as f32
        };
        TickStats {
            agent_count,
            occupied_cells: cells.len(),
            largest_cell,
            isolated_agents,
            polarization,
        }
    }
}

/// Advance every agent in `population` by one tick.
///
/// Draws a fresh lattice frame from `rng`, runs the four stages, and returns
/// statistics for the tick. An empty population is a no-op.
pub fn step<R: Rng>(
    population: &mut Population,
    delta_time: f32,
    config: &FlockingConfig,
    rng: &mut R,
) -> TickStats {
    assert!(
        delta_time.is_finite() && delta_time >= 0.0,
        "delta_time must be finite and non-negative, got {delta_time}"
    );
    if population.is_empty() {
        return TickStats::default();
    }
    let frame = LatticeFrame::draw(config.grid_jitter, config.sense_distance, rng);
    let context = TickContext::prepare(population, &frame);
    context.integrate(population, delta_time, config);
    context.stats()
}
