//! Spatial-hash-based flocking: neighbor aggregation and force integration for
//! populations of 10⁵ agents and beyond.
//!
//! Every tick runs four data-parallel stages in order:
//!
//! 1. [`AgentSnapshot`] captures positions and headings into flat buffers.
//! 2. [`boids_index::SpatialHashGrid`] assigns each agent a jittered lattice cell.
//! 3. [`aggregate_cells`] reduces each cell into position and heading sums.
//! 4. [`TickContext::integrate`] derives steering forces and moves every agent
//!    at constant speed.
//!
//! [`step`] runs one tick over a caller-owned [`Population`]; [`FlockWorld`]
//! adds a tick counter, a seeded RNG, a bounded worker pool, and history.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;
pub mod config;
pub mod forces;
pub mod pipeline;
pub mod population;
pub mod snapshot;
pub mod world;

pub use aggregate::{CellAggregate, CellTable, aggregate_cells};
pub use boids_index::{GridJitter, IndexError, LatticeFrame};
pub use config::FlockingConfig;
pub use pipeline::{TickContext, TickStats, step};
pub use population::{AgentTransform, FORWARD, Population, UP};
pub use snapshot::AgentSnapshot;
pub use world::FlockWorld;

/// Errors raised while configuring the flocking pipeline.
#[derive(Debug, Error)]
pub enum FlockError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The spatial index rejected a parameter.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// The bounded worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Simulation clock (ticks processed since start).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Summary of a completed tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub stats: TickStats,
}
