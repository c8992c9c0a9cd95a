//! Structure-of-arrays storage for agent transforms.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Local forward axis; an agent's heading is its orientation applied to this.
pub const FORWARD: Vec3 = Vec3::Z;
/// Local up axis, preserved when orientation is rebuilt from velocity.
pub const UP: Vec3 = Vec3::Y;

/// Transform fields for a single agent used when inserting or snapshotting rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentTransform {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: f32,
}

impl AgentTransform {
    /// Creates a transform from its parts.
    #[must_use]
    pub const fn new(position: Vec3, orientation: Quat, scale: f32) -> Self {
        Self {
            position,
            orientation,
            scale,
        }
    }

    /// Unit forward direction.
    #[must_use]
    pub fn heading(&self) -> Vec3 {
        self.orientation * FORWARD
    }
}

impl Default for AgentTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

/// Index-aligned columns for every agent in the flock.
///
/// An agent's identity is its row index. Rows are owned by whoever spawns and
/// removes agents; the flocking pipeline only rewrites positions and orientations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Population {
    positions: Vec<Vec3>,
    orientations: Vec<Quat>,
    scales: Vec<f32>,
}

impl Population {
    /// Create an empty population.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a population with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            orientations: Vec::with_capacity(capacity),
            scales: Vec::with_capacity(capacity),
        }
    }

    /// Number of agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if there are no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve additional capacity in each backing vector.
    pub fn reserve(&mut self, additional: usize) {
        self.positions.reserve(additional);
        self.orientations.reserve(additional);
        self.scales.reserve(additional);
    }

    /// Remove all agents while retaining capacity.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.orientations.clear();
        self.scales.clear();
    }

    /// Append an agent.
    pub fn push(&mut self, agent: AgentTransform) {
        self.positions.push(agent.position);
        self.orientations.push(agent.orientation);
        self.scales.push(agent.scale);
        self.debug_assert_coherent();
    }

    /// Swap-remove the agent at `index` and return its transform.
    pub fn swap_remove(&mut self, index: usize) -> AgentTransform {
        let removed = AgentTransform {
            position: self.positions.swap_remove(index),
            orientation: self.orientations.swap_remove(index),
            scale: self.scales.swap_remove(index),
        };
        self.debug_assert_coherent();
        removed
    }

    /// Truncate all columns to the provided length.
    pub fn truncate(&mut self, len: usize) {
        self.positions.truncate(len);
        self.orientations.truncate(len);
        self.scales.truncate(len);
        self.debug_assert_coherent();
    }

    /// Return a copy of the transform at `index`.
    #[must_use]
    pub fn snapshot(&self, index: usize) -> AgentTransform {
        AgentTransform {
            position: self.positions[index],
            orientation: self.orientations[index],
            scale: self.scales[index],
        }
    }

    /// Unit forward direction of the agent at `index`.
    #[must_use]
    pub fn heading(&self, index: usize) -> Vec3 {
        self.orientations[index] * FORWARD
    }

    /// Immutable access to positions.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Mutable access to positions.
    #[must_use]
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    /// Immutable access to orientations.
    #[must_use]
    pub fn orientations(&self) -> &[Quat] {
        &self.orientations
    }

    /// Mutable access to orientations.
    #[must_use]
    pub fn orientations_mut(&mut self) -> &mut [Quat] {
        &mut self.orientations
    }

    /// Immutable access to scales.
    #[must_use]
    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    /// Positions and orientations borrowed mutably together.
    #[must_use]
    pub fn transforms_mut(&mut self) -> (&mut [Vec3], &mut [Quat]) {
        (&mut self.positions, &mut self.orientations)
    }

    #[inline]
    fn debug_assert_coherent(&self) {
        debug_assert_eq!(self.positions.len(), self.orientations.len());
        debug_assert_eq!(self.positions.len(), self.scales.len());
    }
}

impl FromIterator<AgentTransform> for Population {
    fn from_iter<I: IntoIterator<Item = AgentTransform>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut population = Self::with_capacity(iter.size_hint().0);
        for agent in iter {
            population.push(agent);
        }
        population
    }
}
