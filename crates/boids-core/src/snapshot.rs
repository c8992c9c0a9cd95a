use glam::Vec3;
use rayon::prelude::*;

use crate::population::{FORWARD, Population};

/// Positions and headings captured at the start of a tick.
///
/// Later stages read from the snapshot while the integrator rewrites the
/// population in place, so no agent ever observes a neighbor's updated state
/// within the same tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSnapshot {
    positions: Vec<Vec3>,
    headings: Vec<Vec3>,
}

impl AgentSnapshot {
    /// Capture every agent's position and forward direction in parallel.
    #[must_use]
    pub fn capture(population: &Population) -> Self {
        let (positions, headings) = population
            .positions()
            .par_iter()
            .zip(population.orientations().par_iter())
            .map(|(&position, &orientation)| {
                debug_assert!(position.is_finite(), "non-finite agent position {position}");
                (position, orientation * FORWARD)
            })
            .unzip();
        Self {
            positions,
            headings,
        }
    }

    /// Number of captured agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[must_use]
    pub fn headings(&self) -> &[Vec3] {
        &self.headings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::AgentTransform;
    use glam::Quat;

    #[test]
    fn capture_is_index_aligned() {
        let population: Population = (0..64)
            .map(|i| {
                AgentTransform::new(
                    Vec3::splat(i as f32),
                    Quat::from_rotation_x(i as f32 * 0.1),
                    0.1,
                )
            })
            .collect();
        let snapshot = AgentSnapshot::capture(&population);
        assert_eq!(snapshot.len(), 64);
        for i in 0..64 {
            assert_eq!(snapshot.positions()[i], population.positions()[i]);
            assert_eq!(snapshot.headings()[i], population.heading(i));
        }
    }

    #[test]
    fn empty_population_captures_nothing() {
        let snapshot = AgentSnapshot::capture(&Population::new());
        assert!(snapshot.is_empty());
        assert!(snapshot.headings().is_empty());
    }
}
