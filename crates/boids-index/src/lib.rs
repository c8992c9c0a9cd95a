//! Spatial hashing used to partition flocking agents into approximate neighborhoods.
//!
//! Every tick the grid is rebuilt from scratch: positions are shifted by a random
//! offset, rotated by a random orientation, and floored onto a lattice whose cell
//! edge equals the sense distance. Agents that land in the same lattice cell are
//! treated as neighbors for that tick.

use glam::{EulerRot, IVec3, Quat, Vec3};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// Errors emitted when validating spatial index parameters.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell radius).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Validates a lattice cell radius before any frame is drawn from it.
pub fn check_cell_radius(cell_radius: f32) -> Result<(), IndexError> {
    if !cell_radius.is_finite() || cell_radius <= 0.0 {
        return Err(IndexError::InvalidConfig(
            "cell radius must be positive and finite",
        ));
    }
    Ok(())
}

/// How the lattice is placed relative to world axes each tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GridJitter {
    /// Fresh random rotation and offset every tick; suppresses lattice artifacts.
    #[default]
    Randomized,
    /// World-axis-aligned lattice with no offset; reproducible cell membership.
    Fixed,
}

/// Placement of the hashing lattice for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeFrame {
    /// Rotation applied after the offset.
    pub rotation: Quat,
    /// Offset added to every position before rotation.
    pub offset: Vec3,
    /// Edge length of one lattice cell.
    pub cell_radius: f32,
}

impl LatticeFrame {
    /// Lattice aligned with the world axes and anchored at the origin.
    #[must_use]
    pub fn axis_aligned(cell_radius: f32) -> Self {
        assert!(
            check_cell_radius(cell_radius).is_ok(),
            "cell radius must be positive and finite, got {cell_radius}"
        );
        Self {
            rotation: Quat::IDENTITY,
            offset: Vec3::ZERO,
            cell_radius,
        }
    }

    /// Lattice with a uniformly drawn rotation (each Euler angle in [-360°, 360°])
    /// and offset (each component in [-cell_radius / 2, cell_radius / 2]).
    #[must_use]
    pub fn randomized<R: Rng>(cell_radius: f32, rng: &mut R) -> Self {
        let mut frame = Self::axis_aligned(cell_radius);
        let mut angle = || rng.random_range(-360.0_f32..=360.0).to_radians();
        let (x, y, z) = (angle(), angle(), angle());
        frame.rotation = Quat::from_euler(EulerRot::XYZ, x, y, z).normalize();

        let half = cell_radius * 0.5;
        frame.offset = Vec3::new(
            rng.random_range(-half..=half),
            rng.random_range(-half..=half),
            rng.random_range(-half..=half),
        );
        frame
    }

    /// Draw the frame for a tick according to the jitter policy.
    #[must_use]
    pub fn draw<R: Rng>(jitter: GridJitter, cell_radius: f32, rng: &mut R) -> Self {
        match jitter {
            GridJitter::Randomized => Self::randomized(cell_radius, rng),
            GridJitter::Fixed => Self::axis_aligned(cell_radius),
        }
    }

    /// Integer lattice coordinates of the cell containing `position`.
    #[inline]
    #[must_use]
    pub fn cell_of(&self, position: Vec3) -> IVec3 {
        (self.rotation * (position + self.offset) / self.cell_radius)
            .floor()
            .as_ivec3()
    }

    /// Hashed cell key for `position`.
    #[inline]
    #[must_use]
    pub fn key_of(&self, position: Vec3) -> u32 {
        cell_hash(self.cell_of(position))
    }
}

/// Integer hash of a lattice cell.
#[inline]
#[must_use]
pub fn cell_hash(cell: IVec3) -> u32 {
    let mut h = (cell.x as u32).wrapping_mul(0x8DA6_B343)
        ^ (cell.y as u32).wrapping_mul(0xD816_3841)
        ^ (cell.z as u32).wrapping_mul(0xCB1A_B31F);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    h
}

/// A per-tick partition of agent indices into hash buckets.
///
/// Bucket members are stored contiguously: walking [`Self::occupied_buckets`] in
/// order and concatenating [`Self::members`] visits every agent exactly once.
/// Several lattice cells may share a bucket; consumers that need exact cells
/// group members by [`Self::lattice_cell`].
pub trait CellPartition {
    /// Rebuild internal structures from agent positions under `frame`.
    fn rebuild(&mut self, positions: &[Vec3], frame: &LatticeFrame);

    /// Number of agents assigned during the last rebuild.
    fn agent_count(&self) -> usize;

    /// Non-empty buckets in ascending order.
    fn occupied_buckets(&self) -> &[u32];

    /// Agent indices stored in `bucket`.
    fn members(&self, bucket: u32) -> &[u32];

    /// Lattice cell assigned to `agent`.
    fn lattice_cell(&self, agent: usize) -> IVec3;

    /// Position of `agent` in the flat member array.
    fn slot_of(&self, agent: usize) -> usize;
}

/// Spatial hash grid built with a two-pass bucket sort.
///
/// Pass one computes each agent's lattice cell and a histogram of bucket sizes;
/// an exclusive prefix sum turns the histogram into bucket offsets; pass two
/// scatters agent indices into a flat array through per-bucket atomic cursors.
/// Both passes run in parallel and never block on one another.
#[derive(Debug, Clone, Default)]
pub struct SpatialHashGrid {
    cells: Vec<IVec3>,
    slots: Vec<u32>,
    order: Vec<u32>,
    offsets: Vec<u32>,
    occupied: Vec<u32>,
    bucket_mask: u32,
}

impl SpatialHashGrid {
    /// Create an empty grid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grid for `positions` in one call.
    #[must_use]
    pub fn build(positions: &[Vec3], frame: &LatticeFrame) -> Self {
        let mut grid = Self::new();
        grid.rebuild(positions, frame);
        grid
    }

    /// Size of the bucket table (a power of two at least as large as the population).
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Bucket that `cell` hashes into.
    #[inline]
    #[must_use]
    pub fn bucket_of_cell(&self, cell: IVec3) -> u32 {
        cell_hash(cell) & self.bucket_mask
    }

    /// Range of flat slots owned by `bucket`.
    #[must_use]
    pub fn bucket_range(&self, bucket: u32) -> Range<usize> {
        let bucket = bucket as usize;
        self.offsets[bucket] as usize..self.offsets[bucket + 1] as usize
    }

    /// Flat member array; bucket ranges index into it.
    #[must_use]
    pub fn order(&self) -> &[u32] {
        &self.order
    }
}

impl CellPartition for SpatialHashGrid {
    fn rebuild(&mut self, positions: &[Vec3], frame: &LatticeFrame) {
        let agent_count = positions.len();
        assert!(
            u32::try_from(agent_count).is_ok_and(|n| n < u32::MAX),
            "population of {agent_count} agents exceeds the u32 index range"
        );

        let bucket_count = agent_count.next_power_of_two().max(1);
        self.bucket_mask = (bucket_count - 1) as u32;

        let histogram: Vec<AtomicU32> = (0..bucket_count)
            .into_par_iter()
            .map(|_| AtomicU32::new(0))
            .collect();
        self.cells = positions
            .par_iter()
            .map(|&position| frame.cell_of(position))
            .collect();
        let mask = self.bucket_mask;
        let buckets: Vec<u32> = self
            .cells
            .par_iter()
            .map(|&cell| {
                let bucket = cell_hash(cell) & mask;
                histogram[bucket as usize].fetch_add(1, Ordering::Relaxed);
                bucket
            })
            .collect();

        self.offsets.clear();
        self.offsets.reserve(bucket_count + 1);
        self.occupied.clear();
        let mut running = 0u32;
        for (bucket, count) in histogram.iter().enumerate() {
            let count = count.load(Ordering::Relaxed);
            self.offsets.push(running);
            if count > 0 {
                self.occupied.push(bucket as u32);
            }
            running += count;
        }
        self.offsets.push(running);
        debug_assert_eq!(running as usize, agent_count);

        let cursors: Vec<AtomicU32> = self.offsets[..bucket_count]
            .par_iter()
            .map(|&offset| AtomicU32::new(offset))
            .collect();
        self.slots = buckets
            .par_iter()
            .map(|&bucket| cursors[bucket as usize].fetch_add(1, Ordering::Relaxed))
            .collect();

        let order: Vec<AtomicU32> = (0..agent_count)
            .into_par_iter()
            .map(|_| AtomicU32::new(u32::MAX))
            .collect();
        self.slots
            .par_iter()
            .enumerate()
            .for_each(|(agent, &slot)| order[slot as usize].store(agent as u32, Ordering::Relaxed));
        self.order = order.into_par_iter().map(AtomicU32::into_inner).collect();
        debug_assert!(self.order.iter().all(|&agent| agent != u32::MAX));
    }

    fn agent_count(&self) -> usize {
        self.cells.len()
    }

    fn occupied_buckets(&self) -> &[u32] {
        &self.occupied
    }

    fn members(&self, bucket: u32) -> &[u32] {
        &self.order[self.bucket_range(bucket)]
    }

    fn lattice_cell(&self, agent: usize) -> IVec3 {
        self.cells[agent]
    }

    fn slot_of(&self, agent: usize) -> usize {
        self.slots[agent] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    fn scattered_positions(count: usize, extent: f32) -> Vec<Vec3> {
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        (0..count)
            .map(|_| {
                Vec3::new(
                    rng.random_range(-extent..extent),
                    rng.random_range(-extent..extent),
                    rng.random_range(-extent..extent),
                )
            })
            .collect()
    }

    #[test]
    fn rejects_non_positive_cell_radius() {
        assert!(check_cell_radius(0.0).is_err());
        assert!(check_cell_radius(-1.0).is_err());
        assert!(check_cell_radius(f32::NAN).is_err());
        assert!(check_cell_radius(10.0).is_ok());
    }

    #[test]
    fn axis_aligned_frame_floors_onto_lattice() {
        let frame = LatticeFrame::axis_aligned(5.0);
        assert_eq!(frame.cell_of(Vec3::new(0.0, 0.0, 0.0)), IVec3::ZERO);
        assert_eq!(frame.cell_of(Vec3::new(0.0, 0.0, 4.9)), IVec3::ZERO);
        assert_eq!(frame.cell_of(Vec3::new(0.0, 0.0, 5.0)), IVec3::new(0, 0, 1));
        assert_eq!(
            frame.cell_of(Vec3::new(-0.1, 7.5, -12.0)),
            IVec3::new(-1, 1, -3)
        );
    }

    #[test]
    fn randomized_offset_stays_within_half_cell() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..256 {
            let frame = LatticeFrame::randomized(10.0, &mut rng);
            assert!(frame.offset.abs().max_element() <= 5.0);
            assert!((frame.rotation.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn same_position_same_key_within_frame() {
        let mut rng = SmallRng::seed_from_u64(99);
        let frame = LatticeFrame::randomized(3.0, &mut rng);
        let position = Vec3::new(1.25, -7.5, 13.0);
        assert_eq!(frame.key_of(position), frame.key_of(position));

        let grid = SpatialHashGrid::build(&[position, Vec3::splat(40.0), position], &frame);
        assert_eq!(grid.lattice_cell(0), grid.lattice_cell(2));
        let bucket = grid.bucket_of_cell(grid.lattice_cell(0));
        let members = grid.members(bucket);
        assert!(members.contains(&0));
        assert!(members.contains(&2));
    }

    #[test]
    fn buckets_partition_every_agent_once() {
        let positions = scattered_positions(2_000, 30.0);
        let mut rng = SmallRng::seed_from_u64(11);
        let frame = LatticeFrame::randomized(4.0, &mut rng);
        let grid = SpatialHashGrid::build(&positions, &frame);

        assert_eq!(grid.agent_count(), positions.len());
        assert_eq!(grid.bucket_count(), 2_048);

        let mut seen = vec![false; positions.len()];
        let mut visited = 0;
        for &bucket in grid.occupied_buckets() {
            let members = grid.members(bucket);
            assert!(!members.is_empty());
            for (offset, &agent) in members.iter().enumerate() {
                let agent = agent as usize;
                assert!(!seen[agent], "agent {agent} appears twice");
                seen[agent] = true;
                assert_eq!(grid.bucket_of_cell(grid.lattice_cell(agent)), bucket);
                assert_eq!(grid.slot_of(agent), grid.bucket_range(bucket).start + offset);
            }
            visited += members.len();
        }
        assert_eq!(visited, positions.len());
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn occupied_buckets_are_ascending_and_tile_the_order() {
        let positions = scattered_positions(500, 10.0);
        let grid = SpatialHashGrid::build(&positions, &LatticeFrame::axis_aligned(2.0));
        let occupied = grid.occupied_buckets();
        assert!(occupied.windows(2).all(|pair| pair[0] < pair[1]));

        let mut next = 0;
        for &bucket in occupied {
            let range = grid.bucket_range(bucket);
            assert_eq!(range.start, next);
            next = range.end;
        }
        assert_eq!(next, grid.order().len());
    }

    #[test]
    fn empty_population_builds_empty_grid() {
        let grid = SpatialHashGrid::build(&[], &LatticeFrame::axis_aligned(1.0));
        assert_eq!(grid.agent_count(), 0);
        assert!(grid.occupied_buckets().is_empty());
        assert!(grid.order().is_empty());
        assert_eq!(grid.bucket_count(), 1);
    }

    #[test]
    fn fixed_jitter_is_reproducible_across_rebuilds() {
        let positions = scattered_positions(300, 15.0);
        let mut rng = SmallRng::seed_from_u64(1);
        let first = SpatialHashGrid::build(&positions, &LatticeFrame::draw(GridJitter::Fixed, 5.0, &mut rng));
        let second =
            SpatialHashGrid::build(&positions, &LatticeFrame::draw(GridJitter::Fixed, 5.0, &mut rng));
        for agent in 0..positions.len() {
            assert_eq!(first.lattice_cell(agent), second.lattice_cell(agent));
        }
        assert_eq!(first.occupied_buckets(), second.occupied_buckets());
    }
}
