//! Reduction of hash buckets into per-cell position and heading sums.

use boids_index::CellPartition;
use glam::{IVec3, Vec3};
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::snapshot::AgentSnapshot;

/// Aggregate of every agent that shared a lattice cell this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellAggregate {
    /// Lattice coordinates shared by all members.
    pub lattice_cell: IVec3,
    /// First member encountered; the aggregate is attributed to it.
    pub representative: u32,
    /// Exact sum (not average) of member positions.
    pub position_sum: Vec3,
    /// Sum of member headings.
    pub heading_sum: Vec3,
    /// Number of members, including the representative.
    pub member_count: u32,
}

impl CellAggregate {
    fn seed(lattice_cell: IVec3, representative: u32, position: Vec3, heading: Vec3) -> Self {
        Self {
            lattice_cell,
            representative,
            position_sum: position,
            heading_sum: heading,
            member_count: 1,
        }
    }

    fn absorb(&mut self, position: Vec3, heading: Vec3) {
        self.position_sum += position;
        self.heading_sum += heading;
        self.member_count += 1;
    }

    /// Members other than the agent asking.
    #[inline]
    #[must_use]
    pub fn nearby_count(&self) -> u32 {
        self.member_count - 1
    }
}

/// Per-tick cell aggregates plus the cell every agent was assigned to.
#[derive(Debug, Clone, Default)]
pub struct CellTable {
    cells: Vec<CellAggregate>,
    assignment: Vec<u32>,
}

impl CellTable {
    /// Number of distinct occupied cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn cells(&self) -> &[CellAggregate] {
        &self.cells
    }

    /// Index into [`Self::cells`] for `agent`.
    #[inline]
    #[must_use]
    pub fn cell_index(&self, agent: usize) -> usize {
        self.assignment[agent] as usize
    }

    /// Aggregate covering `agent`.
    #[inline]
    #[must_use]
    pub fn cell_for(&self, agent: usize) -> &CellAggregate {
        &self.cells[self.cell_index(agent)]
    }

    /// Representative agent holding `agent`'s cell aggregate.
    #[must_use]
    pub fn representative_of(&self, agent: usize) -> u32 {
        self.cell_for(agent).representative
    }
}

/// Reduce every occupied bucket of `partition` into cell aggregates.
///
/// Buckets are reduced in parallel; members within a bucket are walked in
/// order, and members whose lattice cells differ (hash collisions) get
/// separate aggregates.
pub fn aggregate_cells<P>(partition: &P, snapshot: &AgentSnapshot) -> CellTable
where
    P: CellPartition + Sync,
{
    let agent_count = snapshot.len();
    assert_eq!(
        partition.agent_count(),
        agent_count,
        "partition was built from a different population"
    );

    // Local cell ordinal of the agent in each flat slot, later rebased to a
    // global cell index.
    let mut slot_cells = vec![0u32; agent_count];

    let per_bucket: Vec<SmallVec<[CellAggregate; 2]>> = partition
        .occupied_buckets()
        .par_iter()
        .zip(split_by_bucket(&mut slot_cells, partition).into_par_iter())
        .map(|(&bucket, ordinals)| reduce_bucket(partition, bucket, snapshot, ordinals))
        .collect();

    let mut bases = Vec::with_capacity(per_bucket.len());
    let mut cell_count = 0u32;
    for cells in &per_bucket {
        bases.push(cell_count);
        cell_count += cells.len() as u32;
    }

    split_by_bucket(&mut slot_cells, partition)
        .into_par_iter()
        .zip(bases.par_iter())
        .for_each(|(ordinals, &base)| ordinals.iter_mut().for_each(|ordinal| *ordinal += base));

    let cells: Vec<CellAggregate> = per_bucket.into_par_iter().flatten_iter().collect();
    let total_members: usize = cells.iter().map(|cell| cell.member_count as usize).sum();
    assert_eq!(
        total_members, agent_count,
        "cell aggregation lost or duplicated agents"
    );

    let assignment = (0..agent_count)
        .into_par_iter()
        .map(|agent| slot_cells[partition.slot_of(agent)])
        .collect();

    CellTable { cells, assignment }
}

fn reduce_bucket<P: CellPartition>(
    partition: &P,
    bucket: u32,
    snapshot: &AgentSnapshot,
    ordinals: &mut [u32],
) -> SmallVec<[CellAggregate; 2]> {
    let members = partition.members(bucket);
    debug_assert_eq!(members.len(), ordinals.len());
    let positions = snapshot.positions();
    let headings = snapshot.headings();

    let mut cells: SmallVec<[CellAggregate; 2]> = SmallVec::new();
    for (&member, ordinal) in members.iter().zip(ordinals.iter_mut()) {
        let agent = member as usize;
        let lattice_cell = partition.lattice_cell(agent);
        match cells
            .iter()
            .position(|cell| cell.lattice_cell == lattice_cell)
        {
            Some(existing) => {
                cells[existing].absorb(positions[agent], headings[agent]);
                *ordinal = existing as u32;
            }
            None => {
                *ordinal = cells.len() as u32;
                cells.push(CellAggregate::seed(
                    lattice_cell,
                    member,
                    positions[agent],
                    headings[agent],
                ));
            }
        }
    }
    cells
}

/// Split `slots` into one disjoint chunk per occupied bucket.
fn split_by_bucket<'a, P: CellPartition>(slots: &'a mut [u32], partition: &P) -> Vec<&'a mut [u32]> {
    let occupied = partition.occupied_buckets();
    let mut chunks = Vec::with_capacity(occupied.len());
    let mut rest = slots;
    for &bucket in occupied {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(partition.members(bucket).len());
        chunks.push(head);
        rest = tail;
    }
    assert!(rest.is_empty(), "occupied buckets do not cover every agent");
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{AgentTransform, Population};
    use boids_index::{LatticeFrame, SpatialHashGrid};
    use glam::Quat;

    fn population_at(points: &[Vec3]) -> Population {
        points
            .iter()
            .map(|&p| AgentTransform::new(p, Quat::IDENTITY, 0.1))
            .collect()
    }

    fn aggregate_fixed(population: &Population, cell_radius: f32) -> CellTable {
        let snapshot = AgentSnapshot::capture(population);
        let grid = SpatialHashGrid::build(snapshot.positions(), &LatticeFrame::axis_aligned(cell_radius));
        aggregate_cells(&grid, &snapshot)
    }

    /// Every agent lands in one bucket regardless of position.
    struct SingleBucket {
        cells: Vec<IVec3>,
        order: Vec<u32>,
        occupied: Vec<u32>,
    }

    impl CellPartition for SingleBucket {
        fn rebuild(&mut self, positions: &[Vec3], frame: &LatticeFrame) {
            self.cells = positions.iter().map(|&p| frame.cell_of(p)).collect();
            self.order = (0..positions.len() as u32).collect();
            self.occupied = if positions.is_empty() { Vec::new() } else { vec![0] };
        }

        fn agent_count(&self) -> usize {
            self.cells.len()
        }

        fn occupied_buckets(&self) -> &[u32] {
            &self.occupied
        }

        fn members(&self, _bucket: u32) -> &[u32] {
            &self.order
        }

        fn lattice_cell(&self, agent: usize) -> IVec3 {
            self.cells[agent]
        }

        fn slot_of(&self, agent: usize) -> usize {
            agent
        }
    }

    #[test]
    fn shared_cell_sums_every_member() {
        let points = [
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, 0.25, 1.5),
            Vec3::new(2.5, 2.5, 2.5),
        ];
        let table = aggregate_fixed(&population_at(&points), 5.0);
        assert_eq!(table.len(), 1);

        let cell = table.cells()[0];
        assert_eq!(cell.member_count, 4);
        let expected: Vec3 = points.iter().copied().sum();
        assert!((cell.position_sum - expected).length() < 1e-5);
        assert_eq!(cell.heading_sum, Vec3::new(0.0, 0.0, 4.0));
        for agent in 0..points.len() {
            assert_eq!(table.cell_index(agent), 0);
            assert_eq!(table.representative_of(agent), cell.representative);
        }
        assert!((cell.representative as usize) < points.len());
    }

    #[test]
    fn singleton_cells_count_one() {
        let points = [Vec3::ZERO, Vec3::splat(50.0), Vec3::splat(-50.0)];
        let table = aggregate_fixed(&population_at(&points), 5.0);
        assert_eq!(table.len(), 3);
        for agent in 0..points.len() {
            let cell = table.cell_for(agent);
            assert_eq!(cell.member_count, 1);
            assert_eq!(cell.nearby_count(), 0);
            assert_eq!(cell.representative as usize, agent);
            assert_eq!(cell.position_sum, points[agent]);
        }
    }

    #[test]
    fn colliding_bucket_keeps_cells_apart() {
        let points = [
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(30.0, 0.5, 0.5),
            Vec3::new(1.5, 0.5, 0.5),
        ];
        let population = population_at(&points);
        let snapshot = AgentSnapshot::capture(&population);
        let mut partition = SingleBucket {
            cells: Vec::new(),
            order: Vec::new(),
            occupied: Vec::new(),
        };
        partition.rebuild(snapshot.positions(), &LatticeFrame::axis_aligned(5.0));

        let table = aggregate_cells(&partition, &snapshot);
        assert_eq!(table.len(), 2);
        assert_eq!(table.representative_of(0), 0);
        assert_eq!(table.representative_of(2), 0);
        assert_eq!(table.representative_of(1), 1);
        assert_eq!(table.cell_for(0).member_count, 2);
        assert_eq!(table.cell_for(1).member_count, 1);
        assert_eq!(table.cell_for(2).position_sum, Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn member_counts_cover_population() {
        let points: Vec<Vec3> = (0..1_000)
            .map(|i| {
                let t = i as f32;
                Vec3::new((t * 0.37).sin() * 18.0, (t * 0.11).cos() * 18.0, (t * 0.05) % 18.0)
            })
            .collect();
        let table = aggregate_fixed(&population_at(&points), 3.0);
        let total: u32 = table.cells().iter().map(|cell| cell.member_count).sum();
        assert_eq!(total as usize, points.len());
        for agent in 0..points.len() {
            let cell = table.cell_for(agent);
            let representative = cell.representative as usize;
            assert_eq!(table.cell_index(representative), table.cell_index(agent));
        }
    }

    #[test]
    fn empty_snapshot_yields_empty_table() {
        let table = aggregate_fixed(&Population::new(), 1.0);
        assert!(table.is_empty());
    }
}
