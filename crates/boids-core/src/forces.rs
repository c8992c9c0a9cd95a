//! Steering rules and constant-speed integration.

use glam::{Mat3, Quat, Vec3};

use crate::aggregate::CellAggregate;
use crate::config::FlockingConfig;
use crate::population::FORWARD;

/// Separation, cohesion and alignment derived from the agent's cell with the
/// agent's own contribution removed.
///
/// Separation and cohesion act along the same axis in opposite directions:
/// separation is scaled by the needs-to-leave factor and dominates up close,
/// cohesion is constant and dominates once the centroid is a sense distance away.
#[must_use]
pub fn flocking_force(
    position: Vec3,
    heading: Vec3,
    cell: &CellAggregate,
    config: &FlockingConfig,
) -> Vec3 {
    let nearby = cell.nearby_count();
    if nearby == 0 {
        return Vec3::ZERO;
    }
    let nearby = nearby as f32;
    let average_position = (cell.position_sum - position) / nearby;
    let average_heading = (cell.heading_sum - heading) / nearby;

    let to_centroid = average_position - position;
    let need_to_leave = needs_to_leave(to_centroid.length_squared(), config.sense_distance);
    let direction = to_centroid.normalize_or_zero();

    -direction * config.separation_weight * need_to_leave
        + direction * config.cohesion_weight
        + average_heading * config.alignment_weight
}

/// 1 when the neighbor centroid coincides with the agent, falling linearly in
/// squared distance to 0 at the sense distance and beyond.
#[inline]
#[must_use]
pub fn needs_to_leave(distance_sq: f32, sense_distance: f32) -> f32 {
    (1.0 - distance_sq / (sense_distance * sense_distance)).max(0.0)
}

/// Inward push once an agent is inside the boundary band.
///
/// Compares squared-radius clearance against a linear distance: exact at the
/// center, conservative near the surface.
#[must_use]
pub fn obstacle_force(position: Vec3, config: &FlockingConfig) -> Vec3 {
    let clearance = config.cage_radius_sq() - position.length_squared();
    if clearance < config.sense_distance {
        -position.normalize_or_zero() * config.obstacle_weight
    } else {
        Vec3::ZERO
    }
}

/// Apply `force` to the current heading and rescale the result to exactly `speed`.
///
/// A velocity that cancels to zero keeps the current heading; an agent with a
/// degenerate heading and no force stays put rather than producing NaN.
#[must_use]
pub fn integrate_velocity(heading: Vec3, force: Vec3, speed: f32, delta_time: f32) -> Vec3 {
    let velocity = heading * speed + force * delta_time;
    velocity
        .try_normalize()
        .or_else(|| heading.try_normalize())
        .map_or(Vec3::ZERO, |direction| direction * speed)
}

/// Orientation facing `forward` with `up` kept as close as possible.
///
/// Falls back to `current` when `forward` is degenerate and to the shortest arc
/// from the local forward axis when `forward` is parallel to `up`.
#[must_use]
pub fn look_rotation(forward: Vec3, up: Vec3, current: Quat) -> Quat {
    let Some(forward) = forward.try_normalize() else {
        return current;
    };
    let Some(right) = up.cross(forward).try_normalize() else {
        return Quat::from_rotation_arc(FORWARD, forward);
    };
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}
