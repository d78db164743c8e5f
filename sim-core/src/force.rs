//! Per-particle force kernel and velocity update.
//!
//! Every function here is pure: it reads shared state and returns a value.
//! The force phase writes the result into the particle's own velocity slot
//! only, which is what lets all particles run in parallel without locks.

use glam::Vec3;

use crate::{
    affinity::GroupAffinityMatrix,
    config::{EnvironmentSettings, KernelGains},
    grid::SpatialHashGrid,
    types::{GroupId, ParticleId},
};

/// Force a particle feels from one neighbor at offset `dir` (neighbor minus
/// self), given the affinity of its group toward the neighbor's group.
///
/// Repulsion always pushes away and dominates at short range; attraction
/// follows the sign of `affinity`. Coincident particles contribute nothing.
#[inline]
pub fn pair_force(dir: Vec3, affinity: f32, gains: &KernelGains) -> Vec3 {
    let dist_sq = dir.length_squared();
    let dir_norm = dir.normalize_or_zero();

    let repulsion = dir_norm * (-gains.repulsion_decay * dist_sq).exp() * gains.repulsion_gain;
    let attraction =
        affinity * dir_norm * (-gains.attraction_decay * dist_sq).exp() * gains.attraction_gain;

    attraction - repulsion
}

/// Inward pull toward the center that grows as the particle nears or
/// crosses the confinement radius. At or beyond the boundary its magnitude
/// is exactly `edge_gain`. Zero at the origin.
pub fn confinement_force(position: Vec3, settings: &EnvironmentSettings) -> Vec3 {
    let inward = -position.normalize_or_zero();
    let dist_from_edge = (settings.max_radius - position.length()).max(0.0);
    inward * (-settings.kernel.edge_decay * dist_from_edge).exp() * settings.kernel.edge_gain
}

/// Tangential bias around `swirl_axis` that keeps the population rotating.
pub fn swirl_force(position: Vec3, gains: &KernelGains) -> Vec3 {
    if gains.swirl_gain == 0.0 {
        return Vec3::ZERO;
    }
    let inward = -position.normalize_or_zero();
    inward.cross(gains.swirl_axis) * gains.swirl_gain
}

/// Sum of all forces on particle `id` for the current grid snapshot.
pub fn accumulate_force(
    id: ParticleId,
    positions: &[Vec3],
    groups: &[GroupId],
    affinity: &GroupAffinityMatrix,
    grid: &SpatialHashGrid,
    settings: &EnvironmentSettings,
) -> Vec3 {
    let gains = &settings.kernel;
    let pos = positions[id];
    let row = affinity.row(groups[id]);

    let mut force = Vec3::ZERO;
    for other in grid.neighbors(id) {
        if other == id {
            continue;
        }
        force += pair_force(positions[other] - pos, row[groups[other]], gains);
    }

    force + confinement_force(pos, settings) + swirl_force(pos, gains)
}

/// Explicit Euler velocity step with linear drag.
///
/// The damping factor `1 - dt * drag` is clamped at zero so a large time
/// step stops the particle instead of reversing it.
#[inline]
pub fn apply_drag(velocity: Vec3, accel: Vec3, dt: f32, drag: f32) -> Vec3 {
    let damping = (1.0 - dt * drag).clamp(0.0, 1.0);
    (velocity + accel * dt) * damping
}

/// New velocity of particle `id` after one tick of length `dt`.
///
/// `velocity` is the particle's current velocity; no other particle's
/// velocity is needed.
#[allow(clippy::too_many_arguments)]
pub fn step_velocity(
    id: ParticleId,
    velocity: Vec3,
    positions: &[Vec3],
    groups: &[GroupId],
    affinity: &GroupAffinityMatrix,
    grid: &SpatialHashGrid,
    settings: &EnvironmentSettings,
    dt: f32,
) -> Vec3 {
    let force = accumulate_force(id, positions, groups, affinity, grid, settings);
    let accel = force / settings.mass;
    apply_drag(velocity, accel, dt, settings.drag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "expected {b}, got {a}");
    }

    #[test]
    fn coincident_pair_contributes_nothing() {
        let f = pair_force(Vec3::ZERO, 1.0, &KernelGains::default());
        assert_eq!(f, Vec3::ZERO);
    }

    #[test]
    fn zero_affinity_pair_only_repels() {
        let gains = KernelGains::default();
        let dir = Vec3::new(0.5, 0.0, 0.0);
        let f = pair_force(dir, 0.0, &gains);

        let expected = -Vec3::X * (-gains.repulsion_decay * 0.25).exp() * gains.repulsion_gain;
        assert_close(f, expected);
        assert!(f.x < 0.0, "force should point away from the neighbor");
    }

    #[test]
    fn positive_affinity_attracts_at_mid_range() {
        let gains = KernelGains::default();
        let f = pair_force(Vec3::new(0.0, 1.5, 0.0), 1.0, &gains);
        assert!(f.y > 0.0);
    }

    #[test]
    fn negative_affinity_adds_repulsion() {
        let gains = KernelGains::default();
        let dir = Vec3::new(0.0, 0.0, 1.0);
        let neutral = pair_force(dir, 0.0, &gains);
        let hostile = pair_force(dir, -1.0, &gains);
        assert!(hostile.z < neutral.z);
    }

    #[test]
    fn confinement_at_boundary_equals_edge_gain() {
        let settings = EnvironmentSettings::default();
        let p = Vec3::new(0.0, settings.max_radius, 0.0);
        let f = confinement_force(p, &settings);

        assert!(f.is_finite());
        assert_close(f, -Vec3::Y * settings.kernel.edge_gain);
    }

    #[test]
    fn confinement_outside_boundary_is_capped() {
        let settings = EnvironmentSettings::default();
        let f = confinement_force(Vec3::new(settings.max_radius * 3.0, 0.0, 0.0), &settings);
        assert_close(f, -Vec3::X * settings.kernel.edge_gain);
    }

    #[test]
    fn confinement_at_origin_is_zero() {
        let settings = EnvironmentSettings::default();
        assert_eq!(confinement_force(Vec3::ZERO, &settings), Vec3::ZERO);
    }

    #[test]
    fn confinement_weakens_toward_center() {
        let settings = EnvironmentSettings::default();
        let near_edge = confinement_force(Vec3::X * (settings.max_radius - 0.5), &settings);
        let inside = confinement_force(Vec3::X * (settings.max_radius - 5.0), &settings);
        assert!(near_edge.length() > inside.length());
        assert!(inside.x < 0.0);
    }

    #[test]
    fn swirl_is_tangential_and_optional() {
        let mut gains = KernelGains::default();
        let p = Vec3::new(5.0, 0.0, 0.0);
        assert_eq!(swirl_force(p, &gains), Vec3::ZERO);

        gains.swirl_gain = 0.5;
        gains.swirl_axis = Vec3::Y;
        let f = swirl_force(p, &gains);
        // (-X) × Y = -Z
        assert_close(f, Vec3::new(0.0, 0.0, -0.5));
        assert_eq!(f.dot(p), 0.0);
        assert_eq!(swirl_force(Vec3::ZERO, &gains), Vec3::ZERO);
    }

    #[test]
    fn drag_factor_never_inverts_velocity() {
        let v = apply_drag(Vec3::X, Vec3::ZERO, 10.0, 1.0);
        assert_eq!(v, Vec3::ZERO);

        let v = apply_drag(Vec3::X, Vec3::ZERO, 0.1, 1.0);
        assert_close(v, Vec3::X * 0.9);

        let v = apply_drag(Vec3::ZERO, Vec3::Y * 2.0, 0.5, 0.0);
        assert_close(v, Vec3::Y);
    }

    #[test]
    fn step_velocity_skips_self_and_sums_neighbors() {
        let mut settings = EnvironmentSettings::default();
        settings.kernel.edge_gain = 0.0;
        settings.drag = 0.0;
        settings.mass = 2.0;

        let positions = vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)];
        let groups = vec![0, 0, 0];
        let affinity = GroupAffinityMatrix::uniform(1, 1.0);
        let grid = SpatialHashGrid::build(&positions, &settings);

        // Symmetric neighbors cancel out on the middle particle.
        let v = step_velocity(0, Vec3::Z, &positions, &groups, &affinity, &grid, &settings, 0.1);
        assert_close(v, Vec3::Z);

        // The outer particle is pulled by the pair force only.
        let v = step_velocity(1, Vec3::ZERO, &positions, &groups, &affinity, &grid, &settings, 0.1);
        let f = pair_force(-Vec3::X, 1.0, &settings.kernel)
            + pair_force(-Vec3::X * 2.0, 1.0, &settings.kernel);
        assert_close(v, f / 2.0 * 0.1);
    }

    #[test]
    fn affinity_lookup_uses_own_row() {
        let mut settings = EnvironmentSettings::default();
        settings.kernel.edge_gain = 0.0;
        settings.kernel.repulsion_gain = 0.0;

        let positions = vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)];
        let groups = vec![0, 1];
        // Group 0 chases group 1, group 1 flees group 0.
        let affinity = GroupAffinityMatrix::from_values(2, vec![0.0, 1.0, -1.0, 0.0]).unwrap();
        let grid = SpatialHashGrid::build(&positions, &settings);

        let f0 = accumulate_force(0, &positions, &groups, &affinity, &grid, &settings);
        let f1 = accumulate_force(1, &positions, &groups, &affinity, &grid, &settings);
        assert!(f0.x > 0.0, "group 0 should move toward group 1");
        assert!(f1.x > 0.0, "group 1 should move away from group 0");
    }
}
