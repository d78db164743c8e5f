//! The three parallel phases of a simulation tick.
//!
//! A tick runs them strictly in order:
//! 1. [`build_grid_phase`]: bucket the current positions into a fresh
//!    [`SpatialHashGrid`].
//! 2. [`force_phase`]: every particle sums the forces from its grid
//!    neighbors and the boundary, and updates its own velocity.
//! 3. [`integrate_phase`]: every particle moves along its new velocity
//!    and refreshes its orientation.
//!
//! Each phase is a rayon parallel iterator over particles. A phase returns
//! only once every worker has finished, which is the barrier the next phase
//! relies on.

use glam::Vec3;
use rayon::prelude::*;

use crate::{
    affinity::GroupAffinityMatrix,
    config::EnvironmentSettings,
    force,
    grid::SpatialHashGrid,
    integrator::{self, ORIENTATION_EPSILON},
    types::GroupId,
};

/// Builds this tick's grid from the current positions.
///
/// The returned grid replaces any previous one; nothing carries over.
pub fn build_grid_phase(positions: &[Vec3], settings: &EnvironmentSettings) -> SpatialHashGrid {
    SpatialHashGrid::build(positions, settings)
}

/// Updates every particle's velocity from the forces acting on it.
///
/// Positions, groups, the affinity table and the grid are shared read-only.
/// Each worker writes only to `velocities[i]` for the particle it owns.
///
/// ### Parameters
/// - `positions` - Positions the grid was built from.
/// - `velocities` - Velocities to update in place.
/// - `groups` - Group label of every particle.
/// - `affinity` - Group-to-group affinity table.
/// - `grid` - Grid built from `positions` this tick.
/// - `settings` - Kernel gains, mass, drag and confinement radius.
/// - `dt` - Tick length in seconds.
pub fn force_phase(
    positions: &[Vec3],
    velocities: &mut [Vec3],
    groups: &[GroupId],
    affinity: &GroupAffinityMatrix,
    grid: &SpatialHashGrid,
    settings: &EnvironmentSettings,
    dt: f32,
) {
    velocities.par_iter_mut().enumerate().for_each(|(i, v)| {
        *v = force::step_velocity(i, *v, positions, groups, affinity, grid, settings, dt);
    });
}

/// Moves every particle along its committed velocity.
///
/// Orientations follow the velocity only where it is fast enough to have a
/// direction (see [`ORIENTATION_EPSILON`]).
pub fn integrate_phase(
    positions: &mut [Vec3],
    orientations: &mut [Vec3],
    velocities: &[Vec3],
    dt: f32,
) {
    positions
        .par_iter_mut()
        .zip(orientations.par_iter_mut())
        .zip(velocities.par_iter())
        .for_each(|((p, o), &v)| {
            *p = integrator::integrate(*p, v, dt);
            *o = integrator::orientation(v, *o, ORIENTATION_EPSILON);
        });
}
