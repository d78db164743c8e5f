//! The simulation orchestrator.
//!
//! [`Simulation`] owns the particle state arrays and the affinity table and
//! drives each tick through the [`TickPhase`] sequence
//! `Idle → BuildGrid → ComputeForces → Integrate → Idle`. The caller owns
//! the clock: every [`Simulation::tick`] is given its `dt` explicitly.

use glam::Vec3;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    affinity::GroupAffinityMatrix,
    config::{CUTOFF_THRESHOLD, EnvironmentSettings},
    error::SimError,
    integrator, phases,
    types::{GroupId, Particle, ParticleId},
};

/// Where a tick currently is.
///
/// Between calls a simulation is always `Idle`. Any other value seen from
/// outside means a tick unwound part way through. Such a simulation is
/// poisoned: it refuses further ticks until [`Simulation::reset`] replaces
/// its state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickPhase {
    #[default]
    Idle,
    BuildGrid,
    ComputeForces,
    Integrate,
}

/// Parameters of a reset, queued through [`Simulation::request_reset`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResetRequest {
    pub seed: Option<u64>,
    pub count: usize,
    pub group_count: usize,
    pub settings: EnvironmentSettings,
}

#[derive(Debug, Clone)]
pub struct Simulation {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    orientations: Vec<Vec3>,
    groups: Vec<GroupId>,
    affinity: GroupAffinityMatrix,
    settings: EnvironmentSettings,

    phase: TickPhase,
    pending_reset: Option<ResetRequest>,
    tick_count: u64,
    seed: Option<u64>,
}

impl Simulation {
    /// Creates a population of `count` particles in `group_count` groups.
    ///
    /// With a `seed`, the affinity matrix, groups and positions are
    /// reproducible bit-for-bit. Random values are drawn in this order:
    /// the affinity matrix row by row, then for every particle its group and
    /// its position's x, y and z.
    ///
    /// ### Errors
    /// - [`SimError::Config`] if `settings` fails validation.
    /// - [`SimError::NoGroups`] if `group_count` is zero.
    pub fn new(
        seed: Option<u64>,
        count: usize,
        group_count: usize,
        settings: EnvironmentSettings,
    ) -> Result<Self, SimError> {
        settings.validate()?;
        if group_count == 0 {
            return Err(SimError::NoGroups);
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let affinity = GroupAffinityMatrix::random(group_count, settings.affinity_range, &mut rng);
        let h = settings.spawn.half_extent;
        let particles = (0..count)
            .map(|_| {
                let group = rng.random_range(0..group_count);
                let position = Vec3::new(
                    rng.random_range(-h..=h),
                    rng.random_range(-h..=h),
                    rng.random_range(-h..=h),
                );
                Particle::new(position, settings.spawn.initial_velocity, group)
            })
            .collect();

        let mut sim = Self::from_particles(particles, affinity, settings)?;
        sim.seed = seed;
        log::debug!(
            "spawned {count} particles in {group_count} groups (seed {:?})",
            seed
        );
        Ok(sim)
    }

    /// Creates a simulation from explicit particles and affinity table.
    ///
    /// ### Errors
    /// - [`SimError::Config`] if `settings` fails validation.
    /// - [`SimError::GroupOutOfRange`] for the first particle whose group
    ///   has no row in `affinity`.
    pub fn from_particles(
        particles: Vec<Particle>,
        affinity: GroupAffinityMatrix,
        settings: EnvironmentSettings,
    ) -> Result<Self, SimError> {
        settings.validate()?;
        let group_count = affinity.group_count();
        if group_count == 0 {
            return Err(SimError::NoGroups);
        }
        if let Some((particle, p)) = particles
            .iter()
            .enumerate()
            .find(|(_, p)| p.group >= group_count)
        {
            return Err(SimError::GroupOutOfRange {
                particle,
                group: p.group,
                group_count,
            });
        }

        let cutoff = settings.effective_cutoff(CUTOFF_THRESHOLD);
        if cutoff > settings.cell_width() {
            log::warn!(
                "kernel reaches {cutoff:.3} but grid cells are {:.3} wide; \
                 interactions beyond the neighboring cells are ignored",
                settings.cell_width()
            );
        }

        Ok(Self {
            positions: particles.iter().map(|p| p.position).collect(),
            velocities: particles.iter().map(|p| p.velocity).collect(),
            orientations: particles
                .iter()
                .map(|p| integrator::initial_orientation(p.velocity))
                .collect(),
            groups: particles.iter().map(|p| p.group).collect(),
            affinity,
            settings,
            phase: TickPhase::Idle,
            pending_reset: None,
            tick_count: 0,
            seed: None,
        })
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// `dt` is clamped to [`EnvironmentSettings::max_time_step`]. In debug
    /// builds the resulting state is checked with [`Self::check_finite`].
    /// A reset queued with [`Self::request_reset`] is applied once the tick
    /// has completed.
    pub fn tick(&mut self, dt: f32) -> Result<(), SimError> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::InvalidTimeStep(dt));
        }
        if self.phase != TickPhase::Idle {
            return Err(SimError::NotIdle(self.phase));
        }
        let dt = dt.min(self.settings.max_time_step);

        self.phase = TickPhase::BuildGrid;
        let grid = phases::build_grid_phase(&self.positions, &self.settings);

        self.phase = TickPhase::ComputeForces;
        phases::force_phase(
            &self.positions,
            &mut self.velocities,
            &self.groups,
            &self.affinity,
            &grid,
            &self.settings,
            dt,
        );

        self.phase = TickPhase::Integrate;
        phases::integrate_phase(
            &mut self.positions,
            &mut self.orientations,
            &self.velocities,
            dt,
        );

        self.phase = TickPhase::Idle;
        self.tick_count += 1;
        log::trace!(
            "tick {} done: dt={dt}, {} occupied buckets",
            self.tick_count,
            grid.occupied_buckets()
        );

        if cfg!(debug_assertions) {
            self.check_finite()?;
        }

        if let Some(request) = self.pending_reset.take() {
            self.apply_reset(request)?;
        }
        Ok(())
    }

    /// Replaces all state with a freshly spawned population.
    ///
    /// This also clears a poisoned [`TickPhase`]. On error the current
    /// state is left untouched.
    pub fn reset(
        &mut self,
        seed: Option<u64>,
        count: usize,
        group_count: usize,
        settings: EnvironmentSettings,
    ) -> Result<(), SimError> {
        self.apply_reset(ResetRequest {
            seed,
            count,
            group_count,
            settings,
        })
    }

    /// Queues a reset to run right after the next tick completes.
    ///
    /// The request is validated here, so a queued reset cannot fail once
    /// the tick is done. A later request replaces an earlier one that has
    /// not run yet; a rejected request leaves any queued one in place.
    ///
    /// ### Errors
    /// - [`SimError::Config`] if `request.settings` fails validation.
    /// - [`SimError::NoGroups`] if `request.group_count` is zero.
    pub fn request_reset(&mut self, request: ResetRequest) -> Result<(), SimError> {
        request.settings.validate()?;
        if request.group_count == 0 {
            return Err(SimError::NoGroups);
        }
        if self.pending_reset.replace(request).is_some() {
            log::debug!("replacing pending reset request");
        }
        Ok(())
    }

    pub fn pending_reset(&self) -> Option<&ResetRequest> {
        self.pending_reset.as_ref()
    }

    fn apply_reset(&mut self, request: ResetRequest) -> Result<(), SimError> {
        if self.phase != TickPhase::Idle {
            log::warn!("resetting a simulation poisoned in {:?}", self.phase);
        }
        *self = Self::new(
            request.seed,
            request.count,
            request.group_count,
            request.settings,
        )?;
        Ok(())
    }

    /// Checks that no position or velocity holds a NaN or infinity.
    pub fn check_finite(&self) -> Result<(), SimError> {
        for (particle, (p, v)) in self.positions.iter().zip(&self.velocities).enumerate() {
            for (field, value) in [("position", *p), ("velocity", *v)] {
                if !value.is_finite() {
                    return Err(SimError::NonFinite {
                        particle,
                        field,
                        value,
                        tick: self.tick_count,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn position(&self, id: ParticleId) -> Vec3 {
        self.positions[id]
    }

    pub fn velocity(&self, id: ParticleId) -> Vec3 {
        self.velocities[id]
    }

    pub fn group(&self, id: ParticleId) -> GroupId {
        self.groups[id]
    }

    /// Unit look direction for renderers, following the velocity.
    pub fn orientation(&self, id: ParticleId) -> Vec3 {
        self.orientations[id]
    }

    pub fn particle(&self, id: ParticleId) -> Particle {
        Particle::new(self.positions[id], self.velocities[id], self.groups[id])
    }

    /// Affinity of group `a` toward group `b`.
    ///
    /// # Panics
    /// If either group is `>= group_count()`.
    pub fn affinity(&self, a: GroupId, b: GroupId) -> f32 {
        self.affinity.get(a, b)
    }

    pub fn affinity_matrix(&self) -> &GroupAffinityMatrix {
        &self.affinity
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.affinity.group_count()
    }

    pub fn settings(&self) -> &EnvironmentSettings {
        &self.settings
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Ticks completed since the last reset.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Seed of the current population, if it was seeded.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}
