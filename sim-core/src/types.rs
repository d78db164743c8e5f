use glam::Vec3;

/// Identifier for a particle in a [`crate::simulation::Simulation`].
///
/// This is an index into the simulation's state arrays, and is only
/// meaningful between two resets of the same `Simulation`.
pub type ParticleId = usize;

/// Categorical group label. Indexes rows and columns of
/// [`crate::affinity::GroupAffinityMatrix`].
pub type GroupId = usize;

/// A single particle as seen by collaborators.
///
/// The simulation itself stores particles as separate position, velocity
/// and group arrays; this record is only used to pass initial state in and
/// to read a particle back out in one call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub group: GroupId,
}

impl Particle {
    pub fn new(position: Vec3, velocity: Vec3, group: GroupId) -> Self {
        Self {
            position,
            velocity,
            group,
        }
    }

    /// A particle at rest.
    pub fn at_rest(position: Vec3, group: GroupId) -> Self {
        Self::new(position, Vec3::ZERO, group)
    }
}
