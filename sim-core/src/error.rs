//! Error types for configuration and simulation state.

use glam::Vec3;

use crate::{
    simulation::TickPhase,
    types::{GroupId, ParticleId},
};

/// An [`crate::config::EnvironmentSettings`] value outside its valid range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("mass must be positive and finite, got {0}")]
    NonPositiveMass(f32),
    #[error("drag must be non-negative and finite, got {0}")]
    NegativeDrag(f32),
    #[error("confinement radius must be positive and finite, got {0}")]
    NonPositiveMaxRadius(f32),
    #[error("grid resolution must be in 1..={max}, got {got}")]
    GridResolution { got: u32, max: u32 },
    #[error("affinity range [{min}, {max}] is empty or not finite")]
    AffinityRange { min: f32, max: f32 },
    #[error("kernel gain `{name}` is not finite")]
    NonFiniteKernel { name: &'static str },
    #[error("kernel decay `{name}` must be non-negative, got {value}")]
    NegativeDecay { name: &'static str, value: f32 },
    #[error("spawn half extent must be non-negative and finite, got {0}")]
    SpawnExtent(f32),
    #[error("maximum time step must be positive and finite, got {0}")]
    MaxTimeStep(f32),
}

/// Errors raised by [`crate::simulation::Simulation`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("a simulation needs at least one group")]
    NoGroups,
    #[error("particle {particle} has group {group}, but only {group_count} groups exist")]
    GroupOutOfRange {
        particle: ParticleId,
        group: GroupId,
        group_count: usize,
    },
    #[error("affinity matrix for {group_count} groups needs {expected} values, got {got}")]
    AffinityShape {
        group_count: usize,
        expected: usize,
        got: usize,
    },
    #[error("affinity entry ({a}, {b}) is not finite")]
    NonFiniteAffinity { a: GroupId, b: GroupId },
    #[error("time step must be finite and non-negative, got {0}")]
    InvalidTimeStep(f32),
    #[error("particle {particle} has non-finite {field} {value} after tick {tick}")]
    NonFinite {
        particle: ParticleId,
        field: &'static str,
        value: Vec3,
        tick: u64,
    },
    #[error("reset is only accepted between ticks, simulation is in {0:?}")]
    NotIdle(TickPhase),
}
