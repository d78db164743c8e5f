//! Core 3-D group-affinity particle simulation library.
//!
//! Main components:
//! - [`affinity`]: the group-to-group attraction/repulsion table.
//! - [`grid`]: the per-tick spatial hash used for neighbor queries.
//! - [`force`]: the pairwise, confinement and swirl force kernel.
//! - [`integrator`]: position and orientation updates.
//! - [`phases`]: the three parallel phases of a tick.
//! - [`simulation`]: the orchestrator owning particle state.
//! - [`config`]: environment settings and kernel gains.
//! - [`error`]: configuration and simulation errors.
//! - [`types`]: shared type aliases and the particle record.

pub mod affinity;
pub mod config;
pub mod error;
pub mod force;
pub mod grid;
pub mod integrator;
pub mod phases;
pub mod simulation;
pub mod types;
