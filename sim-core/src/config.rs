use glam::Vec3;

use crate::error::ConfigError;

/// Upper bound on cells per axis. The bucket arena holds `resolution³` slots.
pub const MAX_GRID_RESOLUTION: u32 = 128;

/// Kernel magnitude below which a pair interaction is treated as negligible
/// when sizing the grid.
pub const CUTOFF_THRESHOLD: f32 = 1e-3;

/// Gains and decay rates of the force kernel.
///
/// None of these are physical constants; they are tuning knobs and the
/// defaults are just one setting that produces lively clustering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelGains {
    /// Decay of the short-range repulsion with squared distance.
    pub repulsion_decay: f32,
    pub repulsion_gain: f32,
    /// Decay of the affinity-scaled attraction with squared distance.
    pub attraction_decay: f32,
    pub attraction_gain: f32,
    /// Decay of the confinement force with distance from the boundary.
    pub edge_decay: f32,
    pub edge_gain: f32,
    /// Rotational drift around `swirl_axis`. Zero disables it.
    pub swirl_gain: f32,
    pub swirl_axis: Vec3,
}

impl Default for KernelGains {
    fn default() -> Self {
        Self {
            repulsion_decay: 4.0,
            repulsion_gain: 2.0,
            attraction_decay: 1.25,
            attraction_gain: 1.0,
            edge_decay: 1.0,
            edge_gain: 4.0,
            swirl_gain: 0.0,
            swirl_axis: Vec3::Y,
        }
    }
}

impl KernelGains {
    fn validate(&self) -> Result<(), ConfigError> {
        let scalars = [
            ("repulsion_decay", self.repulsion_decay),
            ("repulsion_gain", self.repulsion_gain),
            ("attraction_decay", self.attraction_decay),
            ("attraction_gain", self.attraction_gain),
            ("edge_decay", self.edge_decay),
            ("edge_gain", self.edge_gain),
            ("swirl_gain", self.swirl_gain),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteKernel { name });
            }
        }
        if !self.swirl_axis.is_finite() {
            return Err(ConfigError::NonFiniteKernel { name: "swirl_axis" });
        }

        let decays = [
            ("repulsion_decay", self.repulsion_decay),
            ("attraction_decay", self.attraction_decay),
            ("edge_decay", self.edge_decay),
        ];
        for (name, value) in decays {
            if value < 0.0 {
                return Err(ConfigError::NegativeDecay { name, value });
            }
        }
        Ok(())
    }
}

/// Where and how particles start after a reset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnSettings {
    /// Particles spawn uniformly in `[-half_extent, half_extent]³`.
    pub half_extent: f32,
    pub initial_velocity: Vec3,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            half_extent: 10.0,
            initial_velocity: Vec3::Y,
        }
    }
}

/// Everything a simulation run is parameterized by besides `N` and `G`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvironmentSettings {
    pub mass: f32,
    /// Linear damping coefficient, applied as `1 - dt * drag` per tick.
    pub drag: f32,
    /// Radius of the confinement sphere, also the half-size of the grid.
    pub max_radius: f32,
    /// Grid cells per axis.
    pub grid_resolution: u32,
    pub kernel: KernelGains,
    /// Inclusive range the affinity matrix entries are sampled from.
    pub affinity_range: (f32, f32),
    pub spawn: SpawnSettings,
    /// Larger `dt` values passed to a tick are clamped to this.
    pub max_time_step: f32,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            mass: 1.0,
            drag: 1.0,
            max_radius: 20.0,
            grid_resolution: 16,
            kernel: KernelGains::default(),
            affinity_range: (-1.0, 1.0),
            spawn: SpawnSettings::default(),
            max_time_step: 0.1,
        }
    }
}

impl EnvironmentSettings {
    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(ConfigError::NonPositiveMass(self.mass));
        }
        if !(self.drag.is_finite() && self.drag >= 0.0) {
            return Err(ConfigError::NegativeDrag(self.drag));
        }
        if !(self.max_radius.is_finite() && self.max_radius > 0.0) {
            return Err(ConfigError::NonPositiveMaxRadius(self.max_radius));
        }
        if !(1..=MAX_GRID_RESOLUTION).contains(&self.grid_resolution) {
            return Err(ConfigError::GridResolution {
                got: self.grid_resolution,
                max: MAX_GRID_RESOLUTION,
            });
        }
        let (min, max) = self.affinity_range;
        if !(min.is_finite() && max.is_finite() && min <= max) {
            return Err(ConfigError::AffinityRange { min, max });
        }
        if !(self.spawn.half_extent.is_finite() && self.spawn.half_extent >= 0.0) {
            return Err(ConfigError::SpawnExtent(self.spawn.half_extent));
        }
        if !self.spawn.initial_velocity.is_finite() {
            return Err(ConfigError::NonFiniteKernel {
                name: "spawn.initial_velocity",
            });
        }
        if !(self.max_time_step.is_finite() && self.max_time_step > 0.0) {
            return Err(ConfigError::MaxTimeStep(self.max_time_step));
        }
        self.kernel.validate()
    }

    /// Edge length of one grid cell in world units.
    pub fn cell_width(&self) -> f32 {
        2.0 * self.max_radius / self.grid_resolution as f32
    }

    /// Largest absolute affinity the matrix can hold.
    pub fn affinity_bound(&self) -> f32 {
        self.affinity_range.0.abs().max(self.affinity_range.1.abs())
    }

    /// Distance beyond which both pair kernels stay below `threshold`.
    ///
    /// The attraction kernel is scaled by [`Self::affinity_bound`]. Returns
    /// `f32::INFINITY` when a kernel with a significant gain never decays.
    pub fn effective_cutoff(&self, threshold: f32) -> f32 {
        let k = &self.kernel;
        let repulsion = kernel_radius(k.repulsion_gain.abs(), k.repulsion_decay, threshold);
        let attraction = kernel_radius(
            k.attraction_gain.abs() * self.affinity_bound(),
            k.attraction_decay,
            threshold,
        );
        repulsion.max(attraction)
    }
}

/// Radius where `gain * exp(-decay * d²)` drops to `threshold`.
fn kernel_radius(gain: f32, decay: f32, threshold: f32) -> f32 {
    if gain <= threshold {
        return 0.0;
    }
    if decay <= 0.0 {
        return f32::INFINITY;
    }
    ((gain / threshold).ln() / decay).sqrt()
}
