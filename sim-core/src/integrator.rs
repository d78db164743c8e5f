use glam::Vec3;

/// Squared speed below which a particle's look direction is left alone.
pub const ORIENTATION_EPSILON: f32 = 0.01;

/// Advances a position by one explicit Euler step.
#[inline]
pub fn integrate(position: Vec3, velocity: Vec3, dt: f32) -> Vec3 {
    position + velocity * dt
}

/// Look direction derived from `velocity`.
///
/// Near-zero velocities have no meaningful direction, so when
/// `|velocity|² <= epsilon` the previous orientation is kept.
#[inline]
pub fn orientation(velocity: Vec3, previous: Vec3, epsilon: f32) -> Vec3 {
    if velocity.length_squared() > epsilon {
        velocity.normalize()
    } else {
        previous
    }
}

/// Orientation a particle starts with, given its spawn velocity.
pub fn initial_orientation(velocity: Vec3) -> Vec3 {
    orientation(velocity, Vec3::Z, ORIENTATION_EPSILON)
}
