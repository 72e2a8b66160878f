//! Velocity and Transform Integration
//!
//! Semi-implicit Euler. Velocities absorb gravity, queued momenta, rolling
//! friction, and damping first; transforms then advance with the new
//! velocities. The continuous-collision clamp applied by the world after a
//! sweep hit lives here too.

use std::collections::HashMap;

use glam::Vec3;

use crate::body::RigidBody;
use crate::manifold::BodyPairKey;
use crate::math::PhysicsTransform;

/// Velocity cap factor after a CCD hit: slightly below the threshold speed so
/// the clamp cannot re-trigger on the very next step.
pub const CCD_VELOCITY_CLAMP_FACTOR: f32 = 0.95;

/// Integrate the velocities of every active dynamic body.
///
/// `contact_pairs` drive rolling friction: a body only rolls against
/// something it touches, and the pair's larger coefficient wins.
pub fn integrate_velocities(
    bodies: &mut HashMap<u32, RigidBody>,
    contact_pairs: &[BodyPairKey],
    gravity: Vec3,
    dt: f32,
) {
    let rolling = effective_rolling_coefficients(bodies, contact_pairs);
    for (handle, body) in bodies.iter_mut() {
        if !body.is_dynamic() || !body.active {
            continue;
        }
        integrate_velocity(body, gravity, rolling.get(handle).copied().unwrap_or(0.0), dt);
    }
}

/// Largest rolling-friction coefficient each body meets across its contacts.
fn effective_rolling_coefficients(
    bodies: &HashMap<u32, RigidBody>,
    contact_pairs: &[BodyPairKey],
) -> HashMap<u32, f32> {
    let mut rolling: HashMap<u32, f32> = HashMap::new();
    for key in contact_pairs {
        let (Some(a), Some(b)) = (bodies.get(&key.first), bodies.get(&key.second)) else {
            continue;
        };
        let coefficient = a.rolling_friction.max(b.rolling_friction);
        if coefficient <= 0.0 {
            continue;
        }
        for handle in [key.first, key.second] {
            let entry = rolling.entry(handle).or_insert(0.0);
            *entry = entry.max(coefficient);
        }
    }
    rolling
}

fn integrate_velocity(body: &mut RigidBody, gravity: Vec3, rolling_coefficient: f32, dt: f32) {
    // Gravity and queued momenta.
    body.linear_velocity += gravity * dt;
    let (momentum, torque_momentum) = body.pop_momentum();
    body.linear_velocity += momentum * body.inverse_mass();
    body.angular_velocity += body.inverse_inertia_world() * torque_momentum;

    // Rolling friction: a decelerating torque opposing the spin, capped so it
    // can stop the rotation but never reverse it.
    let spin = body.angular_velocity.length();
    if rolling_coefficient > 0.0 && spin > 0.0 {
        let torque = rolling_coefficient * body.mass() * gravity.length();
        let decel =
            (body.inverse_inertia_world() * (body.angular_velocity / spin * torque)).length() * dt;
        if decel >= spin {
            body.angular_velocity = Vec3::ZERO;
        } else {
            body.angular_velocity *= (spin - decel) / spin;
        }
    }

    // Exponential damping: lose `damping` fraction of velocity per second.
    body.linear_velocity *= (1.0 - body.linear_damping).powf(dt);
    body.angular_velocity *= (1.0 - body.angular_damping).powf(dt);

    // Axis locks.
    body.linear_velocity *= body.linear_factor;
    body.angular_velocity *= body.angular_factor;
}

/// Full-step candidate transform for a body at its current velocities.
pub fn candidate_transform(body: &RigidBody, dt: f32) -> PhysicsTransform {
    body.transform
        .integrate(body.linear_velocity, body.angular_velocity, dt)
}

/// Cap the linear velocity so the next step's motion stays under the shape's
/// CCD threshold. Called after a sweep clamped the transform.
pub fn clamp_velocity_after_ccd(body: &mut RigidBody, dt: f32) {
    let max_speed = body.ccd_motion_threshold() / dt * CCD_VELOCITY_CLAMP_FACTOR;
    let speed = body.linear_velocity.length();
    if speed > max_speed {
        body.linear_velocity *= max_speed / speed;
    }
}
