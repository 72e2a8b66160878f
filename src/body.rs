//! Rigid Bodies
//!
//! A body is a shape, a transform, and the state the pipeline integrates.
//! Bodies are identified by a caller-provided string id and addressed
//! internally through a stable `u32` handle assigned by the world.
//!
//! External code applies forces through the momentum accumulators
//! ([`RigidBody::apply_central_momentum`] and friends); the accumulated
//! momentum is popped into velocity once per step, so callers never race the
//! integration.

use std::sync::Arc;

use glam::{Mat3, Vec3};

use crate::math::PhysicsTransform;
use crate::shape::CollisionShape;

/// How a body participates in the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyType {
    /// Integrated, collides, responds.
    Dynamic,
    /// Never moves; collides with dynamic bodies.
    Static,
    /// Detects contacts but never responds and is never integrated. Used for
    /// triggers and the character controller.
    Ghost,
}

/// A rigid body in the world.
#[derive(Clone, Debug)]
pub struct RigidBody {
    /// Caller-facing identifier, unique per world.
    pub id: String,
    pub body_type: BodyType,
    pub shape: Arc<CollisionShape>,
    pub transform: PhysicsTransform,

    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,

    mass: f32,
    inverse_mass: f32,
    local_inertia: Vec3,

    /// Fraction of velocity lost per second, in `[0, 1)`.
    pub linear_damping: f32,
    pub angular_damping: f32,

    /// Per-axis movement masks; a zero component locks that axis.
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,

    pub friction: f32,
    pub rolling_friction: f32,
    pub restitution: f32,

    /// False while the body's island sleeps.
    pub active: bool,
    pub sleep_frames: u32,

    accumulated_momentum: Vec3,
    accumulated_torque_momentum: Vec3,
}

impl RigidBody {
    /// A dynamic body. Mass must be positive; the inertia tensor comes from
    /// the shape.
    pub fn new_dynamic(
        id: impl Into<String>,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
        mass: f32,
    ) -> Self {
        let mut body = Self::base(id, BodyType::Dynamic, shape, transform);
        body.set_mass(mass);
        body
    }

    /// An immovable body with infinite mass.
    pub fn new_static(
        id: impl Into<String>,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
    ) -> Self {
        Self::base(id, BodyType::Static, shape, transform)
    }

    /// A ghost body: contacts are detected and reported, nothing responds.
    pub fn new_ghost(
        id: impl Into<String>,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
    ) -> Self {
        Self::base(id, BodyType::Ghost, shape, transform)
    }

    fn base(
        id: impl Into<String>,
        body_type: BodyType,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
    ) -> Self {
        Self {
            id: id.into(),
            body_type,
            shape,
            transform,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: 0.0,
            inverse_mass: 0.0,
            local_inertia: Vec3::ZERO,
            linear_damping: 0.0,
            angular_damping: 0.0,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            friction: 0.5,
            rolling_friction: 0.0,
            restitution: 0.0,
            active: true,
            sleep_frames: 0,
            accumulated_momentum: Vec3::ZERO,
            accumulated_torque_momentum: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    #[inline]
    pub fn is_ghost(&self) -> bool {
        self.body_type == BodyType::Ghost
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    #[inline]
    pub fn local_inertia(&self) -> Vec3 {
        self.local_inertia
    }

    /// Change the mass, refreshing the inertia from the shape. Non-positive
    /// mass turns the body kinematic (infinite mass).
    pub fn set_mass(&mut self, mass: f32) {
        if self.body_type == BodyType::Dynamic && mass > 0.0 {
            self.mass = mass;
            self.inverse_mass = 1.0 / mass;
            self.local_inertia = self.shape.local_inertia(mass);
        } else {
            self.mass = 0.0;
            self.inverse_mass = 0.0;
            self.local_inertia = Vec3::ZERO;
        }
    }

    /// Inverse inertia tensor in world coordinates for the current
    /// orientation. Zero for static, ghost, and zero-inertia axes.
    pub fn inverse_inertia_world(&self) -> Mat3 {
        let inv_local = Vec3::new(
            safe_recip(self.local_inertia.x),
            safe_recip(self.local_inertia.y),
            safe_recip(self.local_inertia.z),
        );
        let rot = self.transform.rotation_matrix();
        rot * Mat3::from_diagonal(inv_local) * rot.transpose()
    }

    // ------------------------------------------------------------------
    // Momentum accumulators
    // ------------------------------------------------------------------

    /// Queue a momentum (impulse) through the center of mass. Applied and
    /// cleared at the next velocity integration; wakes the body.
    pub fn apply_central_momentum(&mut self, momentum: Vec3) {
        self.accumulated_momentum += momentum;
        self.wake_up();
    }

    /// Queue an angular momentum. Applied at the next velocity integration.
    pub fn apply_torque_momentum(&mut self, torque_momentum: Vec3) {
        self.accumulated_torque_momentum += torque_momentum;
        self.wake_up();
    }

    /// Queue a momentum applied at a world-space point, producing both a
    /// linear and an angular contribution.
    pub fn apply_momentum_at_point(&mut self, momentum: Vec3, world_point: Vec3) {
        let arm = world_point - self.transform.position;
        self.accumulated_momentum += momentum;
        self.accumulated_torque_momentum += arm.cross(momentum);
        self.wake_up();
    }

    /// Take and clear the accumulated (momentum, torque momentum).
    pub fn pop_momentum(&mut self) -> (Vec3, Vec3) {
        let out = (self.accumulated_momentum, self.accumulated_torque_momentum);
        self.accumulated_momentum = Vec3::ZERO;
        self.accumulated_torque_momentum = Vec3::ZERO;
        out
    }

    /// Momentum waiting to be applied, without clearing it.
    pub fn pending_momentum(&self) -> (Vec3, Vec3) {
        (self.accumulated_momentum, self.accumulated_torque_momentum)
    }

    // ------------------------------------------------------------------
    // Activity
    // ------------------------------------------------------------------

    pub fn wake_up(&mut self) {
        self.active = true;
        self.sleep_frames = 0;
    }

    pub fn sleep(&mut self) {
        self.active = false;
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
    }

    /// True when both velocities sit under the sleep thresholds.
    pub fn is_below_sleep_threshold(&self, linear_threshold: f32, angular_threshold: f32) -> bool {
        self.linear_velocity.length_squared() < linear_threshold * linear_threshold
            && self.angular_velocity.length_squared() < angular_threshold * angular_threshold
    }

    /// Displacement magnitude above which this body must be swept instead of
    /// teleported.
    pub fn ccd_motion_threshold(&self) -> f32 {
        self.shape.ccd_motion_threshold()
    }
}

#[inline]
fn safe_recip(v: f32) -> f32 {
    if v > 0.0 {
        1.0 / v
    } else {
        0.0
    }
}
