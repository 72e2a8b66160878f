//! Physics Math Primitives
//!
//! Thin layer over `glam`: a rigid transform (position + unit quaternion, no
//! scale), quaternion time-integration, and the small vector helpers shared by
//! GJK/EPA and the contact pipeline.
//!
//! # Conventions
//!
//! - Right-handed coordinates, Y up.
//! - Orientations are always unit quaternions; `PhysicsTransform` re-normalizes
//!   after integration.
//! - Zero-length directions are replaced by `Vec3::X` instead of producing NaN.

use glam::{Mat3, Quat, Vec3};

// ============================================================================
// Safe vector helpers
// ============================================================================

/// Threshold below which a squared length is treated as zero.
pub const EPSILON: f32 = 1.0e-6;

/// Normalize a vector, falling back to the X axis for degenerate input.
///
/// GJK support queries and contact normals must never be NaN; an arbitrary
/// unit axis is a valid search direction while a NaN poisons the whole step.
#[inline]
pub fn safe_normalize(v: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq < EPSILON * EPSILON {
        Vec3::X
    } else {
        v / len_sq.sqrt()
    }
}

/// Build an orthonormal tangent frame `(t1, t2)` from a unit normal.
pub fn tangent_frame(normal: Vec3) -> (Vec3, Vec3) {
    // Pick the reference axis least parallel to the normal
    let abs = normal.abs();
    let reference = if abs.x <= abs.y && abs.x <= abs.z {
        Vec3::X
    } else if abs.y <= abs.z {
        Vec3::Y
    } else {
        Vec3::Z
    };

    let t1 = safe_normalize(normal.cross(reference));
    let t2 = normal.cross(t1);
    (t1, t2)
}

// ============================================================================
// PhysicsTransform
// ============================================================================

/// Rigid transform: position + orientation, no scale.
///
/// Scale is deliberately absent: scaling a collision shape is an explicit
/// `CollisionShape::scaled` operation that produces a new shape, never a
/// per-frame transform component.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicsTransform {
    /// World position
    pub position: Vec3,
    /// World orientation (unit quaternion)
    pub orientation: Quat,
}

impl PhysicsTransform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    /// Create from position and orientation
    #[inline]
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Create a pure translation
    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Transform a point from local to world space
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.orientation * p + self.position
    }

    /// Transform a point from world to local space
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.orientation.inverse() * (p - self.position)
    }

    /// Rotate a direction into world space (no translation)
    #[inline]
    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        self.orientation * d
    }

    /// Rotate a direction into local space (no translation)
    #[inline]
    pub fn inverse_transform_direction(&self, d: Vec3) -> Vec3 {
        self.orientation.inverse() * d
    }

    /// Inverse transform
    #[inline]
    pub fn inverse(&self) -> Self {
        let inv_orientation = self.orientation.inverse();
        Self {
            position: inv_orientation * -self.position,
            orientation: inv_orientation,
        }
    }

    /// Compose two transforms: `self` applied after `other`
    #[inline]
    pub fn compose(&self, other: &PhysicsTransform) -> Self {
        Self {
            position: self.transform_point(other.position),
            orientation: (self.orientation * other.orientation).normalize(),
        }
    }

    /// Advance the transform by the given velocities over `dt` seconds.
    ///
    /// Position integrates linearly; orientation integrates the quaternion
    /// derivative `q' = 0.5 * w_quat * q` and re-normalizes.
    pub fn integrate(&self, linear_velocity: Vec3, angular_velocity: Vec3, dt: f32) -> Self {
        let position = self.position + linear_velocity * dt;

        let orientation = if angular_velocity.length_squared() < EPSILON * EPSILON {
            self.orientation
        } else {
            let w_quat = Quat::from_xyzw(
                angular_velocity.x,
                angular_velocity.y,
                angular_velocity.z,
                0.0,
            );
            let derivative = w_quat * self.orientation;
            (self.orientation + derivative * (0.5 * dt)).normalize()
        };

        Self {
            position,
            orientation,
        }
    }

    /// Rotation matrix of the orientation
    #[inline]
    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.orientation)
    }
}

impl Default for PhysicsTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl core::ops::Mul for PhysicsTransform {
    type Output = PhysicsTransform;

    fn mul(self, rhs: PhysicsTransform) -> PhysicsTransform {
        self.compose(&rhs)
    }
}

// ============================================================================
// Tests
// ============================================================================
