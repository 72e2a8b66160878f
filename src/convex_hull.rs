//! Convex Hull Shape
//!
//! A convex point cloud used both as a first-class collision shape and as the
//! backing store for GJK support queries. Points are stored in local space;
//! no face/adjacency structure is kept because support mapping only needs the
//! vertices.

use glam::Vec3;

use crate::aabb::Aabb;
use crate::error::PhysicsError;
use crate::math::safe_normalize;

/// Convex hull of a set of local-space points.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexHullShape {
    points: Vec<Vec3>,
    centroid: Vec3,
}

impl ConvexHullShape {
    /// Build a hull from its vertices.
    ///
    /// The caller provides the convex vertex set; interior points are harmless
    /// for support queries but waste iteration time. At least 4 non-coplanar
    /// points are required for a hull with volume.
    pub fn new(points: Vec<Vec3>) -> Result<Self, PhysicsError> {
        if points.len() < 4 {
            return Err(PhysicsError::InvalidShape {
                reason: "convex hull needs at least 4 points",
            });
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::InvalidShape {
                reason: "convex hull points must be finite",
            });
        }

        let centroid = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        Ok(Self { points, centroid })
    }

    /// Hull vertices
    #[inline]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Mean of the vertices
    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// Furthest point in the given local-space direction.
    pub fn support_point(&self, direction: Vec3) -> Vec3 {
        let mut best = self.points[0];
        let mut best_dot = best.dot(direction);
        for &p in &self.points[1..] {
            let d = p.dot(direction);
            if d > best_dot {
                best_dot = d;
                best = p;
            }
        }
        best
    }

    /// Hull grown (or shrunk, `distance < 0`) by moving every vertex along its
    /// outward direction from the centroid.
    ///
    /// `resize(0.0)` reproduces the original support points exactly; positive
    /// distances move every support point strictly outward.
    pub fn resize(&self, distance: f32) -> Self {
        let points = self
            .points
            .iter()
            .map(|&p| {
                let outward = safe_normalize(p - self.centroid);
                p + outward * distance
            })
            .collect();
        Self {
            points,
            centroid: self.centroid,
        }
    }

    /// Uniformly scaled copy (about the local origin).
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            points: self.points.iter().map(|&p| p * factor).collect(),
            centroid: self.centroid * factor,
        }
    }

    /// Tight local-space bounds of the vertices.
    pub fn local_aabb(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for &p in &self.points {
            aabb = aabb.merge(&Aabb::new(p, p));
        }
        aabb
    }

    /// Smallest half-extent of the local bounds.
    pub fn min_half_extent(&self) -> f32 {
        self.local_aabb().half_extents().min_element()
    }
}
