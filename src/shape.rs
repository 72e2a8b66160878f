//! Collision Shapes
//!
//! Every body carries one [`CollisionShape`]. Convex shapes expose a support
//! function split into a core (margin-less) part and an outer margin, which
//! lets the narrow phase run GJK on shrunk cores and reconstruct surface
//! contacts analytically. Concave and compound shapes never answer support
//! queries; the narrow phase decomposes them into convex pieces first.
//!
//! # Margins
//!
//! A margin can never exceed a fixed percentage of the smallest half-extent,
//! so a thin box keeps a proportionally thin margin and the core shape never
//! inverts. Spheres and capsules are exact: their radius *is* the margin and
//! the core is a point or a segment.

use glam::Vec3;

use crate::aabb::Aabb;
use crate::config::PhysicsConfig;
use crate::convex_hull::ConvexHullShape;
use crate::error::PhysicsError;
use crate::math::{safe_normalize, PhysicsTransform, EPSILON};

// ============================================================================
// Shape kinds
// ============================================================================

/// Discriminant used for narrow-phase algorithm dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Sphere,
    Box,
    Capsule,
    Cylinder,
    Cone,
    ConvexHull,
    Triangle,
    Heightfield,
    Compound,
}

impl ShapeKind {
    /// Human-readable name, used in error reporting.
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Sphere => "sphere",
            ShapeKind::Box => "box",
            ShapeKind::Capsule => "capsule",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Cone => "cone",
            ShapeKind::ConvexHull => "convex hull",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Heightfield => "heightfield",
            ShapeKind::Compound => "compound",
        }
    }
}

// ============================================================================
// Shape variants
// ============================================================================

/// A shape embedded in a compound at a local offset.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalizedShape {
    pub transform: PhysicsTransform,
    pub shape: CollisionShape,
}

/// Regular grid of heights in the local XZ plane, triangulated on demand.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeightfieldShape {
    /// Row-major heights, `x_count * z_count` values.
    pub heights: Vec<f32>,
    pub x_count: usize,
    pub z_count: usize,
    /// Distance between neighboring samples on both axes.
    pub spacing: f32,
}

impl HeightfieldShape {
    pub fn new(
        heights: Vec<f32>,
        x_count: usize,
        z_count: usize,
        spacing: f32,
    ) -> Result<Self, PhysicsError> {
        if x_count < 2 || z_count < 2 || heights.len() != x_count * z_count {
            return Err(PhysicsError::InvalidShape {
                reason: "heightfield needs at least a 2x2 grid matching its height count",
            });
        }
        if spacing <= 0.0 || heights.iter().any(|h| !h.is_finite()) {
            return Err(PhysicsError::InvalidShape {
                reason: "heightfield spacing must be positive and heights finite",
            });
        }
        Ok(Self {
            heights,
            x_count,
            z_count,
            spacing,
        })
    }

    #[inline]
    fn height_at(&self, ix: usize, iz: usize) -> f32 {
        self.heights[iz * self.x_count + ix]
    }

    #[inline]
    fn vertex(&self, ix: usize, iz: usize) -> Vec3 {
        // Grid is centered on the local origin.
        let x0 = -(self.x_count as f32 - 1.0) * 0.5 * self.spacing;
        let z0 = -(self.z_count as f32 - 1.0) * 0.5 * self.spacing;
        Vec3::new(
            x0 + ix as f32 * self.spacing,
            self.height_at(ix, iz),
            z0 + iz as f32 * self.spacing,
        )
    }

    fn local_aabb(&self) -> Aabb {
        let mut min_h = f32::INFINITY;
        let mut max_h = f32::NEG_INFINITY;
        for &h in &self.heights {
            min_h = min_h.min(h);
            max_h = max_h.max(h);
        }
        let hx = (self.x_count as f32 - 1.0) * 0.5 * self.spacing;
        let hz = (self.z_count as f32 - 1.0) * 0.5 * self.spacing;
        Aabb::new(Vec3::new(-hx, min_h, -hz), Vec3::new(hx, max_h, hz))
    }

    /// Triangles of every grid cell whose footprint overlaps `local_aabb`.
    ///
    /// Each cell yields two triangles with counter-clockwise winding when
    /// viewed from above.
    pub fn triangles_overlapping(&self, local_aabb: &Aabb) -> Vec<TriangleShape> {
        let x0 = -(self.x_count as f32 - 1.0) * 0.5 * self.spacing;
        let z0 = -(self.z_count as f32 - 1.0) * 0.5 * self.spacing;

        let cell_min = |v: f32, origin: f32| (((v - origin) / self.spacing).floor()).max(0.0);
        let ix_min = cell_min(local_aabb.min.x, x0) as usize;
        let iz_min = cell_min(local_aabb.min.z, z0) as usize;
        let ix_max =
            ((((local_aabb.max.x - x0) / self.spacing).ceil()) as usize).min(self.x_count - 1);
        let iz_max =
            ((((local_aabb.max.z - z0) / self.spacing).ceil()) as usize).min(self.z_count - 1);

        let mut triangles = Vec::new();
        for iz in iz_min..iz_max {
            for ix in ix_min..ix_max {
                let p00 = self.vertex(ix, iz);
                let p10 = self.vertex(ix + 1, iz);
                let p01 = self.vertex(ix, iz + 1);
                let p11 = self.vertex(ix + 1, iz + 1);
                triangles.push(TriangleShape::new(p00, p01, p10));
                triangles.push(TriangleShape::new(p10, p01, p11));
            }
        }
        triangles
    }
}

/// Single triangle, convex with a zero margin.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriangleShape {
    pub points: [Vec3; 3],
}

impl TriangleShape {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { points: [a, b, c] }
    }

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
}

// ============================================================================
// CollisionShape
// ============================================================================

/// A body's collision geometry.
///
/// Dimensions are local-space; the owning body's transform places the shape in
/// the world. All radii and half-extents must be strictly positive.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CollisionShape {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: Vec3,
        margin: f32,
    },
    /// Capsule around the local Y axis: a segment of `2 * half_height` plus a
    /// radius on every side.
    Capsule {
        radius: f32,
        half_height: f32,
    },
    Cylinder {
        radius: f32,
        half_height: f32,
        margin: f32,
    },
    /// Cone around the local Y axis, apex at `+half_height`, base disc of
    /// `radius` at `-half_height`.
    Cone {
        radius: f32,
        half_height: f32,
        margin: f32,
    },
    ConvexHull {
        hull: ConvexHullShape,
        /// `hull` shrunk by `margin`, precomputed once so support queries
        /// never rebuild it.
        core: ConvexHullShape,
        margin: f32,
    },
    Triangle(TriangleShape),
    Heightfield(HeightfieldShape),
    Compound {
        children: Vec<LocalizedShape>,
    },
}

impl CollisionShape {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn sphere(radius: f32) -> Result<Self, PhysicsError> {
        check_positive(radius, "sphere radius must be positive")?;
        Ok(Self::Sphere { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> Result<Self, PhysicsError> {
        if half_extents.min_element() <= 0.0 || !half_extents.is_finite() {
            return Err(PhysicsError::InvalidShape {
                reason: "box half extents must be positive",
            });
        }
        Ok(Self::Box {
            half_extents,
            margin: clamp_margin(half_extents.min_element()),
        })
    }

    pub fn capsule(radius: f32, half_height: f32) -> Result<Self, PhysicsError> {
        check_positive(radius, "capsule radius must be positive")?;
        check_positive(half_height, "capsule half height must be positive")?;
        Ok(Self::Capsule {
            radius,
            half_height,
        })
    }

    pub fn cylinder(radius: f32, half_height: f32) -> Result<Self, PhysicsError> {
        check_positive(radius, "cylinder radius must be positive")?;
        check_positive(half_height, "cylinder half height must be positive")?;
        Ok(Self::Cylinder {
            radius,
            half_height,
            margin: clamp_margin(radius.min(half_height)),
        })
    }

    pub fn cone(radius: f32, half_height: f32) -> Result<Self, PhysicsError> {
        check_positive(radius, "cone radius must be positive")?;
        check_positive(half_height, "cone half height must be positive")?;
        Ok(Self::Cone {
            radius,
            half_height,
            margin: clamp_margin(radius.min(half_height)),
        })
    }

    pub fn convex_hull(points: Vec<Vec3>) -> Result<Self, PhysicsError> {
        let hull = ConvexHullShape::new(points)?;
        let margin = clamp_margin(hull.min_half_extent());
        let core = hull.resize(-margin);
        Ok(Self::ConvexHull { hull, core, margin })
    }

    pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::Triangle(TriangleShape::new(a, b, c))
    }

    pub fn heightfield(
        heights: Vec<f32>,
        x_count: usize,
        z_count: usize,
        spacing: f32,
    ) -> Result<Self, PhysicsError> {
        Ok(Self::Heightfield(HeightfieldShape::new(
            heights, x_count, z_count, spacing,
        )?))
    }

    pub fn compound(children: Vec<LocalizedShape>) -> Result<Self, PhysicsError> {
        if children.is_empty() {
            return Err(PhysicsError::InvalidShape {
                reason: "compound shape needs at least one child",
            });
        }
        if children
            .iter()
            .any(|c| matches!(c.shape, Self::Compound { .. } | Self::Heightfield(_)))
        {
            return Err(PhysicsError::InvalidShape {
                reason: "compound children must be convex shapes",
            });
        }
        Ok(Self::Compound { children })
    }

    // ------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------

    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Sphere { .. } => ShapeKind::Sphere,
            Self::Box { .. } => ShapeKind::Box,
            Self::Capsule { .. } => ShapeKind::Capsule,
            Self::Cylinder { .. } => ShapeKind::Cylinder,
            Self::Cone { .. } => ShapeKind::Cone,
            Self::ConvexHull { .. } => ShapeKind::ConvexHull,
            Self::Triangle(_) => ShapeKind::Triangle,
            Self::Heightfield(_) => ShapeKind::Heightfield,
            Self::Compound { .. } => ShapeKind::Compound,
        }
    }

    pub fn is_convex(&self) -> bool {
        !matches!(self, Self::Heightfield(_) | Self::Compound { .. })
    }

    pub fn is_concave(&self) -> bool {
        matches!(self, Self::Heightfield(_))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound { .. })
    }

    // ------------------------------------------------------------------
    // Support mapping
    // ------------------------------------------------------------------

    /// Outer margin of the shape. Spheres and capsules are entirely margin.
    pub fn margin(&self) -> f32 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Capsule { radius, .. } => *radius,
            Self::Box { margin, .. }
            | Self::Cylinder { margin, .. }
            | Self::Cone { margin, .. }
            | Self::ConvexHull { margin, .. } => *margin,
            Self::Triangle(_) => 0.0,
            Self::Heightfield(_) | Self::Compound { .. } => 0.0,
        }
    }

    /// Furthest point of the shape core in a local-space direction.
    ///
    /// With `with_margin`, the point is pushed `margin()` further along the
    /// normalized direction, recovering the full shape surface. Concave and
    /// compound shapes have no support mapping and return the origin.
    pub fn support_point(&self, direction: Vec3, with_margin: bool) -> Vec3 {
        debug_assert!(self.is_convex(), "support query on a non-convex shape");
        let core = match self {
            // The core of a sphere is its center.
            Self::Sphere { .. } => Vec3::ZERO,
            Self::Box {
                half_extents,
                margin,
            } => {
                let inner = *half_extents - Vec3::splat(*margin);
                Vec3::new(
                    inner.x.copysign(sign_or_pos(direction.x)),
                    inner.y.copysign(sign_or_pos(direction.y)),
                    inner.z.copysign(sign_or_pos(direction.z)),
                )
            }
            Self::Capsule {
                half_height,
                ..
            } => Vec3::new(0.0, half_height.copysign(sign_or_pos(direction.y)), 0.0),
            Self::Cylinder {
                radius,
                half_height,
                margin,
            } => {
                let horizontal = Vec3::new(direction.x, 0.0, direction.z);
                let r = radius - margin;
                let radial = if horizontal.length_squared() > EPSILON * EPSILON {
                    horizontal.normalize() * r
                } else {
                    Vec3::ZERO
                };
                radial
                    + Vec3::new(
                        0.0,
                        (half_height - margin).copysign(sign_or_pos(direction.y)),
                        0.0,
                    )
            }
            Self::Cone {
                radius,
                half_height,
                margin,
            } => {
                let apex = Vec3::new(0.0, half_height - margin, 0.0);
                let horizontal = Vec3::new(direction.x, 0.0, direction.z);
                let r = radius - margin;
                let rim = if horizontal.length_squared() > EPSILON * EPSILON {
                    horizontal.normalize() * r + Vec3::new(0.0, -(half_height - margin), 0.0)
                } else {
                    Vec3::new(0.0, -(half_height - margin), 0.0)
                };
                if apex.dot(direction) >= rim.dot(direction) {
                    apex
                } else {
                    rim
                }
            }
            Self::ConvexHull { core, .. } => core.support_point(direction),
            Self::Triangle(triangle) => triangle.support_point(direction),
            Self::Heightfield(_) | Self::Compound { .. } => Vec3::ZERO,
        };
        if with_margin {
            core + safe_normalize(direction) * self.margin()
        } else {
            core
        }
    }

    // ------------------------------------------------------------------
    // Bounds
    // ------------------------------------------------------------------

    /// World-space bounds of the shape under a transform.
    ///
    /// Rotated boxes use the absolute rotation matrix, which is exact for the
    /// box itself and conservative for cylinders and cones.
    pub fn to_aabb(&self, transform: &PhysicsTransform) -> Aabb {
        match self {
            Self::Sphere { radius } => {
                Aabb::from_center_half_extents(transform.position, Vec3::splat(*radius))
            }
            Self::Box { half_extents, .. } => {
                rotated_extents_aabb(transform, *half_extents)
            }
            Self::Capsule {
                radius,
                half_height,
            } => {
                let tip = transform.transform_point(Vec3::new(0.0, *half_height, 0.0));
                let base = transform.transform_point(Vec3::new(0.0, -*half_height, 0.0));
                let r = Vec3::splat(*radius);
                Aabb::new(tip.min(base) - r, tip.max(base) + r)
            }
            Self::Cylinder {
                radius,
                half_height,
                ..
            }
            | Self::Cone {
                radius,
                half_height,
                ..
            } => rotated_extents_aabb(transform, Vec3::new(*radius, *half_height, *radius)),
            Self::ConvexHull { hull, .. } => {
                let mut aabb = Aabb::empty();
                for &p in hull.points() {
                    let w = transform.transform_point(p);
                    aabb = aabb.merge(&Aabb::new(w, w));
                }
                aabb
            }
            Self::Triangle(triangle) => {
                let mut aabb = Aabb::empty();
                for &p in &triangle.points {
                    let w = transform.transform_point(p);
                    aabb = aabb.merge(&Aabb::new(w, w));
                }
                aabb
            }
            Self::Heightfield(field) => {
                let local = field.local_aabb();
                rotated_extents_aabb_at(transform, local.center(), local.half_extents())
            }
            Self::Compound { children } => {
                let mut aabb = Aabb::empty();
                for child in children {
                    let world = transform.compose(&child.transform);
                    aabb = aabb.merge(&child.shape.to_aabb(&world));
                }
                aabb
            }
        }
    }

    // ------------------------------------------------------------------
    // Mass properties
    // ------------------------------------------------------------------

    /// Diagonal of the local inertia tensor for the given mass.
    ///
    /// Concave shapes are static-only and return zero (treated as infinite
    /// inertia by the body). Convex hulls use their bounding box as an
    /// approximation.
    pub fn local_inertia(&self, mass: f32) -> Vec3 {
        match self {
            Self::Sphere { radius } => {
                Vec3::splat(0.4 * mass * radius * radius)
            }
            Self::Box { half_extents, .. } => {
                let d = *half_extents * 2.0;
                Vec3::new(
                    mass / 12.0 * (d.y * d.y + d.z * d.z),
                    mass / 12.0 * (d.x * d.x + d.z * d.z),
                    mass / 12.0 * (d.x * d.x + d.y * d.y),
                )
            }
            Self::Capsule {
                radius,
                half_height,
            } => {
                // Cylinder plus two hemisphere caps.
                let r = *radius;
                let h = 2.0 * half_height;
                let cyl_mass = mass * h / (h + 4.0 / 3.0 * r);
                let caps_mass = mass - cyl_mass;
                let lateral = cyl_mass * (3.0 * r * r + h * h) / 12.0
                    + caps_mass * (0.4 * r * r + 0.5 * h * h + 0.375 * h * r);
                let axial = cyl_mass * r * r * 0.5 + caps_mass * 0.4 * r * r;
                Vec3::new(lateral, axial, lateral)
            }
            Self::Cylinder {
                radius,
                half_height,
                ..
            } => {
                let h = 2.0 * half_height;
                let lateral = mass * (3.0 * radius * radius + h * h) / 12.0;
                Vec3::new(lateral, mass * radius * radius * 0.5, lateral)
            }
            Self::Cone {
                radius,
                half_height,
                ..
            } => {
                let h = 2.0 * half_height;
                let lateral = mass * (3.0 / 20.0 * radius * radius + 3.0 / 80.0 * h * h);
                Vec3::new(lateral, 0.3 * mass * radius * radius, lateral)
            }
            Self::ConvexHull { hull, .. } => {
                let he = hull.local_aabb().half_extents() * 2.0;
                Vec3::new(
                    mass / 12.0 * (he.y * he.y + he.z * he.z),
                    mass / 12.0 * (he.x * he.x + he.z * he.z),
                    mass / 12.0 * (he.x * he.x + he.y * he.y),
                )
            }
            Self::Triangle(_) | Self::Heightfield(_) => Vec3::ZERO,
            Self::Compound { children } => {
                let child_mass = mass / children.len() as f32;
                let mut inertia = Vec3::ZERO;
                for child in children {
                    let local = child.shape.local_inertia(child_mass);
                    let d = child.transform.position;
                    // Parallel axis shift on the diagonal.
                    inertia += local
                        + child_mass
                            * Vec3::new(
                                d.y * d.y + d.z * d.z,
                                d.x * d.x + d.z * d.z,
                                d.x * d.x + d.y * d.y,
                            );
                }
                inertia
            }
        }
    }

    // ------------------------------------------------------------------
    // Miscellaneous
    // ------------------------------------------------------------------

    /// Uniformly scaled copy of the shape.
    pub fn scaled(&self, factor: f32) -> Self {
        match self {
            Self::Sphere { radius } => Self::Sphere {
                radius: radius * factor,
            },
            Self::Box { half_extents, .. } => Self::Box {
                half_extents: *half_extents * factor,
                margin: clamp_margin((half_extents.min_element()) * factor),
            },
            Self::Capsule {
                radius,
                half_height,
            } => Self::Capsule {
                radius: radius * factor,
                half_height: half_height * factor,
            },
            Self::Cylinder {
                radius,
                half_height,
                ..
            } => Self::Cylinder {
                radius: radius * factor,
                half_height: half_height * factor,
                margin: clamp_margin(radius.min(*half_height) * factor),
            },
            Self::Cone {
                radius,
                half_height,
                ..
            } => Self::Cone {
                radius: radius * factor,
                half_height: half_height * factor,
                margin: clamp_margin(radius.min(*half_height) * factor),
            },
            Self::ConvexHull { hull, .. } => {
                let scaled = hull.scaled(factor);
                let margin = clamp_margin(scaled.min_half_extent());
                let core = scaled.resize(-margin);
                Self::ConvexHull {
                    hull: scaled,
                    core,
                    margin,
                }
            }
            Self::Triangle(t) => Self::Triangle(TriangleShape::new(
                t.points[0] * factor,
                t.points[1] * factor,
                t.points[2] * factor,
            )),
            Self::Heightfield(field) => Self::Heightfield(HeightfieldShape {
                heights: field.heights.iter().map(|h| h * factor).collect(),
                x_count: field.x_count,
                z_count: field.z_count,
                spacing: field.spacing * factor,
            }),
            Self::Compound { children } => Self::Compound {
                children: children
                    .iter()
                    .map(|c| LocalizedShape {
                        transform: PhysicsTransform::new(
                            c.transform.position * factor,
                            c.transform.orientation,
                        ),
                        shape: c.shape.scaled(factor),
                    })
                    .collect(),
            },
        }
    }

    /// Smallest half-extent of the shape's identity-transform bounds.
    pub fn min_half_extent(&self) -> f32 {
        self.to_aabb(&PhysicsTransform::IDENTITY)
            .half_extents()
            .min_element()
    }

    /// Per-step displacement above which a body with this shape needs
    /// continuous collision detection to avoid tunneling.
    pub fn ccd_motion_threshold(&self) -> f32 {
        self.min_half_extent()
    }
}

#[inline]
fn sign_or_pos(v: f32) -> f32 {
    if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

fn check_positive(value: f32, reason: &'static str) -> Result<(), PhysicsError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PhysicsError::InvalidShape { reason })
    }
}

/// Default margin clamped against the smallest half-extent of the shape.
fn clamp_margin(min_half_extent: f32) -> f32 {
    let config = PhysicsConfig::default();
    config
        .collision_margin
        .min(config.maximum_margin_percentage * min_half_extent)
}

/// Bounds of rotated half-extents centered on the transform position.
fn rotated_extents_aabb(transform: &PhysicsTransform, half_extents: Vec3) -> Aabb {
    rotated_extents_aabb_at(transform, Vec3::ZERO, half_extents)
}

fn rotated_extents_aabb_at(
    transform: &PhysicsTransform,
    local_center: Vec3,
    half_extents: Vec3,
) -> Aabb {
    let rot = transform.rotation_matrix();
    let abs = glam::Mat3::from_cols(rot.x_axis.abs(), rot.y_axis.abs(), rot.z_axis.abs());
    let world_he = abs * half_extents;
    let center = transform.transform_point(local_center);
    Aabb::from_center_half_extents(center, world_he)
}
