//! Narrow Phase
//!
//! Turns broad-phase candidate pairs into contacts. Dispatch is a `match`
//! over the `(ShapeKind, ShapeKind)` pair: common pairs get closed-form
//! algorithms, everything convex falls through to GJK/EPA, and compound or
//! concave shapes recurse into their convex pieces. When the canonical
//! algorithm expects the shapes in the opposite order, the result is swapped
//! back in one place instead of inside every algorithm.
//!
//! Contact convention: `normal` points from shape A into shape B, `depth > 0`
//! means penetration, and `contact_a - contact_b ≈ normal * depth`.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::body::RigidBody;
use crate::config::PhysicsConfig;
use crate::epa::{self, EpaResult};
use crate::error::PhysicsError;
use crate::gjk::{self, ConvexObject, GjkResult};
use crate::manifold::{BodyPairKey, ContactPoint, ManifoldCache};
use crate::math::{safe_normalize, PhysicsTransform};
use crate::shape::{CollisionShape, ShapeKind};

/// One raw contact produced by a collision algorithm.
#[derive(Clone, Copy, Debug)]
pub struct ContactResult {
    /// Unit normal from shape A into shape B.
    pub normal: Vec3,
    /// Penetration depth, positive when overlapping.
    pub depth: f32,
    /// Deepest point of A, world space.
    pub contact_a: Vec3,
    /// Surface point of B, world space.
    pub contact_b: Vec3,
}

impl ContactResult {
    /// Relabel a result computed with the arguments in the opposite order.
    fn swapped(self) -> Self {
        Self {
            normal: -self.normal,
            depth: self.depth,
            contact_a: self.contact_b,
            contact_b: self.contact_a,
        }
    }
}

/// Compute the contacts between two placed shapes.
///
/// An empty vector means no collision. `Err` is reserved for shape pairs no
/// algorithm covers, which is a configuration mistake rather than a
/// geometric outcome.
pub fn collide_shapes(
    shape_a: &CollisionShape,
    transform_a: &PhysicsTransform,
    shape_b: &CollisionShape,
    transform_b: &PhysicsTransform,
    config: &PhysicsConfig,
) -> Result<Vec<ContactResult>, PhysicsError> {
    use ShapeKind::*;

    match (shape_a.kind(), shape_b.kind()) {
        (Heightfield, Heightfield) => Err(PhysicsError::UnsupportedShapePair {
            first: shape_a.kind().name(),
            second: shape_b.kind().name(),
        }),
        (Sphere, Sphere) => Ok(sphere_sphere(shape_a, transform_a, shape_b, transform_b)),
        (Sphere, Box) => Ok(sphere_box(shape_a, transform_a, shape_b, transform_b)),
        (Box, Sphere) => Ok(swap_all(sphere_box(
            shape_b,
            transform_b,
            shape_a,
            transform_a,
        ))),
        (Compound, _) => compound_vs_any(shape_a, transform_a, shape_b, transform_b, config),
        (_, Compound) => Ok(swap_all(compound_vs_any(
            shape_b,
            transform_b,
            shape_a,
            transform_a,
            config,
        )?)),
        (Heightfield, _) => heightfield_vs_convex(shape_a, transform_a, shape_b, transform_b, config),
        (_, Heightfield) => Ok(swap_all(heightfield_vs_convex(
            shape_b,
            transform_b,
            shape_a,
            transform_a,
            config,
        )?)),
        _ => Ok(convex_convex(shape_a, transform_a, shape_b, transform_b, config)),
    }
}

fn swap_all(results: Vec<ContactResult>) -> Vec<ContactResult> {
    results.into_iter().map(ContactResult::swapped).collect()
}

// ============================================================================
// Closed-form algorithms
// ============================================================================

fn sphere_sphere(
    shape_a: &CollisionShape,
    ta: &PhysicsTransform,
    shape_b: &CollisionShape,
    tb: &PhysicsTransform,
) -> Vec<ContactResult> {
    let (CollisionShape::Sphere { radius: ra }, CollisionShape::Sphere { radius: rb }) =
        (shape_a, shape_b)
    else {
        unreachable!("dispatched as sphere-sphere");
    };
    let delta = tb.position - ta.position;
    let distance = delta.length();
    let sum = ra + rb;
    if distance >= sum {
        return Vec::new();
    }
    // Concentric spheres have no meaningful direction; pick the fallback.
    let normal = safe_normalize(delta);
    vec![ContactResult {
        normal,
        depth: sum - distance,
        contact_a: ta.position + normal * *ra,
        contact_b: tb.position - normal * *rb,
    }]
}

/// Sphere against box, box-local clamp. A sphere center inside the box
/// projects to the nearest face so the normal never degenerates.
fn sphere_box(
    sphere: &CollisionShape,
    ta: &PhysicsTransform,
    boxed: &CollisionShape,
    tb: &PhysicsTransform,
) -> Vec<ContactResult> {
    let (CollisionShape::Sphere { radius }, CollisionShape::Box { half_extents, .. }) =
        (sphere, boxed)
    else {
        unreachable!("dispatched as sphere-box");
    };

    let center_local = tb.inverse_transform_point(ta.position);
    let clamped = center_local.clamp(-*half_extents, *half_extents);

    if clamped != center_local {
        // Center outside the box.
        let closest_world = tb.transform_point(clamped);
        let delta = closest_world - ta.position;
        let distance = delta.length();
        if distance >= *radius {
            return Vec::new();
        }
        let normal = safe_normalize(delta);
        return vec![ContactResult {
            normal,
            depth: radius - distance,
            contact_a: ta.position + normal * *radius,
            contact_b: closest_world,
        }];
    }

    // Center inside the box: push out through the closest face.
    let gaps = *half_extents - center_local.abs();
    let axis = if gaps.x <= gaps.y && gaps.x <= gaps.z {
        0
    } else if gaps.y <= gaps.z {
        1
    } else {
        2
    };
    let mut outward_local = Vec3::ZERO;
    outward_local[axis] = if center_local[axis] >= 0.0 { 1.0 } else { -1.0 };
    let face_distance = gaps[axis];

    let mut face_point_local = center_local;
    face_point_local[axis] = half_extents[axis] * outward_local[axis];

    let outward = tb.transform_direction(outward_local);
    let normal = -outward;
    vec![ContactResult {
        normal,
        depth: radius + face_distance,
        contact_a: ta.position - outward * *radius,
        contact_b: tb.transform_point(face_point_local),
    }]
}

// ============================================================================
// Generic convex pair
// ============================================================================

/// GJK on the margin-less cores first; shallow contacts come straight from
/// the core witness points and the margins, deep overlap falls back to
/// GJK-with-margin plus EPA.
fn convex_convex(
    shape_a: &CollisionShape,
    ta: &PhysicsTransform,
    shape_b: &CollisionShape,
    tb: &PhysicsTransform,
    config: &PhysicsConfig,
) -> Vec<ContactResult> {
    let core_a = ConvexObject::new(shape_a, ta);
    let core_b = ConvexObject::new(shape_b, tb);
    let margin_sum = shape_a.margin() + shape_b.margin();

    match gjk::evaluate(&core_a, &core_b, config) {
        GjkResult::NoCollide {
            separation,
            closest_a,
            closest_b,
        } => {
            if separation >= margin_sum {
                return Vec::new();
            }
            let normal = safe_normalize(closest_b - closest_a);
            vec![ContactResult {
                normal,
                depth: margin_sum - separation,
                contact_a: closest_a + normal * shape_a.margin(),
                contact_b: closest_b - normal * shape_b.margin(),
            }]
        }
        GjkResult::Collide { .. } => {
            // Cores overlap: the contact is deeper than the margins can
            // express, so expand the full shapes.
            let full_a = ConvexObject::with_margin(shape_a, ta);
            let full_b = ConvexObject::with_margin(shape_b, tb);
            match gjk::evaluate(&full_a, &full_b, config) {
                GjkResult::Collide { simplex } => {
                    match epa::evaluate(&full_a, &full_b, &simplex, config) {
                        EpaResult::Collide {
                            normal,
                            depth,
                            contact_a,
                            contact_b,
                        } => vec![ContactResult {
                            normal,
                            depth,
                            contact_a,
                            contact_b,
                        }],
                        EpaResult::Invalid => {
                            log::debug!("narrow phase: EPA degenerated, contact skipped");
                            Vec::new()
                        }
                    }
                }
                _ => Vec::new(),
            }
        }
        GjkResult::MaxIterations => {
            log::debug!("narrow phase: GJK did not converge, pair skipped this step");
            Vec::new()
        }
    }
}

// ============================================================================
// Composite shapes
// ============================================================================

fn compound_vs_any(
    compound: &CollisionShape,
    ta: &PhysicsTransform,
    other: &CollisionShape,
    tb: &PhysicsTransform,
    config: &PhysicsConfig,
) -> Result<Vec<ContactResult>, PhysicsError> {
    let CollisionShape::Compound { children } = compound else {
        unreachable!("dispatched as compound");
    };
    let mut all = Vec::new();
    for child in children {
        let child_world = ta.compose(&child.transform);
        all.extend(collide_shapes(
            &child.shape,
            &child_world,
            other,
            tb,
            config,
        )?);
    }
    Ok(all)
}

fn heightfield_vs_convex(
    field_shape: &CollisionShape,
    ta: &PhysicsTransform,
    other: &CollisionShape,
    tb: &PhysicsTransform,
    config: &PhysicsConfig,
) -> Result<Vec<ContactResult>, PhysicsError> {
    let CollisionShape::Heightfield(field) = field_shape else {
        unreachable!("dispatched as heightfield");
    };
    if !other.is_convex() {
        return Err(PhysicsError::UnsupportedShapePair {
            first: field_shape.kind().name(),
            second: other.kind().name(),
        });
    }

    // Bounds of the other shape in heightfield-local space (corner-expanded,
    // conservative).
    let world = other.to_aabb(tb);
    let mut local = crate::aabb::Aabb::empty();
    for corner in world_corners(&world) {
        let p = ta.inverse_transform_point(corner);
        local = local.merge(&crate::aabb::Aabb::new(p, p));
    }

    let mut all = Vec::new();
    for triangle in field.triangles_overlapping(&local) {
        let tri = CollisionShape::Triangle(triangle);
        all.extend(convex_convex(&tri, ta, other, tb, config));
    }
    Ok(all)
}

fn world_corners(aabb: &crate::aabb::Aabb) -> [Vec3; 8] {
    let (lo, hi) = (aabb.min, aabb.max);
    [
        Vec3::new(lo.x, lo.y, lo.z),
        Vec3::new(hi.x, lo.y, lo.z),
        Vec3::new(lo.x, hi.y, lo.z),
        Vec3::new(hi.x, hi.y, lo.z),
        Vec3::new(lo.x, lo.y, hi.z),
        Vec3::new(hi.x, lo.y, hi.z),
        Vec3::new(lo.x, hi.y, hi.z),
        Vec3::new(hi.x, hi.y, hi.z),
    ]
}

// ============================================================================
// Per-step processing
// ============================================================================

/// Runs collision algorithms over the broad-phase pairs and keeps the
/// persistent manifolds up to date.
#[derive(Default)]
pub struct NarrowPhase {
    cache: ManifoldCache,
}

impl NarrowPhase {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn manifolds(&self) -> &ManifoldCache {
        &self.cache
    }

    #[inline]
    pub fn manifolds_mut(&mut self) -> &mut ManifoldCache {
        &mut self.cache
    }

    /// Process one step's candidate pairs.
    ///
    /// Each candidate pair claims one collision algorithm slot for the step;
    /// more pairs than `algorithm_pool_size` fails the step with
    /// [`PhysicsError::PoolExhausted`], leaving the manifolds untouched.
    ///
    /// Stale manifolds (pairs the broad phase no longer reports) are dropped,
    /// surviving ones are refreshed against the moved transforms, then fresh
    /// narrow-phase contacts are merged in, preserving warm-start impulses.
    ///
    /// When the `parallel` feature is enabled the collision algorithms run
    /// across pairs via Rayon; manifold merging stays sequential.
    pub fn process(
        &mut self,
        pairs: &[(u32, u32)],
        bodies: &HashMap<u32, RigidBody>,
        config: &PhysicsConfig,
    ) -> Result<(), PhysicsError> {
        let live: HashSet<BodyPairKey> = pairs
            .iter()
            .map(|&(a, b)| BodyPairKey::new(a, b))
            .collect();
        if live.len() > config.algorithm_pool_size {
            return Err(PhysicsError::PoolExhausted {
                resource: "pair collision algorithm",
                capacity: config.algorithm_pool_size,
            });
        }
        self.cache.retain_pairs(|key| live.contains(key));

        let collide_pair = |key: &BodyPairKey| -> Option<Result<Vec<ContactResult>, PhysicsError>> {
            let (Some(body_a), Some(body_b)) = (bodies.get(&key.first), bodies.get(&key.second))
            else {
                return None;
            };
            Some(collide_shapes(
                &body_a.shape,
                &body_a.transform,
                &body_b.shape,
                &body_b.transform,
                config,
            ))
        };

        #[cfg(feature = "parallel")]
        let batches: Vec<(BodyPairKey, Option<Vec<ContactResult>>)> = {
            use rayon::prelude::*;
            pairs
                .par_iter()
                .map(|&(a, b)| {
                    let key = BodyPairKey::new(a, b);
                    let contacts = collide_pair(&key).transpose()?;
                    Ok((key, contacts))
                })
                .collect::<Result<_, PhysicsError>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let batches: Vec<(BodyPairKey, Option<Vec<ContactResult>>)> = {
            let mut out = Vec::with_capacity(pairs.len());
            for &(a, b) in pairs {
                let key = BodyPairKey::new(a, b);
                let contacts = collide_pair(&key).transpose()?;
                out.push((key, contacts));
            }
            out
        };

        for (key, contacts) in batches {
            let Some(contacts) = contacts else {
                // A body vanished between phases; drop its manifold.
                self.cache.remove_pair(&key);
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(&key.first), bodies.get(&key.second))
            else {
                self.cache.remove_pair(&key);
                continue;
            };

            let manifold = self.cache.get_or_create(key);
            manifold.refresh(
                &body_a.transform,
                &body_b.transform,
                config.contact_breaking_threshold,
            );
            for contact in contacts {
                manifold.add_contact(
                    ContactPoint::new(
                        &body_a.transform,
                        &body_b.transform,
                        contact.contact_a,
                        contact.contact_b,
                        contact.normal,
                        contact.depth,
                    ),
                    config.contact_breaking_threshold,
                );
            }
            if manifold.is_empty() {
                self.cache.remove_pair(&key);
            }
        }
        Ok(())
    }

    pub fn remove_body(&mut self, handle: u32) {
        self.cache.remove_body(handle);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PhysicsConfig {
        PhysicsConfig::default()
    }

    fn at(x: f32, y: f32, z: f32) -> PhysicsTransform {
        PhysicsTransform::from_position(Vec3::new(x, y, z))
    }

    #[test]
    fn test_sphere_sphere_overlap() {
        let s = CollisionShape::sphere(1.0).unwrap();
        let contacts = collide_shapes(&s, &at(0.0, 0.0, 0.0), &s, &at(1.5, 0.0, 0.0), &config())
            .unwrap();
        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert!((c.depth - 0.5).abs() < 1.0e-5);
        assert!((c.normal - Vec3::X).length() < 1.0e-5);
        assert!((c.contact_a - Vec3::new(1.0, 0.0, 0.0)).length() < 1.0e-5);
        assert!((c.contact_b - Vec3::new(0.5, 0.0, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn test_sphere_sphere_apart() {
        let s = CollisionShape::sphere(1.0).unwrap();
        let contacts =
            collide_shapes(&s, &at(0.0, 0.0, 0.0), &s, &at(3.0, 0.0, 0.0), &config()).unwrap();
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_sphere_box_outside_clamp() {
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let boxed = CollisionShape::cuboid(Vec3::ONE).unwrap();
        // Sphere center 0.4 above the top face: depth = 0.5 - 0.4 = 0.1.
        let contacts = collide_shapes(
            &sphere,
            &at(0.0, 1.4, 0.0),
            &boxed,
            &at(0.0, 0.0, 0.0),
            &config(),
        )
        .unwrap();
        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert!((c.depth - 0.1).abs() < 1.0e-5, "depth={}", c.depth);
        assert!((c.normal - Vec3::NEG_Y).length() < 1.0e-5, "normal={:?}", c.normal);
        assert!((c.contact_b - Vec3::new(0.0, 1.0, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn test_sphere_box_swapped_labels() {
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let boxed = CollisionShape::cuboid(Vec3::ONE).unwrap();
        let forward = collide_shapes(
            &sphere,
            &at(0.0, 1.4, 0.0),
            &boxed,
            &at(0.0, 0.0, 0.0),
            &config(),
        )
        .unwrap();
        let swapped = collide_shapes(
            &boxed,
            &at(0.0, 0.0, 0.0),
            &sphere,
            &at(0.0, 1.4, 0.0),
            &config(),
        )
        .unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(swapped.len(), 1);
        assert!((forward[0].normal + swapped[0].normal).length() < 1.0e-6);
        assert!((forward[0].contact_a - swapped[0].contact_b).length() < 1.0e-6);
        assert!((forward[0].depth - swapped[0].depth).abs() < 1.0e-6);
    }

    #[test]
    fn test_sphere_center_inside_box_uses_closest_face() {
        let sphere = CollisionShape::sphere(0.25).unwrap();
        let boxed = CollisionShape::cuboid(Vec3::ONE).unwrap();
        // Center inside, nearest to the +x face.
        let contacts = collide_shapes(
            &sphere,
            &at(0.8, 0.0, 0.0),
            &boxed,
            &at(0.0, 0.0, 0.0),
            &config(),
        )
        .unwrap();
        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert!(c.normal.is_finite() && (c.normal.length() - 1.0).abs() < 1.0e-5);
        assert!((c.normal - Vec3::NEG_X).length() < 1.0e-5, "normal={:?}", c.normal);
        assert!((c.depth - 0.45).abs() < 1.0e-5, "depth={}", c.depth);
    }

    #[test]
    fn test_capsule_triangle_symmetry() {
        let capsule = CollisionShape::capsule(0.5, 0.5).unwrap();
        let triangle = CollisionShape::triangle(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 2.0),
        );
        // Capsule resting slightly into the triangle plane.
        let cap_t = at(0.0, 0.9, 0.0);
        let tri_t = at(0.0, 0.0, 0.0);
        let forward = collide_shapes(&capsule, &cap_t, &triangle, &tri_t, &config()).unwrap();
        let swapped = collide_shapes(&triangle, &tri_t, &capsule, &cap_t, &config()).unwrap();
        assert_eq!(forward.len(), 1, "capsule should touch the triangle");
        assert_eq!(swapped.len(), 1);
        assert!((forward[0].normal + swapped[0].normal).length() < 1.0e-3);
        assert!((forward[0].depth - swapped[0].depth).abs() < 1.0e-3);
        assert!((forward[0].depth - 0.1).abs() < 0.05, "depth={}", forward[0].depth);
    }

    #[test]
    fn test_box_box_deep_overlap_uses_epa() {
        let b = CollisionShape::cuboid(Vec3::ONE).unwrap();
        let contacts =
            collide_shapes(&b, &at(0.0, 0.0, 0.0), &b, &at(0.5, 0.0, 0.0), &config()).unwrap();
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 1.5).abs() < 0.05, "depth={}", contacts[0].depth);
        assert!(contacts[0].normal.x.abs() > 0.99);
    }

    #[test]
    fn test_compound_collides_through_child() {
        let child = crate::shape::LocalizedShape {
            transform: PhysicsTransform::from_position(Vec3::new(3.0, 0.0, 0.0)),
            shape: CollisionShape::sphere(1.0).unwrap(),
        };
        let compound = CollisionShape::compound(vec![child]).unwrap();
        let other = CollisionShape::sphere(1.0).unwrap();
        // The child (at world x=3) overlaps the sphere at x=4.5.
        let contacts = collide_shapes(
            &compound,
            &at(0.0, 0.0, 0.0),
            &other,
            &at(4.5, 0.0, 0.0),
            &config(),
        )
        .unwrap();
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.5).abs() < 1.0e-5);
    }

    #[test]
    fn test_heightfield_pair_without_algorithm_is_an_error() {
        let hf = CollisionShape::heightfield(vec![0.0; 4], 2, 2, 1.0).unwrap();
        let result = collide_shapes(&hf, &at(0.0, 0.0, 0.0), &hf, &at(0.0, 0.0, 0.0), &config());
        assert!(matches!(
            result,
            Err(PhysicsError::UnsupportedShapePair { .. })
        ));
    }

    #[test]
    fn test_sphere_on_heightfield() {
        // Flat 4x4 field at height 0, sphere sunken slightly into it.
        let hf = CollisionShape::heightfield(vec![0.0; 16], 4, 4, 1.0).unwrap();
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let contacts = collide_shapes(
            &hf,
            &at(0.0, 0.0, 0.0),
            &sphere,
            &at(0.0, 0.45, 0.0),
            &config(),
        )
        .unwrap();
        assert!(!contacts.is_empty(), "sphere should rest on the field");
        for c in &contacts {
            assert!(c.depth > 0.0);
            assert!(c.normal.y > 0.9, "normal points from field into sphere, got {:?}", c.normal);
        }
    }

    #[test]
    fn test_pool_exhaustion_fails_the_step() {
        let mut np = NarrowPhase::new();
        let mut bodies = HashMap::new();
        let shape = std::sync::Arc::new(CollisionShape::sphere(1.0).unwrap());
        for (handle, x) in [(1, 0.0), (2, 1.5), (3, 3.0)] {
            bodies.insert(
                handle,
                RigidBody::new_dynamic(format!("b{handle}"), shape.clone(), at(x, 0.0, 0.0), 1.0),
            );
        }
        let small = PhysicsConfig {
            algorithm_pool_size: 2,
            ..Default::default()
        };

        let pairs = vec![(1, 2), (2, 3), (1, 3)];
        let result = np.process(&pairs, &bodies, &small);
        assert!(
            matches!(
                result,
                Err(PhysicsError::PoolExhausted { capacity: 2, .. })
            ),
            "three pairs must not fit a pool of two, got {result:?}"
        );
        assert!(
            np.manifolds().is_empty(),
            "a failed step must not leave partial manifolds"
        );

        // Within the pool bound the same scene processes fine.
        np.process(&pairs[..2], &bodies, &small).unwrap();
        assert!(np.manifolds().get(&BodyPairKey::new(1, 2)).is_some());
    }

    #[test]
    fn test_process_persists_manifold_between_steps() {
        let mut np = NarrowPhase::new();
        let mut bodies = HashMap::new();
        let shape = std::sync::Arc::new(CollisionShape::sphere(1.0).unwrap());
        bodies.insert(
            1,
            RigidBody::new_dynamic("a", shape.clone(), at(0.0, 0.0, 0.0), 1.0),
        );
        bodies.insert(
            2,
            RigidBody::new_dynamic("b", shape, at(1.5, 0.0, 0.0), 1.0),
        );

        let pairs = vec![(1, 2)];
        np.process(&pairs, &bodies, &config()).unwrap();
        let key = BodyPairKey::new(1, 2);
        assert_eq!(np.manifolds().get(&key).unwrap().len(), 1);

        // Warm-start impulse set by a solver must survive the next process.
        np.manifolds_mut()
            .get_or_create(key)
            .points_mut()[0]
            .normal_impulse = 3.0;
        np.process(&pairs, &bodies, &config()).unwrap();
        assert_eq!(
            np.manifolds().get(&key).unwrap().points()[0].normal_impulse,
            3.0
        );

        // Pair disappears from the broad phase: manifold goes too.
        np.process(&[], &bodies, &config()).unwrap();
        assert!(np.manifolds().get(&key).is_none());
    }
}
