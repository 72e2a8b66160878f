//! Persistent Contact Manifolds
//!
//! Contacts found by the narrow phase are kept alive across steps so the
//! solver can warm-start its impulses. Each body pair owns one manifold of at
//! most [`MAX_MANIFOLD_POINTS`] points; new points either refresh a nearby
//! existing point (inheriting its accumulated impulses) or evict the point
//! whose removal keeps the largest contact area.

use std::collections::HashMap;

use glam::Vec3;

use crate::math::PhysicsTransform;

/// Maximum points kept per manifold. Four points are enough to represent a
/// stable face-face contact.
pub const MAX_MANIFOLD_POINTS: usize = 4;

// ============================================================================
// Keys
// ============================================================================

/// Order-independent key for a pair of body handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyPairKey {
    pub first: u32,
    pub second: u32,
}

impl BodyPairKey {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.first == handle || self.second == handle
    }
}

// ============================================================================
// Contact points
// ============================================================================

/// A single persistent contact between two bodies.
#[derive(Clone, Copy, Debug)]
pub struct ContactPoint {
    /// Witness point on body A, in A's local space.
    pub local_a: Vec3,
    /// Witness point on body B, in B's local space.
    pub local_b: Vec3,
    /// Witness point on body A, world space.
    pub position_a: Vec3,
    /// Witness point on body B, world space.
    pub position_b: Vec3,
    /// Unit contact normal, world space, pointing from A into B.
    pub normal: Vec3,
    /// Penetration depth; positive when the shapes overlap.
    pub depth: f32,
    /// Accumulated normal impulse, preserved across steps for warm starting.
    pub normal_impulse: f32,
    /// Accumulated friction impulses along the two tangent directions.
    pub tangent_impulse: [f32; 2],
    /// Steps this contact has survived.
    pub lifetime: u32,
    /// Contact anticipated by continuous collision detection; the shapes
    /// touch at the clamped transform but have not been seen by the discrete
    /// narrow phase yet. Dropped on the next refresh.
    pub predictive: bool,
}

impl ContactPoint {
    pub fn new(
        transform_a: &PhysicsTransform,
        transform_b: &PhysicsTransform,
        position_a: Vec3,
        position_b: Vec3,
        normal: Vec3,
        depth: f32,
    ) -> Self {
        Self {
            local_a: transform_a.inverse_transform_point(position_a),
            local_b: transform_b.inverse_transform_point(position_b),
            position_a,
            position_b,
            normal,
            depth,
            normal_impulse: 0.0,
            tangent_impulse: [0.0, 0.0],
            lifetime: 0,
            predictive: false,
        }
    }

    pub fn predictive(mut self) -> Self {
        self.predictive = true;
        self
    }
}

// ============================================================================
// Manifold
// ============================================================================

/// Persistent contact set for one body pair.
#[derive(Clone, Debug, Default)]
pub struct ContactManifold {
    points: Vec<ContactPoint>,
}

impl ContactManifold {
    #[inline]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Deepest penetration across the manifold, or `None` when empty.
    pub fn max_depth(&self) -> Option<f32> {
        self.points
            .iter()
            .map(|p| p.depth)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Insert a contact, merging with an existing point when the new one lies
    /// within `breaking_threshold` of it. Merged points keep their
    /// accumulated impulses and lifetime.
    pub fn add_contact(&mut self, mut point: ContactPoint, breaking_threshold: f32) {
        let threshold_sq = breaking_threshold * breaking_threshold;

        let nearest = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p.local_a - point.local_a).length_squared()))
            .filter(|&(_, d)| d < threshold_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((i, _)) = nearest {
            let old = &self.points[i];
            point.normal_impulse = old.normal_impulse;
            point.tangent_impulse = old.tangent_impulse;
            point.lifetime = old.lifetime + 1;
            self.points[i] = point;
            return;
        }

        if self.points.len() < MAX_MANIFOLD_POINTS {
            self.points.push(point);
            return;
        }

        // Manifold is full: drop the point whose removal keeps the largest
        // contact area, never the deepest one.
        self.points.push(point);
        let deepest = self
            .points
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.depth.total_cmp(&b.1.depth))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut worst = usize::MAX;
        let mut best_area = -1.0f32;
        for candidate in 0..self.points.len() {
            if candidate == deepest {
                continue;
            }
            let kept: Vec<Vec3> = self
                .points
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != candidate)
                .map(|(_, p)| p.position_a)
                .collect();
            let area = quad_area(&kept);
            if area > best_area {
                best_area = area;
                worst = candidate;
            }
        }
        if worst < self.points.len() {
            self.points.remove(worst);
        } else {
            self.points.pop();
        }
    }

    /// Recompute world positions and depths from the bodies' current
    /// transforms and drop contacts that drifted apart or slid away.
    pub fn refresh(
        &mut self,
        transform_a: &PhysicsTransform,
        transform_b: &PhysicsTransform,
        breaking_threshold: f32,
    ) {
        let threshold_sq = breaking_threshold * breaking_threshold;
        // Predictive contacts are one-step hints; the discrete narrow phase
        // re-adds them as real contacts once the shapes actually touch.
        self.points.retain(|p| !p.predictive);
        self.points.retain_mut(|p| {
            p.position_a = transform_a.transform_point(p.local_a);
            p.position_b = transform_b.transform_point(p.local_b);
            p.depth = (p.position_a - p.position_b).dot(p.normal);
            p.lifetime += 1;

            // Separated beyond the threshold.
            if p.depth < -breaking_threshold {
                return false;
            }
            // Slid sideways off the original contact.
            let offset = p.position_b - p.position_a;
            let lateral = offset + p.normal * p.depth;
            lateral.length_squared() < threshold_sq
        });
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Largest quadrilateral area spanned by four points.
fn quad_area(points: &[Vec3]) -> f32 {
    debug_assert_eq!(points.len(), 4);
    let a0 = (points[1] - points[0]).cross(points[3] - points[2]).length();
    let a1 = (points[2] - points[0]).cross(points[3] - points[1]).length();
    let a2 = (points[3] - points[0]).cross(points[2] - points[1]).length();
    a0.max(a1).max(a2)
}

// ============================================================================
// Cache
// ============================================================================

/// All live manifolds, keyed by body pair.
#[derive(Debug, Default)]
pub struct ManifoldCache {
    manifolds: HashMap<BodyPairKey, ContactManifold>,
}

impl ManifoldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, key: BodyPairKey) -> &mut ContactManifold {
        self.manifolds.entry(key).or_default()
    }

    pub fn get(&self, key: &BodyPairKey) -> Option<&ContactManifold> {
        self.manifolds.get(key)
    }

    pub fn remove_pair(&mut self, key: &BodyPairKey) {
        self.manifolds.remove(key);
    }

    /// Drop every manifold involving a removed body.
    pub fn remove_body(&mut self, handle: u32) {
        self.manifolds.retain(|key, _| !key.contains(handle));
    }

    /// Drop manifolds whose pairs the broad phase no longer reports, plus any
    /// that refreshed down to zero points.
    pub fn retain_pairs<F>(&mut self, mut keep: F)
    where
        F: FnMut(&BodyPairKey) -> bool,
    {
        self.manifolds
            .retain(|key, manifold| keep(key) && !manifold.is_empty());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BodyPairKey, &ContactManifold)> {
        self.manifolds.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&BodyPairKey, &mut ContactManifold)> {
        self.manifolds.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.manifolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifolds.is_empty()
    }

    pub fn clear(&mut self) {
        self.manifolds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f32 = 0.02;

    fn contact_at(x: f32, z: f32, depth: f32) -> ContactPoint {
        let id = PhysicsTransform::IDENTITY;
        ContactPoint::new(
            &id,
            &id,
            Vec3::new(x, -depth, z),
            Vec3::new(x, 0.0, z),
            Vec3::NEG_Y,
            depth,
        )
    }

    #[test]
    fn test_pair_key_order_independent() {
        assert_eq!(BodyPairKey::new(3, 7), BodyPairKey::new(7, 3));
        assert!(BodyPairKey::new(3, 7).contains(3));
        assert!(!BodyPairKey::new(3, 7).contains(5));
    }

    #[test]
    fn test_add_distinct_points() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(0.0, 0.0, 0.1), THRESHOLD);
        m.add_contact(contact_at(1.0, 0.0, 0.1), THRESHOLD);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_nearby_point_merges_and_keeps_impulse() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(0.0, 0.0, 0.1), THRESHOLD);
        m.points_mut()[0].normal_impulse = 2.5;
        m.points_mut()[0].tangent_impulse = [0.5, -0.25];

        // Within the breaking threshold of the existing point.
        m.add_contact(contact_at(0.005, 0.0, 0.15), THRESHOLD);
        assert_eq!(m.len(), 1, "nearby point should merge, not append");
        let p = &m.points()[0];
        assert_eq!(p.normal_impulse, 2.5, "warm-start impulse must survive");
        assert_eq!(p.tangent_impulse, [0.5, -0.25]);
        assert!((p.depth - 0.15).abs() < 1.0e-6, "geometry must refresh");
        assert_eq!(p.lifetime, 1);
    }

    #[test]
    fn test_manifold_caps_at_four_points() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(-1.0, -1.0, 0.1), THRESHOLD);
        m.add_contact(contact_at(1.0, -1.0, 0.1), THRESHOLD);
        m.add_contact(contact_at(1.0, 1.0, 0.1), THRESHOLD);
        m.add_contact(contact_at(-1.0, 1.0, 0.1), THRESHOLD);
        m.add_contact(contact_at(0.0, 0.0, 0.1), THRESHOLD);
        assert_eq!(m.len(), MAX_MANIFOLD_POINTS);
    }

    #[test]
    fn test_eviction_keeps_deepest_point() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(-1.0, -1.0, 0.1), THRESHOLD);
        m.add_contact(contact_at(1.0, -1.0, 0.1), THRESHOLD);
        m.add_contact(contact_at(1.0, 1.0, 0.1), THRESHOLD);
        // Deep center point, then a shallow corner forcing an eviction.
        m.add_contact(contact_at(0.0, 0.0, 0.9), THRESHOLD);
        m.add_contact(contact_at(-1.0, 1.0, 0.1), THRESHOLD);
        assert_eq!(m.len(), MAX_MANIFOLD_POINTS);
        assert!(
            m.points().iter().any(|p| (p.depth - 0.9).abs() < 1.0e-6),
            "deepest point must never be evicted"
        );
    }

    #[test]
    fn test_refresh_drops_separated_contact() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(0.0, 0.0, 0.01), THRESHOLD);

        // Move body A up far enough that the contact separates.
        let ta = PhysicsTransform::from_position(Vec3::new(0.0, 0.5, 0.0));
        m.refresh(&ta, &PhysicsTransform::IDENTITY, THRESHOLD);
        assert!(m.is_empty(), "separated contact should break");
    }

    #[test]
    fn test_refresh_drops_laterally_slid_contact() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(0.0, 0.0, 0.01), THRESHOLD);

        let ta = PhysicsTransform::from_position(Vec3::new(0.5, 0.0, 0.0));
        m.refresh(&ta, &PhysicsTransform::IDENTITY, THRESHOLD);
        assert!(m.is_empty(), "contact that slid sideways should break");
    }

    #[test]
    fn test_refresh_keeps_stable_contact_and_updates_depth() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(0.0, 0.0, 0.01), THRESHOLD);

        // Push A slightly down: penetration deepens, contact survives.
        let ta = PhysicsTransform::from_position(Vec3::new(0.0, -0.005, 0.0));
        m.refresh(&ta, &PhysicsTransform::IDENTITY, THRESHOLD);
        assert_eq!(m.len(), 1);
        assert!(m.points()[0].depth > 0.01);
        assert_eq!(m.points()[0].lifetime, 1);
    }

    #[test]
    fn test_refresh_drops_predictive_contact() {
        let mut m = ContactManifold::default();
        m.add_contact(contact_at(0.0, 0.0, 0.05), THRESHOLD);
        m.add_contact(contact_at(1.0, 0.0, 0.0).predictive(), THRESHOLD);
        assert_eq!(m.len(), 2);

        m.refresh(&PhysicsTransform::IDENTITY, &PhysicsTransform::IDENTITY, THRESHOLD);
        assert_eq!(m.len(), 1, "predictive hint must not outlive one step");
        assert!(!m.points()[0].predictive);
    }

    #[test]
    fn test_cache_remove_body() {
        let mut cache = ManifoldCache::new();
        cache
            .get_or_create(BodyPairKey::new(1, 2))
            .add_contact(contact_at(0.0, 0.0, 0.1), THRESHOLD);
        cache
            .get_or_create(BodyPairKey::new(2, 3))
            .add_contact(contact_at(0.0, 0.0, 0.1), THRESHOLD);
        cache
            .get_or_create(BodyPairKey::new(3, 4))
            .add_contact(contact_at(0.0, 0.0, 0.1), THRESHOLD);

        cache.remove_body(2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&BodyPairKey::new(3, 4)).is_some());
    }
}
