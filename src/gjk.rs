//! GJK Distance Algorithm
//!
//! Simplex-based distance query between two convex shapes. The algorithm
//! walks support points of the Minkowski difference toward the origin and
//! either encloses it (overlap) or converges to the pair of closest points.
//!
//! The narrow phase usually runs this on the *cores* of the shapes (support
//! points without margins) so that shallow contacts can be reconstructed from
//! the closest points and the margins alone, without ever running EPA.

use glam::Vec3;

use crate::config::PhysicsConfig;
use crate::math::{PhysicsTransform, EPSILON};
use crate::shape::CollisionShape;

// ============================================================================
// Support mapping over a shape pair
// ============================================================================

/// One support point of the Minkowski difference `A - B`, keeping the
/// world-space witness points on both shapes.
#[derive(Clone, Copy, Debug)]
pub struct SupportPoint {
    pub point: Vec3,
    pub on_a: Vec3,
    pub on_b: Vec3,
}

/// A convex shape placed in the world, answering support queries in world
/// space.
#[derive(Clone, Copy)]
pub struct ConvexObject<'a> {
    pub shape: &'a CollisionShape,
    pub transform: &'a PhysicsTransform,
    pub with_margin: bool,
}

impl<'a> ConvexObject<'a> {
    pub fn new(shape: &'a CollisionShape, transform: &'a PhysicsTransform) -> Self {
        Self {
            shape,
            transform,
            with_margin: false,
        }
    }

    pub fn with_margin(shape: &'a CollisionShape, transform: &'a PhysicsTransform) -> Self {
        Self {
            shape,
            transform,
            with_margin: true,
        }
    }

    /// Furthest point of the placed shape in a world-space direction.
    pub fn support(&self, world_direction: Vec3) -> Vec3 {
        let local_dir = self.transform.inverse_transform_direction(world_direction);
        let local = self.shape.support_point(local_dir, self.with_margin);
        self.transform.transform_point(local)
    }
}

/// Minkowski-difference support of a pair of placed shapes.
pub fn minkowski_support(a: &ConvexObject, b: &ConvexObject, direction: Vec3) -> SupportPoint {
    let on_a = a.support(direction);
    let on_b = b.support(-direction);
    SupportPoint {
        point: on_a - on_b,
        on_a,
        on_b,
    }
}

// ============================================================================
// Simplex
// ============================================================================

/// Up to 4 support points with the barycentric weights of the point closest
/// to the origin.
#[derive(Clone, Debug, Default)]
pub struct Simplex {
    points: [Option<SupportPoint>; 4],
    weights: [f32; 4],
    len: usize,
}

impl Simplex {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn point(&self, i: usize) -> &SupportPoint {
        self.points[i].as_ref().unwrap()
    }

    fn push(&mut self, p: SupportPoint) {
        debug_assert!(self.len < 4);
        self.points[self.len] = Some(p);
        self.len += 1;
    }

    fn contains_point(&self, p: Vec3) -> bool {
        (0..self.len).any(|i| (self.point(i).point - p).length_squared() < EPSILON * EPSILON)
    }

    /// Witness points on both shapes for the current closest point.
    pub fn closest_points(&self) -> (Vec3, Vec3) {
        let mut on_a = Vec3::ZERO;
        let mut on_b = Vec3::ZERO;
        for i in 0..self.len {
            on_a += self.point(i).on_a * self.weights[i];
            on_b += self.point(i).on_b * self.weights[i];
        }
        (on_a, on_b)
    }

    /// Closest point of the simplex to the origin; updates weights and drops
    /// vertices that do not contribute. Returns `None` when the origin lies
    /// inside a tetrahedron.
    fn reduce_to_closest(&mut self) -> Option<Vec3> {
        match self.len {
            1 => {
                self.weights = [1.0, 0.0, 0.0, 0.0];
                Some(self.point(0).point)
            }
            2 => {
                let (closest, bary) =
                    closest_on_segment(self.point(0).point, self.point(1).point);
                self.retain_weighted(&[bary.0, bary.1]);
                Some(closest)
            }
            3 => {
                let (closest, bary) = closest_on_triangle(
                    self.point(0).point,
                    self.point(1).point,
                    self.point(2).point,
                );
                self.retain_weighted(&[bary.0, bary.1, bary.2]);
                Some(closest)
            }
            4 => {
                let (a, b, c, d) = (
                    self.point(0).point,
                    self.point(1).point,
                    self.point(2).point,
                    self.point(3).point,
                );
                if origin_inside_tetrahedron(a, b, c, d) {
                    return None;
                }
                // Closest point lies on one of the faces opposite a vertex.
                let faces: [(usize, usize, usize); 4] =
                    [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
                let mut best: Option<(f32, Vec3, [f32; 4])> = None;
                for &(i, j, k) in &faces {
                    let (closest, bary) = closest_on_triangle(
                        self.points[i].unwrap().point,
                        self.points[j].unwrap().point,
                        self.points[k].unwrap().point,
                    );
                    let dist_sq = closest.length_squared();
                    if best.is_none() || dist_sq < best.as_ref().unwrap().0 {
                        let mut weights = [0.0; 4];
                        weights[i] = bary.0;
                        weights[j] = bary.1;
                        weights[k] = bary.2;
                        best = Some((dist_sq, closest, weights));
                    }
                }
                let (_, closest, weights) = best.unwrap();
                self.retain_weighted(&weights);
                Some(closest)
            }
            _ => unreachable!(),
        }
    }

    /// Drop vertices with (near-)zero weight and renormalize.
    fn retain_weighted(&mut self, weights: &[f32]) {
        let mut kept: [Option<SupportPoint>; 4] = [None; 4];
        let mut kept_w = [0.0; 4];
        let mut n = 0;
        for (i, &w) in weights.iter().enumerate() {
            if w > EPSILON {
                kept[n] = self.points[i];
                kept_w[n] = w;
                n += 1;
            }
        }
        // Keep at least the last point so the simplex never empties.
        if n == 0 {
            kept[0] = self.points[self.len - 1];
            kept_w[0] = 1.0;
            n = 1;
        }
        let total: f32 = kept_w[..n].iter().sum();
        for w in &mut kept_w[..n] {
            *w /= total;
        }
        self.points = kept;
        self.weights = kept_w;
        self.len = n;
    }
}

// ============================================================================
// Closest-point primitives
// ============================================================================

/// Closest point to the origin on segment `ab` with barycentric weights.
pub fn closest_on_segment(a: Vec3, b: Vec3) -> (Vec3, (f32, f32)) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < EPSILON * EPSILON {
        return (a, (1.0, 0.0));
    }
    let t = (-a.dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t, (1.0 - t, t))
}

/// Closest point to the origin on triangle `abc` with barycentric weights.
///
/// Full Voronoi-region walk; degenerate triangles fall back to the best edge.
pub fn closest_on_triangle(a: Vec3, b: Vec3, c: Vec3) -> (Vec3, (f32, f32, f32)) {
    let ab = b - a;
    let ac = c - a;
    let ap = -a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, (1.0, 0.0, 0.0));
    }

    let bp = -b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, (0.0, 1.0, 0.0));
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return (a + ab * t, (1.0 - t, t, 0.0));
    }

    let cp = -c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, (0.0, 0.0, 1.0));
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return (a + ac * t, (1.0 - t, 0.0, t));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * t, (0.0, 1.0 - t, t));
    }

    let denom = va + vb + vc;
    if denom.abs() < EPSILON {
        // Degenerate triangle: take the best of the three edges.
        let candidates = [
            closest_on_segment(a, b),
            closest_on_segment(a, c),
            closest_on_segment(b, c),
        ];
        let baries = [
            (candidates[0].1 .0, candidates[0].1 .1, 0.0),
            (candidates[1].1 .0, 0.0, candidates[1].1 .1),
            (0.0, candidates[2].1 .0, candidates[2].1 .1),
        ];
        let mut best = 0;
        for i in 1..3 {
            if candidates[i].0.length_squared() < candidates[best].0.length_squared() {
                best = i;
            }
        }
        return (candidates[best].0, baries[best]);
    }

    let v = vb / denom;
    let w = vc / denom;
    (a + ab * v + ac * w, (1.0 - v - w, v, w))
}

fn origin_inside_tetrahedron(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> bool {
    let same_side = |p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3| -> bool {
        let normal = (p2 - p1).cross(p3 - p1);
        let dot_p4 = normal.dot(p4 - p1);
        let dot_origin = normal.dot(-p1);
        dot_p4 * dot_origin >= 0.0
    };
    same_side(a, b, c, d)
        && same_side(a, b, d, c)
        && same_side(a, c, d, b)
        && same_side(b, c, d, a)
}

// ============================================================================
// GJK driver
// ============================================================================

/// Outcome of a GJK query.
#[derive(Clone, Debug)]
pub enum GjkResult {
    /// The shapes overlap; the terminal simplex seeds EPA.
    Collide { simplex: Simplex },
    /// The shapes are apart by `separation`, with world-space witness points.
    NoCollide {
        separation: f32,
        closest_a: Vec3,
        closest_b: Vec3,
    },
    /// No convergence within the iteration budget. Callers treat the pair as
    /// non-colliding for this step.
    MaxIterations,
}

/// Run GJK between two placed convex shapes.
pub fn evaluate(a: &ConvexObject, b: &ConvexObject, config: &PhysicsConfig) -> GjkResult {
    let mut simplex = Simplex::default();

    // Any fixed starting direction works; the center offset converges faster.
    let initial_dir = {
        let d = b.transform.position - a.transform.position;
        if d.length_squared() > EPSILON * EPSILON {
            d
        } else {
            Vec3::X
        }
    };
    simplex.push(minkowski_support(a, b, initial_dir));

    let mut termination_tolerance = config.gjk_relative_termination_tolerance;

    for _ in 0..config.gjk_max_iterations {
        let closest = match simplex.reduce_to_closest() {
            Some(c) => c,
            None => return GjkResult::Collide { simplex },
        };

        let dist_sq = closest.length_squared();
        if dist_sq < config.gjk_minimum_termination_tolerance {
            return GjkResult::Collide { simplex };
        }

        let direction = -closest;
        let support = minkowski_support(a, b, direction);

        // No progress past the current closest point: converged.
        let progress = dist_sq - closest.dot(support.point);
        if progress <= termination_tolerance * dist_sq || simplex.contains_point(support.point) {
            let (closest_a, closest_b) = simplex.closest_points();
            return GjkResult::NoCollide {
                separation: dist_sq.sqrt(),
                closest_a,
                closest_b,
            };
        }

        simplex.push(support);

        // Relax the tolerance so near-degenerate configurations still land on
        // a usable answer instead of cycling.
        termination_tolerance *= 1.0 + config.gjk_minimum_tolerance_growth;
    }

    GjkResult::MaxIterations
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn place(pos: Vec3) -> PhysicsTransform {
        PhysicsTransform::from_position(pos)
    }

    #[test]
    fn test_closest_on_segment_interior() {
        let (p, bary) = closest_on_segment(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        assert!((p - Vec3::new(0.0, 1.0, 0.0)).length() < 1.0e-6);
        assert!((bary.0 - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn test_closest_on_segment_endpoint() {
        let (p, bary) = closest_on_segment(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        assert!((p - Vec3::new(1.0, 0.0, 0.0)).length() < 1.0e-6);
        assert_eq!(bary, (1.0, 0.0));
    }

    #[test]
    fn test_closest_on_triangle_face_interior() {
        let (p, bary) = closest_on_triangle(
            Vec3::new(-1.0, 2.0, -1.0),
            Vec3::new(1.0, 2.0, -1.0),
            Vec3::new(0.0, 2.0, 1.0),
        );
        assert!((p.y - 2.0).abs() < 1.0e-6);
        let sum = bary.0 + bary.1 + bary.2;
        assert!((sum - 1.0).abs() < 1.0e-5);
        assert!(bary.0 > 0.0 && bary.1 > 0.0 && bary.2 > 0.0);
    }

    #[test]
    fn test_closest_on_triangle_vertex_region() {
        let (p, bary) = closest_on_triangle(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(1.5, 1.0, 0.0),
        );
        assert!((p - Vec3::new(1.0, 0.0, 0.0)).length() < 1.0e-6);
        assert_eq!(bary, (1.0, 0.0, 0.0));
    }

    #[test]
    fn test_separated_spheres_distance() {
        let sphere = CollisionShape::sphere(1.0).unwrap();
        let ta = place(Vec3::ZERO);
        let tb = place(Vec3::new(5.0, 0.0, 0.0));
        // Query the full surfaces, including margins.
        let a = ConvexObject::with_margin(&sphere, &ta);
        let b = ConvexObject::with_margin(&sphere, &tb);
        match evaluate(&a, &b, &PhysicsConfig::default()) {
            GjkResult::NoCollide {
                separation,
                closest_a,
                closest_b,
            } => {
                assert!((separation - 3.0).abs() < 1.0e-3, "separation={separation}");
                assert!((closest_a.x - 1.0).abs() < 1.0e-2);
                assert!((closest_b.x - 4.0).abs() < 1.0e-2);
            }
            other => panic!("expected NoCollide, got {other:?}"),
        }
    }

    #[test]
    fn test_sphere_cores_report_center_distance() {
        // Without margins, spheres degenerate to their centers.
        let sphere = CollisionShape::sphere(1.0).unwrap();
        let ta = place(Vec3::ZERO);
        let tb = place(Vec3::new(1.5, 0.0, 0.0));
        let a = ConvexObject::new(&sphere, &ta);
        let b = ConvexObject::new(&sphere, &tb);
        match evaluate(&a, &b, &PhysicsConfig::default()) {
            GjkResult::NoCollide { separation, .. } => {
                assert!((separation - 1.5).abs() < 1.0e-3);
            }
            other => panic!("expected NoCollide, got {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_boxes_collide() {
        let b1 = CollisionShape::cuboid(Vec3::ONE).unwrap();
        let b2 = CollisionShape::cuboid(Vec3::ONE).unwrap();
        let ta = place(Vec3::ZERO);
        let tb = place(Vec3::new(1.0, 0.0, 0.0));
        let a = ConvexObject::with_margin(&b1, &ta);
        let b = ConvexObject::with_margin(&b2, &tb);
        assert!(matches!(
            evaluate(&a, &b, &PhysicsConfig::default()),
            GjkResult::Collide { .. }
        ));
    }

    #[test]
    fn test_separated_boxes_gap() {
        let shape = CollisionShape::cuboid(Vec3::ONE).unwrap();
        let ta = place(Vec3::ZERO);
        let tb = place(Vec3::new(3.0, 0.0, 0.0));
        let a = ConvexObject::with_margin(&shape, &ta);
        let b = ConvexObject::with_margin(&shape, &tb);
        match evaluate(&a, &b, &PhysicsConfig::default()) {
            GjkResult::NoCollide { separation, .. } => {
                assert!((separation - 1.0).abs() < 1.0e-3, "separation={separation}");
            }
            other => panic!("expected NoCollide, got {other:?}"),
        }
    }

    #[test]
    fn test_rotated_box_against_box() {
        let shape = CollisionShape::cuboid(Vec3::ONE).unwrap();
        let ta = PhysicsTransform::IDENTITY;
        let tb = PhysicsTransform::new(
            Vec3::new(2.0 * 2.0f32.sqrt() + 0.5, 0.0, 0.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
        );
        let a = ConvexObject::with_margin(&shape, &ta);
        let b = ConvexObject::with_margin(&shape, &tb);
        match evaluate(&a, &b, &PhysicsConfig::default()) {
            GjkResult::NoCollide { separation, .. } => {
                // Rotated box corner reaches sqrt(2) toward the other box.
                let expected = 2.0 * 2.0f32.sqrt() + 0.5 - 1.0 - 2.0f32.sqrt();
                assert!(
                    (separation - expected).abs() < 5.0e-3,
                    "separation={separation}, expected={expected}"
                );
            }
            other => panic!("expected NoCollide, got {other:?}"),
        }
    }

    #[test]
    fn test_touching_spheres_report_collide_or_tiny_gap() {
        let sphere = CollisionShape::sphere(1.0).unwrap();
        let ta = place(Vec3::ZERO);
        let tb = place(Vec3::new(2.0, 0.0, 0.0));
        let a = ConvexObject::with_margin(&sphere, &ta);
        let b = ConvexObject::with_margin(&sphere, &tb);
        match evaluate(&a, &b, &PhysicsConfig::default()) {
            GjkResult::Collide { .. } => {}
            GjkResult::NoCollide { separation, .. } => {
                assert!(separation.abs() < 1.0e-2, "separation={separation}");
            }
            GjkResult::MaxIterations => panic!("did not converge"),
        }
    }
}
