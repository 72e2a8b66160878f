//! Continuous Collision Detection
//!
//! Conservative advancement over one step. A fast body is represented as a
//! [`TemporalObject`] sweeping from its current transform to the candidate
//! end-of-step transform; repeated GJK distance queries advance an
//! interpolation parameter by the distance over a velocity bound until the
//! shapes touch or the step ends. The earliest time of impact across all
//! candidates wins.

use std::cmp::Ordering;

use glam::Vec3;

use crate::config::PhysicsConfig;
use crate::gjk::{self, ConvexObject, GjkResult};
use crate::math::{safe_normalize, PhysicsTransform};
use crate::shape::CollisionShape;

/// Contact distance below which the advancement stops and reports a hit.
const TOUCH_DISTANCE: f32 = 1.0e-3;

/// Advancement iterations before giving up on convergence.
const MAX_ADVANCE_ITERATIONS: usize = 32;

/// A convex shape swept between two transforms over one step.
#[derive(Clone, Debug)]
pub struct TemporalObject<'a> {
    pub shape: &'a CollisionShape,
    pub from: PhysicsTransform,
    pub to: PhysicsTransform,
}

impl<'a> TemporalObject<'a> {
    pub fn new(shape: &'a CollisionShape, from: PhysicsTransform, to: PhysicsTransform) -> Self {
        Self { shape, from, to }
    }

    /// A body that does not move during the step.
    pub fn stationary(shape: &'a CollisionShape, transform: PhysicsTransform) -> Self {
        Self {
            shape,
            from: transform,
            to: transform,
        }
    }

    /// Bounds covering the whole sweep.
    pub fn swept_aabb(&self) -> crate::aabb::Aabb {
        self.shape
            .to_aabb(&self.from)
            .merge(&self.shape.to_aabb(&self.to))
    }

    /// Pose at normalized sweep time `t` in `[0, 1]`.
    fn at(&self, t: f32) -> PhysicsTransform {
        PhysicsTransform::new(
            self.from.position.lerp(self.to.position, t),
            self.from.orientation.slerp(self.to.orientation, t),
        )
    }

    /// Translation distance over the full sweep.
    fn linear_distance(&self) -> f32 {
        (self.to.position - self.from.position).length()
    }

    /// Rotation angle over the full sweep, in radians.
    fn angular_distance(&self) -> f32 {
        self.from.orientation.angle_between(self.to.orientation)
    }

    /// Radius of the bounding sphere around the shape's local origin, used to
    /// bound the surface speed contributed by rotation.
    fn bounding_radius(&self) -> f32 {
        self.shape
            .to_aabb(&PhysicsTransform::IDENTITY)
            .half_extents()
            .length()
    }
}

/// A time-of-impact hit against one candidate body.
#[derive(Clone, Copy, Debug)]
pub struct ContinuousCollisionResult {
    /// Handle of the body that was hit.
    pub body: u32,
    /// Normalized sweep time of first touch, in `[0, 1]`.
    pub time_to_hit: f32,
    /// Unit normal at the hit, pointing from the moving shape into the hit
    /// shape.
    pub normal: Vec3,
    /// World-space point of first touch on the hit shape.
    pub hit_point: Vec3,
}

impl PartialEq for ContinuousCollisionResult {
    fn eq(&self, other: &Self) -> bool {
        self.time_to_hit == other.time_to_hit && self.body == other.body
    }
}

impl Eq for ContinuousCollisionResult {}

impl PartialOrd for ContinuousCollisionResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContinuousCollisionResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time_to_hit
            .total_cmp(&other.time_to_hit)
            .then(self.body.cmp(&other.body))
    }
}

/// Time of impact between two swept convex shapes by conservative
/// advancement. Returns `None` when they never touch within the sweep.
pub fn time_of_impact(
    a: &TemporalObject,
    b: &TemporalObject,
    config: &PhysicsConfig,
) -> Option<(f32, Vec3, Vec3)> {
    // Upper bound on how fast the surfaces approach, per unit of sweep time.
    let speed_bound = a.linear_distance()
        + b.linear_distance()
        + a.angular_distance() * a.bounding_radius()
        + b.angular_distance() * b.bounding_radius();

    let mut t = 0.0f32;
    for _ in 0..MAX_ADVANCE_ITERATIONS {
        let pose_a = a.at(t);
        let pose_b = b.at(t);
        let obj_a = ConvexObject::with_margin(a.shape, &pose_a);
        let obj_b = ConvexObject::with_margin(b.shape, &pose_b);

        match gjk::evaluate(&obj_a, &obj_b, config) {
            GjkResult::Collide { .. } => {
                // Already touching at t (t = 0 means the pair starts in
                // contact; the discrete narrow phase owns that case).
                let (normal, point) = touch_frame(a, b, t, config);
                return Some((t, normal, point));
            }
            GjkResult::NoCollide {
                separation,
                closest_a,
                closest_b,
            } => {
                if separation < TOUCH_DISTANCE {
                    let normal = safe_normalize(closest_b - closest_a);
                    return Some((t, normal, closest_b));
                }
                if speed_bound <= f32::EPSILON {
                    return None;
                }
                t += separation / speed_bound;
                if t > 1.0 {
                    return None;
                }
            }
            GjkResult::MaxIterations => {
                log::debug!("ccd: GJK failed to converge during advancement");
                return None;
            }
        }
    }
    // Convergence stalled just short of touching; report the current time.
    let (normal, point) = touch_frame(a, b, t, config);
    Some((t, normal, point))
}

/// Best-effort normal and point when the advancement terminates in contact.
fn touch_frame(
    a: &TemporalObject,
    b: &TemporalObject,
    t: f32,
    config: &PhysicsConfig,
) -> (Vec3, Vec3) {
    // Back off slightly to recover a separation direction.
    let back = (t - 0.01).max(0.0);
    let pose_a = a.at(back);
    let pose_b = b.at(back);
    let obj_a = ConvexObject::with_margin(a.shape, &pose_a);
    let obj_b = ConvexObject::with_margin(b.shape, &pose_b);
    if let GjkResult::NoCollide {
        closest_a,
        closest_b,
        ..
    } = gjk::evaluate(&obj_a, &obj_b, config)
    {
        (safe_normalize(closest_b - closest_a), closest_b)
    } else {
        // Fully embedded: fall back to the center line.
        let dir = safe_normalize(pose_b.position - pose_a.position);
        (dir, pose_b.position)
    }
}

/// Sweep a moving object against a set of candidates and collect the hits
/// sorted by time of impact.
pub fn continuous_collision_test<'a, I>(
    moving: &TemporalObject,
    candidates: I,
    config: &PhysicsConfig,
) -> Vec<ContinuousCollisionResult>
where
    I: IntoIterator<Item = (u32, TemporalObject<'a>)>,
{
    let swept = moving.swept_aabb();
    let mut hits = Vec::new();
    for (handle, candidate) in candidates {
        if !swept.intersects(&candidate.swept_aabb()) {
            continue;
        }
        if let Some((time, normal, point)) = time_of_impact(moving, &candidate, config) {
            hits.push(ContinuousCollisionResult {
                body: handle,
                time_to_hit: time,
                normal,
                hit_point: point,
            });
        }
    }
    hits.sort_unstable();
    hits
}

/// A ray hit found by sweeping a point along the ray.
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub body: u32,
    pub distance: f32,
    pub normal: Vec3,
    pub hit_point: Vec3,
}

/// Cast a ray against one shape. A ray is continuous collision detection of a
/// (near) zero-radius sphere swept along the direction.
pub fn ray_shape_test(
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
    shape: &CollisionShape,
    transform: &PhysicsTransform,
    config: &PhysicsConfig,
) -> Option<(f32, Vec3, Vec3)> {
    let dir = safe_normalize(direction);
    let point = CollisionShape::Sphere {
        radius: TOUCH_DISTANCE,
    };
    let sweep = TemporalObject::new(
        &point,
        PhysicsTransform::from_position(origin),
        PhysicsTransform::from_position(origin + dir * max_distance),
    );
    let target = TemporalObject::stationary(shape, *transform);
    time_of_impact(&sweep, &target, config)
        .map(|(t, normal, hit_point)| (t * max_distance, normal, hit_point))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PhysicsConfig {
        PhysicsConfig::default()
    }

    #[test]
    fn test_swept_aabb_covers_both_ends() {
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let sweep = TemporalObject::new(
            &sphere,
            PhysicsTransform::from_position(Vec3::ZERO),
            PhysicsTransform::from_position(Vec3::new(10.0, 0.0, 0.0)),
        );
        let aabb = sweep.swept_aabb();
        assert!(aabb.min.x <= -0.5 && aabb.max.x >= 10.5);
    }

    #[test]
    fn test_toi_head_on() {
        // Sphere of radius 0.5 flying 10 units at a unit box wall at x=5.
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let wall = CollisionShape::cuboid(Vec3::new(0.1, 5.0, 5.0)).unwrap();
        let sweep = TemporalObject::new(
            &sphere,
            PhysicsTransform::from_position(Vec3::ZERO),
            PhysicsTransform::from_position(Vec3::new(10.0, 0.0, 0.0)),
        );
        let target =
            TemporalObject::stationary(&wall, PhysicsTransform::from_position(Vec3::new(5.0, 0.0, 0.0)));

        let (t, normal, _) = time_of_impact(&sweep, &target, &config()).expect("must hit");
        // Surfaces touch when the center is at x = 5 - 0.1 - 0.5 = 4.4.
        assert!((t - 0.44).abs() < 0.02, "t={t}");
        assert!(normal.x > 0.9, "normal={normal:?}");
    }

    #[test]
    fn test_no_hit_when_passing_beside() {
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let wall = CollisionShape::cuboid(Vec3::new(0.1, 1.0, 1.0)).unwrap();
        let sweep = TemporalObject::new(
            &sphere,
            PhysicsTransform::from_position(Vec3::new(0.0, 5.0, 0.0)),
            PhysicsTransform::from_position(Vec3::new(10.0, 5.0, 0.0)),
        );
        let target =
            TemporalObject::stationary(&wall, PhysicsTransform::from_position(Vec3::new(5.0, 0.0, 0.0)));
        assert!(time_of_impact(&sweep, &target, &config()).is_none());
    }

    #[test]
    fn test_no_hit_when_sweep_too_short() {
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let wall = CollisionShape::cuboid(Vec3::ONE).unwrap();
        let sweep = TemporalObject::new(
            &sphere,
            PhysicsTransform::from_position(Vec3::ZERO),
            PhysicsTransform::from_position(Vec3::new(1.0, 0.0, 0.0)),
        );
        let target = TemporalObject::stationary(
            &wall,
            PhysicsTransform::from_position(Vec3::new(10.0, 0.0, 0.0)),
        );
        assert!(time_of_impact(&sweep, &target, &config()).is_none());
    }

    #[test]
    fn test_results_sorted_by_time() {
        let sphere = CollisionShape::sphere(0.5).unwrap();
        let wall = CollisionShape::cuboid(Vec3::new(0.1, 5.0, 5.0)).unwrap();
        let sweep = TemporalObject::new(
            &sphere,
            PhysicsTransform::from_position(Vec3::ZERO),
            PhysicsTransform::from_position(Vec3::new(20.0, 0.0, 0.0)),
        );
        // Far wall listed first; sorting must put the near wall first anyway.
        let far = TemporalObject::stationary(
            &wall,
            PhysicsTransform::from_position(Vec3::new(15.0, 0.0, 0.0)),
        );
        let near = TemporalObject::stationary(
            &wall,
            PhysicsTransform::from_position(Vec3::new(5.0, 0.0, 0.0)),
        );
        let hits = continuous_collision_test(&sweep, [(8u32, far), (3u32, near)], &config());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].body, 3, "nearest hit must come first");
        assert!(hits[0].time_to_hit < hits[1].time_to_hit);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.time_to_hit)));
    }

    #[test]
    fn test_ray_against_sphere() {
        let sphere = CollisionShape::sphere(1.0).unwrap();
        let transform = PhysicsTransform::from_position(Vec3::new(5.0, 0.0, 0.0));
        let hit = ray_shape_test(Vec3::ZERO, Vec3::X, 100.0, &sphere, &transform, &config());
        let (distance, _, _) = hit.expect("ray must hit the sphere");
        assert!((distance - 4.0).abs() < 0.1, "distance={distance}");

        let miss = ray_shape_test(Vec3::ZERO, Vec3::Y, 100.0, &sphere, &transform, &config());
        assert!(miss.is_none());
    }
}
