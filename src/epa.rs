//! EPA Penetration Depth
//!
//! Expanding Polytope Algorithm. Starting from the terminal GJK simplex of an
//! overlapping pair, the polytope around the origin of the Minkowski
//! difference is expanded face by face until the closest boundary face stops
//! moving. That face yields the penetration normal, depth, and the witness
//! contact points on both shapes.

use glam::Vec3;

use crate::config::PhysicsConfig;
use crate::gjk::{closest_on_triangle, minkowski_support, ConvexObject, Simplex, SupportPoint};
use crate::math::EPSILON;

/// Outcome of an EPA query.
#[derive(Clone, Copy, Debug)]
pub enum EpaResult {
    /// Penetrating contact. `depth > 0`, `normal` is the unit direction from
    /// shape A into shape B, and the contact points are in world space.
    Collide {
        normal: Vec3,
        depth: f32,
        contact_a: Vec3,
        contact_b: Vec3,
    },
    /// The polytope degenerated (touching contact or numerical failure); the
    /// caller skips the contact for this step.
    Invalid,
}

struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
    alive: bool,
}

/// Run EPA from a terminal GJK simplex.
pub fn evaluate(
    a: &ConvexObject,
    b: &ConvexObject,
    simplex: &Simplex,
    config: &PhysicsConfig,
) -> EpaResult {
    let mut vertices: Vec<SupportPoint> = (0..simplex.len()).map(|i| *simplex.point(i)).collect();
    if !complete_to_tetrahedron(a, b, &mut vertices) {
        return EpaResult::Invalid;
    }

    let mut faces = Vec::with_capacity(config.epa_max_iterations as usize * 2);
    for &idx in &[[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]] {
        match make_face(&vertices, idx) {
            Some(face) => faces.push(face),
            None => return EpaResult::Invalid,
        }
    }

    for _ in 0..config.epa_max_iterations {
        let closest = match closest_face(&faces) {
            Some(i) => i,
            None => return EpaResult::Invalid,
        };
        let normal = faces[closest].normal;
        let distance = faces[closest].distance;

        let support = minkowski_support(a, b, normal);
        let growth = support.point.dot(normal) - distance;
        if growth <= config.epa_termination_tolerance {
            return face_contact(&vertices, &faces[closest]);
        }

        expand(&mut vertices, &mut faces, support);
    }

    // Iteration budget exhausted: answer with the best face found so far.
    match closest_face(&faces) {
        Some(i) => face_contact(&vertices, &faces[i]),
        None => EpaResult::Invalid,
    }
}

/// Grow a sub-tetrahedral simplex into a tetrahedron with volume.
fn complete_to_tetrahedron(
    a: &ConvexObject,
    b: &ConvexObject,
    vertices: &mut Vec<SupportPoint>,
) -> bool {
    const AXES: [Vec3; 6] = [
        Vec3::X,
        Vec3::Y,
        Vec3::Z,
        Vec3::NEG_X,
        Vec3::NEG_Y,
        Vec3::NEG_Z,
    ];

    if vertices.len() == 1 {
        let p = vertices[0].point;
        for dir in AXES {
            let s = minkowski_support(a, b, dir);
            if (s.point - p).length_squared() > EPSILON * EPSILON {
                vertices.push(s);
                break;
            }
        }
        if vertices.len() < 2 {
            return false;
        }
    }

    if vertices.len() == 2 {
        let axis = vertices[1].point - vertices[0].point;
        // Any direction orthogonal to the segment works.
        let ortho = axis.cross(Vec3::Y);
        let ortho = if ortho.length_squared() > EPSILON * EPSILON {
            ortho
        } else {
            axis.cross(Vec3::X)
        };
        for dir in [ortho, -ortho, axis.cross(ortho), -axis.cross(ortho)] {
            let s = minkowski_support(a, b, dir);
            if segment_point_distance_sq(vertices[0].point, vertices[1].point, s.point)
                > EPSILON * EPSILON
            {
                vertices.push(s);
                break;
            }
        }
        if vertices.len() < 3 {
            return false;
        }
    }

    if vertices.len() == 3 {
        let normal = (vertices[1].point - vertices[0].point)
            .cross(vertices[2].point - vertices[0].point);
        if normal.length_squared() < EPSILON * EPSILON {
            return false;
        }
        for dir in [normal, -normal] {
            let s = minkowski_support(a, b, dir);
            if (s.point - vertices[0].point).dot(normal).abs() > EPSILON {
                vertices.push(s);
                break;
            }
        }
        if vertices.len() < 4 {
            return false;
        }
    }

    true
}

fn segment_point_distance_sq(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < EPSILON * EPSILON {
        return (p - a).length_squared();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length_squared()
}

/// Build a face with an outward normal, or `None` when degenerate.
fn make_face(vertices: &[SupportPoint], indices: [usize; 3]) -> Option<Face> {
    let (v0, v1, v2) = (
        vertices[indices[0]].point,
        vertices[indices[1]].point,
        vertices[indices[2]].point,
    );
    let mut normal = (v1 - v0).cross(v2 - v0);
    if normal.length_squared() < EPSILON * EPSILON {
        return None;
    }
    normal = normal.normalize();
    let mut indices = indices;
    let mut distance = normal.dot(v0);
    if distance < 0.0 {
        normal = -normal;
        distance = -distance;
        indices.swap(1, 2);
    }
    Some(Face {
        indices,
        normal,
        distance,
        alive: true,
    })
}

fn closest_face(faces: &[Face]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, face) in faces.iter().enumerate() {
        if !face.alive {
            continue;
        }
        if best.is_none() || face.distance < faces[best.unwrap()].distance {
            best = Some(i);
        }
    }
    best
}

/// Remove faces visible from the new support and stitch the horizon.
fn expand(vertices: &mut Vec<SupportPoint>, faces: &mut Vec<Face>, support: SupportPoint) {
    let new_index = vertices.len();
    vertices.push(support);

    let mut horizon: Vec<(usize, usize)> = Vec::new();
    for face in faces.iter_mut() {
        if !face.alive {
            continue;
        }
        let v0 = vertices[face.indices[0]].point;
        if face.normal.dot(support.point - v0) > 0.0 {
            face.alive = false;
            for e in 0..3 {
                let edge = (face.indices[e], face.indices[(e + 1) % 3]);
                // An edge shared with another visible face cancels out.
                if let Some(pos) = horizon.iter().position(|&(x, y)| (y, x) == edge) {
                    horizon.swap_remove(pos);
                } else {
                    horizon.push(edge);
                }
            }
        }
    }

    for (ea, eb) in horizon {
        if let Some(face) = make_face(vertices, [ea, eb, new_index]) {
            faces.push(face);
        }
    }
}

/// Penetration answer from the terminal face.
fn face_contact(vertices: &[SupportPoint], face: &Face) -> EpaResult {
    let (p0, p1, p2) = (
        vertices[face.indices[0]],
        vertices[face.indices[1]],
        vertices[face.indices[2]],
    );
    let (_, bary) = closest_on_triangle(p0.point, p1.point, p2.point);
    let contact_a = p0.on_a * bary.0 + p1.on_a * bary.1 + p2.on_a * bary.2;
    let contact_b = p0.on_b * bary.0 + p1.on_b * bary.1 + p2.on_b * bary.2;
    if !face.normal.is_finite() || face.distance < 0.0 {
        return EpaResult::Invalid;
    }
    EpaResult::Collide {
        normal: face.normal,
        depth: face.distance,
        contact_a,
        contact_b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gjk::{self, GjkResult};
    use crate::math::PhysicsTransform;
    use crate::shape::CollisionShape;

    fn penetrate(
        shape_a: &CollisionShape,
        pos_a: Vec3,
        shape_b: &CollisionShape,
        pos_b: Vec3,
    ) -> EpaResult {
        let config = PhysicsConfig::default();
        let ta = PhysicsTransform::from_position(pos_a);
        let tb = PhysicsTransform::from_position(pos_b);
        let a = ConvexObject::with_margin(shape_a, &ta);
        let b = ConvexObject::with_margin(shape_b, &tb);
        match gjk::evaluate(&a, &b, &config) {
            GjkResult::Collide { simplex } => evaluate(&a, &b, &simplex, &config),
            other => panic!("expected overlap, GJK said {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_boxes_depth_and_normal() {
        let shape = CollisionShape::cuboid(Vec3::ONE).unwrap();
        match penetrate(&shape, Vec3::ZERO, &shape, Vec3::new(1.5, 0.0, 0.0)) {
            EpaResult::Collide {
                normal,
                depth,
                contact_a,
                contact_b,
            } => {
                assert!(depth > 0.0, "penetration depth must be positive");
                assert!((depth - 0.5).abs() < 2.0e-2, "depth={depth}");
                assert!(
                    normal.x.abs() > 0.99,
                    "normal should be the x axis, got {normal:?}"
                );
                // Witness points are depth apart along the normal.
                let gap = (contact_a - contact_b).length();
                assert!((gap - depth).abs() < 2.0e-2, "gap={gap}, depth={depth}");
            }
            EpaResult::Invalid => panic!("EPA returned Invalid"),
        }
    }

    #[test]
    fn test_deep_box_overlap() {
        let shape = CollisionShape::cuboid(Vec3::ONE).unwrap();
        match penetrate(&shape, Vec3::ZERO, &shape, Vec3::new(0.4, 0.0, 0.0)) {
            EpaResult::Collide { normal, depth, .. } => {
                assert!((depth - 1.6).abs() < 5.0e-2, "depth={depth}");
                assert!(normal.x.abs() > 0.99);
            }
            EpaResult::Invalid => panic!("EPA returned Invalid"),
        }
    }

    #[test]
    fn test_box_on_box_vertical_stack_penetration() {
        let shape = CollisionShape::cuboid(Vec3::ONE).unwrap();
        match penetrate(&shape, Vec3::ZERO, &shape, Vec3::new(0.0, 1.8, 0.0)) {
            EpaResult::Collide { normal, depth, .. } => {
                assert!((depth - 0.2).abs() < 2.0e-2, "depth={depth}");
                assert!(normal.y.abs() > 0.99, "normal={normal:?}");
            }
            EpaResult::Invalid => panic!("EPA returned Invalid"),
        }
    }

    #[test]
    fn test_normal_points_from_a_into_b() {
        let shape = CollisionShape::cuboid(Vec3::ONE).unwrap();
        match penetrate(&shape, Vec3::ZERO, &shape, Vec3::new(0.0, 1.5, 0.0)) {
            EpaResult::Collide { normal, depth, .. } => {
                // B sits above A, so pushing A along -normal must separate:
                // the normal points up toward B.
                assert!(normal.y > 0.99, "normal={normal:?}");
                assert!(depth > 0.0);
            }
            EpaResult::Invalid => panic!("EPA returned Invalid"),
        }
    }
}
