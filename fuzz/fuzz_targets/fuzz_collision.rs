#![no_main]
use arbitrary::Arbitrary;
use glam::{Quat, Vec3};
use libfuzzer_sys::fuzz_target;

use aegis_physics::{collide_shapes, CollisionShape, PhysicsConfig, PhysicsTransform};

#[derive(Debug, Arbitrary)]
struct CollisionInput {
    /// Shape selectors for both sides
    kind_a: u8,
    kind_b: u8,
    /// Relative position of shape B (i8 keeps the pair near each other)
    x: i8,
    y: i8,
    z: i8,
    /// Raw quaternion components for B's orientation
    qx: i8,
    qy: i8,
    qz: i8,
    qw: i8,
    /// Shape dimensions in deci-units (> 0 after clamping)
    dims: [u8; 3],
}

fn make_shape(kind: u8, dims: &[u8; 3]) -> Option<CollisionShape> {
    let d = |i: usize| (dims[i].max(1)) as f32 / 10.0;
    match kind % 5 {
        0 => CollisionShape::sphere(d(0)).ok(),
        1 => CollisionShape::cuboid(Vec3::new(d(0), d(1), d(2))).ok(),
        2 => CollisionShape::capsule(d(0), d(1)).ok(),
        3 => CollisionShape::cylinder(d(0), d(1)).ok(),
        4 => CollisionShape::cone(d(0), d(1)).ok(),
        _ => unreachable!(),
    }
}

// Fuzz the GJK/EPA dispatch with near-degenerate placements: overlapping,
// touching and concentric shape pairs. Must never panic, and reported
// penetrations must be finite.
fuzz_target!(|input: CollisionInput| {
    let config = PhysicsConfig::default();
    let (Some(shape_a), Some(shape_b)) = (
        make_shape(input.kind_a, &input.dims),
        make_shape(input.kind_b, &input.dims),
    ) else {
        return;
    };

    let rotation = Quat::from_xyzw(
        input.qx as f32,
        input.qy as f32,
        input.qz as f32,
        input.qw as f32,
    );
    let rotation = if rotation.length_squared() > 1.0e-6 {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    };
    let transform_b = PhysicsTransform::new(
        Vec3::new(input.x as f32, input.y as f32, input.z as f32) / 10.0,
        rotation,
    );

    if let Ok(contacts) = collide_shapes(
        &shape_a,
        &PhysicsTransform::IDENTITY,
        &shape_b,
        &transform_b,
        &config,
    ) {
        for contact in contacts {
            assert!(contact.depth.is_finite(), "depth must be finite");
            assert!(contact.normal.is_finite(), "normal must be finite");
            assert!(contact.contact_a.is_finite() && contact.contact_b.is_finite());
        }
    }
});
