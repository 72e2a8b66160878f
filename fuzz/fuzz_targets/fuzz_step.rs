#![no_main]
use arbitrary::Arbitrary;
use glam::Vec3;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use aegis_physics::{CollisionShape, PhysicsConfig, PhysicsTransform, PhysicsWorld, RigidBody};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Number of bodies to add (capped)
    body_count: u8,
    /// Position components (i16 to keep values reasonable)
    positions: Vec<(i16, i16, i16)>,
    /// Velocity components
    velocities: Vec<(i8, i8, i8)>,
    /// Mass deci-units (> 0 after clamping)
    masses: Vec<u16>,
    /// Number of simulation steps (capped)
    step_count: u8,
}

// Fuzz the world pipeline: add random bodies with random velocities and step.
// Must never panic regardless of input.
fuzz_target!(|input: FuzzInput| {
    let mut world = match PhysicsWorld::new(PhysicsConfig::default()) {
        Ok(world) => world,
        Err(_) => return,
    };

    let body_count = (input.body_count as usize).min(16);
    for i in 0..body_count {
        let (px, py, pz) = input.positions.get(i).copied().unwrap_or((0, 0, 0));
        let (vx, vy, vz) = input.velocities.get(i).copied().unwrap_or((0, 0, 0));
        let mass = input.masses.get(i).copied().unwrap_or(10).max(1) as f32 / 10.0;

        let mut body = RigidBody::new_dynamic(
            format!("body_{i}"),
            Arc::new(CollisionShape::sphere(0.5).expect("valid radius")),
            PhysicsTransform::from_position(Vec3::new(px as f32, py as f32, pz as f32)),
            mass,
        );
        body.linear_velocity = Vec3::new(vx as f32, vy as f32, vz as f32);
        let _ = world.add_body(body);
    }

    let steps = (input.step_count as usize).min(64);
    for _ in 0..steps {
        let _ = world.step(1.0 / 60.0);
    }
});
