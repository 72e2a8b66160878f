//! Benchmarks for Aegis Physics
//!
//! Run with: `cargo bench`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{Quat, Vec3};

use aegis_physics::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn sphere(id: &str, position: Vec3) -> RigidBody {
    RigidBody::new_dynamic(
        id,
        Arc::new(CollisionShape::sphere(0.5).unwrap()),
        PhysicsTransform::from_position(position),
        1.0,
    )
}

fn world_with_floor() -> PhysicsWorld {
    let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
    world
        .add_body(RigidBody::new_static(
            "floor",
            Arc::new(CollisionShape::cuboid(Vec3::new(100.0, 0.5, 100.0)).unwrap()),
            PhysicsTransform::from_position(Vec3::new(0.0, -0.5, 0.0)),
        ))
        .unwrap();
    world
}

// ============================================================================
// World step benchmarks
// ============================================================================

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");

    group.bench_function("single_body_60_steps", |b| {
        b.iter(|| {
            let mut world = world_with_floor();
            world
                .add_body(sphere("ball", Vec3::new(0.0, 20.0, 0.0)))
                .unwrap();
            for _ in 0..60 {
                world.step(black_box(DT)).unwrap();
            }
            world.body("ball").unwrap().transform.position
        });
    });

    group.bench_function("hundred_bodies_60_steps", |b| {
        b.iter(|| {
            let mut world = world_with_floor();
            for i in 0..100 {
                let x = (i % 10) as f32 * 1.5;
                let z = (i / 10) as f32 * 1.5;
                world
                    .add_body(sphere(&format!("ball_{i}"), Vec3::new(x, 5.0, z)))
                    .unwrap();
            }
            for _ in 0..60 {
                world.step(black_box(DT)).unwrap();
            }
            world.body("ball_0").unwrap().transform.position
        });
    });

    group.finish();
}

// ============================================================================
// Broad phase benchmarks
// ============================================================================

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");

    let shape = CollisionShape::sphere(0.5).unwrap();
    let mut broad_phase = BroadPhase::new(0.2);
    for i in 0..1000u32 {
        let position = Vec3::new(
            (i % 10) as f32 * 2.0,
            ((i / 10) % 10) as f32 * 2.0,
            (i / 100) as f32 * 2.0,
        );
        broad_phase.add_body(i, &shape, &PhysicsTransform::from_position(position));
    }

    group.bench_function("pairs_1000_bodies", |b| {
        b.iter(|| broad_phase.compute_overlapping_pairs(|_, _| true).len());
    });

    group.bench_function("ray_1000_bodies", |b| {
        b.iter(|| {
            broad_phase
                .bodies_on_ray(black_box(Vec3::ZERO), Vec3::ONE.normalize(), 100.0)
                .len()
        });
    });

    group.finish();
}

// ============================================================================
// Narrow phase benchmarks
// ============================================================================

fn bench_narrow_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow_phase");

    let config = PhysicsConfig::default();
    let box_a = CollisionShape::cuboid(Vec3::ONE).unwrap();
    let box_b = CollisionShape::cuboid(Vec3::ONE).unwrap();
    let identity = PhysicsTransform::IDENTITY;
    let overlapping = PhysicsTransform::new(
        Vec3::new(1.5, 0.3, 0.2),
        Quat::from_rotation_y(0.4),
    );
    let separated = PhysicsTransform::from_position(Vec3::new(5.0, 0.0, 0.0));

    group.bench_function("gjk_epa_overlapping_boxes", |b| {
        b.iter(|| {
            collide_shapes(
                black_box(&box_a),
                &identity,
                black_box(&box_b),
                &overlapping,
                &config,
            )
            .unwrap()
            .len()
        });
    });

    group.bench_function("gjk_separated_boxes", |b| {
        b.iter(|| {
            collide_shapes(
                black_box(&box_a),
                &identity,
                black_box(&box_b),
                &separated,
                &config,
            )
            .unwrap()
            .len()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_world_step,
    bench_broad_phase,
    bench_narrow_phase
);
criterion_main!(benches);
