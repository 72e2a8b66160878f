//! # Aegis Physics
//!
//! **Rigid-Body Physics Core**
//!
//! A Rust library providing the collision and motion pipeline of a rigid-body
//! physics engine: broad phase, narrow phase, contact persistence, simulation
//! islands, integration with continuous collision detection and a kinematic
//! character controller. Contact resolution is left to the embedding engine,
//! which reads the sorted islands and persisted manifolds after each step.
//!
//! ## Pipeline
//!
//! | Stage | Structure | Algorithm |
//! |-------|-----------|-----------|
//! | **Broad phase** | Fat-AABB dynamic tree | SAH insertion, subtree rotation |
//! | **Narrow phase** | Shape-pair dispatch | GJK distance + EPA penetration |
//! | **Contacts** | Persistent manifolds | 4-point cap, warm-start impulses |
//! | **Islands** | Union-find partition | Island-wide sleep and wake |
//! | **Motion** | Semi-implicit Euler | Conservative-advancement CCD |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use glam::Vec3;
//! use aegis_physics::prelude::*;
//!
//! let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
//!
//! world.add_body(RigidBody::new_static(
//!     "floor",
//!     Arc::new(CollisionShape::cuboid(Vec3::new(50.0, 0.5, 50.0)).unwrap()),
//!     PhysicsTransform::from_position(Vec3::new(0.0, -0.5, 0.0)),
//! )).unwrap();
//!
//! world.add_body(RigidBody::new_dynamic(
//!     "ball",
//!     Arc::new(CollisionShape::sphere(0.5).unwrap()),
//!     PhysicsTransform::from_position(Vec3::new(0.0, 5.0, 0.0)),
//!     1.0,
//! )).unwrap();
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0).unwrap();
//! }
//! assert!(world.body("ball").unwrap().transform.position.y < 5.0);
//! ```
//!
//! ## Ray Casting
//!
//! ```rust
//! # use std::sync::Arc;
//! # use glam::Vec3;
//! # use aegis_physics::prelude::*;
//! # let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
//! world.add_body(RigidBody::new_static(
//!     "target",
//!     Arc::new(CollisionShape::sphere(1.0).unwrap()),
//!     PhysicsTransform::from_position(Vec3::new(10.0, 0.0, 0.0)),
//! )).unwrap();
//!
//! let hit = world.ray_test(Vec3::ZERO, Vec3::X, 100.0).unwrap();
//! assert_eq!(hit.body_id, "target");
//! assert!((hit.distance - 9.0).abs() < 0.1);
//! ```

pub mod aabb;
pub mod body;
pub mod broad_phase;
pub mod ccd;
pub mod character;
pub mod config;
pub mod convex_hull;
pub mod epa;
pub mod error;
pub mod gjk;
pub mod integrate;
pub mod island;
pub mod manifold;
pub mod math;
pub mod narrow_phase;
pub mod shape;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aabb::Aabb;
    pub use crate::body::{BodyType, RigidBody};
    pub use crate::broad_phase::{AabbTree, BroadPhase};
    pub use crate::ccd::{ContinuousCollisionResult, TemporalObject};
    pub use crate::character::{CharacterController, CharacterSettings};
    pub use crate::config::PhysicsConfig;
    pub use crate::convex_hull::ConvexHullShape;
    pub use crate::error::PhysicsError;
    pub use crate::island::{islands, IslandContainer, IslandElement};
    pub use crate::manifold::{BodyPairKey, ContactManifold, ContactPoint, ManifoldCache};
    pub use crate::math::PhysicsTransform;
    pub use crate::narrow_phase::{collide_shapes, ContactResult, NarrowPhase};
    pub use crate::shape::{CollisionShape, HeightfieldShape, LocalizedShape};
    pub use crate::world::{GhostContact, PhysicsWorld, RayTestResult};
}

// Re-export main types at crate root
pub use prelude::*;
