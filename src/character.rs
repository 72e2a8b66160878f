//! Kinematic Character Controller
//!
//! Drives a capsule-shaped ghost body through the world without the
//! integrator: the controller moves the ghost itself, queries on-demand
//! contacts, pushes out of penetration over several relaxation passes and
//! classifies ground/roof contacts from the steepest surface normals.
//!
//! # Behavior
//!
//! - Walk speed scales down with the climbed slope (`1 - slope/max_slope`).
//! - In the air, control blends between the momentum kept from the last
//!   grounded move and the requested direction, fading out over
//!   `time_keep_move_in_air` seconds.
//! - A jump is accepted while grounded or within a short grace window after
//!   leaving the ground, so stepping off a ledge does not eat the input.
//! - Frames whose displacement exceeds the shape's continuous-collision
//!   threshold are subdivided so the ghost cannot skip through geometry.
//! - A known-good transform is snapshotted periodically; a stuck character
//!   teleports back to it.

use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::error::PhysicsError;
use crate::math::PhysicsTransform;
use crate::shape::CollisionShape;
use crate::world::{GhostContact, PhysicsWorld};
use crate::body::RigidBody;

/// Penetrations shallower than this are left to the next frame.
const MIN_RECOVERABLE_DEPTH: f32 = 0.0001;
/// Grace window after leaving the ground during which a jump still triggers.
const MAX_TIME_IN_AIR_CONSIDERED_AS_ON_GROUND: f32 = 0.15;
/// Terminal fall speed.
const MAX_VERTICAL_VELOCITY: f32 = 55.0;
/// Upper bound on frame subdivisions.
const MAX_UPDATE_LOOP_BY_FRAME: u32 = 32;
/// Seconds between snapshots of a known-good respawn transform.
const SAVE_RESPAWN_TRANSFORM_TIME: f32 = 10.0;
/// Per-pass recovery strength. Early passes under-correct so simultaneous
/// contacts get a chance to pull in opposite directions before the full push.
const RECOVER_FACTORS: [f32; 4] = [0.4, 0.7, 0.9, 1.0];

/// Tunable parameters for a [`CharacterController`].
#[derive(Clone, Debug)]
pub struct CharacterSettings {
    /// Steepest walkable slope, in radians from horizontal.
    pub max_slope: f32,
    /// Vertical speed gained by a jump, in units/s.
    pub jump_speed: f32,
    /// Seconds the last grounded move keeps acting after leaving the ground.
    pub time_keep_move_in_air: f32,
    /// Blend factor of the requested direction while airborne, in `[0, 1]`.
    pub percentage_control_in_air: f32,
}

impl Default for CharacterSettings {
    fn default() -> Self {
        Self {
            max_slope: std::f32::consts::FRAC_PI_4,
            jump_speed: 5.0,
            time_keep_move_in_air: 2.5,
            percentage_control_in_air: 0.4,
        }
    }
}

/// Extremes of the contact normals gathered in the first recovery pass.
struct SignificantContacts {
    number_of_hit: u32,
    max_dot_up: f32,
    max_dot_down: f32,
    deepest: f32,
}

impl SignificantContacts {
    fn new() -> Self {
        Self {
            number_of_hit: 0,
            max_dot_up: f32::MIN,
            max_dot_down: f32::MIN,
            deepest: 0.0,
        }
    }

    /// `surface_normal` points from the touched surface toward the character.
    fn record(&mut self, surface_normal: Vec3, depth: f32) {
        self.number_of_hit += 1;
        self.max_dot_up = self.max_dot_up.max(surface_normal.dot(Vec3::Y));
        self.max_dot_down = self.max_dot_down.max(surface_normal.dot(Vec3::NEG_Y));
        self.deepest = self.deepest.max(depth);
    }
}

/// Kinematic capsule controller on a ghost body.
pub struct CharacterController {
    body_id: String,
    settings: CharacterSettings,
    max_slope_percentage: f32,

    walk_direction: Vec3,
    last_walk_direction: Vec3,
    vertical_velocity: f32,
    make_jump: bool,
    jumping: bool,

    is_on_ground: bool,
    hit_roof: bool,
    number_of_hit: u32,
    time_in_the_air: f32,
    slope_percentage: f32,

    previous_position: Vec3,
    respawn_transform: PhysicsTransform,
    time_since_respawn_save: f32,
}

impl CharacterController {
    /// Register a ghost body for the character and build its controller.
    pub fn new(
        world: &mut PhysicsWorld,
        id: impl Into<String>,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
        settings: CharacterSettings,
    ) -> Result<Self, PhysicsError> {
        if settings.max_slope <= 0.0 || settings.max_slope >= std::f32::consts::FRAC_PI_2 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "character max slope must be in (0, pi/2)",
            });
        }
        if !(0.0..=1.0).contains(&settings.percentage_control_in_air) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "percentage_control_in_air must be in [0, 1]",
            });
        }

        let body_id = id.into();
        world.add_body(RigidBody::new_ghost(body_id.clone(), shape, transform))?;

        Ok(Self {
            body_id,
            max_slope_percentage: settings.max_slope.tan(),
            settings,
            walk_direction: Vec3::ZERO,
            last_walk_direction: Vec3::ZERO,
            vertical_velocity: 0.0,
            make_jump: false,
            jumping: false,
            is_on_ground: false,
            hit_roof: false,
            number_of_hit: 0,
            time_in_the_air: 0.0,
            slope_percentage: 0.0,
            previous_position: transform.position,
            respawn_transform: transform,
            time_since_respawn_save: 0.0,
        })
    }

    /// Requested horizontal velocity, in units/s. Applied while grounded and
    /// blended in while airborne.
    pub fn set_walk_direction(&mut self, direction: Vec3) {
        self.walk_direction = Vec3::new(direction.x, 0.0, direction.z);
    }

    pub fn walk_direction(&self) -> Vec3 {
        self.walk_direction
    }

    /// Request a jump; consumed by the next `update`.
    pub fn jump(&mut self) {
        self.make_jump = true;
    }

    pub fn is_on_ground(&self) -> bool {
        self.is_on_ground
    }

    pub fn hit_roof(&self) -> bool {
        self.hit_roof
    }

    pub fn vertical_velocity(&self) -> f32 {
        self.vertical_velocity
    }

    /// Slope climbed by the last move as rise/run. Positive climbs.
    pub fn slope_percentage(&self) -> f32 {
        self.slope_percentage
    }

    pub fn body_id(&self) -> &str {
        &self.body_id
    }

    pub fn transform(&self, world: &PhysicsWorld) -> Option<PhysicsTransform> {
        world.body(&self.body_id).map(|b| b.transform)
    }

    /// Advance the character by `dt` seconds.
    ///
    /// The frame is subdivided so no sub-step moves farther than the shape's
    /// continuous-collision threshold.
    pub fn update(&mut self, world: &mut PhysicsWorld, dt: f32) -> Result<(), PhysicsError> {
        if dt <= 0.0 {
            return Ok(());
        }
        let Some(body) = world.body(&self.body_id) else {
            return Err(PhysicsError::UnknownBody {
                id: self.body_id.clone(),
            });
        };
        let ccd_threshold = body.ccd_motion_threshold();
        let gravity = world.gravity();

        let speed = (self.walk_direction
            + Vec3::new(0.0, self.vertical_velocity, 0.0))
        .length();
        let sub_steps = if ccd_threshold > 0.0 {
            ((speed * dt / ccd_threshold).ceil() as u32).clamp(1, MAX_UPDATE_LOOP_BY_FRAME)
        } else {
            1
        };
        let sub_dt = dt / sub_steps as f32;

        for _ in 0..sub_steps {
            self.move_body(world, sub_dt, gravity)?;
            self.recover_from_penetration(world, sub_dt)?;

            self.slope_percentage = 0.0;
            if self.is_on_ground {
                self.vertical_velocity = 0.0;
                self.slope_percentage = self.compute_slope(world);
            }
            if self.hit_roof {
                self.vertical_velocity = 0.0;
            }
        }

        self.update_respawn(world, dt)?;
        Ok(())
    }

    /// Teleport back to the last saved respawn transform.
    pub fn respawn(&mut self, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
        let respawn = self.respawn_transform;
        let body = world.body_mut(&self.body_id).ok_or_else(|| {
            PhysicsError::UnknownBody {
                id: self.body_id.clone(),
            }
        })?;
        body.transform = respawn;
        self.previous_position = respawn.position;
        self.vertical_velocity = 0.0;
        self.last_walk_direction = Vec3::ZERO;
        self.time_in_the_air = 0.0;
        self.jumping = false;
        Ok(())
    }

    fn move_body(
        &mut self,
        world: &mut PhysicsWorld,
        dt: f32,
        gravity: Vec3,
    ) -> Result<(), PhysicsError> {
        let body = world.body_mut(&self.body_id).ok_or_else(|| {
            PhysicsError::UnknownBody {
                id: self.body_id.clone(),
            }
        })?;
        self.previous_position = body.transform.position;

        let mut target = body.transform.position;
        if self.is_on_ground {
            let slope_decrease =
                (1.0 - self.slope_percentage / self.max_slope_percentage).clamp(0.0, 1.0);
            target += self.walk_direction * dt * slope_decrease;
            self.last_walk_direction = self.walk_direction;
        } else if self.time_in_the_air < self.settings.time_keep_move_in_air {
            let momentum_decrease =
                1.0 - self.time_in_the_air / self.settings.time_keep_move_in_air;
            let control = self.settings.percentage_control_in_air;
            let air_direction =
                self.last_walk_direction * (1.0 - control) + self.walk_direction * control;
            target += air_direction * dt * momentum_decrease;
        } else {
            self.last_walk_direction = Vec3::ZERO;
        }

        // Jump, with the grace window after stepping off an edge.
        let close_to_ground = self.time_in_the_air < MAX_TIME_IN_AIR_CONSIDERED_AS_ON_GROUND;
        let wants_jump = std::mem::take(&mut self.make_jump);
        if wants_jump && close_to_ground && !self.jumping {
            self.vertical_velocity += self.settings.jump_speed;
            self.is_on_ground = false;
            self.jumping = true;
        } else if self.is_on_ground && self.jumping {
            self.jumping = false;
        }

        // Pinched between more than one contact counts as falling, so a
        // character squeezed in a crevice still slides out.
        if !self.is_on_ground || self.number_of_hit > 1 {
            self.vertical_velocity += gravity.y * dt;
            if self.vertical_velocity < -MAX_VERTICAL_VELOCITY {
                self.vertical_velocity = -MAX_VERTICAL_VELOCITY;
            }
        }

        target.y += self.vertical_velocity * dt;
        body.transform.position = target;

        // Face the walk direction, yaw only.
        let flat = Vec3::new(self.walk_direction.x, 0.0, self.walk_direction.z);
        if flat.length_squared() > 0.001 {
            let yaw = flat.x.atan2(flat.z);
            body.transform.orientation = Quat::from_rotation_y(yaw);
        }
        Ok(())
    }

    /// Push the ghost out of penetration over several relaxation passes and
    /// classify the touched surfaces.
    fn recover_from_penetration(
        &mut self,
        world: &mut PhysicsWorld,
        dt: f32,
    ) -> Result<(), PhysicsError> {
        let mut significant = SignificantContacts::new();

        for (pass, factor) in RECOVER_FACTORS.iter().enumerate() {
            let contacts = world.ghost_contacts(&self.body_id)?;
            let mut correction = Vec3::ZERO;
            for GhostContact { normal, depth, .. } in &contacts {
                if *depth < MIN_RECOVERABLE_DEPTH {
                    continue;
                }
                // Normal points from the character into the obstacle, so the
                // escape direction is its opposite.
                correction -= *normal * *depth * *factor;
                if pass == 0 {
                    significant.record(-*normal, *depth);
                }
            }
            if correction != Vec3::ZERO {
                if let Some(body) = world.body_mut(&self.body_id) {
                    body.transform.position += correction;
                }
            }
        }

        self.number_of_hit = significant.number_of_hit;
        self.is_on_ground = significant.number_of_hit > 0
            && significant.max_dot_up.clamp(-1.0, 1.0).acos() < self.settings.max_slope;
        self.hit_roof = significant.number_of_hit > 0
            && significant.max_dot_down.clamp(-1.0, 1.0).acos() < self.settings.max_slope;
        self.time_in_the_air = if self.is_on_ground {
            0.0
        } else {
            self.time_in_the_air + dt
        };
        Ok(())
    }

    /// Slope of the last move as rise/run. Positive climbs.
    fn compute_slope(&self, world: &PhysicsWorld) -> f32 {
        let Some(body) = world.body(&self.body_id) else {
            return 0.0;
        };
        let position = body.transform.position;
        let run = Vec3::new(
            position.x - self.previous_position.x,
            0.0,
            position.z - self.previous_position.z,
        )
        .length();
        if run == 0.0 {
            return 0.0;
        }
        let rise = position.y - self.previous_position.y;
        rise / run
    }

    /// Snapshot a known-good transform periodically and teleport back when
    /// the character ends up somewhere unrecoverable.
    fn update_respawn(&mut self, world: &mut PhysicsWorld, dt: f32) -> Result<(), PhysicsError> {
        let (position, min_half_extent) = {
            let body = world.body(&self.body_id).ok_or_else(|| {
                PhysicsError::UnknownBody {
                    id: self.body_id.clone(),
                }
            })?;
            (body.transform.position, body.shape.min_half_extent())
        };

        let stuck = !position.is_finite()
            || world
                .ghost_contacts(&self.body_id)?
                .iter()
                .any(|c| c.depth > min_half_extent);
        if stuck {
            log::warn!("character '{}' is stuck, teleporting to respawn", self.body_id);
            self.respawn(world)?;
            return Ok(());
        }

        self.time_since_respawn_save += dt;
        if self.time_since_respawn_save >= SAVE_RESPAWN_TRANSFORM_TIME {
            self.time_since_respawn_save = 0.0;
            if self.is_on_ground {
                if let Some(body) = world.body(&self.body_id) {
                    self.respawn_transform = body.transform;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;

    const DT: f32 = 1.0 / 60.0;

    fn world_with_floor() -> PhysicsWorld {
        let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
        world
            .add_body(RigidBody::new_static(
                "floor",
                Arc::new(CollisionShape::cuboid(Vec3::new(50.0, 0.5, 50.0)).unwrap()),
                PhysicsTransform::from_position(Vec3::new(0.0, -0.5, 0.0)),
            ))
            .unwrap();
        world
    }

    fn capsule() -> Arc<CollisionShape> {
        // Total half height: 0.6 segment + 0.3 radius = 0.9.
        Arc::new(CollisionShape::capsule(0.3, 0.6).unwrap())
    }

    /// Capsule standing with a slight floor overlap.
    fn standing_character(world: &mut PhysicsWorld) -> CharacterController {
        CharacterController::new(
            world,
            "player",
            capsule(),
            PhysicsTransform::from_position(Vec3::new(0.0, 0.88, 0.0)),
            CharacterSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut world = world_with_floor();
        let settings = CharacterSettings {
            max_slope: 2.0,
            ..CharacterSettings::default()
        };
        let result = CharacterController::new(
            &mut world,
            "player",
            capsule(),
            PhysicsTransform::IDENTITY,
            settings,
        );
        assert!(result.is_err(), "max slope beyond pi/2 must be rejected");
    }

    #[test]
    fn test_detects_ground() {
        let mut world = world_with_floor();
        let mut character = standing_character(&mut world);
        character.update(&mut world, DT).unwrap();
        assert!(character.is_on_ground(), "standing capsule must report ground");
        assert!(!character.hit_roof());
    }

    #[test]
    fn test_penetration_recovery_pushes_up() {
        let mut world = world_with_floor();
        // Sunk 0.1 into the floor.
        let mut character = CharacterController::new(
            &mut world,
            "player",
            capsule(),
            PhysicsTransform::from_position(Vec3::new(0.0, 0.8, 0.0)),
            CharacterSettings::default(),
        )
        .unwrap();
        character.update(&mut world, DT).unwrap();
        let y = character.transform(&world).unwrap().position.y;
        assert!(y > 0.85, "recovery should push the capsule out, y={y}");
    }

    #[test]
    fn test_walk_moves_horizontally() {
        let mut world = world_with_floor();
        let mut character = standing_character(&mut world);
        character.update(&mut world, DT).unwrap();
        assert!(character.is_on_ground());

        character.set_walk_direction(Vec3::new(3.0, 0.0, 0.0));
        for _ in 0..60 {
            character.update(&mut world, DT).unwrap();
        }
        let position = character.transform(&world).unwrap().position;
        assert!(position.x > 2.0, "one second at 3 u/s, x={}", position.x);
        assert!(position.z.abs() < 0.01);
    }

    #[test]
    fn test_jump_leaves_ground_and_lands() {
        let mut world = world_with_floor();
        let mut character = standing_character(&mut world);
        character.update(&mut world, DT).unwrap();

        character.jump();
        character.update(&mut world, DT).unwrap();
        assert!(!character.is_on_ground(), "jump must leave the ground");
        assert!(character.vertical_velocity() > 0.0);

        // Default jump speed 5 u/s against 9.81 gravity lands within ~1.1 s.
        let mut landed = false;
        for _ in 0..120 {
            character.update(&mut world, DT).unwrap();
            if character.is_on_ground() {
                landed = true;
                break;
            }
        }
        assert!(landed, "character must come back down");
    }

    #[test]
    fn test_jump_only_once_until_landing() {
        let mut world = world_with_floor();
        let mut character = standing_character(&mut world);
        character.update(&mut world, DT).unwrap();

        character.jump();
        character.update(&mut world, DT).unwrap();
        let first = character.vertical_velocity();

        // A second jump inside the grace window must be ignored while the
        // first one is still in flight.
        character.jump();
        character.update(&mut world, DT).unwrap();
        assert!(
            character.vertical_velocity() <= first,
            "double jump must not add velocity"
        );
    }

    #[test]
    fn test_fall_speed_is_clamped() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
        let mut character = CharacterController::new(
            &mut world,
            "player",
            capsule(),
            PhysicsTransform::from_position(Vec3::new(0.0, 10_000.0, 0.0)),
            CharacterSettings::default(),
        )
        .unwrap();
        // Free fall long past 55/9.81 seconds.
        for _ in 0..600 {
            character.update(&mut world, DT).unwrap();
        }
        assert!(
            character.vertical_velocity() >= -MAX_VERTICAL_VELOCITY - 1.0e-3,
            "fall speed clamped to terminal, v={}",
            character.vertical_velocity()
        );
    }

    #[test]
    fn test_roof_stops_upward_motion() {
        let mut world = world_with_floor();
        // Low ceiling right above the capsule.
        world
            .add_body(RigidBody::new_static(
                "roof",
                Arc::new(CollisionShape::cuboid(Vec3::new(50.0, 0.5, 50.0)).unwrap()),
                PhysicsTransform::from_position(Vec3::new(0.0, 2.4, 0.0)),
            ))
            .unwrap();
        let mut character = standing_character(&mut world);
        character.update(&mut world, DT).unwrap();

        character.jump();
        let mut hit_roof = false;
        for _ in 0..60 {
            character.update(&mut world, DT).unwrap();
            if character.hit_roof() {
                hit_roof = true;
                break;
            }
        }
        assert!(hit_roof, "jump into a low ceiling must report the roof");
        assert!(character.vertical_velocity() <= 0.0);
    }

    #[test]
    fn test_slope_scales_walk_speed() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
        // A ramp made from a box rotated 30 degrees around Z.
        world
            .add_body(RigidBody::new_static(
                "ramp",
                Arc::new(CollisionShape::cuboid(Vec3::new(50.0, 0.5, 50.0)).unwrap()),
                PhysicsTransform::new(
                    Vec3::new(0.0, -0.5, 0.0),
                    Quat::from_rotation_z(std::f32::consts::FRAC_PI_6),
                ),
            ))
            .unwrap();
        let mut character = CharacterController::new(
            &mut world,
            "player",
            capsule(),
            PhysicsTransform::from_position(Vec3::new(0.0, 0.95, 0.0)),
            CharacterSettings::default(),
        )
        .unwrap();
        // Settle on the ramp.
        for _ in 0..10 {
            character.update(&mut world, DT).unwrap();
        }
        assert!(character.is_on_ground(), "30 degree ramp is walkable");

        // Walk uphill (toward -x on this ramp) for one second.
        character.set_walk_direction(Vec3::new(-3.0, 0.0, 0.0));
        for _ in 0..60 {
            character.update(&mut world, DT).unwrap();
        }
        let uphill = character.transform(&world).unwrap().position.x.abs();
        assert!(
            uphill < 3.0,
            "uphill walk must be slower than the flat speed, moved {uphill}"
        );
        assert!(
            character.slope_percentage() > 0.0,
            "climbing must report a positive slope"
        );
    }
}
