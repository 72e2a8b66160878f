//! Physics World
//!
//! Owns the bodies and drives the step pipeline: synchronize queued body
//! additions and removals, refresh the broad phase, run the narrow phase,
//! rebuild simulation islands and update sleep state, then integrate
//! velocities and transforms with continuous collision clamping for fast
//! bodies.
//!
//! The world itself steps on one thread. Body lifecycle calls are the
//! exception: `add_body_async` / `remove_body_async` buffer commands under a
//! mutex and apply them at the start of the next step, so gameplay threads
//! never touch mid-step state.

use std::collections::HashMap;
use std::sync::Mutex;

use glam::Vec3;

use crate::body::{BodyType, RigidBody};
use crate::broad_phase::BroadPhase;
use crate::ccd::{self, TemporalObject};
use crate::config::PhysicsConfig;
use crate::error::PhysicsError;
use crate::integrate;
use crate::island::{islands, IslandContainer};
use crate::manifold::BodyPairKey;
use crate::math::PhysicsTransform;
use crate::narrow_phase::NarrowPhase;

/// Result of a world ray cast.
#[derive(Clone, Debug)]
pub struct RayTestResult {
    pub body_id: String,
    pub distance: f32,
    /// Surface normal at the hit, facing back toward the ray origin.
    pub normal: Vec3,
    pub hit_point: Vec3,
}

/// One on-demand contact of a queried body. The normal points from the
/// queried body into `other_id`; `depth > 0` is penetration.
#[derive(Clone, Debug)]
pub struct GhostContact {
    pub other_id: String,
    pub normal: Vec3,
    pub depth: f32,
}

enum BodyCommand {
    Add(Box<RigidBody>),
    Remove(String),
}

/// The simulation container.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    gravity: Vec3,

    bodies: HashMap<u32, RigidBody>,
    handles_by_id: HashMap<String, u32>,
    next_handle: u32,

    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    islands: IslandContainer,

    pending: Mutex<Vec<BodyCommand>>,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            broad_phase: BroadPhase::new(config.broad_phase_fat_margin),
            narrow_phase: NarrowPhase::new(),
            islands: IslandContainer::new(),
            bodies: HashMap::new(),
            handles_by_id: HashMap::new(),
            next_handle: 0,
            pending: Mutex::new(Vec::new()),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    #[inline]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    // ------------------------------------------------------------------
    // Body lifecycle
    // ------------------------------------------------------------------

    /// Add a body immediately. Ids must be unique per world.
    pub fn add_body(&mut self, body: RigidBody) -> Result<u32, PhysicsError> {
        if self.handles_by_id.contains_key(&body.id) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "body id already in use",
            });
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles_by_id.insert(body.id.clone(), handle);
        self.broad_phase.add_body(handle, &body.shape, &body.transform);
        self.bodies.insert(handle, body);
        Ok(handle)
    }

    /// Remove a body immediately, with its manifolds and broad-phase proxy.
    pub fn remove_body(&mut self, id: &str) -> Result<(), PhysicsError> {
        let handle = self
            .handles_by_id
            .remove(id)
            .ok_or_else(|| PhysicsError::UnknownBody { id: id.to_string() })?;
        self.bodies.remove(&handle);
        self.broad_phase.remove_body(handle);
        self.narrow_phase.remove_body(handle);
        Ok(())
    }

    /// Queue a body for addition at the next step start. Callable from any
    /// thread holding a shared reference.
    pub fn add_body_async(&self, body: RigidBody) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(BodyCommand::Add(Box::new(body)));
    }

    /// Queue a body for removal at the next step start.
    pub fn remove_body_async(&self, id: impl Into<String>) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(BodyCommand::Remove(id.into()));
    }

    /// Apply all queued lifecycle commands. Runs automatically at the start
    /// of [`PhysicsWorld::step`].
    pub fn synchronize_bodies(&mut self) {
        let commands: Vec<BodyCommand> = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending.drain(..).collect()
        };
        for command in commands {
            match command {
                BodyCommand::Add(body) => {
                    if let Err(e) = self.add_body(*body) {
                        log::warn!("deferred body add failed: {e}");
                    }
                }
                BodyCommand::Remove(id) => {
                    if let Err(e) = self.remove_body(&id) {
                        log::warn!("deferred body remove failed: {e}");
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn handle_of(&self, id: &str) -> Option<u32> {
        self.handles_by_id.get(id).copied()
    }

    pub fn body(&self, id: &str) -> Option<&RigidBody> {
        self.handles_by_id.get(id).and_then(|h| self.bodies.get(h))
    }

    pub fn body_mut(&mut self, id: &str) -> Option<&mut RigidBody> {
        let handle = self.handles_by_id.get(id)?;
        self.bodies.get_mut(handle)
    }

    pub fn body_by_handle(&self, handle: u32) -> Option<&RigidBody> {
        self.bodies.get(&handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.values()
    }

    /// Live manifolds, for an external solver or contact inspection.
    pub fn manifolds(&self) -> &crate::manifold::ManifoldCache {
        self.narrow_phase.manifolds()
    }

    /// Island partition of the last step, sorted by island then body handle.
    /// Feed consecutive runs to [`crate::island::islands`] to group them.
    pub fn island_elements(&mut self) -> Vec<crate::island::IslandElement> {
        self.islands.sorted_elements()
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> Result<(), PhysicsError> {
        if dt <= 0.0 {
            return Ok(());
        }
        self.synchronize_bodies();

        // Track moved bodies in the broad phase.
        for (&handle, body) in &self.bodies {
            self.broad_phase.update_body(handle, &body.shape, &body.transform);
        }

        // Candidate pairs: anything except static-static.
        let bodies = &self.bodies;
        let pairs = self.broad_phase.compute_overlapping_pairs(|a, b| {
            match (bodies.get(&a), bodies.get(&b)) {
                (Some(a), Some(b)) => !(a.is_static() && b.is_static()),
                _ => false,
            }
        });

        self.narrow_phase.process(&pairs, &self.bodies, &self.config)?;

        // Pairs that actually touch this step.
        let contact_pairs: Vec<BodyPairKey> = self
            .narrow_phase
            .manifolds()
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(key, _)| *key)
            .collect();

        self.update_islands_and_sleep(&contact_pairs);

        integrate::integrate_velocities(&mut self.bodies, &contact_pairs, self.gravity, dt);
        self.integrate_transforms(dt);

        Ok(())
    }

    /// Rebuild the island partition from this step's contacts and put
    /// all-quiet islands to sleep as a unit.
    fn update_islands_and_sleep(&mut self, contact_pairs: &[BodyPairKey]) {
        let dynamic_handles: Vec<u32> = self
            .bodies
            .iter()
            .filter(|(_, b)| b.is_dynamic())
            .map(|(&h, _)| h)
            .collect();
        self.islands.reset(dynamic_handles);
        for key in contact_pairs {
            self.islands.merge(key.first, key.second);
        }

        let elements = self.islands.sorted_elements();
        for island in islands(&elements) {
            let mut can_rest = true;
            for element in island {
                let Some(body) = self.bodies.get(&element.body) else {
                    continue;
                };
                let quiet = body.is_below_sleep_threshold(
                    self.config.sleep_linear_velocity_threshold,
                    self.config.sleep_angular_velocity_threshold,
                ) && body.pending_momentum() == (Vec3::ZERO, Vec3::ZERO);
                if !quiet {
                    can_rest = false;
                    break;
                }
            }

            for element in island {
                let Some(body) = self.bodies.get_mut(&element.body) else {
                    continue;
                };
                if can_rest {
                    body.sleep_frames += 1;
                    if body.sleep_frames >= self.config.sleep_frames {
                        body.sleep();
                    }
                } else if !body.active {
                    // One energetic body wakes its whole island.
                    body.wake_up();
                } else {
                    body.sleep_frames = 0;
                }
            }
        }
    }

    /// Advance transforms, sweeping bodies whose displacement exceeds their
    /// shape's CCD threshold so they cannot tunnel.
    fn integrate_transforms(&mut self, dt: f32) {
        struct Move {
            handle: u32,
            transform: PhysicsTransform,
            // (other body, normal from mover into it, world hit point)
            ccd_hit: Option<(u32, Vec3, Vec3)>,
        }

        let mut moves = Vec::new();
        for (&handle, body) in &self.bodies {
            if !body.is_dynamic() || !body.active {
                continue;
            }
            let candidate = integrate::candidate_transform(body, dt);
            let displacement = (candidate.position - body.transform.position).length();

            if displacement <= body.ccd_motion_threshold() {
                moves.push(Move {
                    handle,
                    transform: candidate,
                    ccd_hit: None,
                });
                continue;
            }

            let sweep = TemporalObject::new(&body.shape, body.transform, candidate);
            let swept_aabb = sweep.swept_aabb();
            let candidates = self
                .broad_phase
                .bodies_in_aabb(&swept_aabb)
                .into_iter()
                .filter(|&other| other != handle)
                .filter_map(|other| {
                    let other_body = self.bodies.get(&other)?;
                    // Ghosts never block motion.
                    if other_body.is_ghost() {
                        return None;
                    }
                    Some((
                        other,
                        TemporalObject::stationary(&other_body.shape, other_body.transform),
                    ))
                });

            let hits = ccd::continuous_collision_test(&sweep, candidates, &self.config);
            match hits.first() {
                Some(hit) => {
                    let t = hit.time_to_hit.clamp(0.0, 1.0);
                    let clamped = PhysicsTransform::new(
                        body.transform.position.lerp(candidate.position, t),
                        body.transform.orientation.slerp(candidate.orientation, t),
                    );
                    moves.push(Move {
                        handle,
                        transform: clamped,
                        ccd_hit: Some((hit.body, hit.normal, hit.hit_point)),
                    });
                }
                None => moves.push(Move {
                    handle,
                    transform: candidate,
                    ccd_hit: None,
                }),
            }
        }

        for m in moves {
            if let Some(body) = self.bodies.get_mut(&m.handle) {
                body.transform = m.transform;
                if m.ccd_hit.is_some() {
                    integrate::clamp_velocity_after_ccd(body, dt);
                }
            }
            if let Some((other, normal, point)) = m.ccd_hit {
                self.add_predictive_contact(m.handle, other, normal, point);
            }
        }
    }

    /// Seed the pair's manifold with the CCD touch point so an external
    /// solver sees the imminent contact one step early.
    fn add_predictive_contact(&mut self, mover: u32, other: u32, normal: Vec3, point: Vec3) {
        let (Some(body_m), Some(body_o)) = (self.bodies.get(&mover), self.bodies.get(&other))
        else {
            return;
        };
        let key = BodyPairKey::new(mover, other);
        // ContactPoint normals run from the pair's first body into the
        // second; `normal` runs from the mover into the obstacle.
        let (ta, tb, normal_ab) = if key.first == mover {
            (&body_m.transform, &body_o.transform, normal)
        } else {
            (&body_o.transform, &body_m.transform, -normal)
        };
        let contact =
            crate::manifold::ContactPoint::new(ta, tb, point, point, normal_ab, 0.0).predictive();
        self.narrow_phase
            .manifolds_mut()
            .get_or_create(key)
            .add_contact(contact, self.config.contact_breaking_threshold);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Closest body hit by a ray, ghosts excluded.
    pub fn ray_test(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayTestResult> {
        let mut best: Option<RayTestResult> = None;
        for handle in self.broad_phase.bodies_on_ray(origin, direction, max_distance) {
            let Some(body) = self.bodies.get(&handle) else {
                continue;
            };
            if body.body_type == BodyType::Ghost {
                continue;
            }
            if let Some((distance, normal, hit_point)) = ccd::ray_shape_test(
                origin,
                direction,
                max_distance,
                &body.shape,
                &body.transform,
                &self.config,
            ) {
                if best.as_ref().map_or(true, |b| distance < b.distance) {
                    best = Some(RayTestResult {
                        body_id: body.id.clone(),
                        distance,
                        // The sweep reports the normal into the body; callers
                        // expect the surface normal facing the ray.
                        normal: -normal,
                        hit_point,
                    });
                }
            }
        }
        best
    }

    /// Narrow-phase contacts of one body against everything overlapping it,
    /// computed on demand. Used by kinematic controllers that move a ghost
    /// between steps and need fresh penetration data, not last step's
    /// manifolds. Normals point from the queried body into the other body.
    pub fn ghost_contacts(&self, id: &str) -> Result<Vec<GhostContact>, PhysicsError> {
        let handle = self
            .handle_of(id)
            .ok_or_else(|| PhysicsError::UnknownBody { id: id.to_string() })?;
        let body = &self.bodies[&handle];
        let aabb = body.shape.to_aabb(&body.transform);

        let mut contacts = Vec::new();
        for other_handle in self.broad_phase.bodies_in_aabb(&aabb) {
            if other_handle == handle {
                continue;
            }
            let Some(other) = self.bodies.get(&other_handle) else {
                continue;
            };
            if other.is_ghost() {
                continue;
            }
            let results = crate::narrow_phase::collide_shapes(
                &body.shape,
                &body.transform,
                &other.shape,
                &other.transform,
                &self.config,
            )?;
            for result in results {
                contacts.push(GhostContact {
                    other_id: other.id.clone(),
                    normal: result.normal,
                    depth: result.depth,
                });
            }
        }
        Ok(contacts)
    }

    /// Ids of bodies whose broad-phase bounds overlap the sweep of `id`'s
    /// shape between two transforms.
    pub fn body_test(
        &self,
        id: &str,
        from: &PhysicsTransform,
        to: &PhysicsTransform,
    ) -> Result<Vec<String>, PhysicsError> {
        let handle = self
            .handle_of(id)
            .ok_or_else(|| PhysicsError::UnknownBody { id: id.to_string() })?;
        let body = &self.bodies[&handle];
        let swept = TemporalObject::new(&body.shape, *from, *to).swept_aabb();
        Ok(self
            .broad_phase
            .bodies_in_aabb(&swept)
            .into_iter()
            .filter(|&h| h != handle)
            .filter_map(|h| self.bodies.get(&h).map(|b| b.id.clone()))
            .collect())
    }
}
