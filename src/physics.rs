// Thin wrapper over the rapier2d rigid-body engine. The rest of the simulator
// treats physics as a black box: cuboid bodies, forces at local points, one
// fixed-size step, begin/end contact events between the robot and token
// collision classes, and AABB containment queries.

use crate::config;
use rapier2d_f64::parry::bounding_volume::BoundingVolume;
use rapier2d_f64::prelude::*;
use std::sync::Mutex;

/// Collision class of a collider, stored in its user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyClass {
    Static,
    Robot(usize),
    Token(u32),
}

const CLASS_STATIC: u128 = 0;
const CLASS_ROBOT: u128 = 1;
const CLASS_TOKEN: u128 = 2;

fn encode_class(class: BodyClass) -> u128 {
    match class {
        BodyClass::Static => CLASS_STATIC << 32,
        BodyClass::Robot(team) => (CLASS_ROBOT << 32) | team as u128,
        BodyClass::Token(id) => (CLASS_TOKEN << 32) | id as u128,
    }
}

fn decode_class(data: u128) -> BodyClass {
    match data >> 32 {
        CLASS_ROBOT => BodyClass::Robot((data & 0xffff_ffff) as usize),
        CLASS_TOKEN => BodyClass::Token((data & 0xffff_ffff) as u32),
        _ => BodyClass::Static,
    }
}

/// A robot/token contact that began or ended during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactChange {
    pub team: usize,
    pub token_id: u32,
    pub began: bool,
}

// Event handlers run inside the engine step, which only ever happens from the
// main loop while every actor is suspended.
#[derive(Default)]
struct ContactLog {
    events: Mutex<Vec<CollisionEvent>>,
}

impl EventHandler for ContactLog {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events.lock().expect("contact log poisoned").push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

pub struct PhysicsWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector<Real>,
    contact_log: ContactLog,
}

impl PhysicsWorld {
    /// Top-down arena: no gravity, one fixed step of `dt` seconds.
    pub fn new(dt: f64) -> PhysicsWorld {
        let mut params = IntegrationParameters::default();
        params.dt = dt;
        PhysicsWorld {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: vector![0.0, 0.0],
            contact_log: ContactLog::default(),
        }
    }

    /// Adds a fixed cuboid body. `local_offset` shifts the collider relative
    /// to the body origin (walls keep their inner face on the body origin).
    pub fn add_static_box(
        &mut self,
        position: (f64, f64),
        angle: f64,
        half_extents: (f64, f64),
        local_offset: (f64, f64),
        sensor: bool,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::fixed()
            .translation(vector![position.0, position.1])
            .rotation(angle)
            .build();
        let body_handle = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(half_extents.0, half_extents.1)
            .translation(vector![local_offset.0, local_offset.1])
            .friction(config::BODY_FRICTION)
            .restitution(config::BODY_ELASTICITY)
            .sensor(sensor)
            .user_data(encode_class(BodyClass::Static))
            .build();
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    /// Adds a dynamic cuboid body. Contact events are only reported for
    /// colliders created with `events` set.
    pub fn add_dynamic_box(
        &mut self,
        position: (f64, f64),
        angle: f64,
        half_extents: (f64, f64),
        mass: f64,
        class: BodyClass,
        events: bool,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![position.0, position.1])
            .rotation(angle)
            .linear_damping(config::FLUID_DAMPING)
            .angular_damping(config::FLUID_DAMPING)
            .build();
        let body_handle = self.bodies.insert(body);
        let mut collider = ColliderBuilder::cuboid(half_extents.0, half_extents.1)
            .mass(mass)
            .friction(config::BODY_FRICTION)
            .restitution(config::BODY_ELASTICITY)
            .user_data(encode_class(class));
        if events {
            collider = collider.active_events(ActiveEvents::COLLISION_EVENTS);
        }
        let collider_handle =
            self.colliders
                .insert_with_parent(collider.build(), body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    /// Steps the engine by the fixed dt and returns the robot/token contacts
    /// that began or ended during the step.
    pub fn step(&mut self) -> Vec<ContactChange> {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &self.contact_log,
        );

        let events = std::mem::take(
            &mut *self
                .contact_log
                .events
                .lock()
                .expect("contact log poisoned"),
        );
        let mut changes = Vec::new();
        for event in events {
            let (first, second, began) = match event {
                CollisionEvent::Started(a, b, _) => (a, b, true),
                CollisionEvent::Stopped(a, b, _) => (a, b, false),
            };
            let Some(first) = self.colliders.get(first) else {
                continue;
            };
            let Some(second) = self.colliders.get(second) else {
                continue;
            };
            let pair = (decode_class(first.user_data), decode_class(second.user_data));
            let (team, token_id) = match pair {
                (BodyClass::Robot(team), BodyClass::Token(id)) => (team, id),
                (BodyClass::Token(id), BodyClass::Robot(team)) => (team, id),
                _ => continue,
            };
            changes.push(ContactChange {
                team,
                token_id,
                began,
            });
        }
        changes
    }

    /// Position and body angle.
    pub fn pose(&self, handle: RigidBodyHandle) -> ((f64, f64), f64) {
        let body = &self.bodies[handle];
        let translation = body.translation();
        ((translation.x, translation.y), body.rotation().angle())
    }

    /// Small thresholds are deliberate: bodies under fluid damping take a
    /// while to come to rest entirely.
    pub fn is_moving(&self, handle: RigidBodyHandle) -> bool {
        let body = &self.bodies[handle];
        body.linvel().norm() > config::MOVING_LINEAR_THRESHOLD
            || body.angvel().abs() > config::MOVING_ANGULAR_THRESHOLD
    }

    /// Clears the persistent forces on a body before this tick's motor forces
    /// are applied.
    pub fn reset_forces(&mut self, handle: RigidBodyHandle) {
        self.bodies[handle].reset_forces(true);
    }

    /// Applies a force given in body-local coordinates at a body-local point.
    pub fn apply_local_force(
        &mut self,
        handle: RigidBodyHandle,
        force: (f64, f64),
        point: (f64, f64),
    ) {
        let body = &mut self.bodies[handle];
        let world_force = body.position() * vector![force.0, force.1];
        let world_point = body.position() * point![point.0, point.1];
        body.add_force_at_point(world_force, world_point, true);
    }

    /// Bounding-box containment: true when `inner` lies fully inside `outer`.
    pub fn aabb_contains(&self, outer: ColliderHandle, inner: ColliderHandle) -> bool {
        self.colliders[outer]
            .compute_aabb()
            .contains(&self.colliders[inner].compute_aabb())
    }

    /// Moves a body directly to a pose. Only used to stage test scenarios.
    pub fn teleport(&mut self, handle: RigidBodyHandle, position: (f64, f64), angle: f64) {
        let body = &mut self.bodies[handle];
        body.set_translation(vector![position.0, position.1], true);
        body.set_rotation(Rotation::new(angle), true);
    }

    /// Overrides a body's linear velocity. Only used to stage test scenarios.
    pub fn set_linear_velocity(&mut self, handle: RigidBodyHandle, velocity: (f64, f64)) {
        self.bodies[handle].set_linvel(vector![velocity.0, velocity.1], true);
    }
}
