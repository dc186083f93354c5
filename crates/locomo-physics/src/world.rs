//! Physics world management using Rapier3d.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::dynamics::{
    CCDSolver, ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, IslandManager,
    LockedAxes, MassProperties, MotorModel, MultibodyJointSet, RigidBody, RigidBodyBuilder,
    RigidBodyHandle, RigidBodySet,
};
use rapier3d::geometry::{
    BroadPhaseMultiSap, ColliderBuilder, ColliderHandle, ColliderSet, Group, InteractionGroups,
    NarrowPhase, SolverFlags,
};
use rapier3d::parry::query::{self, Ray};
use rapier3d::pipeline::{
    ActiveHooks, PairFilterContext, PhysicsHooks, PhysicsPipeline, QueryFilter, QueryPipeline,
};
use tracing::debug;

use locomo_model::{Body, RobotModel};

use crate::camera::{Camera, Image};
use crate::colliders::{geom_to_shape, object_to_shape, quaternion};
use crate::error::{PhysicsError, Result};
use crate::joints::{
    joint_frame, joint_position, joint_to_rapier, Actuation, DEFAULT_MOTOR_DAMPING,
    DEFAULT_MOTOR_STIFFNESS,
};
use crate::scene::SceneConfig;
use crate::sim::{
    JointHandle, JointInfo, JointState, LoadedRobot, ObjectId, ObjectSpec, PartHandle, PartInfo,
    Pose, RobotOptions, Simulator,
};

/// Mass carried by every jointed body on top of its geoms.
///
/// Bodies chaining multi-axis joints have no geoms at all, and light links
/// such as steering knuckles would otherwise be too small for motors acting
/// on them to move what hangs below.
const LINK_MASS: f32 = 0.01;
const LINK_INERTIA: f32 = 1e-4;

const FLOOR_HALF_EXTENTS: [f32; 3] = [50.0, 50.0, 0.5];
const FLOOR_COLORS: [[u8; 4]; 2] = [[200, 200, 200, 255], [150, 150, 150, 255]];
const SKY_COLOR: [u8; 4] = [180, 205, 235, 255];

const FLOOR_GROUP: Group = Group::GROUP_1;
const ROBOT_GROUP: Group = Group::GROUP_2;
const OBJECT_GROUP: Group = Group::GROUP_3;

/// One part of an object: a rigid body and the part frame within it.
///
/// Bodies without joints are welded onto their parent's rigid body, so
/// several parts can share one rigid body with different offsets.
#[derive(Debug, Clone)]
struct Link {
    body: RigidBodyHandle,
    offset: Isometry3<f32>,
    colliders: Vec<ColliderHandle>,
}

#[derive(Debug, Clone)]
struct Joint {
    handle: ImpulseJointHandle,
    actuation: Actuation,
    parent: RigidBodyHandle,
    child: RigidBodyHandle,
    frame1: Isometry3<f32>,
    frame2: Isometry3<f32>,
    /// Indices into `Object::bodies` moved along with `child`.
    subtree: Range<usize>,
    torque: f32,
}

#[derive(Debug, Clone, Default)]
struct Object {
    name: String,
    bodies: Vec<RigidBodyHandle>,
    links: Vec<Link>,
    joints: Vec<Joint>,
}

/// Excludes contacts between bodies connected through a joint chain.
#[derive(Debug, Default)]
struct PairFilter {
    excluded: HashSet<(RigidBodyHandle, RigidBodyHandle)>,
}

impl PairFilter {
    fn exclude(&mut self, a: RigidBodyHandle, b: RigidBodyHandle) {
        self.excluded.insert((a, b));
        self.excluded.insert((b, a));
    }
}

impl PhysicsHooks for PairFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        if let (Some(a), Some(b)) = (context.rigid_body1, context.rigid_body2) {
            if self.excluded.contains(&(a, b)) {
                return None;
            }
        }
        Some(SolverFlags::COMPUTE_IMPULSES)
    }
}

/// Rapier-backed [`Simulator`].
pub struct RapierWorld {
    // Rapier components
    pipeline: PhysicsPipeline,
    gravity: Vector3<f32>,
    integration_params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    hooks: PairFilter,

    // Scene bookkeeping
    objects: Vec<Object>,
    colors: HashMap<ColliderHandle, [f32; 4]>,
    floor: Option<ObjectId>,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierWorld {
    /// Create an empty physics world. Call [`Simulator::reset_scene`]
    /// before loading anything.
    pub fn new() -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: Vector3::new(0.0, 0.0, -9.8),
            integration_params: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            hooks: PairFilter::default(),
            objects: Vec::new(),
            colors: HashMap::new(),
            floor: None,
        }
    }

    /// Name of a loaded object.
    pub fn object_name(&self, id: ObjectId) -> Result<&str> {
        Ok(&self.object(id)?.name)
    }

    /// Number of loaded objects, floor included.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn object(&self, id: ObjectId) -> Result<&Object> {
        self.objects.get(id.0).ok_or(PhysicsError::MissingObject(id))
    }

    fn link(&self, part: PartHandle) -> Result<&Link> {
        self.object(part.object)?
            .links
            .get(part.link)
            .ok_or(PhysicsError::MissingPart(part))
    }

    fn joint(&self, handle: JointHandle) -> Result<&Joint> {
        self.objects
            .get(handle.object.0)
            .and_then(|o| o.joints.get(handle.index))
            .ok_or(PhysicsError::MissingJoint(handle))
    }

    fn joint_mut(&mut self, handle: JointHandle) -> Result<&mut Joint> {
        self.objects
            .get_mut(handle.object.0)
            .and_then(|o| o.joints.get_mut(handle.index))
            .ok_or(PhysicsError::MissingJoint(handle))
    }

    fn rigid_body(&self, handle: RigidBodyHandle) -> Result<&RigidBody> {
        self.bodies
            .get(handle)
            .ok_or_else(|| PhysicsError::InvalidScene("stale rigid body handle".into()))
    }

    fn require_scene(&self) -> Result<()> {
        if self.floor.is_some() {
            Ok(())
        } else {
            Err(PhysicsError::NoScene)
        }
    }

    /// World axis of a joint, taken from the child's joint frame.
    fn joint_axis(&self, joint: &Joint) -> Result<Vector3<f32>> {
        let child = self.rigid_body(joint.child)?;
        Ok((child.position() * joint.frame2).rotation * Vector3::x())
    }

    fn apply_joint_torques(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }

        let mut efforts = Vec::new();
        for object in &self.objects {
            for joint in object.joints.iter().filter(|j| j.torque != 0.0) {
                if let Ok(axis) = self.joint_axis(joint) {
                    efforts.push((joint.parent, joint.child, joint.actuation, axis * joint.torque));
                }
            }
        }

        for (parent, child, actuation, effort) in efforts {
            match actuation {
                Actuation::Revolute => {
                    if let Some(body) = self.bodies.get_mut(child) {
                        body.add_torque(effort, true);
                    }
                    if let Some(body) = self.bodies.get_mut(parent) {
                        body.add_torque(-effort, true);
                    }
                }
                Actuation::Prismatic => {
                    if let Some(body) = self.bodies.get_mut(child) {
                        body.add_force(effort, true);
                    }
                    if let Some(body) = self.bodies.get_mut(parent) {
                        body.add_force(-effort, true);
                    }
                }
            }
        }
    }

    fn add_floor(&mut self, friction: f64) -> ObjectId {
        let id = ObjectId(self.objects.len());
        let body = self.bodies.insert(RigidBodyBuilder::fixed().build());
        let [hx, hy, hz] = FLOOR_HALF_EXTENTS;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(Vector3::new(0.0, 0.0, -hz))
            .friction(friction as f32)
            .collision_groups(InteractionGroups::new(FLOOR_GROUP, Group::ALL))
            .user_data(encode_part(PartHandle { object: id, link: 0 }))
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);

        self.objects.push(Object {
            name: "floor".into(),
            bodies: vec![body],
            links: vec![Link {
                body,
                offset: Isometry3::identity(),
                colliders: vec![collider],
            }],
            joints: Vec::new(),
        });
        id
    }

    fn shade(&self, collider: ColliderHandle, hit: &Point3<f32>, normal: &Vector3<f32>) -> [u8; 4] {
        let light = Vector3::new(0.3f32, 0.2, 1.0).normalize();
        let lambert = 0.35 + 0.65 * normal.dot(&light).max(0.0);

        let base = if self.is_floor_collider(collider) {
            let parity = (hit.x.floor() as i64 + hit.y.floor() as i64).rem_euclid(2) as usize;
            let c = FLOOR_COLORS[parity];
            [c[0] as f32 / 255.0, c[1] as f32 / 255.0, c[2] as f32 / 255.0, 1.0]
        } else {
            self.colors.get(&collider).copied().unwrap_or([0.8, 0.8, 0.8, 1.0])
        };

        let channel = |v: f32| (v * lambert * 255.0).round().clamp(0.0, 255.0) as u8;
        [channel(base[0]), channel(base[1]), channel(base[2]), 255]
    }

    fn is_floor_collider(&self, collider: ColliderHandle) -> bool {
        self.floor
            .and_then(|id| self.objects.get(id.0))
            .is_some_and(|floor| floor.links.iter().any(|l| l.colliders.contains(&collider)))
    }
}

impl Simulator for RapierWorld {
    fn reset_scene(&mut self, scene: &SceneConfig) -> Result<ObjectId> {
        scene.validate()?;
        *self = Self::new();
        self.gravity = Vector3::new(0.0, 0.0, -(scene.gravity as f32));
        self.integration_params.dt = scene.timestep as f32;

        let floor = self.add_floor(scene.floor_friction);
        self.floor = Some(floor);
        self.query_pipeline.update(&self.colliders);
        debug!(
            gravity = scene.gravity,
            timestep = scene.timestep,
            frame_skip = scene.frame_skip,
            "scene reset"
        );
        Ok(floor)
    }

    fn load_robot(&mut self, model: &RobotModel, options: &RobotOptions) -> Result<LoadedRobot> {
        self.require_scene()?;
        let id = ObjectId(self.objects.len());
        let mut builder = RobotBuilder {
            world: self,
            id,
            options,
            object: Object {
                name: model.name.clone(),
                ..Default::default()
            },
            parts: Vec::new(),
            joints: Vec::new(),
        };

        let base = Isometry3::translation(
            options.base_offset.x as f32,
            options.base_offset.y as f32,
            options.base_offset.z as f32,
        );
        builder.add_root(model, base)?;
        let RobotBuilder {
            object,
            parts,
            joints,
            ..
        } = builder;

        debug!(
            robot = %model.name,
            parts = parts.len(),
            joints = joints.len(),
            "robot loaded"
        );
        self.objects.push(object);
        self.query_pipeline.update(&self.colliders);

        Ok(LoadedRobot {
            object: id,
            root: PartHandle { object: id, link: 0 },
            parts,
            joints,
        })
    }

    fn load_object(&mut self, spec: &ObjectSpec) -> Result<ObjectId> {
        self.require_scene()?;
        if !(spec.mass.is_finite() && spec.mass >= 0.0) {
            return Err(PhysicsError::InvalidScene(format!(
                "{} has mass {}",
                spec.name, spec.mass
            )));
        }
        let id = ObjectId(self.objects.len());
        let shape = object_to_shape(&spec.shape, &spec.name)?;
        let [x, y, z] = spec.position;
        let builder = if spec.mass == 0.0 {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic().can_sleep(false)
        };
        let body = self.bodies.insert(
            builder
                .translation(Vector3::new(x as f32, y as f32, z as f32))
                .build(),
        );

        let mut collider = ColliderBuilder::new(shape)
            .collision_groups(InteractionGroups::new(OBJECT_GROUP, Group::ALL))
            .user_data(encode_part(PartHandle { object: id, link: 0 }));
        if spec.mass > 0.0 {
            collider = collider.mass(spec.mass as f32);
        }
        let collider = self
            .colliders
            .insert_with_parent(collider.build(), body, &mut self.bodies);
        self.colors.insert(collider, spec.rgba);

        self.objects.push(Object {
            name: spec.name.clone(),
            bodies: vec![body],
            links: vec![Link {
                body,
                offset: Isometry3::identity(),
                colliders: vec![collider],
            }],
            joints: Vec::new(),
        });
        self.query_pipeline.update(&self.colliders);
        debug!(object = %spec.name, "object loaded");
        Ok(id)
    }

    fn step(&mut self) {
        self.apply_joint_torques();
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &self.hooks,
            &(),
        );
    }

    fn timestep(&self) -> f64 {
        f64::from(self.integration_params.dt)
    }

    fn part_pose(&self, part: PartHandle) -> Result<Pose> {
        let link = self.link(part)?;
        let pose = (self.rigid_body(link.body)?.position() * link.offset).cast::<f64>();
        Ok(Pose {
            position: pose.translation.vector,
            orientation: pose.rotation,
        })
    }

    fn part_velocity(&self, part: PartHandle) -> Result<Vector3<f64>> {
        let link = self.link(part)?;
        let body = self.rigid_body(link.body)?;
        let origin = Point3::from((body.position() * link.offset).translation.vector);
        Ok(body.velocity_at_point(&origin).cast::<f64>())
    }

    fn joint_state(&self, handle: JointHandle) -> Result<JointState> {
        let joint = self.joint(handle)?;
        let parent = self.rigid_body(joint.parent)?;
        let child = self.rigid_body(joint.child)?;
        let frame1 = parent.position() * joint.frame1;
        let frame2 = child.position() * joint.frame2;
        let axis = frame2.rotation * Vector3::x();

        let velocity = match joint.actuation {
            Actuation::Revolute => (child.angvel() - parent.angvel()).dot(&axis),
            Actuation::Prismatic => {
                let anchor = Point3::from(frame2.translation.vector);
                (child.velocity_at_point(&anchor) - parent.velocity_at_point(&anchor)).dot(&axis)
            }
        };
        Ok(JointState {
            position: joint_position(joint.actuation, &frame1, &frame2),
            velocity: f64::from(velocity),
        })
    }

    fn reset_joint_state(&mut self, handle: JointHandle, position: f64, velocity: f64) -> Result<()> {
        let joint = self.joint(handle)?.clone();
        let bodies = self.object(handle.object)?.bodies[joint.subtree.clone()].to_vec();
        let parent = self.rigid_body(joint.parent)?;
        let parent_pose = *parent.position();
        let parent_linvel = *parent.linvel();
        let parent_angvel = *parent.angvel();
        let child_pose = *self.rigid_body(joint.child)?.position();

        let motion = match joint.actuation {
            Actuation::Revolute => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), position as f32),
            ),
            Actuation::Prismatic => Isometry3::translation(position as f32, 0.0, 0.0),
        };
        let target = parent_pose * joint.frame1 * motion * joint.frame2.inverse();
        let delta = target * child_pose.inverse();
        let axis = target.rotation * (joint.frame2.rotation * Vector3::x());

        for handle in bodies {
            if let Some(body) = self.bodies.get_mut(handle) {
                let pose = delta * body.position();
                body.set_position(pose, true);
                body.set_linvel(parent_linvel, true);
                body.set_angvel(parent_angvel, true);
            }
        }
        if let Some(child) = self.bodies.get_mut(joint.child) {
            match joint.actuation {
                Actuation::Revolute => {
                    child.set_angvel(parent_angvel + axis * velocity as f32, true)
                }
                Actuation::Prismatic => child.set_linvel(parent_linvel + axis * velocity as f32, true),
            }
        }
        // Teleported links must be visible to ray casts before the next step.
        self.bodies
            .propagate_modified_body_positions_to_colliders(&mut self.colliders);
        self.query_pipeline.update(&self.colliders);
        Ok(())
    }

    fn set_motor_torque(&mut self, handle: JointHandle, torque: f64) -> Result<()> {
        self.joint_mut(handle)?.torque = torque as f32;
        Ok(())
    }

    fn set_motor_velocity(&mut self, handle: JointHandle, target: f64, max_force: f64) -> Result<()> {
        let joint = self.joint(handle)?;
        let (impulse, axis) = (joint.handle, joint.actuation.axis());
        let joint = self
            .impulse_joints
            .get_mut(impulse, true)
            .ok_or(PhysicsError::MissingJoint(handle))?;
        joint
            .data
            .set_motor_model(axis, MotorModel::ForceBased)
            .set_motor_velocity(axis, target as f32, DEFAULT_MOTOR_DAMPING)
            .set_motor_max_force(axis, max_force as f32);
        Ok(())
    }

    fn set_motor_position(&mut self, handle: JointHandle, target: f64, max_force: f64) -> Result<()> {
        let joint = self.joint(handle)?;
        let (impulse, axis) = (joint.handle, joint.actuation.axis());
        let joint = self
            .impulse_joints
            .get_mut(impulse, true)
            .ok_or(PhysicsError::MissingJoint(handle))?;
        joint
            .data
            .set_motor_model(axis, MotorModel::ForceBased)
            .set_motor_position(axis, target as f32, DEFAULT_MOTOR_STIFFNESS, DEFAULT_MOTOR_DAMPING)
            .set_motor_max_force(axis, max_force as f32);
        Ok(())
    }

    fn contacts(&self, part: PartHandle) -> Result<Vec<PartHandle>> {
        let link = self.link(part)?;
        let mut found = BTreeSet::new();
        for &collider in &link.colliders {
            for pair in self.narrow_phase.contact_pairs_with(collider) {
                if !pair.has_any_active_contact {
                    continue;
                }
                let other = if pair.collider1 == collider {
                    pair.collider2
                } else {
                    pair.collider1
                };
                if let Some(c) = self.colliders.get(other) {
                    found.insert(decode_part(c.user_data));
                }
            }
        }
        Ok(found.into_iter().collect())
    }

    fn closest_distance(&self, a: ObjectId, b: ObjectId, max_distance: f64) -> Result<Option<f64>> {
        let colliders_of = |id: ObjectId| -> Result<Vec<ColliderHandle>> {
            Ok(self
                .object(id)?
                .links
                .iter()
                .flat_map(|l| l.colliders.iter().copied())
                .collect())
        };
        let (first, second) = (colliders_of(a)?, colliders_of(b)?);

        let mut best: Option<f64> = None;
        for h1 in &first {
            for h2 in &second {
                let (Some(c1), Some(c2)) = (self.colliders.get(*h1), self.colliders.get(*h2)) else {
                    continue;
                };
                let (p1, p2) = (c1.position(), c2.position());
                let d = match query::distance(p1, c1.shape(), p2, c2.shape()) {
                    Ok(d) if d > 0.0 => d,
                    // Overlapping shapes report how deep they penetrate.
                    Ok(d) => query::contact(p1, c1.shape(), p2, c2.shape(), 0.0)
                        .ok()
                        .flatten()
                        .map_or(d, |contact| contact.dist.min(0.0)),
                    Err(_) => continue,
                };
                let d = f64::from(d);
                best = Some(best.map_or(d, |b| b.min(d)));
            }
        }
        Ok(best.filter(|d| *d <= max_distance))
    }

    fn render(&self, camera: &Camera, width: usize, height: usize) -> Image {
        let mut image = Image::filled(width, height, SKY_COLOR);
        let eye = camera.eye.cast::<f32>();
        let max_toi = (camera.far - camera.near) as f32;

        for py in 0..height {
            for px in 0..width {
                let dir = camera.ray_direction(px, py, width, height).cast::<f32>();
                let ray = Ray::new(eye + dir * camera.near as f32, dir);
                if let Some((collider, hit)) = self.query_pipeline.cast_ray_and_get_normal(
                    &self.bodies,
                    &self.colliders,
                    &ray,
                    max_toi,
                    true,
                    QueryFilter::default(),
                ) {
                    let point = ray.point_at(hit.time_of_impact);
                    image.set_pixel(px, py, self.shade(collider, &point, &hit.normal));
                }
            }
        }
        image
    }
}

/// Incrementally converts a robot description into rigid bodies.
struct RobotBuilder<'w> {
    world: &'w mut RapierWorld,
    id: ObjectId,
    options: &'w RobotOptions,
    object: Object,
    parts: Vec<PartInfo>,
    joints: Vec<JointInfo>,
}

impl RobotBuilder<'_> {
    fn add_root(&mut self, model: &RobotModel, base: Isometry3<f32>) -> Result<()> {
        let root = &model.root;
        let pose = base * local_pose(root);
        let motion = model.root_motion();

        let builder = if motion.is_fixed() {
            RigidBodyBuilder::fixed()
        } else {
            let mut locked = LockedAxes::empty();
            let flags = [
                (motion.translation[0], LockedAxes::TRANSLATION_LOCKED_X),
                (motion.translation[1], LockedAxes::TRANSLATION_LOCKED_Y),
                (motion.translation[2], LockedAxes::TRANSLATION_LOCKED_Z),
                (motion.rotation[0], LockedAxes::ROTATION_LOCKED_X),
                (motion.rotation[1], LockedAxes::ROTATION_LOCKED_Y),
                (motion.rotation[2], LockedAxes::ROTATION_LOCKED_Z),
            ];
            for (free, flag) in flags {
                if !free {
                    locked |= flag;
                }
            }
            RigidBodyBuilder::dynamic().locked_axes(locked).can_sleep(false)
        };

        let body = self.insert_body(builder.position(pose), root.geoms.is_empty());
        let link = self.add_link(root, body, Isometry3::identity())?;
        for child in &root.children {
            self.add_body(child, link, pose)?;
        }
        Ok(())
    }

    fn add_body(&mut self, body: &Body, parent: usize, parent_pose: Isometry3<f32>) -> Result<()> {
        let local = local_pose(body);
        let pose = parent_pose * local;
        let Link {
            body: parent_body,
            offset: parent_offset,
            ..
        } = self.object.links[parent].clone();

        if body.joints.is_empty() {
            let link = self.add_link(body, parent_body, parent_offset * local)?;
            for child in &body.children {
                self.add_body(child, link, pose)?;
            }
            return Ok(());
        }

        let first_joint = self.object.joints.len();
        let mut prev_body = parent_body;
        let mut prev_offset = parent_offset * local;
        let mut rigid = prev_body;

        for def in &body.joints {
            let builder = RigidBodyBuilder::dynamic().position(pose).can_sleep(false);
            rigid = self.insert_body(builder, true);

            let anchor = Vector3::new(def.pos.x as f32, def.pos.y as f32, def.pos.z as f32);
            let axis = Vector3::new(def.axis.x as f32, def.axis.y as f32, def.axis.z as f32);
            let frame2 = joint_frame(anchor, axis);
            let frame1 = prev_offset * frame2;
            let (data, actuation) = joint_to_rapier(def, frame1, frame2)?;
            let handle = self
                .world
                .impulse_joints
                .insert(prev_body, rigid, data, true);

            let index = self.object.joints.len();
            self.object.joints.push(Joint {
                handle,
                actuation,
                parent: prev_body,
                child: rigid,
                frame1,
                frame2,
                subtree: self.object.bodies.len() - 1..0,
                torque: 0.0,
            });
            self.joints.push(JointInfo {
                name: def.name.clone(),
                handle: JointHandle {
                    object: self.id,
                    index,
                },
                limits: def.range,
            });

            prev_body = rigid;
            prev_offset = Isometry3::identity();
        }
        self.world.hooks.exclude(parent_body, rigid);

        let link = self.add_link(body, rigid, Isometry3::identity())?;
        for child in &body.children {
            self.add_body(child, link, pose)?;
        }

        let end = self.object.bodies.len();
        for joint in &mut self.object.joints[first_joint..] {
            if joint.subtree.end == 0 {
                joint.subtree.end = end;
            }
        }
        Ok(())
    }

    fn insert_body(&mut self, builder: RigidBodyBuilder, padded: bool) -> RigidBodyHandle {
        let builder = if padded {
            builder.additional_mass_properties(MassProperties::new(
                Point3::origin(),
                LINK_MASS,
                Vector3::repeat(LINK_INERTIA),
            ))
        } else {
            builder
        };
        let handle = self.world.bodies.insert(builder.build());
        self.object.bodies.push(handle);
        handle
    }

    /// Attach `body`'s geoms to `rigid` at `offset` and register the part.
    fn add_link(&mut self, body: &Body, rigid: RigidBodyHandle, offset: Isometry3<f32>) -> Result<usize> {
        let link = self.object.links.len();
        let part = PartHandle {
            object: self.id,
            link,
        };
        let filter = if self.options.self_collision {
            Group::ALL
        } else {
            Group::ALL ^ ROBOT_GROUP
        };

        let mut colliders = Vec::with_capacity(body.geoms.len());
        for (i, geom) in body.geoms.iter().enumerate() {
            let label = geom
                .name
                .clone()
                .unwrap_or_else(|| format!("{}/geom{i}", body.name));
            let placed = geom_to_shape(geom, &label)?;
            let mut builder = ColliderBuilder::new(placed.shape)
                .position(offset * placed.position)
                .density(geom.density as f32)
                .friction(geom.friction as f32)
                .collision_groups(InteractionGroups::new(ROBOT_GROUP, filter))
                .user_data(encode_part(part));
            if self.options.self_collision {
                builder = builder.active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS);
            }
            let handle = self.world.colliders.insert_with_parent(
                builder.build(),
                rigid,
                &mut self.world.bodies,
            );
            self.world.colors.insert(handle, geom.rgba);
            colliders.push(handle);
        }

        self.object.links.push(Link {
            body: rigid,
            offset,
            colliders,
        });
        self.parts.push(PartInfo {
            name: body.name.clone(),
            handle: part,
        });
        Ok(link)
    }
}

fn local_pose(body: &Body) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::new(body.pos.x as f32, body.pos.y as f32, body.pos.z as f32),
        quaternion(&body.rotation),
    )
}

fn encode_part(part: PartHandle) -> u128 {
    ((part.object.0 as u128) << 64) | part.link as u128
}

fn decode_part(data: u128) -> PartHandle {
    PartHandle {
        object: ObjectId((data >> 64) as usize),
        link: (data & u128::from(u64::MAX)) as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ObjectShape;
    use approx::assert_relative_eq;
    use locomo_model::{Geom, GeomShape, JointDef, JointKind, Quat, RobotAsset, Vec3};

    fn scene() -> SceneConfig {
        SceneConfig::default()
    }

    fn capsule(from: Vec3, to: Vec3) -> Geom {
        Geom {
            name: None,
            shape: GeomShape::Capsule {
                radius: 0.05,
                from,
                to,
            },
            density: 1000.0,
            friction: 1.0,
            rgba: [0.8, 0.6, 0.4, 1.0],
        }
    }

    fn hinge(name: &str, axis: Vec3) -> JointDef {
        JointDef {
            name: name.into(),
            kind: JointKind::Hinge,
            axis,
            pos: Vec3::zero(),
            range: Some((-2.0, 2.0)),
            damping: 0.0,
        }
    }

    /// A fixed post carrying an arm on a vertical hinge.
    fn pendulum() -> RobotModel {
        let mut arm = Body::new("arm");
        arm.pos = Vec3::new(0.0, 0.0, 1.0);
        arm.joints.push(hinge("swing", Vec3::new(0.0, 0.0, 1.0)));
        arm.geoms
            .push(capsule(Vec3::zero(), Vec3::new(0.5, 0.0, 0.0)));
        let mut tip = Body::new("tip");
        tip.pos = Vec3::new(0.5, 0.0, 0.0);
        arm.children.push(tip);

        let mut post = Body::new("post");
        post.geoms
            .push(capsule(Vec3::new(0.0, 0.0, 0.1), Vec3::new(0.0, 0.0, 0.9)));
        post.children.push(arm);
        RobotModel {
            name: "pendulum".into(),
            root: post,
            actuators: vec![],
        }
    }

    fn ball(name: &str, position: [f64; 3], mass: f64) -> ObjectSpec {
        ObjectSpec {
            name: name.into(),
            shape: ObjectShape::Sphere { radius: 0.5 },
            position,
            mass,
            rgba: [1.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn loading_requires_scene() {
        let mut world = RapierWorld::new();
        assert!(matches!(
            world.load_robot(&pendulum(), &RobotOptions::default()),
            Err(PhysicsError::NoScene)
        ));
    }

    #[test]
    fn robot_parts_and_joints() {
        let mut world = RapierWorld::new();
        let floor = world.reset_scene(&scene()).unwrap();
        let robot = world
            .load_robot(&pendulum(), &RobotOptions::default())
            .unwrap();

        assert_eq!(floor, ObjectId(0));
        assert_eq!(robot.object, ObjectId(1));
        assert_eq!(world.object_name(robot.object).unwrap(), "pendulum");
        let names: Vec<_> = robot.parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["post", "arm", "tip"]);
        assert_eq!(robot.joints.len(), 1);
        assert_eq!(robot.joints[0].limits, Some((-2.0, 2.0)));

        // The welded tip sits at the end of the arm.
        let tip = world.part_pose(robot.part("tip").unwrap()).unwrap();
        assert_relative_eq!(tip.position, Vector3::new(0.5, 0.0, 1.0), epsilon = 1e-5);

        let state = world.joint_state(robot.joints[0].handle).unwrap();
        assert_relative_eq!(state.position, 0.0, epsilon = 1e-6);
        assert_relative_eq!(state.velocity, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn reset_joint_moves_subtree() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let robot = world
            .load_robot(&pendulum(), &RobotOptions::default())
            .unwrap();
        let swing = robot.joints[0].handle;

        world
            .reset_joint_state(swing, std::f64::consts::FRAC_PI_2, 0.5)
            .unwrap();
        let state = world.joint_state(swing).unwrap();
        assert_relative_eq!(state.position, std::f64::consts::FRAC_PI_2, epsilon = 1e-4);
        assert_relative_eq!(state.velocity, 0.5, epsilon = 1e-4);

        let tip = world.part_pose(robot.part("tip").unwrap()).unwrap();
        assert_relative_eq!(tip.position, Vector3::new(0.0, 0.5, 1.0), epsilon = 1e-4);
    }

    #[test]
    fn torque_spins_hinge() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let robot = world
            .load_robot(&pendulum(), &RobotOptions::default())
            .unwrap();
        let swing = robot.joints[0].handle;

        world.set_motor_torque(swing, 2.0).unwrap();
        for _ in 0..20 {
            world.step();
        }
        let state = world.joint_state(swing).unwrap();
        assert!(state.velocity > 0.0, "{state:?}");
        assert!(state.position > 0.0, "{state:?}");
    }

    #[test]
    fn ball_rests_on_floor() {
        let mut world = RapierWorld::new();
        let floor = world.reset_scene(&scene()).unwrap();
        let ball = world.load_object(&ball("ball", [0.0, 0.0, 0.6], 1.0)).unwrap();

        for _ in 0..200 {
            world.step();
        }
        let pose = world
            .part_pose(PartHandle {
                object: ball,
                link: 0,
            })
            .unwrap();
        assert_relative_eq!(pose.position.z, 0.5, epsilon = 0.05);

        let contacts = world
            .contacts(PartHandle {
                object: ball,
                link: 0,
            })
            .unwrap();
        assert_eq!(contacts, [PartHandle { object: floor, link: 0 }]);
    }

    #[test]
    fn closest_distance_between_objects() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let a = world.load_object(&ball("a", [0.0, 0.0, 1.0], 0.0)).unwrap();
        let b = world.load_object(&ball("b", [3.0, 0.0, 1.0], 0.0)).unwrap();

        let d = world.closest_distance(a, b, 10.0).unwrap().unwrap();
        assert_relative_eq!(d, 2.0, epsilon = 1e-4);
        assert_eq!(world.closest_distance(a, b, 1.0).unwrap(), None);
        assert!(world.closest_distance(a, ObjectId(9), 1.0).is_err());
    }

    #[test]
    fn overlapping_objects_report_penetration() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let a = world.load_object(&ball("a", [0.0, 0.0, 1.0], 0.0)).unwrap();
        let b = world.load_object(&ball("b", [0.6, 0.0, 1.0], 0.0)).unwrap();

        let d = world.closest_distance(a, b, 1.0).unwrap().unwrap();
        assert_relative_eq!(d, -0.4, epsilon = 1e-4);
    }

    #[test]
    fn velocity_motor_reaches_target_speed() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let robot = world
            .load_robot(&pendulum(), &RobotOptions::default())
            .unwrap();
        let swing = robot.joints[0].handle;

        world.set_motor_velocity(swing, 1.5, 50.0).unwrap();
        for _ in 0..60 {
            world.step();
        }
        let state = world.joint_state(swing).unwrap();
        assert_relative_eq!(state.velocity, 1.5, epsilon = 0.05);
        assert!(state.position > 0.0 && state.position < 2.0, "{state:?}");

        world.set_motor_velocity(swing, 0.0, 50.0).unwrap();
        for _ in 0..60 {
            world.step();
        }
        assert_relative_eq!(world.joint_state(swing).unwrap().velocity, 0.0, epsilon = 0.05);
    }

    #[test]
    fn position_motor_reaches_target_angle() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let robot = world
            .load_robot(&pendulum(), &RobotOptions::default())
            .unwrap();
        let swing = robot.joints[0].handle;

        world.set_motor_position(swing, 0.8, 50.0).unwrap();
        for _ in 0..300 {
            world.step();
        }
        let state = world.joint_state(swing).unwrap();
        assert_relative_eq!(state.position, 0.8, epsilon = 0.02);
        assert_relative_eq!(state.velocity, 0.0, epsilon = 0.05);
    }

    #[test]
    fn position_motor_steers_wheel_on_floor() {
        let mut world = RapierWorld::new();
        world
            .reset_scene(&SceneConfig {
                gravity: 10.0,
                timestep: 0.01,
                frame_skip: 1,
                ..scene()
            })
            .unwrap();
        let model = RobotModel::from_asset(RobotAsset::Racecar).unwrap();
        let car = world.load_robot(&model, &RobotOptions::default()).unwrap();
        for _ in 0..50 {
            world.step();
        }
        let tire = car.part("left_front_wheel").unwrap();
        assert!(!world.contacts(tire).unwrap().is_empty());

        let joint = |name: &str| car.joint(name).unwrap().handle;
        for wheel in ["left_front_wheel_joint", "right_front_wheel_joint"] {
            world.set_motor_velocity(joint(wheel), 0.0, 20.0).unwrap();
        }
        let hinges = [
            joint("left_steering_hinge_joint"),
            joint("right_steering_hinge_joint"),
        ];
        for target in [0.3, -0.3] {
            for hinge in hinges {
                world.set_motor_position(hinge, target, 20.0).unwrap();
            }
            for _ in 0..50 {
                world.step();
            }
            for hinge in hinges {
                let state = world.joint_state(hinge).unwrap();
                assert_relative_eq!(state.position, target, epsilon = 0.03);
            }
        }
    }

    #[test]
    fn reset_joint_updates_collision_geometry() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let robot = world
            .load_robot(&pendulum(), &RobotOptions::default())
            .unwrap();
        let target = world.load_object(&ball("target", [0.0, 1.5, 1.0], 0.0)).unwrap();
        let before = world.closest_distance(robot.object, target, 10.0).unwrap().unwrap();
        assert_relative_eq!(before, 0.95, epsilon = 1e-3);

        // Swing the arm toward the target without stepping.
        world
            .reset_joint_state(robot.joints[0].handle, std::f64::consts::FRAC_PI_2, 0.0)
            .unwrap();
        let after = world.closest_distance(robot.object, target, 10.0).unwrap().unwrap();
        assert_relative_eq!(after, 0.45, epsilon = 1e-3);

        // A camera looking straight down now sees the arm instead of the floor.
        let camera = Camera::look_at(
            Point3::new(0.0, 0.3, 3.0),
            Point3::new(0.0, 0.3, 0.0),
            Vector3::x(),
        );
        let center = world.render(&camera, 11, 11).pixel(5, 5).unwrap();
        assert!(center[0] > center[2], "{center:?}");
    }

    #[test]
    fn render_sees_floor_and_sky() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        world.load_object(&ball("target", [3.0, 0.0, 1.0], 0.0)).unwrap();

        let camera = Camera::look_at(
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Vector3::z(),
        );
        let image = world.render(&camera, 21, 15);
        assert_eq!(image.data.len(), 21 * 15 * 4);
        // Top row looks at the sky, bottom row at the floor, center at the ball.
        assert_eq!(image.pixel(0, 0), Some(SKY_COLOR));
        assert_ne!(image.pixel(10, 14), Some(SKY_COLOR));
        let center = image.pixel(10, 7).unwrap();
        assert!(center[0] > center[1] && center[0] > center[2], "{center:?}");
    }

    #[test]
    fn planar_root_stays_in_plane() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let model = RobotModel::from_asset(RobotAsset::Hopper).unwrap();
        let robot = world.load_robot(&model, &RobotOptions::default()).unwrap();
        assert_eq!(robot.joints.len(), 3);
        assert_eq!(robot.parts.len(), 4);

        for _ in 0..50 {
            world.step();
        }
        let torso = world.part_pose(robot.root).unwrap();
        assert_relative_eq!(torso.position.y, 0.0, epsilon = 1e-3);
        let (roll, _, yaw) = torso.rpy();
        assert_relative_eq!(roll, 0.0, epsilon = 1e-3);
        assert_relative_eq!(yaw, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn multi_axis_body_chains_joints() {
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let model = RobotModel::from_asset(RobotAsset::Humanoid).unwrap();
        let robot = world
            .load_robot(
                &model,
                &RobotOptions {
                    self_collision: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(robot.joints.len(), 17);
        assert!(robot.part("right_foot").is_some());

        let hip_z = robot.joint("right_hip_z").unwrap().handle;
        world.reset_joint_state(hip_z, 0.3, 0.0).unwrap();
        assert_relative_eq!(world.joint_state(hip_z).unwrap().position, 0.3, epsilon = 1e-4);
        let hip_x = robot.joint("right_hip_x").unwrap().handle;
        assert_relative_eq!(world.joint_state(hip_x).unwrap().position, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn part_handles_round_trip_through_user_data() {
        let part = PartHandle {
            object: ObjectId(3),
            link: 7,
        };
        assert_eq!(decode_part(encode_part(part)), part);
    }

    #[test]
    fn rotated_body_pose() {
        let mut root = Body::new("root");
        root.rotation = Quat {
            w: std::f64::consts::FRAC_1_SQRT_2,
            x: 0.0,
            y: 0.0,
            z: std::f64::consts::FRAC_1_SQRT_2,
        };
        root.geoms.push(capsule(Vec3::zero(), Vec3::new(0.0, 0.0, 0.2)));
        let model = RobotModel {
            name: "turned".into(),
            root,
            actuators: vec![],
        };
        let mut world = RapierWorld::new();
        world.reset_scene(&scene()).unwrap();
        let robot = world
            .load_robot(
                &model,
                &RobotOptions {
                    base_offset: Vector3::new(1.0, 2.0, 3.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let pose = world.part_pose(robot.root).unwrap();
        assert_relative_eq!(pose.position, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-6);
        assert_relative_eq!(pose.rpy().2, std::f64::consts::FRAC_PI_2, epsilon = 1e-5);
    }
}
