//! The scene-query and actuation interface environments are written against.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use locomo_model::RobotModel;

use crate::camera::{Camera, Image};
use crate::error::Result;
use crate::scene::SceneConfig;

/// Identifies an object (robot, floor or prop) loaded into the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub usize);

/// Identifies one link of an object.
///
/// Contact queries report the parts they touch with this pair, so it also
/// serves as a contact id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartHandle {
    /// Owning object.
    pub object: ObjectId,
    /// Link index within the object.
    pub link: usize,
}

/// Identifies one actuated joint of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointHandle {
    /// Owning object.
    pub object: ObjectId,
    /// Joint index within the object.
    pub index: usize,
}

/// World pose of a part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position in meters.
    pub position: Vector3<f64>,
    /// Orientation.
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    /// Pose at `position` with identity orientation.
    pub fn from_position(position: Vector3<f64>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Roll, pitch and yaw (rotations about fixed x, y, z).
    pub fn rpy(&self) -> (f64, f64, f64) {
        self.orientation.euler_angles()
    }
}

/// Position and velocity of a single joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointState {
    /// Joint position (radians for hinges, meters for slides).
    pub position: f64,
    /// Joint velocity (rad/s for hinges, m/s for slides).
    pub velocity: f64,
}

/// A named part of a loaded robot.
#[derive(Debug, Clone, PartialEq)]
pub struct PartInfo {
    /// Body name from the robot description.
    pub name: String,
    /// Handle for queries.
    pub handle: PartHandle,
}

/// An actuated joint of a loaded robot.
#[derive(Debug, Clone, PartialEq)]
pub struct JointInfo {
    /// Joint name from the robot description.
    pub name: String,
    /// Handle for queries and actuation.
    pub handle: JointHandle,
    /// Position limits, if the joint is limited.
    pub limits: Option<(f64, f64)>,
}

/// A robot as it exists in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRobot {
    /// Object id of the robot.
    pub object: ObjectId,
    /// Every body of the description, in depth-first order.
    pub parts: Vec<PartInfo>,
    /// Actuated joints, in depth-first order.
    pub joints: Vec<JointInfo>,
    /// The root body.
    pub root: PartHandle,
}

impl LoadedRobot {
    /// Look up a part by name.
    pub fn part(&self, name: &str) -> Option<PartHandle> {
        self.parts.iter().find(|p| p.name == name).map(|p| p.handle)
    }

    /// Look up a joint by name.
    pub fn joint(&self, name: &str) -> Option<&JointInfo> {
        self.joints.iter().find(|j| j.name == name)
    }
}

/// Options applied when a robot is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RobotOptions {
    /// Let the robot's own links collide with each other.
    pub self_collision: bool,
    /// Offset added to the root body position.
    pub base_offset: Vector3<f64>,
}

/// Shape of a standalone prop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ObjectShape {
    /// Sphere with the given radius.
    Sphere {
        /// Radius in meters.
        radius: f64,
    },
    /// Box with the given half extents.
    Box {
        /// Half extents in meters.
        half_extents: [f64; 3],
    },
}

/// A single-body prop such as a target ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// Object name.
    pub name: String,
    /// Collision shape.
    pub shape: ObjectShape,
    /// Initial position.
    pub position: [f64; 3],
    /// Mass in kg; zero makes the object static.
    pub mass: f64,
    /// Display color.
    pub rgba: [f32; 4],
}

/// Narrow interface to a rigid-body physics engine.
///
/// Environments only read poses, velocities, joint states and contacts,
/// and write motor commands. Everything else stays inside the engine.
pub trait Simulator {
    /// Clear the world and load the static scene. Returns the floor object.
    fn reset_scene(&mut self, scene: &SceneConfig) -> Result<ObjectId>;

    /// Add an articulated robot to the scene.
    fn load_robot(&mut self, model: &RobotModel, options: &RobotOptions) -> Result<LoadedRobot>;

    /// Add a single-body prop to the scene.
    fn load_object(&mut self, spec: &ObjectSpec) -> Result<ObjectId>;

    /// Advance the simulation by one physics timestep.
    fn step(&mut self);

    /// Physics timestep in seconds.
    fn timestep(&self) -> f64;

    /// World pose of a part.
    fn part_pose(&self, part: PartHandle) -> Result<Pose>;

    /// World linear velocity of a part.
    fn part_velocity(&self, part: PartHandle) -> Result<Vector3<f64>>;

    /// Current position and velocity of a joint.
    fn joint_state(&self, joint: JointHandle) -> Result<JointState>;

    /// Teleport a joint to `position` with `velocity`, moving the
    /// descendant links along with it.
    fn reset_joint_state(&mut self, joint: JointHandle, position: f64, velocity: f64)
        -> Result<()>;

    /// Apply a constant torque (or force, for slides) until changed.
    fn set_motor_torque(&mut self, joint: JointHandle, torque: f64) -> Result<()>;

    /// Drive a joint toward a target velocity with bounded force.
    fn set_motor_velocity(&mut self, joint: JointHandle, target: f64, max_force: f64)
        -> Result<()>;

    /// Drive a joint toward a target position with bounded force.
    fn set_motor_position(&mut self, joint: JointHandle, target: f64, max_force: f64)
        -> Result<()>;

    /// Parts currently in contact with `part`, deduplicated and sorted.
    fn contacts(&self, part: PartHandle) -> Result<Vec<PartHandle>>;

    /// Closest distance between two objects, if within `max_distance`.
    ///
    /// Negative when the objects overlap: the depth of penetration.
    fn closest_distance(&self, a: ObjectId, b: ObjectId, max_distance: f64)
        -> Result<Option<f64>>;

    /// Render an RGBA image from `camera`.
    fn render(&self, camera: &Camera, width: usize, height: usize) -> Image;
}
