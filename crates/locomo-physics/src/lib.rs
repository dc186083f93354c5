#![warn(missing_docs)]

//! Physics backend for the locomo environments, built on Rapier3d.
//!
//! Environments talk to the physics engine only through the [`Simulator`]
//! trait: part poses and velocities, joint states, contact lists, motor
//! commands, closest-point distances and camera images. [`RapierWorld`]
//! implements it by turning a [`locomo_model::RobotModel`] into rigid
//! bodies chained with impulse joints.
//!
//! # Features
//!
//! - Stadium scene with a static floor, gravity and fixed timestep
//! - Hinge and slide joints with limits, damping and torque/velocity/position motors
//! - Planar or free root bodies via locked axes
//! - Contact and closest-distance queries keyed by `(object, link)` parts
//! - Ray-cast RGBA rendering for vision tasks
//!
//! # Example
//!
//! ```
//! use locomo_model::{RobotAsset, RobotModel};
//! use locomo_physics::{RapierWorld, RobotOptions, SceneConfig, Simulator};
//!
//! let mut world = RapierWorld::new();
//! world.reset_scene(&SceneConfig::default()).unwrap();
//! let hopper = RobotModel::from_asset(RobotAsset::Hopper).unwrap();
//! let robot = world.load_robot(&hopper, &RobotOptions::default()).unwrap();
//!
//! world.set_motor_torque(robot.joints[0].handle, 10.0).unwrap();
//! world.step();
//! ```

mod camera;
mod colliders;
mod error;
mod joints;
mod scene;
mod sim;
mod world;

pub use camera::{Camera, Image};
pub use error::{PhysicsError, Result};
pub use scene::SceneConfig;
pub use sim::{
    JointHandle, JointInfo, JointState, LoadedRobot, ObjectId, ObjectShape, ObjectSpec, PartHandle,
    PartInfo, Pose, RobotOptions, Simulator,
};
pub use world::RapierWorld;
