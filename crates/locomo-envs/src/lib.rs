#![warn(missing_docs)]

//! Reinforcement-learning locomotion tasks on top of [`locomo_physics`].
//!
//! Five walker tasks share [`WalkerBaseEnv`]: a robot is rewarded for
//! progress toward a distant target, for staying upright, and penalized
//! for motor effort, joints at their limits and feet hitting anything but
//! the floor. The robots differ only in what [`Locomotor`] describes.
//! [`RacecarZedEnv`] is a vision task driving a car toward a ball.
//!
//! # Example
//!
//! ```no_run
//! use locomo_envs::{make, Env};
//!
//! let mut env = make("HopperBulletEnv").unwrap();
//! let mut obs = env.reset().unwrap();
//! loop {
//!     let step = env.step(&[0.0, 0.0, 0.0]).unwrap();
//!     obs = step.observation;
//!     if step.done {
//!         break;
//!     }
//! }
//! # let _ = obs;
//! ```

mod config;
mod env;
mod error;
mod racecar;
mod registry;
mod robots;
mod time_limit;
mod walker;

#[cfg(test)]
mod testing;

pub use config::{RacecarConfig, WalkerConfig};
pub use env::{Env, Space, Step};
pub use error::{EnvError, Result};
pub use racecar::{RacecarZedEnv, FORWARD, STEERING};
pub use registry::{make, make_racecar, make_with_config, DynWalkerEnv, EnvId, WalkerEnv};
pub use robots::{Ant, HalfCheetah, Hopper, Humanoid, Locomotor, Walker2D, HUMANOID_MOTORS};
pub use time_limit::{TimeLimit, DEFAULT_MAX_EPISODE_STEPS, TRUNCATED};
pub use walker::{
    EpisodeState, RewardTerms, WalkerBaseEnv, WalkerJoint, DEFAULT_POWER_COEF, OBS_CLIP,
};

/// Hopper walking task.
pub type HopperBulletEnv = WalkerBaseEnv<Hopper>;
/// Two-legged walker task.
pub type Walker2DBulletEnv = WalkerBaseEnv<Walker2D>;
/// Half cheetah running task.
pub type HalfCheetahBulletEnv = WalkerBaseEnv<HalfCheetah>;
/// Ant walking task.
pub type AntBulletEnv = WalkerBaseEnv<Ant>;
/// Humanoid walking task.
pub type HumanoidBulletEnv = WalkerBaseEnv<Humanoid>;
/// Racecar vision task.
pub type RacecarZedBulletEnv = RacecarZedEnv;
