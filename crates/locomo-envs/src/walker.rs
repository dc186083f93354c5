//! Shared locomotion environment for the walker robots.

use locomo_model::RobotModel;
use locomo_physics::{
    Camera, Image, JointHandle, JointState, LoadedRobot, ObjectId, PartHandle, RapierWorld,
    RobotOptions, Simulator,
};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::WalkerConfig;
use crate::env::{Env, Space, Step};
use crate::error::{EnvError, Result};
use crate::robots::Locomotor;

/// Observation entries are clipped to `[-OBS_CLIP, OBS_CLIP]`.
pub const OBS_CLIP: f64 = 5.0;

/// Relative joint positions beyond this count as "at limit".
const AT_LIMIT: f64 = 0.99;

/// Power coefficient of a joint unless the robot overrides it.
pub const DEFAULT_POWER_COEF: f64 = 100.0;

/// An actuated joint as the walker tasks see it.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkerJoint {
    /// Joint name.
    pub name: String,
    /// Simulator handle.
    pub handle: JointHandle,
    /// Position limits, if any.
    pub limits: Option<(f64, f64)>,
    /// Torque per unit action, before the robot's overall power.
    pub power_coef: f64,
}

impl WalkerJoint {
    /// Position scaled to `[-1, 1]` between the limits, and velocity
    /// scaled by 0.1. Unlimited joints report their raw position.
    pub fn relative_state(&self, state: JointState) -> (f64, f64) {
        let position = match self.limits {
            Some((lower, upper)) if upper > lower => {
                let mid = 0.5 * (lower + upper);
                2.0 * (state.position - mid) / (upper - lower)
            }
            _ => state.position,
        };
        (position, 0.1 * state.velocity)
    }
}

/// The five reward terms of the last step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardTerms {
    /// Bonus for staying upright; negative once the robot has fallen.
    pub alive: f64,
    /// Change in potential toward the walk target.
    pub progress: f64,
    /// Motor usage cost.
    pub electricity: f64,
    /// Cost for joints pressed against their limits.
    pub joints_at_limit: f64,
    /// Cost for feet touching something other than the floor.
    pub feet_collision: f64,
}

impl RewardTerms {
    /// Sum of all terms.
    pub fn total(&self) -> f64 {
        self.alive + self.progress + self.electricity + self.joints_at_limit + self.feet_collision
    }
}

/// Per-episode bookkeeping derived from the simulator state.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeState {
    /// Potential after the last state computation.
    pub potential: f64,
    /// Body height at the first state computation of the episode.
    pub initial_z: Option<f64>,
    /// 1.0 for each foot touching the floor at the last step.
    pub feet_contact: Vec<f64>,
    /// Scaled joint velocities.
    pub joint_speeds: Vec<f64>,
    /// Joints with relative position beyond 0.99.
    pub joints_at_limit: usize,
    /// Mean part x, mean part y, root z.
    pub body_xyz: [f64; 3],
    /// Root roll, pitch, yaw.
    pub body_rpy: [f64; 3],
    /// Planar distance to the walk target.
    pub walk_target_dist: f64,
    /// World heading of the walk target from the body.
    pub walk_target_theta: f64,
    /// Steps taken this episode.
    pub steps: u64,
}

impl EpisodeState {
    fn new(feet: usize, initial_z: Option<f64>) -> Self {
        Self {
            potential: 0.0,
            initial_z,
            feet_contact: vec![0.0; feet],
            joint_speeds: Vec::new(),
            joints_at_limit: 0,
            body_xyz: [0.0; 3],
            body_rpy: [0.0; 3],
            walk_target_dist: 0.0,
            walk_target_theta: 0.0,
            steps: 0,
        }
    }
}

/// Handles valid for the current episode.
#[derive(Debug, Clone)]
struct Episode {
    floor: ObjectId,
    robot: LoadedRobot,
    joints: Vec<WalkerJoint>,
    feet: Vec<PartHandle>,
}

/// Walk-toward-a-target task shared by hopper, walker2d, half cheetah, ant
/// and humanoid.
///
/// The simulator is generic so tasks can run against any [`Simulator`];
/// [`RapierWorld`] is the default.
pub struct WalkerBaseEnv<L, S = RapierWorld> {
    robot: L,
    sim: S,
    model: RobotModel,
    config: WalkerConfig,
    rng: StdRng,
    episode: Option<Episode>,
    state: EpisodeState,
    rewards: RewardTerms,
    camera_x: f64,
}

impl<L: Locomotor> WalkerBaseEnv<L> {
    /// Create the task with the robot's default configuration.
    pub fn new(robot: L) -> Result<Self> {
        let config = robot.default_config();
        Self::with_config(robot, config)
    }

    /// Create the task with an explicit configuration.
    pub fn with_config(robot: L, config: WalkerConfig) -> Result<Self> {
        Self::with_simulator(robot, config, RapierWorld::new())
    }
}

impl<L: Locomotor, S: Simulator> WalkerBaseEnv<L, S> {
    /// Create the task on top of a caller-provided simulator.
    pub fn with_simulator(robot: L, config: WalkerConfig, sim: S) -> Result<Self> {
        config.validate()?;
        let model = RobotModel::from_asset(robot.asset())?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = EpisodeState::new(robot.foot_names().len(), robot.initial_z());
        Ok(Self {
            robot,
            sim,
            model,
            config,
            rng,
            episode: None,
            state,
            rewards: RewardTerms::default(),
            camera_x: 0.0,
        })
    }

    /// The robot variant.
    pub fn robot(&self) -> &L {
        &self.robot
    }

    /// The active configuration.
    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// The underlying simulator.
    pub fn simulator(&self) -> &S {
        &self.sim
    }

    /// Mutable access to the underlying simulator.
    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    /// The robot as loaded for the current episode.
    pub fn loaded_robot(&self) -> Option<&LoadedRobot> {
        self.episode.as_ref().map(|e| &e.robot)
    }

    /// Actuated joints of the current episode.
    pub fn joints(&self) -> &[WalkerJoint] {
        self.episode.as_ref().map_or(&[], |e| &e.joints)
    }

    /// Episode bookkeeping as of the last reset or step.
    pub fn episode_state(&self) -> &EpisodeState {
        &self.state
    }

    /// Reward terms of the last step.
    pub fn last_rewards(&self) -> RewardTerms {
        self.rewards
    }

    /// Render an RGBA frame from a camera chasing the robot.
    ///
    /// The camera's x coordinate trails the body with exponential
    /// smoothing, so consecutive frames pan smoothly.
    pub fn render(&mut self, width: usize, height: usize) -> Image {
        let [x, y, _] = self.state.body_xyz;
        self.camera_x = 0.98 * self.camera_x + (1.0 - 0.98) * x;
        let camera = Camera::look_at(
            Point3::new(self.camera_x, y - 2.0, 1.4),
            Point3::new(x, y, 1.0),
            Vector3::z(),
        );
        self.sim.render(&camera, width, height)
    }

    /// Potential of the current state: negative target distance per
    /// control timestep.
    fn calc_potential(&self) -> f64 {
        -self.state.walk_target_dist / self.config.scene.dt()
    }

    /// Recompute the episode state and return the unclipped observation.
    fn calc_state(&mut self) -> Result<Vec<f64>> {
        let episode = self.episode.as_ref().ok_or(EnvError::NotReset)?;

        let mut j = Vec::with_capacity(episode.joints.len() * 2);
        for joint in &episode.joints {
            let (position, speed) = joint.relative_state(self.sim.joint_state(joint.handle)?);
            j.push(position);
            j.push(speed);
        }
        self.state.joint_speeds = j.iter().skip(1).step_by(2).copied().collect();
        self.state.joints_at_limit = j.iter().step_by(2).filter(|p| p.abs() > AT_LIMIT).count();

        let body = self.sim.part_pose(episode.robot.root)?;
        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        for part in &episode.robot.parts {
            let pose = self.sim.part_pose(part.handle)?;
            sum_x += pose.position.x;
            sum_y += pose.position.y;
        }
        let n = episode.robot.parts.len().max(1) as f64;
        let (x, y, z) = (sum_x / n, sum_y / n, body.position.z);
        let (roll, pitch, yaw) = body.rpy();
        self.state.body_xyz = [x, y, z];
        self.state.body_rpy = [roll, pitch, yaw];
        let initial_z = *self.state.initial_z.get_or_insert(z);

        let [target_x, target_y] = self.config.walk_target;
        self.state.walk_target_theta = (target_y - y).atan2(target_x - x);
        self.state.walk_target_dist = (target_y - y).hypot(target_x - x);
        let angle_to_target = self.state.walk_target_theta - yaw;

        // Root velocity in the yaw frame of the body.
        let v = self.sim.part_velocity(episode.robot.root)?;
        let (sin, cos) = (-yaw).sin_cos();
        let vx = cos * v.x - sin * v.y;
        let vy = sin * v.x + cos * v.y;

        let mut state = vec![
            z - initial_z,
            angle_to_target.sin(),
            angle_to_target.cos(),
            0.3 * vx,
            0.3 * vy,
            0.3 * v.z,
            roll,
            pitch,
        ];
        state.extend(j);
        state.extend(self.state.feet_contact.iter().copied());
        Ok(state)
    }

    fn check_action(&self, action: &[f32]) -> Result<()> {
        let expected = self.robot.action_dim();
        if action.len() != expected {
            return Err(EnvError::ActionDim {
                expected,
                actual: action.len(),
            });
        }
        if let Some(index) = action.iter().position(|a| !a.is_finite()) {
            return Err(EnvError::NonFiniteAction { index });
        }
        Ok(())
    }
}

fn clip_observation(state: &[f64]) -> Vec<f32> {
    state
        .iter()
        .map(|v| v.clamp(-OBS_CLIP, OBS_CLIP) as f32)
        .collect()
}

impl<L: Locomotor, S: Simulator> Env for WalkerBaseEnv<L, S> {
    type Observation = Vec<f32>;
    type Action = [f32];

    fn reset(&mut self) -> Result<Vec<f32>> {
        let floor = self.sim.reset_scene(&self.config.scene)?;
        let options = RobotOptions {
            self_collision: self.robot.self_collision(),
            ..Default::default()
        };
        let robot = self.sim.load_robot(&self.model, &options)?;
        if robot.joints.len() != self.robot.action_dim() {
            return Err(EnvError::JointCount {
                robot: self.robot.name().to_string(),
                expected: self.robot.action_dim(),
                actual: robot.joints.len(),
            });
        }

        let joints: Vec<WalkerJoint> = robot
            .joints
            .iter()
            .map(|j| WalkerJoint {
                name: j.name.clone(),
                handle: j.handle,
                limits: j.limits,
                power_coef: self.robot.power_coef(&j.name),
            })
            .collect();
        let feet = self
            .robot
            .foot_names()
            .iter()
            .map(|name| robot.part(name).ok_or_else(|| EnvError::MissingPart(name.to_string())))
            .collect::<Result<Vec<_>>>()?;

        self.robot.robot_specific_reset(
            &mut self.sim,
            &joints,
            &mut self.rng,
            self.config.reset_noise,
        )?;

        self.episode = Some(Episode {
            floor,
            robot,
            joints,
            feet,
        });
        self.state = EpisodeState::new(self.robot.foot_names().len(), self.robot.initial_z());
        self.rewards = RewardTerms::default();

        let state = self.calc_state()?;
        self.state.potential = self.calc_potential();
        debug!(
            robot = self.robot.name(),
            initial_z = ?self.state.initial_z,
            potential = self.state.potential,
            "episode reset"
        );
        Ok(clip_observation(&state))
    }

    fn step(&mut self, action: &[f32]) -> Result<Step<Vec<f32>>> {
        self.check_action(action)?;
        let a: Vec<f64> = action.iter().map(|&v| f64::from(v)).collect();
        {
            let episode = self.episode.as_ref().ok_or(EnvError::NotReset)?;
            self.robot.apply_action(&mut self.sim, &episode.joints, &a)?;
        }
        for _ in 0..self.config.scene.frame_skip {
            self.sim.step();
        }

        let state = self.calc_state()?;
        let initial_z = self.state.initial_z.unwrap_or(0.0);
        let observation = clip_observation(&state);

        let alive = self.robot.alive_bonus(
            f64::from(observation[0]) + initial_z,
            self.state.body_rpy[1],
            &self.state.feet_contact,
        );
        let mut done = alive < 0.0;
        if state.iter().any(|v| !v.is_finite()) {
            warn!(robot = self.robot.name(), ?state, "non-finite state");
            done = true;
        }

        let potential_old = self.state.potential;
        self.state.potential = self.calc_potential();
        let progress = self.state.potential - potential_old;

        let episode = self.episode.as_ref().ok_or(EnvError::NotReset)?;
        let mut feet_collision = 0.0;
        for (i, foot) in episode.feet.iter().enumerate() {
            let contacts = self.sim.contacts(*foot)?;
            let on_floor = contacts.iter().any(|c| c.object == episode.floor);
            self.state.feet_contact[i] = if on_floor { 1.0 } else { 0.0 };
            if contacts.iter().any(|c| c.object != episode.floor) {
                feet_collision += self.config.foot_collision_cost;
            }
        }

        let n = a.len().max(1) as f64;
        let work = a
            .iter()
            .zip(&self.state.joint_speeds)
            .map(|(a, s)| (a * s).abs())
            .sum::<f64>()
            / n;
        let stall = a.iter().map(|a| a * a).sum::<f64>() / n;
        let electricity = self.config.electricity_cost * work + self.config.stall_torque_cost * stall;
        let joints_at_limit = self.config.joints_at_limit_cost * self.state.joints_at_limit as f64;

        self.rewards = RewardTerms {
            alive,
            progress,
            electricity,
            joints_at_limit,
            feet_collision,
        };
        self.state.steps += 1;

        Ok(Step::new(observation, self.rewards.total(), done))
    }

    fn action_space(&self) -> Space {
        Space::uniform_box(-1.0, 1.0, vec![self.robot.action_dim()])
    }

    fn observation_space(&self) -> Space {
        Space::uniform_box(
            f32::NEG_INFINITY,
            f32::INFINITY,
            vec![self.robot.observation_dim()],
        )
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}
