//! Vision-based racecar task: drive toward a ball seen through a
//! chassis-mounted camera.

use std::f64::consts::TAU;

use locomo_model::{RobotAsset, RobotModel};
use locomo_physics::{
    Camera, Image, JointHandle, LoadedRobot, ObjectId, ObjectShape, ObjectSpec, RapierWorld,
    RobotOptions, Simulator,
};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::RacecarConfig;
use crate::env::{Env, Space, Step};
use crate::error::{EnvError, Result};

/// Forward command for each discrete action.
pub const FORWARD: [f64; 9] = [-1.0, -1.0, -1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

/// Steering command for each discrete action.
pub const STEERING: [f64; 9] = [-0.6, 0.0, 0.6, -0.6, 0.0, 0.6, -0.6, 0.0, 0.6];

const WHEELS: [&str; 4] = [
    "left_rear_wheel_joint",
    "right_rear_wheel_joint",
    "left_front_wheel_joint",
    "right_front_wheel_joint",
];
const STEERING_HINGES: [&str; 2] = ["left_steering_hinge_joint", "right_steering_hinge_joint"];

/// Distances beyond this are not reported.
const MAX_DISTANCE: f64 = 10_000.0;

/// Reward when the ball is out of range.
const OUT_OF_RANGE_REWARD: f64 = -1000.0;

const BALL_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone)]
struct Episode {
    car: LoadedRobot,
    ball: ObjectId,
    wheels: Vec<JointHandle>,
    steering: Vec<JointHandle>,
}

/// Racecar that must reach a randomly placed ball, observing only a small
/// RGBA camera image.
pub struct RacecarZedEnv<S = RapierWorld> {
    sim: S,
    model: RobotModel,
    config: RacecarConfig,
    rng: StdRng,
    episode: Option<Episode>,
    counter: u64,
    observation: Image,
}

impl RacecarZedEnv {
    /// Create the task with default parameters.
    pub fn new() -> Result<Self> {
        Self::with_config(RacecarConfig::default())
    }

    /// Create the task with explicit parameters.
    pub fn with_config(config: RacecarConfig) -> Result<Self> {
        Self::with_simulator(config, RapierWorld::new())
    }
}

impl<S: Simulator> RacecarZedEnv<S> {
    /// Create the task on top of a caller-provided simulator.
    pub fn with_simulator(config: RacecarConfig, sim: S) -> Result<Self> {
        config.validate()?;
        let model = RobotModel::from_asset(RobotAsset::Racecar)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let observation = Image::filled(config.width, config.height, [0, 0, 0, 255]);
        Ok(Self {
            sim,
            model,
            config,
            rng,
            episode: None,
            counter: 0,
            observation,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &RacecarConfig {
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

    /// Object id of the ball, once reset.
    pub fn ball(&self) -> Option<ObjectId> {
        self.episode.as_ref().map(|e| e.ball)
    }

    /// Physics substeps taken since reset.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Latest camera image.
    pub fn observation(&self) -> &Image {
        &self.observation
    }

    /// Camera riding on the chassis, looking along its forward axis.
    fn camera(&self, car: &LoadedRobot) -> Result<Camera> {
        let pose = self.sim.part_pose(car.root)?;
        let rotation = pose.orientation.to_rotation_matrix();
        let forward: Vector3<f64> = rotation.matrix().column(0).into_owned();
        let up: Vector3<f64> = rotation.matrix().column(2).into_owned();
        let base = Point3::from(pose.position) + Vector3::new(0.0, 0.0, 0.3);
        Ok(Camera::look_at(base + 0.3 * forward, base + forward, up))
    }

    fn render_observation(&mut self) -> Result<()> {
        let episode = self.episode.as_ref().ok_or(EnvError::NotReset)?;
        let camera = self.camera(&episode.car)?;
        self.observation = self
            .sim
            .render(&camera, self.config.width, self.config.height);
        Ok(())
    }

    fn termination(&self) -> bool {
        self.counter > self.config.max_steps
    }

    fn reward(&self) -> Result<f64> {
        let episode = self.episode.as_ref().ok_or(EnvError::NotReset)?;
        let distance =
            self.sim
                .closest_distance(episode.car.object, episode.ball, MAX_DISTANCE)?;
        Ok(distance.map_or(OUT_OF_RANGE_REWARD, |d| -d))
    }
}

fn find_joints(car: &LoadedRobot, names: &[&str]) -> Result<Vec<JointHandle>> {
    names
        .iter()
        .map(|name| {
            car.joint(name)
                .map(|j| j.handle)
                .ok_or_else(|| EnvError::MissingJoint(name.to_string()))
        })
        .collect()
}

impl<S: Simulator> Env for RacecarZedEnv<S> {
    type Observation = Image;
    type Action = usize;

    fn reset(&mut self) -> Result<Image> {
        self.sim.reset_scene(&self.config.scene())?;

        let [near, far] = self.config.ball_distance;
        let distance = if near < far {
            self.rng.gen_range(near..far)
        } else {
            near
        };
        let angle = self.rng.gen_range(0.0..TAU);
        let ball = self.sim.load_object(&ObjectSpec {
            name: "ball".into(),
            shape: ObjectShape::Sphere {
                radius: self.config.ball_radius,
            },
            position: [distance * angle.sin(), distance * angle.cos(), 1.0],
            mass: self.config.ball_mass,
            rgba: BALL_COLOR,
        })?;

        let car = self.sim.load_robot(&self.model, &RobotOptions::default())?;
        let wheels = find_joints(&car, &WHEELS)?;
        let steering = find_joints(&car, &STEERING_HINGES)?;
        self.episode = Some(Episode {
            car,
            ball,
            wheels,
            steering,
        });
        self.counter = 0;

        for _ in 0..self.config.warmup_steps {
            self.sim.step();
        }
        self.render_observation()?;
        debug!(distance, angle, "racecar reset");
        Ok(self.observation.clone())
    }

    fn step(&mut self, action: &usize) -> Result<Step<Image>> {
        let action = *action;
        if action >= FORWARD.len() {
            return Err(EnvError::ActionOutOfRange {
                action,
                n: FORWARD.len(),
            });
        }
        let episode = self.episode.as_ref().ok_or(EnvError::NotReset)?;
        let speed = FORWARD[action] * self.config.speed_multiplier;
        let steer = STEERING[action] * self.config.steering_multiplier;
        for &wheel in &episode.wheels {
            self.sim
                .set_motor_velocity(wheel, speed, self.config.max_force)?;
        }
        for &hinge in &episode.steering {
            self.sim
                .set_motor_position(hinge, steer, self.config.max_force)?;
        }

        for _ in 0..self.config.action_repeat {
            self.sim.step();
            self.render_observation()?;
            if self.termination() {
                break;
            }
            self.counter += 1;
        }

        let reward = self.reward()?;
        Ok(Step::new(
            self.observation.clone(),
            reward,
            self.termination(),
        ))
    }

    fn action_space(&self) -> Space {
        Space::Discrete(FORWARD.len())
    }

    fn observation_space(&self) -> Space {
        Space::uniform_box(0.0, 255.0, vec![self.config.height, self.config.width, 4])
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSim;
    use approx::assert_relative_eq;
    use locomo_physics::{PartHandle, Pose};

    fn env() -> RacecarZedEnv<FakeSim> {
        let config = RacecarConfig {
            seed: Some(9),
            ..Default::default()
        };
        RacecarZedEnv::with_simulator(config, FakeSim::default()).unwrap()
    }

    #[test]
    fn reset_places_ball_and_warms_up() {
        let mut env = env();
        let image = env.reset().unwrap();
        assert_eq!((image.width, image.height), (100, 10));
        assert_eq!(env.simulator().steps, 100);
        assert_eq!(env.counter(), 0);

        let ball = env.ball().unwrap();
        let pose = env
            .simulator()
            .part_pose(PartHandle {
                object: ball,
                link: 0,
            })
            .unwrap();
        let planar = pose.position.xy().norm();
        assert!((5.0..7.0).contains(&planar));
        assert_relative_eq!(pose.position.z, 1.0);
        assert_relative_eq!(env.simulator().timestep, 0.01);
    }

    #[test]
    fn action_table() {
        let mut env = env();
        env.reset().unwrap();
        env.step(&8).unwrap();
        let sim = env.simulator();
        assert_eq!(sim.velocity_targets.len(), 4);
        for &(target, force) in sim.velocity_targets.values() {
            assert_relative_eq!(target, 20.0);
            assert_relative_eq!(force, 20.0);
        }
        assert_eq!(sim.position_targets.len(), 2);
        for &(target, _) in sim.position_targets.values() {
            assert_relative_eq!(target, 0.3);
        }

        env.step(&0).unwrap();
        for &(target, _) in env.simulator().velocity_targets.values() {
            assert_relative_eq!(target, -20.0);
        }
        for &(target, _) in env.simulator().position_targets.values() {
            assert_relative_eq!(target, -0.3);
        }
    }

    #[test]
    fn out_of_range_action_is_an_error() {
        let mut env = env();
        env.reset().unwrap();
        assert!(matches!(
            env.step(&9),
            Err(EnvError::ActionOutOfRange { action: 9, n: 9 })
        ));
    }

    #[test]
    fn reward_is_negative_distance() {
        let mut env = env();
        env.reset().unwrap();
        env.simulator_mut().distance = Some(3.5);
        let step = env.step(&4).unwrap();
        assert_relative_eq!(step.reward, -3.5);
        assert_eq!(env.simulator().steps, 110);

        env.simulator_mut().distance = None;
        let step = env.step(&4).unwrap();
        assert_relative_eq!(step.reward, -1000.0);
    }

    #[test]
    fn episode_ends_after_max_steps() {
        let mut env = env();
        env.reset().unwrap();
        for _ in 0..100 {
            assert!(!env.step(&4).unwrap().done);
        }
        assert_eq!(env.counter(), 1000);
        let step = env.step(&4).unwrap();
        assert!(step.done);
        assert_eq!(env.counter(), 1001);
        assert_eq!(env.simulator().steps, 100 + 1000 + 2);
    }

    #[test]
    fn camera_follows_chassis() {
        let mut env = env();
        env.reset().unwrap();
        let car = env.episode.as_ref().unwrap().car.clone();
        env.simulator_mut().poses.insert(
            car.root,
            Pose {
                position: Vector3::new(1.0, 2.0, 0.0),
                orientation: nalgebra::UnitQuaternion::from_euler_angles(
                    0.0,
                    0.0,
                    std::f64::consts::FRAC_PI_2,
                ),
            },
        );
        let camera = env.camera(&car).unwrap();
        assert_relative_eq!(camera.eye, Point3::new(1.0, 2.3, 0.3), epsilon = 1e-9);
        assert_relative_eq!(camera.target, Point3::new(1.0, 3.0, 0.3), epsilon = 1e-9);
        assert_relative_eq!(camera.up, Vector3::z(), epsilon = 1e-9);
    }

    #[test]
    fn spaces() {
        let env = env();
        assert_eq!(env.action_space(), Space::Discrete(9));
        assert_eq!(env.observation_space().dim(), 10 * 100 * 4);
    }

    fn rapier_env() -> RacecarZedEnv {
        RacecarZedEnv::with_config(RacecarConfig {
            seed: Some(3),
            ..Default::default()
        })
        .unwrap()
    }

    fn chassis_pose(env: &RacecarZedEnv) -> Pose {
        let root = env.episode.as_ref().unwrap().car.root;
        env.simulator().part_pose(root).unwrap()
    }

    /// Yaw change after holding `action` for one simulated second.
    fn yaw_change(action: usize) -> f64 {
        let mut env = rapier_env();
        env.reset().unwrap();
        let start = chassis_pose(&env).rpy().2;
        for _ in 0..10 {
            env.step(&action).unwrap();
        }
        chassis_pose(&env).rpy().2 - start
    }

    #[test]
    fn steering_turns_the_car() {
        let right = yaw_change(6);
        let left = yaw_change(8);
        assert!(left > 0.1, "left turn changed yaw by {left}");
        assert!(right < -0.1, "right turn changed yaw by {right}");

        let straight = yaw_change(7);
        assert!(
            straight.abs() < 0.5 * left.min(-right),
            "straight drive changed yaw by {straight}"
        );
    }

    #[test]
    fn rollout_drives_forward() {
        let mut env = rapier_env();
        let image = env.reset().unwrap();
        assert_eq!((image.width, image.height), (100, 10));
        let start = chassis_pose(&env).position;
        // Wheels rest on the floor after warmup.
        assert!(start.z > 0.0 && start.z < 0.1, "{start:?}");

        let mut last = None;
        for _ in 0..5 {
            let step = env.step(&7).unwrap();
            assert!(!step.done);
            assert!(step.reward.is_finite());
            // The ball sits 5 to 7 meters away.
            assert!(step.reward < 0.0 && step.reward > -7.0, "{}", step.reward);
            assert_eq!(step.observation.data.len(), 100 * 10 * 4);
            last = Some(step);
        }
        assert_eq!(env.counter(), 50);

        let moved = chassis_pose(&env).position - start;
        assert!(moved.x > 0.2, "car moved {moved:?}");
        assert!(moved.y.abs() < 0.5 * moved.x, "car moved {moved:?}");
        let frame = last.unwrap().observation;
        assert!(frame.data.chunks(4).any(|px| px[..3] != [0, 0, 0]));
    }
}
