//! The five walker robots and what sets them apart.

use locomo_model::RobotAsset;
use locomo_physics::Simulator;
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::WalkerConfig;
use crate::error::{EnvError, Result};
use crate::walker::{WalkerJoint, DEFAULT_POWER_COEF};

/// Per-robot behavior of a walker task.
///
/// Dimensions, feet and the alive bonus are required. Reset noise and
/// action mapping have defaults that every robot but the humanoid uses.
pub trait Locomotor {
    /// Short task name.
    fn name(&self) -> &'static str;

    /// Embedded robot description.
    fn asset(&self) -> RobotAsset;

    /// Number of actuated joints.
    fn action_dim(&self) -> usize;

    /// Length of the observation vector.
    fn observation_dim(&self) -> usize;

    /// Overall torque scale.
    fn power(&self) -> f64;

    /// Parts whose floor contacts are reported in the observation.
    fn foot_names(&self) -> &'static [&'static str];

    /// Reward for staying up. Negative ends the episode.
    fn alive_bonus(&self, z: f64, pitch: f64, feet_contact: &[f64]) -> f64;

    /// Per-joint torque coefficient.
    fn power_coef(&self, _joint: &str) -> f64 {
        DEFAULT_POWER_COEF
    }

    /// Whether the robot's own links collide with each other.
    fn self_collision(&self) -> bool {
        false
    }

    /// Fixed reference height. `None` takes the height at reset.
    fn initial_z(&self) -> Option<f64> {
        None
    }

    /// Configuration the registry uses for this robot.
    fn default_config(&self) -> WalkerConfig {
        WalkerConfig::default()
    }

    /// Perturb the joints at the start of an episode.
    fn robot_specific_reset(
        &self,
        sim: &mut dyn Simulator,
        joints: &[WalkerJoint],
        rng: &mut StdRng,
        noise: f64,
    ) -> Result<()> {
        for joint in joints {
            let position = if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            sim.reset_joint_state(joint.handle, position, 0.0)?;
        }
        Ok(())
    }

    /// Turn a validated action into joint torques.
    fn apply_action(
        &self,
        sim: &mut dyn Simulator,
        joints: &[WalkerJoint],
        action: &[f64],
    ) -> Result<()> {
        for (joint, a) in joints.iter().zip(action) {
            let torque = self.power() * joint.power_coef * a.clamp(-1.0, 1.0);
            sim.set_motor_torque(joint.handle, torque)?;
        }
        Ok(())
    }
}

fn upright(z: f64, pitch: f64) -> f64 {
    if z > 0.8 && pitch.abs() < 1.0 {
        1.0
    } else {
        -1.0
    }
}

/// One-legged planar hopper.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hopper;

impl Locomotor for Hopper {
    fn name(&self) -> &'static str {
        "hopper"
    }

    fn asset(&self) -> RobotAsset {
        RobotAsset::Hopper
    }

    fn action_dim(&self) -> usize {
        3
    }

    fn observation_dim(&self) -> usize {
        15
    }

    fn power(&self) -> f64 {
        0.75
    }

    fn foot_names(&self) -> &'static [&'static str] {
        &["foot"]
    }

    fn alive_bonus(&self, z: f64, pitch: f64, _feet_contact: &[f64]) -> f64 {
        upright(z, pitch)
    }
}

/// Two-legged planar walker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Walker2D;

impl Locomotor for Walker2D {
    fn name(&self) -> &'static str {
        "walker2d"
    }

    fn asset(&self) -> RobotAsset {
        RobotAsset::Walker2D
    }

    fn action_dim(&self) -> usize {
        6
    }

    fn observation_dim(&self) -> usize {
        22
    }

    fn power(&self) -> f64 {
        0.40
    }

    fn foot_names(&self) -> &'static [&'static str] {
        &["foot", "foot_left"]
    }

    fn alive_bonus(&self, z: f64, pitch: f64, _feet_contact: &[f64]) -> f64 {
        upright(z, pitch)
    }

    fn power_coef(&self, joint: &str) -> f64 {
        match joint {
            "foot_joint" | "foot_left_joint" => 30.0,
            _ => DEFAULT_POWER_COEF,
        }
    }
}

/// Planar half cheetah.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfCheetah;

impl Locomotor for HalfCheetah {
    fn name(&self) -> &'static str {
        "half_cheetah"
    }

    fn asset(&self) -> RobotAsset {
        RobotAsset::HalfCheetah
    }

    fn action_dim(&self) -> usize {
        6
    }

    fn observation_dim(&self) -> usize {
        26
    }

    fn power(&self) -> f64 {
        0.90
    }

    fn foot_names(&self) -> &'static [&'static str] {
        &["ffoot", "fshin", "fthigh", "bfoot", "bshin", "bthigh"]
    }

    /// Only the feet may touch the ground; shins and thighs may not.
    fn alive_bonus(&self, _z: f64, pitch: f64, feet_contact: &[f64]) -> f64 {
        let grounded = [1, 2, 4, 5]
            .iter()
            .any(|&i| feet_contact.get(i).copied().unwrap_or(0.0) != 0.0);
        if pitch.abs() < 1.0 && !grounded {
            1.0
        } else {
            -1.0
        }
    }

    fn power_coef(&self, joint: &str) -> f64 {
        match joint {
            "bthigh" => 120.0,
            "bshin" => 90.0,
            "bfoot" => 60.0,
            "fthigh" => 140.0,
            "fshin" => 60.0,
            "ffoot" => 30.0,
            _ => DEFAULT_POWER_COEF,
        }
    }
}

/// Four-legged ant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ant;

impl Locomotor for Ant {
    fn name(&self) -> &'static str {
        "ant"
    }

    fn asset(&self) -> RobotAsset {
        RobotAsset::Ant
    }

    fn action_dim(&self) -> usize {
        8
    }

    fn observation_dim(&self) -> usize {
        28
    }

    fn power(&self) -> f64 {
        10.5
    }

    fn foot_names(&self) -> &'static [&'static str] {
        &[
            "front_left_foot",
            "front_right_foot",
            "left_back_foot",
            "right_back_foot",
        ]
    }

    fn alive_bonus(&self, z: f64, _pitch: f64, _feet_contact: &[f64]) -> f64 {
        if z > 0.26 {
            1.0
        } else {
            -1.0
        }
    }
}

/// Humanoid motors and their individual power, in action order.
pub const HUMANOID_MOTORS: [(&str, f64); 17] = [
    ("abdomen_z", 100.0),
    ("abdomen_y", 100.0),
    ("abdomen_x", 100.0),
    ("right_hip_x", 100.0),
    ("right_hip_z", 100.0),
    ("right_hip_y", 300.0),
    ("right_knee", 200.0),
    ("left_hip_x", 100.0),
    ("left_hip_z", 100.0),
    ("left_hip_y", 300.0),
    ("left_knee", 200.0),
    ("right_shoulder1", 75.0),
    ("right_shoulder2", 75.0),
    ("right_elbow", 75.0),
    ("left_shoulder1", 75.0),
    ("left_shoulder2", 75.0),
    ("left_elbow", 75.0),
];

/// Motor costs are scaled up to account for the humanoid's many joints.
const HUMANOID_COST_SCALE: f64 = 4.25;

/// 17-joint humanoid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Humanoid;

impl Locomotor for Humanoid {
    fn name(&self) -> &'static str {
        "humanoid"
    }

    fn asset(&self) -> RobotAsset {
        RobotAsset::Humanoid
    }

    fn action_dim(&self) -> usize {
        HUMANOID_MOTORS.len()
    }

    fn observation_dim(&self) -> usize {
        44
    }

    fn power(&self) -> f64 {
        0.41
    }

    fn foot_names(&self) -> &'static [&'static str] {
        &["right_foot", "left_foot"]
    }

    fn alive_bonus(&self, z: f64, _pitch: f64, _feet_contact: &[f64]) -> f64 {
        if z > 0.78 {
            2.0
        } else {
            -1.0
        }
    }

    fn self_collision(&self) -> bool {
        true
    }

    fn initial_z(&self) -> Option<f64> {
        Some(0.8)
    }

    fn default_config(&self) -> WalkerConfig {
        WalkerConfig::default().with_motor_cost_scale(HUMANOID_COST_SCALE)
    }

    /// Drives each motor by name with its own power. Actions are not clipped.
    fn apply_action(
        &self,
        sim: &mut dyn Simulator,
        joints: &[WalkerJoint],
        action: &[f64],
    ) -> Result<()> {
        for ((name, motor_power), a) in HUMANOID_MOTORS.iter().zip(action) {
            let joint = joints
                .iter()
                .find(|j| j.name == *name)
                .ok_or_else(|| EnvError::MissingJoint(name.to_string()))?;
            sim.set_motor_torque(joint.handle, self.power() * motor_power * a)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSim;
    use approx::assert_relative_eq;
    use locomo_model::RobotModel;
    use locomo_physics::{RobotOptions, SceneConfig};

    fn load(robot: &dyn Locomotor, sim: &mut FakeSim) -> Vec<WalkerJoint> {
        sim.reset_scene(&SceneConfig::default()).unwrap();
        let model = RobotModel::from_asset(robot.asset()).unwrap();
        let loaded = sim.load_robot(&model, &RobotOptions::default()).unwrap();
        loaded
            .joints
            .iter()
            .map(|j| WalkerJoint {
                name: j.name.clone(),
                handle: j.handle,
                limits: j.limits,
                power_coef: robot.power_coef(&j.name),
            })
            .collect()
    }

    #[test]
    fn assets_match_declared_dims() {
        let robots: [&dyn Locomotor; 5] = [&Hopper, &Walker2D, &HalfCheetah, &Ant, &Humanoid];
        for robot in robots {
            let model = RobotModel::from_asset(robot.asset()).unwrap();
            let joints = model.ordered_joints().len();
            assert_eq!(joints, robot.action_dim(), "{}", robot.name());
            assert_eq!(
                robot.observation_dim(),
                8 + 2 * joints + robot.foot_names().len(),
                "{}",
                robot.name()
            );
            for foot in robot.foot_names() {
                assert!(model.body(foot).is_some(), "{} has no {foot}", robot.name());
            }
        }
    }

    #[test]
    fn upright_bonus() {
        assert_eq!(Hopper.alive_bonus(1.0, 0.2, &[0.0]), 1.0);
        assert_eq!(Hopper.alive_bonus(0.7, 0.2, &[0.0]), -1.0);
        assert_eq!(Walker2D.alive_bonus(1.0, 1.2, &[0.0, 0.0]), -1.0);
        assert_eq!(Ant.alive_bonus(0.3, 3.0, &[0.0; 4]), 1.0);
        assert_eq!(Ant.alive_bonus(0.2, 0.0, &[0.0; 4]), -1.0);
        assert_eq!(Humanoid.alive_bonus(0.9, 0.0, &[0.0; 2]), 2.0);
        assert_eq!(Humanoid.alive_bonus(0.5, 0.0, &[0.0; 2]), -1.0);
    }

    #[test]
    fn cheetah_dies_on_shins_and_thighs() {
        let mut feet = [0.0; 6];
        feet[0] = 1.0;
        feet[3] = 1.0;
        assert_eq!(HalfCheetah.alive_bonus(0.0, 0.0, &feet), 1.0);
        for i in [1, 2, 4, 5] {
            let mut feet = [0.0; 6];
            feet[i] = 1.0;
            assert_eq!(HalfCheetah.alive_bonus(0.0, 0.0, &feet), -1.0);
        }
        assert_eq!(HalfCheetah.alive_bonus(0.0, 1.5, &[0.0; 6]), -1.0);
    }

    #[test]
    fn power_coefficients() {
        assert_eq!(Walker2D.power_coef("foot_left_joint"), 30.0);
        assert_eq!(Walker2D.power_coef("thigh_joint"), 100.0);
        assert_eq!(HalfCheetah.power_coef("fthigh"), 140.0);
        assert_eq!(HalfCheetah.power_coef("ffoot"), 30.0);
        assert_eq!(Ant.power_coef("hip_1"), 100.0);
    }

    #[test]
    fn humanoid_uses_motor_table_without_clipping() {
        let mut sim = FakeSim::default();
        let joints = load(&Humanoid, &mut sim);
        let mut action = vec![0.0; 17];
        action[5] = 2.0;
        action[16] = -0.5;
        Humanoid.apply_action(&mut sim, &joints, &action).unwrap();

        let hip = joints.iter().find(|j| j.name == "right_hip_y").unwrap();
        let elbow = joints.iter().find(|j| j.name == "left_elbow").unwrap();
        assert_relative_eq!(sim.torques[&hip.handle], 0.41 * 300.0 * 2.0);
        assert_relative_eq!(sim.torques[&elbow.handle], -0.41 * 75.0 * 0.5);
    }

    #[test]
    fn humanoid_defaults() {
        assert!(Humanoid.self_collision());
        assert_eq!(Humanoid.initial_z(), Some(0.8));
        assert_relative_eq!(Humanoid.default_config().electricity_cost, -8.5);
        assert!(!Ant.self_collision());
        assert_eq!(Ant.initial_z(), None);
    }

    #[test]
    fn default_action_scales_by_power_coef() {
        let mut sim = FakeSim::default();
        let joints = load(&Walker2D, &mut sim);
        Walker2D
            .apply_action(&mut sim, &joints, &[0.0, 0.0, -3.0, 0.0, 0.0, 0.5])
            .unwrap();
        assert_relative_eq!(sim.torques[&joints[2].handle], -0.4 * 30.0);
        assert_relative_eq!(sim.torques[&joints[5].handle], 0.4 * 30.0 * 0.5);
    }

    #[test]
    fn reset_noise_stays_in_range() {
        use rand::SeedableRng;
        let mut sim = FakeSim::default();
        let joints = load(&Ant, &mut sim);
        let mut rng = StdRng::seed_from_u64(5);
        Ant.robot_specific_reset(&mut sim, &joints, &mut rng, 0.1)
            .unwrap();
        for joint in &joints {
            let state = sim.joint_state(joint.handle).unwrap();
            assert!(state.position.abs() <= 0.1);
            assert_eq!(state.velocity, 0.0);
        }

        Ant.robot_specific_reset(&mut sim, &joints, &mut rng, 0.0)
            .unwrap();
        assert!(joints
            .iter()
            .all(|j| sim.joint_state(j.handle).unwrap().position == 0.0));
    }
}
