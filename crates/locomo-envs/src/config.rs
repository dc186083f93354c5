//! Task configuration, loadable from TOML.

use locomo_physics::SceneConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EnvError, Result};

/// Reward shaping and scene parameters of a walker task.
///
/// Costs are added to the reward, so they are zero or negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Weight of `mean(|action * joint_speed|)`.
    pub electricity_cost: f64,
    /// Weight of `mean(action²)`.
    pub stall_torque_cost: f64,
    /// Added once per foot touching anything but the floor.
    pub foot_collision_cost: f64,
    /// Added once per joint near its limit.
    pub joints_at_limit_cost: f64,
    /// Point in the floor plane the robot should walk to.
    pub walk_target: [f64; 2],
    /// Half width of the uniform joint noise applied on reset.
    pub reset_noise: f64,
    /// Seed for the environment RNG. Drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Physics scene.
    pub scene: SceneConfig,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            electricity_cost: -2.0,
            stall_torque_cost: -0.1,
            foot_collision_cost: -1.0,
            joints_at_limit_cost: -0.1,
            walk_target: [1e3, 0.0],
            reset_noise: 0.1,
            seed: None,
            scene: SceneConfig::default(),
        }
    }
}

impl WalkerConfig {
    /// Scale the motor costs, as done for robots with many joints.
    pub fn with_motor_cost_scale(mut self, scale: f64) -> Self {
        self.electricity_cost *= scale;
        self.stall_torque_cost *= scale;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let costs = [
            ("electricity_cost", self.electricity_cost),
            ("stall_torque_cost", self.stall_torque_cost),
            ("foot_collision_cost", self.foot_collision_cost),
            ("joints_at_limit_cost", self.joints_at_limit_cost),
        ];
        for (name, value) in costs {
            if !(value.is_finite() && value <= 0.0) {
                return Err(EnvError::Config(format!(
                    "{name} must be a finite non-positive number, got {value}"
                )));
            }
        }
        if !self.walk_target.iter().all(|v| v.is_finite()) {
            return Err(EnvError::Config("walk_target must be finite".into()));
        }
        if !(self.reset_noise.is_finite() && self.reset_noise >= 0.0) {
            return Err(EnvError::Config(format!(
                "reset_noise must be non-negative, got {}",
                self.reset_noise
            )));
        }
        self.scene.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parameters of the racecar task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RacecarConfig {
    /// Physics timestep in seconds.
    pub timestep: f64,
    /// Downward gravity in m/s².
    pub gravity: f64,
    /// Physics substeps per environment step.
    pub action_repeat: u32,
    /// Camera image width in pixels.
    pub width: usize,
    /// Camera image height in pixels.
    pub height: usize,
    /// Substeps simulated after reset before the first observation.
    pub warmup_steps: u32,
    /// The episode ends once the substep counter exceeds this.
    pub max_steps: u64,
    /// Ball spawn distance range from the origin.
    pub ball_distance: [f64; 2],
    /// Ball radius in meters.
    pub ball_radius: f64,
    /// Ball mass in kg.
    pub ball_mass: f64,
    /// Wheel target velocity per unit of forward command.
    pub speed_multiplier: f64,
    /// Steering angle per unit of steering command.
    pub steering_multiplier: f64,
    /// Motor force limit for wheels and steering.
    pub max_force: f64,
    /// Seed for the environment RNG. Drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Default for RacecarConfig {
    fn default() -> Self {
        Self {
            timestep: 0.01,
            gravity: 10.0,
            action_repeat: 10,
            width: 100,
            height: 10,
            warmup_steps: 100,
            max_steps: 1000,
            ball_distance: [5.0, 7.0],
            ball_radius: 0.5,
            ball_mass: 1.0,
            speed_multiplier: 20.0,
            steering_multiplier: 0.5,
            max_force: 20.0,
            seed: None,
        }
    }
}

impl RacecarConfig {
    /// Scene used by the task. Action repeat is handled by the task itself.
    pub fn scene(&self) -> SceneConfig {
        SceneConfig {
            gravity: self.gravity,
            timestep: self.timestep,
            frame_skip: 1,
            ..SceneConfig::default()
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.action_repeat == 0 {
            return Err(EnvError::Config("action_repeat must be at least 1".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(EnvError::Config("image size must be non-zero".into()));
        }
        let [near, far] = self.ball_distance;
        if !(near.is_finite() && far.is_finite() && 0.0 <= near && near <= far) {
            return Err(EnvError::Config(format!(
                "ball_distance must satisfy 0 <= min <= max, got [{near}, {far}]"
            )));
        }
        if !(self.ball_radius > 0.0 && self.ball_mass >= 0.0 && self.max_force >= 0.0) {
            return Err(EnvError::Config(
                "ball_radius must be positive; ball_mass and max_force non-negative".into(),
            ));
        }
        self.scene().validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
