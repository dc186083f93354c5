//! Static scene parameters.

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Gravity, integration timestep and frame skip of a stadium scene.
///
/// The scene always contains a flat static floor whose top face lies at
/// `z = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Downward gravitational acceleration in m/s².
    pub gravity: f64,
    /// Physics timestep in seconds.
    pub timestep: f64,
    /// Physics substeps per environment step.
    pub frame_skip: u32,
    /// Floor friction coefficient.
    pub floor_friction: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            timestep: 0.0165 / 4.0,
            frame_skip: 4,
            floor_friction: 0.8,
        }
    }
}

impl SceneConfig {
    /// Control timestep: the simulated time covered by one environment step.
    pub fn dt(&self) -> f64 {
        self.timestep * f64::from(self.frame_skip)
    }

    /// Check that the parameters describe a usable scene.
    pub fn validate(&self) -> Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(PhysicsError::InvalidScene(format!(
                "timestep must be positive, got {}",
                self.timestep
            )));
        }
        if self.frame_skip == 0 {
            return Err(PhysicsError::InvalidScene(
                "frame_skip must be at least 1".into(),
            ));
        }
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidScene("gravity must be finite".into()));
        }
        if !(self.floor_friction.is_finite() && self.floor_friction >= 0.0) {
            return Err(PhysicsError::InvalidScene(
                "floor_friction must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
