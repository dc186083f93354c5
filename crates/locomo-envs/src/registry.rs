//! Environment lookup by name.

use std::fmt;
use std::str::FromStr;

use crate::config::{RacecarConfig, WalkerConfig};
use crate::env::Env;
use crate::error::{EnvError, Result};
use crate::racecar::RacecarZedEnv;
use crate::robots::{Ant, HalfCheetah, Hopper, Humanoid, Locomotor, Walker2D};
use crate::time_limit::TimeLimit;
use crate::walker::WalkerBaseEnv;

/// A walker task behind dynamic dispatch.
pub type DynWalkerEnv = Box<dyn Env<Observation = Vec<f32>, Action = [f32]>>;

/// A registered walker task with its episode limit.
pub type WalkerEnv = TimeLimit<DynWalkerEnv>;

/// Registered environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvId {
    /// `HopperBulletEnv`
    Hopper,
    /// `Walker2DBulletEnv`
    Walker2D,
    /// `HalfCheetahBulletEnv`
    HalfCheetah,
    /// `AntBulletEnv`
    Ant,
    /// `HumanoidBulletEnv`
    Humanoid,
    /// `RacecarZedBulletEnv`
    RacecarZed,
}

impl EnvId {
    /// Every registered environment.
    pub const ALL: [EnvId; 6] = [
        EnvId::Hopper,
        EnvId::Walker2D,
        EnvId::HalfCheetah,
        EnvId::Ant,
        EnvId::Humanoid,
        EnvId::RacecarZed,
    ];

    /// Registered name.
    pub fn name(self) -> &'static str {
        match self {
            EnvId::Hopper => "HopperBulletEnv",
            EnvId::Walker2D => "Walker2DBulletEnv",
            EnvId::HalfCheetah => "HalfCheetahBulletEnv",
            EnvId::Ant => "AntBulletEnv",
            EnvId::Humanoid => "HumanoidBulletEnv",
            EnvId::RacecarZed => "RacecarZedBulletEnv",
        }
    }

    /// Lowercase short name.
    pub fn short_name(self) -> &'static str {
        match self {
            EnvId::Hopper => "hopper",
            EnvId::Walker2D => "walker2d",
            EnvId::HalfCheetah => "half_cheetah",
            EnvId::Ant => "ant",
            EnvId::Humanoid => "humanoid",
            EnvId::RacecarZed => "racecar",
        }
    }

    /// Whether observations are camera images rather than state vectors.
    pub fn is_vision(self) -> bool {
        self == EnvId::RacecarZed
    }

    /// Default configuration of a walker task.
    pub fn default_walker_config(self) -> Option<WalkerConfig> {
        match self {
            EnvId::Hopper => Some(Hopper.default_config()),
            EnvId::Walker2D => Some(Walker2D.default_config()),
            EnvId::HalfCheetah => Some(HalfCheetah.default_config()),
            EnvId::Ant => Some(Ant.default_config()),
            EnvId::Humanoid => Some(Humanoid.default_config()),
            EnvId::RacecarZed => None,
        }
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnvId {
    type Err = EnvError;

    /// Accepts registered names with or without a `-v0` suffix, and short
    /// names.
    fn from_str(s: &str) -> Result<Self> {
        let base = s.strip_suffix("-v0").unwrap_or(s);
        EnvId::ALL
            .into_iter()
            .find(|id| id.name() == base || id.short_name() == base.to_ascii_lowercase())
            .ok_or_else(|| EnvError::UnknownEnv(s.to_string()))
    }
}

fn boxed<L: Locomotor + 'static>(robot: L, config: Option<WalkerConfig>) -> Result<DynWalkerEnv> {
    let config = config.unwrap_or_else(|| robot.default_config());
    Ok(Box::new(WalkerBaseEnv::with_config(robot, config)?))
}

/// Create a walker task by name with its default configuration.
pub fn make(name: &str) -> Result<WalkerEnv> {
    make_with_config(name, None)
}

/// Create a walker task by name, overriding its configuration.
pub fn make_with_config(name: &str, config: Option<WalkerConfig>) -> Result<WalkerEnv> {
    let env = match name.parse::<EnvId>()? {
        EnvId::Hopper => boxed(Hopper, config)?,
        EnvId::Walker2D => boxed(Walker2D, config)?,
        EnvId::HalfCheetah => boxed(HalfCheetah, config)?,
        EnvId::Ant => boxed(Ant, config)?,
        EnvId::Humanoid => boxed(Humanoid, config)?,
        EnvId::RacecarZed => {
            return Err(EnvError::Config(format!(
                "{name} has image observations; create it with make_racecar"
            )))
        }
    };
    Ok(TimeLimit::new(env))
}

/// Create the racecar task with its episode limit.
pub fn make_racecar(config: RacecarConfig) -> Result<TimeLimit<RacecarZedEnv>> {
    Ok(TimeLimit::new(RacecarZedEnv::with_config(config)?))
}
