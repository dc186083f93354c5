//! Embedded robot descriptions.

use serde::{Deserialize, Serialize};

/// Robots shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RobotAsset {
    /// One-legged planar hopper.
    Hopper,
    /// Two-legged planar walker.
    Walker2D,
    /// Planar half cheetah.
    HalfCheetah,
    /// Four-legged ant.
    Ant,
    /// 17-joint humanoid with symmetric joint naming.
    Humanoid,
    /// Four-wheeled car with steerable front wheels.
    Racecar,
}

impl RobotAsset {
    /// Every embedded robot.
    pub const ALL: [RobotAsset; 6] = [
        RobotAsset::Hopper,
        RobotAsset::Walker2D,
        RobotAsset::HalfCheetah,
        RobotAsset::Ant,
        RobotAsset::Humanoid,
        RobotAsset::Racecar,
    ];

    /// The asset's file name.
    pub fn file_name(self) -> &'static str {
        match self {
            RobotAsset::Hopper => "hopper.xml",
            RobotAsset::Walker2D => "walker2d.xml",
            RobotAsset::HalfCheetah => "half_cheetah.xml",
            RobotAsset::Ant => "ant.xml",
            RobotAsset::Humanoid => "humanoid_symmetric.xml",
            RobotAsset::Racecar => "racecar.xml",
        }
    }

    /// The MJCF source.
    pub fn mjcf(self) -> &'static str {
        match self {
            RobotAsset::Hopper => include_str!("../assets/hopper.xml"),
            RobotAsset::Walker2D => include_str!("../assets/walker2d.xml"),
            RobotAsset::HalfCheetah => include_str!("../assets/half_cheetah.xml"),
            RobotAsset::Ant => include_str!("../assets/ant.xml"),
            RobotAsset::Humanoid => include_str!("../assets/humanoid_symmetric.xml"),
            RobotAsset::Racecar => include_str!("../assets/racecar.xml"),
        }
    }
}
