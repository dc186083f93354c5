//! Error types for the environments.

use locomo_model::MjcfError;
use locomo_physics::PhysicsError;
use thiserror::Error;

/// Errors that can occur while building or driving an environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The robot description could not be read.
    #[error(transparent)]
    Model(#[from] MjcfError),

    /// The physics backend rejected a request.
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    /// `step` was called before `reset`.
    #[error("environment must be reset before stepping")]
    NotReset,

    /// Action has the wrong number of components.
    #[error("action has {actual} components, expected {expected}")]
    ActionDim {
        /// Declared action dimension.
        expected: usize,
        /// Length of the supplied action.
        actual: usize,
    },

    /// Action contains NaN or infinity.
    #[error("action component {index} is not finite")]
    NonFiniteAction {
        /// Index of the offending component.
        index: usize,
    },

    /// Discrete action outside the action space.
    #[error("discrete action {action} out of range 0..{n}")]
    ActionOutOfRange {
        /// Supplied action.
        action: usize,
        /// Number of actions.
        n: usize,
    },

    /// A part the task needs is missing from the robot.
    #[error("robot has no part named {0}")]
    MissingPart(String),

    /// A joint the task needs is missing from the robot.
    #[error("robot has no joint named {0}")]
    MissingJoint(String),

    /// The loaded robot does not match the task's declared dimensions.
    #[error("robot {robot} has {actual} actuated joints, task expects {expected}")]
    JointCount {
        /// Robot name.
        robot: String,
        /// Declared action dimension.
        expected: usize,
        /// Joints found on the robot.
        actual: usize,
    },

    /// No environment is registered under this name.
    #[error("unknown environment: {0}")]
    UnknownEnv(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

/// Result type for environment operations.
pub type Result<T> = std::result::Result<T, EnvError>;
