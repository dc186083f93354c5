//! Error types for physics simulation.

use thiserror::Error;

use crate::sim::{JointHandle, ObjectId, PartHandle};

/// Errors that can occur during physics simulation.
#[derive(Error, Debug)]
pub enum PhysicsError {
    /// No scene has been created yet.
    #[error("no scene loaded; call reset_scene first")]
    NoScene,

    /// Object handle does not refer to a loaded object.
    #[error("object not found: {0:?}")]
    MissingObject(ObjectId),

    /// Part handle does not refer to a loaded part.
    #[error("part not found: {0:?}")]
    MissingPart(PartHandle),

    /// Joint handle does not refer to a loaded joint.
    #[error("joint not found: {0:?}")]
    MissingJoint(JointHandle),

    /// Failed to create collision shape.
    #[error("failed to create collision shape for {name}: {reason}")]
    CollisionShape {
        /// Body or geom name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid joint configuration.
    #[error("invalid joint configuration: {0}")]
    InvalidJoint(String),

    /// Invalid scene or object parameters.
    #[error("invalid scene configuration: {0}")]
    InvalidScene(String),
}

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
