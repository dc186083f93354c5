//! Joint conversion from robot descriptions to Rapier.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rapier3d::dynamics::{
    GenericJoint, GenericJointBuilder, JointAxesMask, JointAxis, MotorModel,
};

use locomo_model::{JointDef, JointKind};

use crate::error::PhysicsError;

/// Stiffness of force-based position motors.
///
/// High enough that the motor behaves as a stiff servo bounded only by its
/// force limit, the way position control works in constraint-based engines.
pub const DEFAULT_MOTOR_STIFFNESS: f32 = 1.0e5;
/// Default motor damping, also used as the velocity-tracking gain.
pub const DEFAULT_MOTOR_DAMPING: f32 = 100.0;

/// Kind of an actuated joint as simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    /// Rotation about the joint frame x axis.
    Revolute,
    /// Translation along the joint frame x axis.
    Prismatic,
}

impl Actuation {
    /// The free Rapier axis of this joint.
    pub fn axis(self) -> JointAxis {
        match self {
            Actuation::Revolute => JointAxis::AngX,
            Actuation::Prismatic => JointAxis::LinX,
        }
    }
}

/// Local frame of a joint whose x axis is `axis` and origin is `anchor`.
pub fn joint_frame(anchor: Vector3<f32>, axis: Vector3<f32>) -> Isometry3<f32> {
    let rotation = UnitQuaternion::rotation_between(&Vector3::x(), &axis).unwrap_or_else(|| {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::PI)
    });
    Isometry3::from_parts(Translation3::from(anchor), rotation)
}

/// Create a Rapier joint from a joint definition.
///
/// # Arguments
///
/// * `joint` - The joint definition
/// * `frame1` - Joint frame in the parent body
/// * `frame2` - Joint frame in the child body
///
/// # Returns
///
/// The joint and how it is actuated. Free joints only exist on the root
/// body and cannot be converted.
pub fn joint_to_rapier(
    joint: &JointDef,
    frame1: Isometry3<f32>,
    frame2: Isometry3<f32>,
) -> Result<(GenericJoint, Actuation), PhysicsError> {
    let (mask, actuation) = match joint.kind {
        JointKind::Hinge => (JointAxesMask::LOCKED_REVOLUTE_AXES, Actuation::Revolute),
        JointKind::Slide => (JointAxesMask::LOCKED_PRISMATIC_AXES, Actuation::Prismatic),
        JointKind::Free => {
            return Err(PhysicsError::InvalidJoint(format!(
                "{} is a free joint below the root",
                joint.name
            )))
        }
    };
    let axis = actuation.axis();

    let mut builder = GenericJointBuilder::new(mask)
        .local_frame1(frame1)
        .local_frame2(frame2)
        .contacts_enabled(false);

    if let Some((lower, upper)) = joint.range {
        if !(lower <= upper) {
            return Err(PhysicsError::InvalidJoint(format!(
                "{} has range [{lower}, {upper}]",
                joint.name
            )));
        }
        builder = builder.limits(axis, [lower as f32, upper as f32]);
    }

    // Passive viscous damping: a force-based motor tracking zero velocity.
    if joint.damping > 0.0 {
        builder = builder
            .motor_model(axis, MotorModel::ForceBased)
            .motor_velocity(axis, 0.0, joint.damping as f32);
    }

    Ok((builder.build(), actuation))
}

/// Joint coordinate from the world poses of the two joint frames.
///
/// Revolute angles are wrapped to `[-pi, pi]`.
pub fn joint_position(
    actuation: Actuation,
    frame1_world: &Isometry3<f32>,
    frame2_world: &Isometry3<f32>,
) -> f64 {
    let rel = frame1_world.inv_mul(frame2_world);
    match actuation {
        Actuation::Revolute => {
            let q = rel.rotation.quaternion();
            let (i, w) = if q.w < 0.0 { (-q.i, -q.w) } else { (q.i, q.w) };
            2.0 * f64::from(i).atan2(f64::from(w))
        }
        Actuation::Prismatic => f64::from(rel.translation.vector.x),
    }
}
