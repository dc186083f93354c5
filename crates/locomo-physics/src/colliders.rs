//! Collision shape generation from robot geoms.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::geometry::SharedShape;

use locomo_model::{Geom, GeomShape, Quat, Vec3};

use crate::error::PhysicsError;
use crate::sim::ObjectShape;

/// A collision shape and its placement in the owning body's frame.
pub struct PlacedShape {
    /// The shape.
    pub shape: SharedShape,
    /// Placement relative to the body frame.
    pub position: Isometry3<f32>,
}

/// Generate the collision shape for a geom.
///
/// # Arguments
///
/// * `geom` - The geom to convert
/// * `name` - Name for error messages
///
/// # Returns
///
/// The shape and its pose in the body frame. Capsules keep their segment
/// in the shape itself and are placed at the body origin.
pub fn geom_to_shape(geom: &Geom, name: &str) -> Result<PlacedShape, PhysicsError> {
    match &geom.shape {
        GeomShape::Capsule { radius, from, to } => {
            check_radius(*radius, name)?;
            Ok(PlacedShape {
                shape: SharedShape::capsule(point(from), point(to), *radius as f32),
                position: Isometry3::identity(),
            })
        }
        GeomShape::Cylinder { radius, from, to } => create_cylinder(*radius, from, to, name),
        GeomShape::Sphere { radius, center } => {
            check_radius(*radius, name)?;
            Ok(PlacedShape {
                shape: SharedShape::ball(*radius as f32),
                position: Isometry3::from_parts(translation(center), UnitQuaternion::identity()),
            })
        }
        GeomShape::Box {
            half_extents,
            center,
            rotation,
        } => {
            let he = vector(half_extents);
            if he.iter().any(|h| !(h.is_finite() && *h > 0.0)) {
                return Err(shape_error(name, "box half extents must be positive"));
            }
            Ok(PlacedShape {
                shape: SharedShape::cuboid(he.x, he.y, he.z),
                position: Isometry3::from_parts(translation(center), quaternion(rotation)),
            })
        }
    }
}

/// Generate the collision shape for a standalone object, centered on it.
pub fn object_to_shape(shape: &ObjectShape, name: &str) -> Result<SharedShape, PhysicsError> {
    match *shape {
        ObjectShape::Sphere { radius } => {
            check_radius(radius, name)?;
            Ok(SharedShape::ball(radius as f32))
        }
        ObjectShape::Box { half_extents } => {
            if half_extents.iter().any(|h| !(h.is_finite() && *h > 0.0)) {
                return Err(shape_error(name, "box half extents must be positive"));
            }
            Ok(SharedShape::cuboid(
                half_extents[0] as f32,
                half_extents[1] as f32,
                half_extents[2] as f32,
            ))
        }
    }
}

// Rapier cylinders are aligned with local y.
fn create_cylinder(
    radius: f64,
    from: &Vec3,
    to: &Vec3,
    name: &str,
) -> Result<PlacedShape, PhysicsError> {
    check_radius(radius, name)?;
    let a = vector(from);
    let b = vector(to);
    let axis = b - a;
    let length = axis.norm();
    if length <= f32::EPSILON {
        return Err(shape_error(name, "cylinder has zero length"));
    }

    let rotation = UnitQuaternion::rotation_between(&Vector3::y(), &axis).unwrap_or_else(|| {
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::PI)
    });
    let center = (a + b) * 0.5;
    Ok(PlacedShape {
        shape: SharedShape::cylinder(length * 0.5, radius as f32),
        position: Isometry3::from_parts(Translation3::from(center), rotation),
    })
}

fn check_radius(radius: f64, name: &str) -> Result<(), PhysicsError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(shape_error(name, "radius must be positive"))
    }
}

fn shape_error(name: &str, reason: &str) -> PhysicsError {
    PhysicsError::CollisionShape {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn vector(v: &Vec3) -> Vector3<f32> {
    Vector3::new(v.x as f32, v.y as f32, v.z as f32)
}

fn point(v: &Vec3) -> Point3<f32> {
    Point3::from(vector(v))
}

fn translation(v: &Vec3) -> Translation3<f32> {
    Translation3::from(vector(v))
}

/// Convert a model quaternion to a single-precision unit quaternion.
pub fn quaternion(q: &Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
        q.w as f32, q.x as f32, q.y as f32, q.z as f32,
    ))
}
