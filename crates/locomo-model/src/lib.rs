#![warn(missing_docs)]

//! Articulated robot descriptions for the locomo environments.
//!
//! This crate defines the intermediate representation of a robot: a tree of
//! rigid bodies carrying collision geometry and the joints that connect each
//! body to its parent. Descriptions are read from a subset of MJCF and the
//! robots used by the locomotion tasks ship as embedded assets.
//!
//! The IR is purely declarative. Turning it into simulated bodies is the job
//! of a physics backend.
//!
//! # Example
//!
//! ```
//! use locomo_model::{RobotAsset, RobotModel};
//!
//! let hopper = RobotModel::from_asset(RobotAsset::Hopper).unwrap();
//! assert_eq!(hopper.ordered_joints().len(), 3);
//! ```

mod assets;
mod error;
pub mod mjcf;

pub use assets::RobotAsset;
pub use error::{MjcfError, Result};

use serde::{Deserialize, Serialize};

/// 3D vector with f64 components (meters unless stated otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Create a new Vec3.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Components as an array.
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Unit quaternion stored as `[w, x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    /// Scalar part.
    pub w: f64,
    /// X component of the vector part.
    pub x: f64,
    /// Y component of the vector part.
    pub y: f64,
    /// Z component of the vector part.
    pub z: f64,
}

impl Quat {
    /// The identity rotation.
    pub const fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Whether this quaternion is (numerically) the identity.
    pub fn is_identity(&self) -> bool {
        (self.w.abs() - 1.0).abs() < 1e-9
            && self.x.abs() < 1e-9
            && self.y.abs() < 1e-9
            && self.z.abs() < 1e-9
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

/// Collision shape of a geom, expressed in the owning body's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeomShape {
    /// Capsule spanning a segment.
    Capsule {
        /// Radius of the capsule.
        radius: f64,
        /// Segment start.
        from: Vec3,
        /// Segment end.
        to: Vec3,
    },
    /// Cylinder spanning a segment.
    Cylinder {
        /// Radius of the cylinder.
        radius: f64,
        /// Axis start.
        from: Vec3,
        /// Axis end.
        to: Vec3,
    },
    /// Sphere.
    Sphere {
        /// Radius of the sphere.
        radius: f64,
        /// Center of the sphere.
        center: Vec3,
    },
    /// Oriented box.
    Box {
        /// Half extents along the box axes.
        half_extents: Vec3,
        /// Center of the box.
        center: Vec3,
        /// Orientation of the box.
        rotation: Quat,
    },
}

/// A collision geometry attached to a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geom {
    /// Optional geom name.
    pub name: Option<String>,
    /// Shape and placement.
    pub shape: GeomShape,
    /// Density in kg/m^3.
    pub density: f64,
    /// Sliding friction coefficient.
    pub friction: f64,
    /// Display color as `[r, g, b, a]` in 0.0..1.0.
    pub rgba: [f32; 4],
}

/// Kind of joint connecting a body to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointKind {
    /// Rotation about an axis.
    Hinge,
    /// Translation along an axis.
    Slide,
    /// Six degrees of freedom relative to the world.
    Free,
}

/// A joint definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    /// Joint name.
    pub name: String,
    /// Joint kind.
    pub kind: JointKind,
    /// Unit axis in the child body frame.
    pub axis: Vec3,
    /// Anchor point in the child body frame.
    pub pos: Vec3,
    /// Position limits (radians for hinges, meters for slides).
    pub range: Option<(f64, f64)>,
    /// Viscous damping coefficient.
    pub damping: f64,
}

/// A rigid body in the robot tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Body name (used as the part name).
    pub name: String,
    /// Position relative to the parent body.
    pub pos: Vec3,
    /// Orientation relative to the parent body.
    pub rotation: Quat,
    /// Joints connecting this body to its parent, outermost first.
    pub joints: Vec<JointDef>,
    /// Collision geometry.
    pub geoms: Vec<Geom>,
    /// Child bodies.
    pub children: Vec<Body>,
}

impl Body {
    /// Create an empty body at the parent origin.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pos: Vec3::zero(),
            rotation: Quat::identity(),
            joints: Vec::new(),
            geoms: Vec::new(),
            children: Vec::new(),
        }
    }

    fn visit<'a>(&'a self, out: &mut Vec<&'a Body>) {
        out.push(self);
        for child in &self.children {
            child.visit(out);
        }
    }
}

/// A motor actuator driving a joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actuator {
    /// Actuated joint name.
    pub joint: String,
    /// Gear ratio.
    pub gear: f64,
}

/// Degrees of freedom of the root body relative to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RootMotion {
    /// Free translation along world x, y, z.
    pub translation: [bool; 3],
    /// Free rotation about world x, y, z.
    pub rotation: [bool; 3],
}

impl RootMotion {
    /// A root with all six degrees of freedom.
    pub const FREE: Self = Self {
        translation: [true; 3],
        rotation: [true; 3],
    };

    /// A root welded to the world.
    pub const FIXED: Self = Self {
        translation: [false; 3],
        rotation: [false; 3],
    };

    /// Whether every degree of freedom is free.
    pub fn is_free(&self) -> bool {
        *self == Self::FREE
    }

    /// Whether the root cannot move at all.
    pub fn is_fixed(&self) -> bool {
        *self == Self::FIXED
    }
}

/// A complete articulated robot description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotModel {
    /// Model name.
    pub name: String,
    /// Root body of the tree.
    pub root: Body,
    /// Motor actuators in declaration order.
    pub actuators: Vec<Actuator>,
}

impl RobotModel {
    /// Parse a robot from an MJCF string.
    pub fn from_mjcf(xml: &str) -> Result<Self> {
        mjcf::parse_mjcf_str(xml)
    }

    /// Load one of the embedded robot descriptions.
    pub fn from_asset(asset: RobotAsset) -> Result<Self> {
        Self::from_mjcf(asset.mjcf())
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// All bodies in depth-first order, root first.
    pub fn bodies(&self) -> Vec<&Body> {
        let mut out = Vec::new();
        self.root.visit(&mut out);
        out
    }

    /// Find a body by name.
    pub fn body(&self, name: &str) -> Option<&Body> {
        self.bodies().into_iter().find(|b| b.name == name)
    }

    /// Actuated joints in depth-first order.
    ///
    /// Joints on the root body describe its motion relative to the world
    /// and are not included.
    pub fn ordered_joints(&self) -> Vec<&JointDef> {
        self.bodies()
            .into_iter()
            .skip(1)
            .flat_map(|b| b.joints.iter())
            .collect()
    }

    /// Degrees of freedom granted to the root body by its joints.
    pub fn root_motion(&self) -> RootMotion {
        let mut motion = RootMotion::FIXED;
        for joint in &self.root.joints {
            match joint.kind {
                JointKind::Free => return RootMotion::FREE,
                JointKind::Slide => motion.translation[dominant_axis(joint.axis)] = true,
                JointKind::Hinge => motion.rotation[dominant_axis(joint.axis)] = true,
            }
        }
        motion
    }

    /// Gear of the actuator driving `joint`, if any.
    pub fn actuator_gear(&self, joint: &str) -> Option<f64> {
        self.actuators
            .iter()
            .find(|a| a.joint == joint)
            .map(|a| a.gear)
    }
}

fn dominant_axis(axis: Vec3) -> usize {
    let a = [axis.x.abs(), axis.y.abs(), axis.z.abs()];
    if a[0] >= a[1] && a[0] >= a[2] {
        0
    } else if a[1] >= a[2] {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hinge(name: &str, axis: Vec3) -> JointDef {
        JointDef {
            name: name.to_string(),
            kind: JointKind::Hinge,
            axis,
            pos: Vec3::zero(),
            range: None,
            damping: 0.0,
        }
    }

    fn slide(name: &str, axis: Vec3) -> JointDef {
        JointDef {
            kind: JointKind::Slide,
            ..hinge(name, axis)
        }
    }

    #[test]
    fn planar_root_motion() {
        let mut root = Body::new("torso");
        root.joints = vec![
            slide("rootx", Vec3::new(1.0, 0.0, 0.0)),
            slide("rootz", Vec3::new(0.0, 0.0, 1.0)),
            hinge("rooty", Vec3::new(0.0, 1.0, 0.0)),
        ];
        let model = RobotModel {
            name: "planar".into(),
            root,
            actuators: vec![],
        };

        let motion = model.root_motion();
        assert_eq!(motion.translation, [true, false, true]);
        assert_eq!(motion.rotation, [false, true, false]);
        assert!(model.ordered_joints().is_empty());
    }

    #[test]
    fn ordered_joints_skip_root() {
        let mut leg = Body::new("leg");
        leg.joints.push(hinge("knee", Vec3::new(0.0, 1.0, 0.0)));
        let mut thigh = Body::new("thigh");
        thigh.joints.push(hinge("hip", Vec3::new(0.0, 1.0, 0.0)));
        thigh.children.push(leg);
        let mut root = Body::new("torso");
        root.joints.push(JointDef {
            kind: JointKind::Free,
            ..hinge("root", Vec3::zero())
        });
        root.children.push(thigh);

        let model = RobotModel {
            name: "leg".into(),
            root,
            actuators: vec![],
        };
        let names: Vec<_> = model
            .ordered_joints()
            .iter()
            .map(|j| j.name.as_str())
            .collect();
        assert_eq!(names, ["hip", "knee"]);
        assert!(model.root_motion().is_free());
        assert_eq!(model.bodies().len(), 3);
        assert!(model.body("leg").is_some());
    }

    #[test]
    fn serde_tagged_shape() {
        let shape = GeomShape::Sphere {
            radius: 0.25,
            center: Vec3::zero(),
        };
        let json = serde_json::to_string(&shape).unwrap();
        assert!(json.contains(r#""type":"Sphere""#));

        let restored: GeomShape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, restored);
    }
}
