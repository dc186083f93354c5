//! MJCF subset parser.
//!
//! Reads the parts of MJCF the locomotion robots use: `compiler`
//! (angle units and coordinate mode), a single top-level `default`, the
//! body tree under `worldbody` with `joint`, `freejoint` and `geom`
//! children, and `motor` actuators. Everything else is skipped.

use std::collections::{HashMap, HashSet};

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{MjcfError, Result};
use crate::{Actuator, Body, Geom, GeomShape, JointDef, JointKind, Quat, RobotModel, Vec3};

const DEFAULT_DENSITY: f64 = 1000.0;
const DEFAULT_FRICTION: f64 = 1.0;
const DEFAULT_RGBA: [f32; 4] = [0.8, 0.6, 0.4, 1.0];

/// Elements inside a body that carry no collision or joint data.
const IGNORED_BODY_ELEMENTS: &[&str] = &["site", "inertial", "camera", "light"];

/// Parse an MJCF string into a robot model.
///
/// # Errors
///
/// Returns an error if the XML is malformed, required elements are
/// missing, or the document uses features outside the supported subset.
pub fn parse_mjcf_str(xml: &str) -> Result<RobotModel> {
    let doc = read_tree(xml)?;
    if doc.name != "mujoco" {
        return Err(MjcfError::missing_element("mujoco", "MJCF document"));
    }

    let compiler = Compiler::from_element(doc.child("compiler"))?;
    let defaults = Defaults::from_element(doc.child("default"));
    let worldbody = doc
        .child("worldbody")
        .ok_or_else(|| MjcfError::missing_element("worldbody", "mujoco"))?;

    for geom in worldbody.children_named("geom") {
        tracing::debug!(
            name = geom.attr("name").unwrap_or("<unnamed>"),
            "skipping worldbody geom; the scene provides the ground"
        );
    }

    let roots: Vec<&Element> = worldbody.children_named("body").collect();
    if roots.len() != 1 {
        return Err(MjcfError::RootCount(roots.len()));
    }

    let mut parser = BodyParser {
        compiler,
        defaults,
        body_names: HashSet::new(),
        joint_names: HashSet::new(),
        unnamed: 0,
    };
    let root = parser.parse_body(roots[0], Vector3::zeros())?;

    let mut actuators = Vec::new();
    if let Some(actuator) = doc.child("actuator") {
        for motor in actuator.children_named("motor") {
            let joint = motor
                .attr("joint")
                .ok_or(MjcfError::MissingAttribute {
                    attribute: "joint",
                    element: "motor".into(),
                })?
                .to_string();
            if !parser.joint_names.contains(&joint) {
                return Err(MjcfError::UndefinedJoint(joint));
            }
            let gear = match motor.attr("gear") {
                Some(s) => parse_floats(s, "gear", "motor")?[0],
                None => 1.0,
            };
            actuators.push(Actuator { joint, gear });
        }
    }

    Ok(RobotModel {
        name: doc.attr("model").unwrap_or("unnamed").to_string(),
        root,
        actuators,
    })
}

/// A parsed XML element.
#[derive(Debug)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn from_start(e: &BytesStart) -> Result<Self> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| MjcfError::XmlParse(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| MjcfError::XmlParse(err.to_string()))?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Build the element tree of an XML document.
fn read_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(Element::from_start(e)?),
            Ok(Event::Empty(ref e)) => {
                let element = Element::from_start(e)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| MjcfError::XmlParse("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(MjcfError::XmlParse(e.to_string())),
        }
    }

    if let Some(open) = stack.last() {
        return Err(MjcfError::XmlParse(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| MjcfError::missing_element("mujoco", "MJCF document"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Settings from the `<compiler>` element.
#[derive(Debug, Clone, Copy)]
struct Compiler {
    degrees: bool,
    global: bool,
}

impl Compiler {
    fn from_element(element: Option<&Element>) -> Result<Self> {
        let mut compiler = Self {
            degrees: true,
            global: false,
        };
        let Some(e) = element else {
            return Ok(compiler);
        };
        match e.attr("angle") {
            None | Some("degree") => {}
            Some("radian") => compiler.degrees = false,
            Some(other) => {
                return Err(MjcfError::invalid("angle", "compiler", format!("'{other}'")));
            }
        }
        match e.attr("coordinate") {
            None | Some("local") => {}
            Some("global") => compiler.global = true,
            Some(other) => {
                return Err(MjcfError::invalid(
                    "coordinate",
                    "compiler",
                    format!("'{other}'"),
                ));
            }
        }
        Ok(compiler)
    }

    fn angle(&self, value: f64) -> f64 {
        if self.degrees {
            value.to_radians()
        } else {
            value
        }
    }
}

/// Attribute defaults from the top-level `<default>` element.
#[derive(Debug, Default)]
struct Defaults {
    joint: HashMap<String, String>,
    geom: HashMap<String, String>,
}

impl Defaults {
    fn from_element(element: Option<&Element>) -> Self {
        let mut defaults = Self::default();
        let Some(e) = element else {
            return defaults;
        };
        for child in &e.children {
            let target = match child.name.as_str() {
                "joint" => &mut defaults.joint,
                "geom" => &mut defaults.geom,
                "default" => {
                    tracing::warn!(
                        class = child.attr("class").unwrap_or("<unnamed>"),
                        "nested default classes are not supported; ignoring"
                    );
                    continue;
                }
                _ => continue,
            };
            for (k, v) in &child.attrs {
                target.insert(k.clone(), v.clone());
            }
        }
        defaults
    }
}

fn lookup<'a>(e: &'a Element, defaults: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    e.attr(name).or_else(|| defaults.get(name).map(String::as_str))
}

struct BodyParser {
    compiler: Compiler,
    defaults: Defaults,
    body_names: HashSet<String>,
    joint_names: HashSet<String>,
    unnamed: usize,
}

impl BodyParser {
    fn parse_body(&mut self, e: &Element, parent_global: Vector3<f64>) -> Result<Body> {
        let name = match e.attr("name") {
            Some(n) => n.to_string(),
            None => {
                self.unnamed += 1;
                format!("body{}", self.unnamed)
            }
        };
        if !self.body_names.insert(name.clone()) {
            return Err(MjcfError::DuplicateBody(name));
        }

        let pos = optional_vec3(e.attr("pos"), "pos", &name)?.unwrap_or_else(Vector3::zeros);
        let rotation = self.orientation(e, &name)?;

        // In global mode positions are world coordinates; re-express them
        // relative to the parent body and to this body's origin.
        let (local_pos, body_global, origin) = if self.compiler.global {
            if rotation.angle() > 1e-9 {
                return Err(MjcfError::RotatedGlobalBody(name));
            }
            (pos - parent_global, pos, pos)
        } else {
            (pos, parent_global + pos, Vector3::zeros())
        };

        let mut body = Body::new(name.clone());
        body.pos = to_vec3(&local_pos);
        body.rotation = to_quat(&rotation);

        for child in &e.children {
            match child.name.as_str() {
                "joint" => body.joints.push(self.parse_joint(child, &name, &origin)?),
                "freejoint" => body.joints.push(self.free_joint(child, &name)?),
                "geom" => body.geoms.push(self.parse_geom(child, &name, &origin)?),
                "body" => body.children.push(self.parse_body(child, body_global)?),
                other if IGNORED_BODY_ELEMENTS.contains(&other) => {}
                other => {
                    tracing::warn!(body = %name, element = other, "skipping unsupported element");
                }
            }
        }

        Ok(body)
    }

    fn register_joint(&mut self, name: String) -> Result<String> {
        if !self.joint_names.insert(name.clone()) {
            return Err(MjcfError::DuplicateJoint(name));
        }
        Ok(name)
    }

    fn free_joint(&mut self, e: &Element, body: &str) -> Result<JointDef> {
        let name = self.register_joint(
            e.attr("name")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{body}_free")),
        )?;
        Ok(JointDef {
            name,
            kind: JointKind::Free,
            axis: Vec3::new(0.0, 0.0, 1.0),
            pos: Vec3::zero(),
            range: None,
            damping: 0.0,
        })
    }

    fn parse_joint(&mut self, e: &Element, body: &str, origin: &Vector3<f64>) -> Result<JointDef> {
        let defaults = &self.defaults.joint;
        let name = e
            .attr("name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{body}_joint{}", self.joint_names.len()));
        let kind = match lookup(e, defaults, "type").unwrap_or("hinge") {
            "hinge" => JointKind::Hinge,
            "slide" => JointKind::Slide,
            "free" => JointKind::Free,
            other => return Err(MjcfError::UnknownJointType(other.to_string())),
        };

        let axis = optional_vec3(lookup(e, defaults, "axis"), "axis", &name)?
            .unwrap_or_else(Vector3::z);
        if axis.norm() < 1e-12 {
            return Err(MjcfError::invalid("axis", &name, "zero-length axis"));
        }
        let axis = axis.normalize();
        let pos = optional_vec3(e.attr("pos"), "pos", &name)?.unwrap_or_else(Vector3::zeros)
            - origin;

        let limited = lookup(e, defaults, "limited");
        let range = match (limited, lookup(e, defaults, "range")) {
            (Some("false"), _) | (_, None) => None,
            (_, Some(s)) => {
                let r = parse_floats(s, "range", &name)?;
                if r.len() < 2 {
                    return Err(MjcfError::invalid("range", &name, "expected 2 values"));
                }
                match kind {
                    JointKind::Hinge => {
                        Some((self.compiler.angle(r[0]), self.compiler.angle(r[1])))
                    }
                    _ => Some((r[0], r[1])),
                }
            }
        };
        let damping = match lookup(e, defaults, "damping") {
            Some(s) => parse_floats(s, "damping", &name)?[0],
            None => 0.0,
        };

        let name = self.register_joint(name)?;
        Ok(JointDef {
            name,
            kind,
            axis: to_vec3(&axis),
            pos: to_vec3(&pos),
            range,
            damping,
        })
    }

    fn parse_geom(&self, e: &Element, body: &str, origin: &Vector3<f64>) -> Result<Geom> {
        let defaults = &self.defaults.geom;
        let name = e.attr("name").map(str::to_string);
        let label = name.clone().unwrap_or_else(|| format!("{body} geom"));
        let kind = lookup(e, defaults, "type").unwrap_or("sphere");

        let size = match lookup(e, defaults, "size") {
            Some(s) => parse_floats(s, "size", &label)?,
            None => Vec::new(),
        };
        let size_at = |i: usize| -> Result<f64> {
            size.get(i)
                .copied()
                .ok_or_else(|| MjcfError::invalid("size", &label, format!("expected at least {} values", i + 1)))
        };
        let pos = optional_vec3(e.attr("pos"), "pos", &label)?.unwrap_or_else(Vector3::zeros)
            - origin;
        let rotation = self.orientation(e, &label)?;

        let segment = |half_length: Option<f64>| -> Result<(Vec3, Vec3)> {
            if let Some(s) = e.attr("fromto") {
                let v = parse_floats(s, "fromto", &label)?;
                if v.len() != 6 {
                    return Err(MjcfError::invalid("fromto", &label, "expected 6 values"));
                }
                let from = Vector3::new(v[0], v[1], v[2]) - origin;
                let to = Vector3::new(v[3], v[4], v[5]) - origin;
                return Ok((to_vec3(&from), to_vec3(&to)));
            }
            let half = half_length.ok_or_else(|| {
                MjcfError::invalid("size", &label, "needs a half-length without fromto")
            })?;
            let offset = rotation * Vector3::new(0.0, 0.0, half);
            Ok((to_vec3(&(pos - offset)), to_vec3(&(pos + offset))))
        };

        let shape = match kind {
            "capsule" => {
                let (from, to) = segment(size.get(1).copied())?;
                GeomShape::Capsule {
                    radius: size_at(0)?,
                    from,
                    to,
                }
            }
            "cylinder" => {
                let (from, to) = segment(size.get(1).copied())?;
                GeomShape::Cylinder {
                    radius: size_at(0)?,
                    from,
                    to,
                }
            }
            "sphere" => GeomShape::Sphere {
                radius: size_at(0)?,
                center: to_vec3(&pos),
            },
            "box" => GeomShape::Box {
                half_extents: Vec3::new(size_at(0)?, size_at(1)?, size_at(2)?),
                center: to_vec3(&pos),
                rotation: to_quat(&rotation),
            },
            other => return Err(MjcfError::UnsupportedGeomType(other.to_string())),
        };

        let density = match lookup(e, defaults, "density") {
            Some(s) => parse_floats(s, "density", &label)?[0],
            None => DEFAULT_DENSITY,
        };
        let friction = match lookup(e, defaults, "friction") {
            Some(s) => parse_floats(s, "friction", &label)?[0],
            None => DEFAULT_FRICTION,
        };
        let rgba = match lookup(e, defaults, "rgba") {
            Some(s) => {
                let v = parse_floats(s, "rgba", &label)?;
                if v.len() != 4 {
                    return Err(MjcfError::invalid("rgba", &label, "expected 4 values"));
                }
                [v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32]
            }
            None => DEFAULT_RGBA,
        };

        Ok(Geom {
            name,
            shape,
            density,
            friction,
            rgba,
        })
    }

    /// Orientation from `quat`, `axisangle` or `euler` (intrinsic xyz).
    fn orientation(&self, e: &Element, label: &str) -> Result<UnitQuaternion<f64>> {
        if let Some(s) = e.attr("quat") {
            let q = parse_floats(s, "quat", label)?;
            if q.len() != 4 {
                return Err(MjcfError::invalid("quat", label, "expected 4 values"));
            }
            return Ok(UnitQuaternion::from_quaternion(Quaternion::new(
                q[0], q[1], q[2], q[3],
            )));
        }
        if let Some(s) = e.attr("axisangle") {
            let v = parse_floats(s, "axisangle", label)?;
            if v.len() != 4 {
                return Err(MjcfError::invalid("axisangle", label, "expected 4 values"));
            }
            let axis = Unit::new_normalize(Vector3::new(v[0], v[1], v[2]));
            return Ok(UnitQuaternion::from_axis_angle(&axis, self.compiler.angle(v[3])));
        }
        if let Some(s) = e.attr("euler") {
            let v = parse_floats(s, "euler", label)?;
            if v.len() != 3 {
                return Err(MjcfError::invalid("euler", label, "expected 3 values"));
            }
            let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.compiler.angle(v[0]));
            let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.compiler.angle(v[1]));
            let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.compiler.angle(v[2]));
            return Ok(rx * ry * rz);
        }
        Ok(UnitQuaternion::identity())
    }
}

/// Parse a whitespace-separated float list.
fn parse_floats(s: &str, attribute: &str, element: &str) -> Result<Vec<f64>> {
    let values = s
        .split_whitespace()
        .map(|part| {
            part.parse::<f64>()
                .map_err(|_| MjcfError::invalid(attribute, element, format!("'{part}' is not a number")))
        })
        .collect::<Result<Vec<_>>>()?;
    if values.is_empty() {
        return Err(MjcfError::invalid(attribute, element, "empty value"));
    }
    Ok(values)
}

fn optional_vec3(s: Option<&str>, attribute: &str, element: &str) -> Result<Option<Vector3<f64>>> {
    let Some(s) = s else {
        return Ok(None);
    };
    let v = parse_floats(s, attribute, element)?;
    if v.len() != 3 {
        return Err(MjcfError::invalid(attribute, element, "expected 3 values"));
    }
    Ok(Some(Vector3::new(v[0], v[1], v[2])))
}

fn to_vec3(v: &Vector3<f64>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_quat(q: &UnitQuaternion<f64>) -> Quat {
    Quat {
        w: q.w,
        x: q.i,
        y: q.j,
        z: q.k,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PLANAR_LEG: &str = r#"
        <mujoco model="leg">
          <compiler angle="degree"/>
          <default>
            <joint damping="0.5" limited="true"/>
            <geom density="500" friction="0.9 0.1 0.1" rgba="1 0 0 1"/>
          </default>
          <worldbody>
            <geom name="floor" type="plane" size="10 10 0.1"/>
            <body name="torso" pos="0 0 1.25">
              <joint name="rootx" type="slide" axis="1 0 0" limited="false"/>
              <joint name="rootz" type="slide" axis="0 0 1" limited="false"/>
              <joint name="rooty" type="hinge" axis="0 1 0" limited="false"/>
              <geom name="torso_geom" type="capsule" fromto="0 0 0.2 0 0 -0.2" size="0.05"/>
              <body name="thigh" pos="0 0 -0.2">
                <joint name="thigh_joint" axis="0 -1 0" range="-150 0"/>
                <geom type="capsule" fromto="0 0 0 0 0 -0.45" size="0.05"/>
                <site name="marker" pos="0 0 0"/>
              </body>
            </body>
          </worldbody>
          <actuator>
            <motor joint="thigh_joint" gear="200"/>
          </actuator>
        </mujoco>
    "#;

    #[test]
    fn parses_planar_leg() {
        let model = parse_mjcf_str(PLANAR_LEG).unwrap();
        assert_eq!(model.name, "leg");
        assert_eq!(model.root.name, "torso");
        assert_eq!(model.root.pos, Vec3::new(0.0, 0.0, 1.25));

        let joints = model.ordered_joints();
        assert_eq!(joints.len(), 1);
        let thigh = joints[0];
        assert_eq!(thigh.name, "thigh_joint");
        assert_eq!(thigh.axis, Vec3::new(0.0, -1.0, 0.0));
        let (lo, hi) = thigh.range.unwrap();
        assert_relative_eq!(lo, -150f64.to_radians());
        assert_relative_eq!(hi, 0.0);
        assert_relative_eq!(thigh.damping, 0.5);

        // limited="false" overrides the default
        assert!(model.root.joints.iter().all(|j| j.range.is_none()));

        let motion = model.root_motion();
        assert_eq!(motion.translation, [true, false, true]);
        assert_eq!(motion.rotation, [false, true, false]);

        let geom = &model.root.geoms[0];
        assert_relative_eq!(geom.density, 500.0);
        assert_relative_eq!(geom.friction, 0.9);
        assert_eq!(geom.rgba, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.actuator_gear("thigh_joint"), Some(200.0));
    }

    #[test]
    fn global_coordinates_become_local() {
        let xml = r#"
            <mujoco>
              <compiler angle="degree" coordinate="global"/>
              <worldbody>
                <body name="torso" pos="0 0 1.25">
                  <joint name="rooty" type="hinge" axis="0 1 0" pos="0 0 1.25"/>
                  <geom type="capsule" fromto="0 0 1.45 0 0 1.05" size="0.05"/>
                  <body name="thigh" pos="0 0 1.05">
                    <joint name="thigh_joint" axis="0 -1 0" pos="0 0 1.05" range="-150 0"/>
                    <geom type="capsule" fromto="0 0 1.05 0 0 0.6" size="0.05"/>
                  </body>
                </body>
              </worldbody>
            </mujoco>
        "#;
        let model = parse_mjcf_str(xml).unwrap();
        let thigh = model.body("thigh").unwrap();
        assert_relative_eq!(thigh.pos.z, -0.2, epsilon = 1e-12);
        assert_eq!(thigh.joints[0].pos, Vec3::zero());
        match &thigh.geoms[0].shape {
            GeomShape::Capsule { from, to, .. } => {
                assert_relative_eq!(from.z, 0.0, epsilon = 1e-12);
                assert_relative_eq!(to.z, -0.45, epsilon = 1e-12);
            }
            other => panic!("expected capsule, got {other:?}"),
        }
    }

    #[test]
    fn capsule_from_axisangle_and_half_length() {
        let xml = r#"
            <mujoco>
              <compiler angle="radian"/>
              <worldbody>
                <body name="torso">
                  <freejoint/>
                  <geom type="capsule" pos="0 0 0" axisangle="0 1 0 1.5707963267948966" size="0.05 0.2"/>
                </body>
              </worldbody>
            </mujoco>
        "#;
        let model = parse_mjcf_str(xml).unwrap();
        assert!(model.root_motion().is_free());
        match &model.root.geoms[0].shape {
            GeomShape::Capsule { radius, from, to } => {
                assert_relative_eq!(*radius, 0.05);
                // local +z rotated onto +x
                assert_relative_eq!(to.x, 0.2, epsilon = 1e-9);
                assert_relative_eq!(from.x, -0.2, epsilon = 1e-9);
                assert_relative_eq!(to.z, 0.0, epsilon = 1e-9);
            }
            other => panic!("expected capsule, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unsupported_input() {
        let ball = r#"<mujoco><worldbody><body name="a"><body name="b">
            <joint type="ball"/></body></body></worldbody></mujoco>"#;
        assert!(matches!(
            parse_mjcf_str(ball),
            Err(MjcfError::UnknownJointType(t)) if t == "ball"
        ));

        let duplicate = r#"<mujoco><worldbody><body name="a"><body name="a"/>
            </body></worldbody></mujoco>"#;
        assert!(matches!(parse_mjcf_str(duplicate), Err(MjcfError::DuplicateBody(_))));

        let two_roots = r#"<mujoco><worldbody><body name="a"/><body name="b"/>
            </worldbody></mujoco>"#;
        assert!(matches!(parse_mjcf_str(two_roots), Err(MjcfError::RootCount(2))));

        let bad_motor = r#"<mujoco><worldbody><body name="a"/></worldbody>
            <actuator><motor joint="nope"/></actuator></mujoco>"#;
        assert!(matches!(parse_mjcf_str(bad_motor), Err(MjcfError::UndefinedJoint(_))));

        let bad_number = r#"<mujoco><worldbody><body name="a" pos="0 x 0"/>
            </worldbody></mujoco>"#;
        assert!(matches!(
            parse_mjcf_str(bad_number),
            Err(MjcfError::InvalidAttribute { .. })
        ));

        assert!(matches!(
            parse_mjcf_str("<mujoco><worldbody>"),
            Err(MjcfError::XmlParse(_))
        ));
    }
}
