//! Scripted simulator for environment tests.
//!
//! State is whatever the test writes into the public maps; stepping only
//! counts. Unknown parts sit at the origin and unknown joints at zero.

use std::collections::HashMap;

use locomo_model::RobotModel;
use locomo_physics::{
    Camera, Image, JointHandle, JointInfo, JointState, LoadedRobot, ObjectId, ObjectSpec,
    PartHandle, PartInfo, Pose, Result, RobotOptions, SceneConfig, Simulator,
};
use nalgebra::Vector3;

#[derive(Default)]
pub(crate) struct FakeSim {
    pub objects: Vec<String>,
    pub timestep: f64,
    pub steps: usize,
    pub poses: HashMap<PartHandle, Pose>,
    pub velocities: HashMap<PartHandle, Vector3<f64>>,
    pub joints: HashMap<JointHandle, JointState>,
    pub torques: HashMap<JointHandle, f64>,
    pub velocity_targets: HashMap<JointHandle, (f64, f64)>,
    pub position_targets: HashMap<JointHandle, (f64, f64)>,
    pub contacts: HashMap<PartHandle, Vec<PartHandle>>,
    pub distance: Option<f64>,
}

impl Simulator for FakeSim {
    fn reset_scene(&mut self, scene: &SceneConfig) -> Result<ObjectId> {
        *self = Self {
            timestep: scene.timestep,
            distance: self.distance,
            ..Self::default()
        };
        self.objects.push("floor".into());
        Ok(ObjectId(0))
    }

    fn load_robot(&mut self, model: &RobotModel, _options: &RobotOptions) -> Result<LoadedRobot> {
        let object = ObjectId(self.objects.len());
        self.objects.push(model.name.clone());
        let parts = model
            .bodies()
            .iter()
            .enumerate()
            .map(|(link, body)| PartInfo {
                name: body.name.clone(),
                handle: PartHandle { object, link },
            })
            .collect();
        let joints = model
            .ordered_joints()
            .iter()
            .enumerate()
            .map(|(index, joint)| JointInfo {
                name: joint.name.clone(),
                handle: JointHandle { object, index },
                limits: joint.range,
            })
            .collect();
        Ok(LoadedRobot {
            object,
            parts,
            joints,
            root: PartHandle { object, link: 0 },
        })
    }

    fn load_object(&mut self, spec: &ObjectSpec) -> Result<ObjectId> {
        let object = ObjectId(self.objects.len());
        self.objects.push(spec.name.clone());
        self.poses.insert(
            PartHandle { object, link: 0 },
            Pose::from_position(Vector3::from(spec.position)),
        );
        Ok(object)
    }

    fn step(&mut self) {
        self.steps += 1;
    }

    fn timestep(&self) -> f64 {
        self.timestep
    }

    fn part_pose(&self, part: PartHandle) -> Result<Pose> {
        Ok(self
            .poses
            .get(&part)
            .copied()
            .unwrap_or_else(|| Pose::from_position(Vector3::zeros())))
    }

    fn part_velocity(&self, part: PartHandle) -> Result<Vector3<f64>> {
        Ok(self.velocities.get(&part).copied().unwrap_or_else(Vector3::zeros))
    }

    fn joint_state(&self, joint: JointHandle) -> Result<JointState> {
        Ok(self.joints.get(&joint).copied().unwrap_or_default())
    }

    fn reset_joint_state(&mut self, joint: JointHandle, position: f64, velocity: f64) -> Result<()> {
        self.joints.insert(joint, JointState { position, velocity });
        Ok(())
    }

    fn set_motor_torque(&mut self, joint: JointHandle, torque: f64) -> Result<()> {
        self.torques.insert(joint, torque);
        Ok(())
    }

    fn set_motor_velocity(&mut self, joint: JointHandle, target: f64, max_force: f64) -> Result<()> {
        self.velocity_targets.insert(joint, (target, max_force));
        Ok(())
    }

    fn set_motor_position(&mut self, joint: JointHandle, target: f64, max_force: f64) -> Result<()> {
        self.position_targets.insert(joint, (target, max_force));
        Ok(())
    }

    fn contacts(&self, part: PartHandle) -> Result<Vec<PartHandle>> {
        Ok(self.contacts.get(&part).cloned().unwrap_or_default())
    }

    fn closest_distance(&self, _a: ObjectId, _b: ObjectId, max_distance: f64) -> Result<Option<f64>> {
        Ok(self.distance.filter(|d| *d <= max_distance))
    }

    fn render(&self, _camera: &Camera, width: usize, height: usize) -> Image {
        Image::filled(width, height, [0, 0, 0, 255])
    }
}
