//! 测试辅助：记录调用结果的物理后端与人形骨骼

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use crate::math::Pose;
use crate::physical_animation::{PhysicalAnimationComponent, RagdollBuilder, RagdollJointIds, RagdollProfile};
use crate::physics::{
    BodyDesc, BodyHandle, BodyKind, ContactEvent, D6JointDesc, DriveParams, JointHandle, PhysicsBackend, ShapeDesc,
};
use crate::skeleton::{JointLink, JointSet, JointTransform};

/// 测试日志（重复调用无害）
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// MockBackend
// ============================================================================

#[derive(Clone, Debug)]
pub struct MockBody {
    pub desc: BodyDesc,
    pub pose: Pose,
    pub linear: Vec3,
    pub angular: Vec3,
    pub simulated: bool,
    pub kinematic: bool,
}

#[derive(Clone, Debug)]
pub struct MockJoint {
    pub desc: D6JointDesc,
    pub enabled: bool,
    pub linear_drive: DriveParams,
    pub angular_drive: DriveParams,
    pub target: Pose,
    pub angular_velocity: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

/// 不做积分，只记录状态
#[derive(Debug)]
pub struct MockBackend {
    pub bodies: BTreeMap<BodyHandle, MockBody>,
    pub joints: BTreeMap<JointHandle, MockJoint>,
    /// 为 false 时所有刚体都报告未就绪
    pub ready: bool,
    next_handle: u32,
    contacts: Vec<ContactEvent>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            bodies: BTreeMap::new(),
            joints: BTreeMap::new(),
            ready: true,
            next_handle: 1,
            contacts: Vec::new(),
        }
    }
}

impl MockBackend {
    pub fn body(&self, body: BodyHandle) -> &MockBody {
        &self.bodies[&body]
    }

    pub fn joint(&self, joint: JointHandle) -> &MockJoint {
        &self.joints[&joint]
    }

    /// 普通动态刚体
    pub fn dynamic_desc(name: &str) -> BodyDesc {
        BodyDesc {
            name: name.to_string(),
            pose: Pose::IDENTITY,
            shape: ShapeDesc::Capsule { radius: 0.05, half_height: 0.1 },
            shape_local: Pose::IDENTITY,
            mass: 1.0,
            kind: BodyKind::Dynamic,
            simulated: true,
            collidable: true,
            use_gravity: true,
            ccd: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            position_iterations: 4,
            velocity_iterations: 1,
            sleep_threshold: 0.01,
        }
    }

    /// 下一次 drain_contact_events 返回的接触事件
    pub fn push_contact(&mut self, body0: BodyHandle, body1: BodyHandle, started: bool) {
        self.contacts.push(ContactEvent { body0, body1, started });
    }

    fn next(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl PhysicsBackend for MockBackend {
    fn create_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next());
        self.bodies.insert(
            handle,
            MockBody {
                desc: desc.clone(),
                pose: desc.pose,
                linear: Vec3::ZERO,
                angular: Vec3::ZERO,
                simulated: desc.simulated,
                kinematic: desc.kind == BodyKind::Kinematic,
            },
        );
        handle
    }

    fn destroy_body(&mut self, body: BodyHandle) {
        self.bodies.remove(&body);
    }

    fn create_joint(&mut self, desc: &D6JointDesc) -> JointHandle {
        let handle = JointHandle(self.next());
        self.joints.insert(
            handle,
            MockJoint {
                desc: desc.clone(),
                enabled: true,
                linear_drive: desc.linear_drive.unwrap_or_default(),
                angular_drive: desc.angular_drive.unwrap_or_default(),
                target: Pose::IDENTITY,
                angular_velocity: Vec3::ZERO,
                linear_damping: 0.0,
                angular_damping: 0.0,
            },
        );
        handle
    }

    fn destroy_joint(&mut self, joint: JointHandle) {
        self.joints.remove(&joint);
    }

    fn is_body_ready(&self, body: BodyHandle) -> bool {
        self.ready && self.bodies.contains_key(&body)
    }

    fn body_pose(&self, body: BodyHandle) -> Option<Pose> {
        self.bodies.get(&body).map(|b| b.pose)
    }

    fn set_body_pose(&mut self, body: BodyHandle, pose: Pose) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.pose = pose;
        }
    }

    fn move_kinematic_body(&mut self, body: BodyHandle, pose: Pose) {
        self.set_body_pose(body, pose);
    }

    fn set_body_simulated(&mut self, body: BodyHandle, simulated: bool) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.simulated = simulated;
        }
    }

    fn set_body_kinematic(&mut self, body: BodyHandle, kinematic: bool) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.kinematic = kinematic;
        }
    }

    fn body_velocity(&self, body: BodyHandle) -> Option<(Vec3, Vec3)> {
        self.bodies.get(&body).map(|b| (b.linear, b.angular))
    }

    fn set_body_velocity(&mut self, body: BodyHandle, linear: Vec3, angular: Vec3) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.linear = linear;
            b.angular = angular;
        }
    }

    fn set_joint_enabled(&mut self, joint: JointHandle, enabled: bool) {
        if let Some(j) = self.joints.get_mut(&joint) {
            j.enabled = enabled;
        }
    }

    fn set_joint_drive(&mut self, joint: JointHandle, linear: DriveParams, angular: DriveParams) {
        if let Some(j) = self.joints.get_mut(&joint) {
            j.linear_drive = linear;
            j.angular_drive = angular;
        }
    }

    fn set_joint_drive_target(&mut self, joint: JointHandle, target: Pose, angular_velocity: Vec3) {
        if let Some(j) = self.joints.get_mut(&joint) {
            j.target = target;
            j.angular_velocity = angular_velocity;
        }
    }

    fn set_joint_drive_damping(&mut self, joint: JointHandle, linear_damping: f32, angular_damping: f32) {
        if let Some(j) = self.joints.get_mut(&joint) {
            j.linear_damping = linear_damping;
            j.angular_damping = angular_damping;
        }
    }

    fn step(&mut self, _dt: f32) {}

    fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.contacts)
    }
}

// ============================================================================
// 人形骨骼
// ============================================================================

/// T 字姿态人形骨骼：Y 轴向上，左侧为 +X，父关节总在子关节之前
pub fn humanoid_skeleton() -> JointSet {
    let mut joints: Vec<JointLink> = Vec::new();
    let add = |name: &str, parent: Option<&str>, offset: Vec3, joints: &mut Vec<JointLink>| {
        let parent = parent.and_then(|p| joints.iter().position(|j| j.name == p));
        joints.push(JointLink::new(name, parent, JointTransform::new(offset, Quat::IDENTITY)));
    };

    add("root", None, Vec3::ZERO, &mut joints);
    add("pelvis", Some("root"), Vec3::new(0.0, 1.0, 0.0), &mut joints);
    add("spine_01", Some("pelvis"), Vec3::new(0.0, 0.1, 0.0), &mut joints);
    add("spine_02", Some("spine_01"), Vec3::new(0.0, 0.15, 0.0), &mut joints);
    add("spine_03", Some("spine_02"), Vec3::new(0.0, 0.15, 0.0), &mut joints);
    add("neck_01", Some("spine_03"), Vec3::new(0.0, 0.15, 0.0), &mut joints);
    add("head", Some("neck_01"), Vec3::new(0.0, 0.1, 0.0), &mut joints);
    add("head_end", Some("head"), Vec3::new(0.0, 0.2, 0.0), &mut joints);

    for (side, sign) in [("l", 1.0), ("r", -1.0)] {
        let name = |base: &str| format!("{}_{}", base, side);
        add(&name("upperarm"), Some("spine_03"), Vec3::new(0.18 * sign, 0.1, 0.0), &mut joints);
        add(&name("lowerarm"), Some(name("upperarm").as_str()), Vec3::new(0.28 * sign, 0.0, 0.0), &mut joints);
        add(&name("hand"), Some(name("lowerarm").as_str()), Vec3::new(0.25 * sign, 0.0, 0.0), &mut joints);
        add(&name("hand_end"), Some(name("hand").as_str()), Vec3::new(0.15 * sign, 0.0, 0.0), &mut joints);
    }
    for (side, sign) in [("l", 1.0), ("r", -1.0)] {
        let name = |base: &str| format!("{}_{}", base, side);
        add(&name("thigh"), Some("pelvis"), Vec3::new(0.1 * sign, -0.05, 0.0), &mut joints);
        add(&name("calf"), Some(name("thigh").as_str()), Vec3::new(0.0, -0.45, 0.0), &mut joints);
        add(&name("foot"), Some(name("calf").as_str()), Vec3::new(0.0, -0.45, 0.0), &mut joints);
        add(&name("foot_end"), Some(name("foot").as_str()), Vec3::new(0.0, -0.05, 0.15), &mut joints);
    }

    match JointSet::new(joints) {
        Ok(skeleton) => skeleton,
        Err(err) => panic!("humanoid skeleton: {}", err),
    }
}

/// 在世界原点用站立配置档构建好的组件
pub fn built_component(backend: &mut MockBackend, skeleton: &JointSet) -> PhysicalAnimationComponent {
    let mut component = PhysicalAnimationComponent::default();
    component.joint_ids = RagdollJointIds::from_skeleton(skeleton).unwrap();
    let profile = RagdollProfile::idle();
    RagdollBuilder::new(backend, skeleton, Pose::IDENTITY, &profile)
        .build(&mut component)
        .unwrap();
    component
}
