//! 肢体与肢体链
//!
//! 一个肢体对应布娃娃的一段刚体（头、前臂、脚等），
//! 由所属的 PhysicalAnimationComponent 独占持有，互相之间只用索引引用。

use glam::Vec2;

use super::limb_state::LimbStateType;
use super::profile::{DragForceDetails, LimbBlendType, MotorDriveDetails};
use crate::math::{map_value, Pose};
use crate::physics::{BodyHandle, JointHandle};

/// 碰撞余量上限（秒）
pub const MAX_COLLISION_TIME: f32 = 0.5;
/// 手臂类肢体碰撞频繁，余量上限更短
pub const MAX_FREQUENT_COLLISION_TIME: f32 = 0.3;
/// Transition 状态的默认时长（秒）
pub const DEFAULT_TRANSITION_TIME: f32 = 0.2;

/// 肢体类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimbType {
    BodyLower,
    BodyMiddle,
    BodyUpper,
    Head,
    Arm,
    Forearm,
    Hand,
    Leg,
    Calf,
    Foot,
}

impl LimbType {
    pub const ALL: [LimbType; 10] = [
        LimbType::BodyLower,
        LimbType::BodyMiddle,
        LimbType::BodyUpper,
        LimbType::Head,
        LimbType::Arm,
        LimbType::Forearm,
        LimbType::Hand,
        LimbType::Leg,
        LimbType::Calf,
        LimbType::Foot,
    ];

    /// 手臂类（上臂、前臂、手）
    #[inline]
    pub fn is_arm(self) -> bool {
        matches!(self, LimbType::Arm | LimbType::Forearm | LimbType::Hand)
    }

    #[inline]
    pub fn max_collision_time(self) -> f32 {
        if self.is_arm() {
            MAX_FREQUENT_COLLISION_TIME
        } else {
            MAX_COLLISION_TIME
        }
    }
}

// ============================================================================
// 肢体关节
// ============================================================================

/// 肢体关节：body0 为父刚体（或附着体），body1 为肢体自身
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimbJoint {
    pub handle: JointHandle,
    pub body0: BodyHandle,
    /// 关节坐标系在 body0 局部空间中的姿态
    pub frame0: Pose,
    /// 关节坐标系在肢体局部空间中的姿态
    pub frame1: Pose,
}

// ============================================================================
// 肢体
// ============================================================================

/// 物理动画肢体
#[derive(Clone, Debug)]
pub struct PhysicalAnimationLimb {
    pub name: String,
    pub limb_type: LimbType,

    /// 骨骼关节索引
    pub joint_id: usize,
    pub body: BodyHandle,
    /// 父肢体在组件肢体列表中的索引（骨盆为 None）
    pub parent_limb: Option<usize>,
    /// 与父肢体相连的 D6 关节
    pub parent_joint: Option<LimbJoint>,
    /// 与附着体相连的驱动关节
    pub drive_joint: Option<LimbJoint>,

    // ========== 姿态（模型空间） ==========
    /// 采样器给出的目标姿态
    pub target_pose: Pose,
    /// 刚体当前姿态
    pub physics_pose: Pose,
    /// 最终送给驱动的姿态
    pub adjusted_pose: Pose,
    /// 上一次解析出的父关节相对姿态
    pub prev_local_pose: Pose,

    // ========== 状态 ==========
    pub state: LimbStateType,
    pub blend_type: LimbBlendType,
    /// 配置档切换过渡期间保留的旧混合策略
    pub prev_blend_type: LimbBlendType,
    pub simulated: bool,

    // ========== 碰撞 ==========
    pub is_colliding: bool,
    pub was_in_collision: bool,
    pub collision_time: f32,
    /// 尚未结束的接触数
    pub active_contacts: u32,

    // ========== 驱动参数 ==========
    pub mass: f32,
    pub drive_velocity_modifier: f32,
    pub transition_time: f32,
    pub motor_drive: Option<MotorDriveDetails>,
    pub drag_force: Option<DragForceDetails>,
}

impl PhysicalAnimationLimb {
    pub fn new(name: impl Into<String>, limb_type: LimbType, joint_id: usize, body: BodyHandle, mass: f32) -> Self {
        Self {
            name: name.into(),
            limb_type,
            joint_id,
            body,
            parent_limb: None,
            parent_joint: None,
            drive_joint: None,
            target_pose: Pose::IDENTITY,
            physics_pose: Pose::IDENTITY,
            adjusted_pose: Pose::IDENTITY,
            prev_local_pose: Pose::IDENTITY,
            state: LimbStateType::Kinematic,
            blend_type: LimbBlendType::empty(),
            prev_blend_type: LimbBlendType::empty(),
            simulated: false,
            is_colliding: false,
            was_in_collision: false,
            collision_time: 0.0,
            active_contacts: 0,
            mass,
            drive_velocity_modifier: 1.0,
            transition_time: DEFAULT_TRANSITION_TIME,
            motor_drive: None,
            drag_force: None,
        }
    }

    #[inline]
    pub fn max_collision_time(&self) -> f32 {
        self.limb_type.max_collision_time()
    }

    /// 正在碰撞或仍有碰撞余量
    #[inline]
    pub fn is_in_collision(&self) -> bool {
        self.is_colliding || self.collision_time > 0.0
    }

    /// 角度误差越大，阻尼越小
    pub fn calculate_desired_angular_damping(&self, delta_angle: f32) -> Option<f32> {
        let motor = self.motor_drive.as_ref()?;
        Some(map_range(delta_angle, motor.angular_range, motor.angular_damping_range))
    }

    /// 位置误差越大，阻尼越小
    pub fn calculate_desired_linear_damping(&self, distance: f32) -> Option<f32> {
        let motor = self.motor_drive.as_ref()?;
        Some(map_range(distance, motor.linear_range, motor.linear_damping_range))
    }

    /// 每帧结束后推进碰撞计时
    pub fn update_collision_time(&mut self, dt: f32) {
        if self.was_in_collision && self.is_colliding {
            self.collision_time = (self.collision_time + dt).clamp(0.0, self.max_collision_time());
        } else {
            self.collision_time = (self.collision_time - dt).max(0.0);
        }
        self.was_in_collision = self.is_colliding;
    }
}

#[inline]
fn map_range(value: f32, input: Vec2, output: Vec2) -> f32 {
    map_value(value, input.x, input.y, output.x, output.y)
}

// ============================================================================
// 肢体链
// ============================================================================

/// 按解剖关系分组的肢体链，整体升级到 Simulation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhysicsLimbChain {
    /// 组件肢体列表中的索引
    pub limbs: Vec<usize>,
}

impl PhysicsLimbChain {
    pub fn new(limbs: Vec<usize>) -> Self {
        Self { limbs }
    }

    /// 链上是否有肢体正在碰撞或仍有碰撞余量
    pub fn has_active_limb(&self, limbs: &[PhysicalAnimationLimb]) -> bool {
        self.limbs
            .iter()
            .filter_map(|&index| limbs.get(index))
            .any(PhysicalAnimationLimb::is_in_collision)
    }
}

/// 一个布娃娃的全部肢体链
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LimbChains {
    pub neck: PhysicsLimbChain,
    pub body: PhysicsLimbChain,
    pub left_arm: PhysicsLimbChain,
    pub right_arm: PhysicsLimbChain,
    pub left_leg: PhysicsLimbChain,
    pub right_leg: PhysicsLimbChain,
}
