//! 布娃娃配置档（Profile）
//!
//! 每个配置档为各肢体组提供马达驱动、拖拽力、强度系数与混合策略。
//! 配置档创建后不可变，按运动速度整体切换（idle / running / sprint），
//! 多个布娃娃通过 Arc 共享同一份配置档。

use std::sync::Arc;

use bitflags::bitflags;
use glam::Vec2;

use super::limb::LimbType;
use crate::physics::DriveParams;

bitflags! {
    /// 肢体混合策略
    ///
    /// 没有任何标志时按 PURE_ANIMATION 处理。
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LimbBlendType: u8 {
        /// 向上一帧的解析姿态插值
        const BLEND_WITH_PREV_POSE = 1 << 0;
        /// 向动画姿态插值
        const BLEND_WITH_ANIMATION_POSE = 1 << 1;
        /// 只取物理姿态
        const PURE_PHYSICS = 1 << 2;
        /// 只取动画姿态
        const PURE_ANIMATION = 1 << 3;
    }
}

// ============================================================================
// 肢体参数
// ============================================================================

/// 马达驱动参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorDriveDetails {
    pub angular_stiffness: f32,
    pub linear_stiffness: f32,
    /// 角度误差区间（弧度），映射到 angular_damping_range
    pub angular_range: Vec2,
    /// 误差小 → 阻尼大，误差大 → 阻尼小
    pub angular_damping_range: Vec2,
    /// 位置误差区间（米）
    pub linear_range: Vec2,
    pub linear_damping_range: Vec2,
    pub max_force: f32,
    pub accelerated: bool,
    pub enable_slerp_drive: bool,
}

impl Default for MotorDriveDetails {
    fn default() -> Self {
        Self {
            angular_stiffness: 100.0,
            linear_stiffness: 100.0,
            angular_range: Vec2::new(3.0_f32.to_radians(), 30.0_f32.to_radians()),
            angular_damping_range: Vec2::new(60.0, 20.0),
            linear_range: Vec2::new(0.05, 0.5),
            linear_damping_range: Vec2::new(80.0, 20.0),
            max_force: f32::MAX,
            accelerated: true,
            enable_slerp_drive: true,
        }
    }
}

impl MotorDriveDetails {
    #[inline]
    pub fn with_stiffness(angular_stiffness: f32, linear_stiffness: f32) -> Self {
        Self {
            angular_stiffness,
            linear_stiffness,
            ..Self::default()
        }
    }

    /// 换算为关节驱动参数 (线性, 角)，阻尼取区间下限
    pub fn drive_params(&self) -> (DriveParams, DriveParams) {
        let linear = DriveParams {
            stiffness: self.linear_stiffness,
            damping: self.linear_damping_range.y,
            force_limit: self.max_force,
            accelerated: self.accelerated,
        };
        let angular = DriveParams {
            stiffness: self.angular_stiffness,
            damping: self.angular_damping_range.y,
            ..linear
        };
        (linear, angular)
    }
}

/// 拖拽力参数：直接把刚体速度拉向姿态差对应的速度
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragForceDetails {
    pub partial_angular_drive_limit: f32,
    pub partial_angular_drive: f32,
    pub partial_velocity_drive_limit: f32,
    pub partial_velocity_drive: f32,
    /// 根速度的钳制长度
    pub acceleration_limit: f32,
    pub acceleration_gain: f32,
}

impl Default for DragForceDetails {
    fn default() -> Self {
        Self {
            partial_angular_drive_limit: 25.0,
            partial_angular_drive: 0.5,
            partial_velocity_drive_limit: 10.0,
            partial_velocity_drive: 0.5,
            acceleration_limit: 0.2,
            acceleration_gain: 0.02,
        }
    }
}

impl DragForceDetails {
    #[inline]
    pub fn with_drive(partial_velocity_drive: f32, partial_angular_drive: f32) -> Self {
        Self {
            partial_velocity_drive,
            partial_angular_drive,
            ..Self::default()
        }
    }
}

/// 强度档位
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProfileStrength {
    #[default]
    Default,
    Soft,
    Hard,
}

/// 刚度缩放系数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimbStrengthDetails {
    pub default_strength_coeff: f32,
    pub soft_strength_coeff: f32,
    pub hard_strength_coeff: f32,
}

impl Default for LimbStrengthDetails {
    fn default() -> Self {
        Self {
            default_strength_coeff: 1.0,
            soft_strength_coeff: 0.5,
            hard_strength_coeff: 3.0,
        }
    }
}

impl LimbStrengthDetails {
    #[inline]
    pub fn coefficient(&self, strength: ProfileStrength) -> f32 {
        match strength {
            ProfileStrength::Default => self.default_strength_coeff,
            ProfileStrength::Soft => self.soft_strength_coeff,
            ProfileStrength::Hard => self.hard_strength_coeff,
        }
    }
}

/// 单个肢体组的完整参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimbDetails {
    pub motor_drive: Option<MotorDriveDetails>,
    pub drag_force: Option<DragForceDetails>,
    pub strength: LimbStrengthDetails,
    pub blend_type: LimbBlendType,
    /// 驱动角速度倍率
    pub drive_velocity_modifier: f32,
}

impl Default for LimbDetails {
    fn default() -> Self {
        Self {
            motor_drive: None,
            drag_force: None,
            strength: LimbStrengthDetails::default(),
            blend_type: LimbBlendType::BLEND_WITH_PREV_POSE,
            drive_velocity_modifier: 1.0,
        }
    }
}

impl LimbDetails {
    fn new(blend_type: LimbBlendType, motor_drive: Option<MotorDriveDetails>, drag_force: Option<DragForceDetails>) -> Self {
        Self {
            motor_drive,
            drag_force,
            strength: LimbStrengthDetails::default(),
            blend_type,
            drive_velocity_modifier: 1.0,
        }
    }
}

// ============================================================================
// 配置档
// ============================================================================

/// 配置档类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RagdollProfileType {
    Idle,
    Running,
    Sprint,
    Ragdoll,
}

/// 布娃娃配置档
#[derive(Clone, Debug, PartialEq)]
pub struct RagdollProfile {
    pub kind: RagdollProfileType,

    pub head: LimbDetails,
    pub body_upper: LimbDetails,
    pub body_middle: LimbDetails,
    pub body_lower: LimbDetails,
    pub arm: LimbDetails,
    pub forearm: LimbDetails,
    pub hand: LimbDetails,
    pub leg: LimbDetails,
    pub calf: LimbDetails,
    pub foot: LimbDetails,

    /// 碰撞刚结束时朝目标姿态的起始插值系数
    pub target_position_blend_factor: f32,
    pub target_rotation_blend_factor: f32,
}

impl RagdollProfile {
    /// 所有肢体组使用同一份参数
    pub fn uniform(kind: RagdollProfileType, details: LimbDetails) -> Self {
        Self {
            kind,
            head: details,
            body_upper: details,
            body_middle: details,
            body_lower: details,
            arm: details,
            forearm: details,
            hand: details,
            leg: details,
            calf: details,
            foot: details,
            target_position_blend_factor: 0.2,
            target_rotation_blend_factor: 0.2,
        }
    }

    /// 按肢体类型取参数
    pub fn details(&self, limb_type: LimbType) -> &LimbDetails {
        match limb_type {
            LimbType::BodyLower => &self.body_lower,
            LimbType::BodyMiddle => &self.body_middle,
            LimbType::BodyUpper => &self.body_upper,
            LimbType::Head => &self.head,
            LimbType::Arm => &self.arm,
            LimbType::Forearm => &self.forearm,
            LimbType::Hand => &self.hand,
            LimbType::Leg => &self.leg,
            LimbType::Calf => &self.calf,
            LimbType::Foot => &self.foot,
        }
    }

    /// 站立：全部纯物理 + 较硬的马达
    pub fn idle() -> Self {
        let physics = LimbBlendType::PURE_PHYSICS;
        let motor = |angular, linear| Some(MotorDriveDetails::with_stiffness(angular, linear));
        let torso_drag = Some(DragForceDetails::with_drive(0.4, 0.5));

        let arm = LimbDetails::new(physics, motor(200.0, 400.0), None);
        let leg = LimbDetails::new(physics, motor(400.0, 300.0), None);

        Self {
            head: LimbDetails::new(physics, motor(300.0, 300.0), None),
            body_upper: LimbDetails::new(physics, motor(500.0, 400.0), torso_drag),
            body_middle: LimbDetails::new(physics, motor(500.0, 400.0), None),
            body_lower: LimbDetails::new(physics, None, torso_drag),
            arm,
            forearm: arm,
            hand: arm,
            leg,
            calf: leg,
            foot: leg,
            ..Self::uniform(RagdollProfileType::Idle, LimbDetails::default())
        }
    }

    /// 跑步：上半身混合上一帧姿态，腿部混合动画
    pub fn running() -> Self {
        let prev = LimbBlendType::BLEND_WITH_PREV_POSE;
        let anim = LimbBlendType::BLEND_WITH_ANIMATION_POSE;
        let motor = |angular, linear| Some(MotorDriveDetails::with_stiffness(angular, linear));

        let upper = LimbDetails::new(prev, motor(150.0, 200.0), None);
        let leg = LimbDetails::new(anim, motor(200.0, 150.0), None);

        Self {
            head: upper,
            body_upper: upper,
            body_middle: upper,
            body_lower: LimbDetails::new(prev, None, Some(DragForceDetails::default())),
            arm: upper,
            forearm: upper,
            hand: upper,
            leg,
            calf: leg,
            foot: leg,
            ..Self::uniform(RagdollProfileType::Running, LimbDetails::default())
        }
    }

    /// 冲刺：全部混合动画，马达最软
    pub fn sprint() -> Self {
        let mut details = LimbDetails::new(
            LimbBlendType::BLEND_WITH_ANIMATION_POSE,
            Some(MotorDriveDetails::with_stiffness(80.0, 100.0)),
            None,
        );
        let mut profile = Self::uniform(RagdollProfileType::Sprint, details);
        details.motor_drive = None;
        details.drag_force = Some(DragForceDetails::default());
        profile.body_lower = details;
        profile
    }

    /// 纯布娃娃：纯物理，没有马达
    pub fn ragdoll() -> Self {
        Self::uniform(
            RagdollProfileType::Ragdoll,
            LimbDetails::new(LimbBlendType::PURE_PHYSICS, None, None),
        )
    }
}

// ============================================================================
// 配置档库
// ============================================================================

/// 内置配置档集合（系统持有，各布娃娃共享引用）
#[derive(Clone, Debug)]
pub struct ProfileLibrary {
    pub idle: Arc<RagdollProfile>,
    pub running: Arc<RagdollProfile>,
    pub sprint: Arc<RagdollProfile>,
    pub ragdoll: Arc<RagdollProfile>,
}

impl Default for ProfileLibrary {
    fn default() -> Self {
        Self {
            idle: Arc::new(RagdollProfile::idle()),
            running: Arc::new(RagdollProfile::running()),
            sprint: Arc::new(RagdollProfile::sprint()),
            ragdoll: Arc::new(RagdollProfile::ragdoll()),
        }
    }
}

impl ProfileLibrary {
    pub fn get(&self, kind: RagdollProfileType) -> &Arc<RagdollProfile> {
        match kind {
            RagdollProfileType::Idle => &self.idle,
            RagdollProfileType::Running => &self.running,
            RagdollProfileType::Sprint => &self.sprint,
            RagdollProfileType::Ragdoll => &self.ragdoll,
        }
    }

    /// 按速度平方选择档位
    pub fn select_by_velocity(&self, velocity_squared: f32, running_speed: f32, sprint_speed: f32) -> &Arc<RagdollProfile> {
        if velocity_squared < running_speed * running_speed {
            &self.idle
        } else if velocity_squared < sprint_speed * sprint_speed {
            &self.running
        } else {
            &self.sprint
        }
    }
}
