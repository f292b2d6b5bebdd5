//! 物理后端抽象
//!
//! 物理动画只通过 PhysicsBackend 创建/查询刚体和关节，
//! 后端实例以显式上下文传入系统（无全局单例）。
//! 默认实现为 Rapier（RapierWorld）。

pub mod config;
mod rapier_backend;

pub use config::{get_config, reset_config, set_config, PhysicsConfig};
pub use rapier_backend::RapierWorld;

use glam::{Vec2, Vec3};

use crate::math::Pose;

// ============================================================================
// 句柄
// ============================================================================

/// 刚体句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// 关节句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(pub u32);

// ============================================================================
// 刚体描述
// ============================================================================

/// 碰撞形状（胶囊轴向为局部 +X）
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShapeDesc {
    Capsule { radius: f32, half_height: f32 },
    Box { half_extents: Vec3 },
}

/// 刚体类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Kinematic,
}

/// 刚体创建参数
#[derive(Clone, Debug)]
pub struct BodyDesc {
    pub name: String,
    /// 世界空间初始姿态
    pub pose: Pose,
    pub shape: ShapeDesc,
    /// 形状相对刚体的局部姿态
    pub shape_local: Pose,
    pub mass: f32,
    pub kind: BodyKind,
    /// 是否参与模拟
    pub simulated: bool,
    /// 是否参与碰撞
    pub collidable: bool,
    pub use_gravity: bool,
    pub ccd: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// 求解迭代次数；只有一组迭代计数的后端取两者较大值
    pub position_iterations: u32,
    pub velocity_iterations: u32,
    pub sleep_threshold: f32,
}

impl BodyDesc {
    /// 运动学附着体（无碰撞、无重力）
    pub fn kinematic_attachment(name: impl Into<String>, pose: Pose, half_extent: f32, mass: f32) -> Self {
        Self {
            name: name.into(),
            pose,
            shape: ShapeDesc::Box { half_extents: Vec3::splat(half_extent) },
            shape_local: Pose::IDENTITY,
            mass,
            kind: BodyKind::Kinematic,
            simulated: true,
            collidable: false,
            use_gravity: false,
            ccd: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            position_iterations: 4,
            velocity_iterations: 1,
            sleep_threshold: 0.0,
        }
    }
}

// ============================================================================
// 关节描述
// ============================================================================

/// 单轴运动类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointMotion {
    Locked,
    Limited,
    Free,
}

/// 驱动参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveParams {
    pub stiffness: f32,
    pub damping: f32,
    pub force_limit: f32,
    /// 为 true 时刚度/阻尼按加速度解释（与质量无关）
    pub accelerated: bool,
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            stiffness: 0.0,
            damping: 0.0,
            force_limit: f32::MAX,
            accelerated: true,
        }
    }
}

/// 6 自由度关节创建参数
#[derive(Clone, Debug, PartialEq)]
pub struct D6JointDesc {
    pub body0: BodyHandle,
    pub body1: BodyHandle,
    /// 关节坐标系在 body0 局部空间中的姿态
    pub local_frame0: Pose,
    /// 关节坐标系在 body1 局部空间中的姿态
    pub local_frame1: Pose,

    pub linear_motion: JointMotion,
    pub twist_motion: JointMotion,
    /// 扭转限制 (min, max)，弧度
    pub twist_limits: Vec2,
    pub swing_y_motion: JointMotion,
    pub swing_y_limit: f32,
    pub swing_z_motion: JointMotion,
    pub swing_z_limit: f32,
    pub limit_stiffness: f32,
    pub limit_damping: f32,

    pub linear_drive: Option<DriveParams>,
    pub angular_drive: Option<DriveParams>,
    /// 角驱动使用 slerp（否则 twist/swing 分轴）
    ///
    /// 三个角轴共用同一组 DriveParams，按轴驱动的后端（Rapier）两种模式等价，忽略此项。
    pub slerp_drive: bool,

    /// 相连刚体之间是否碰撞
    pub enable_collision: bool,
}

impl D6JointDesc {
    /// 全部自由度锁定的固定关节
    pub fn fixed(body0: BodyHandle, body1: BodyHandle, local_frame0: Pose, local_frame1: Pose) -> Self {
        Self {
            body0,
            body1,
            local_frame0,
            local_frame1,
            linear_motion: JointMotion::Locked,
            twist_motion: JointMotion::Locked,
            twist_limits: Vec2::ZERO,
            swing_y_motion: JointMotion::Locked,
            swing_y_limit: 0.0,
            swing_z_motion: JointMotion::Locked,
            swing_z_limit: 0.0,
            limit_stiffness: 0.0,
            limit_damping: 0.0,
            linear_drive: None,
            angular_drive: None,
            slerp_drive: false,
            enable_collision: false,
        }
    }

    /// 全部自由度放开、带驱动的关节
    pub fn free_drive(
        body0: BodyHandle,
        body1: BodyHandle,
        linear_drive: DriveParams,
        angular_drive: DriveParams,
        slerp_drive: bool,
    ) -> Self {
        Self {
            linear_motion: JointMotion::Free,
            twist_motion: JointMotion::Free,
            swing_y_motion: JointMotion::Free,
            swing_z_motion: JointMotion::Free,
            linear_drive: Some(linear_drive),
            angular_drive: Some(angular_drive),
            slerp_drive,
            ..Self::fixed(body0, body1, Pose::IDENTITY, Pose::IDENTITY)
        }
    }
}

// ============================================================================
// 接触事件
// ============================================================================

/// 接触开始/结束事件
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEvent {
    pub body0: BodyHandle,
    pub body1: BodyHandle,
    pub started: bool,
}

// ============================================================================
// 后端接口
// ============================================================================

/// 刚体/关节求解器的窄接口
pub trait PhysicsBackend {
    fn create_body(&mut self, desc: &BodyDesc) -> BodyHandle;
    fn destroy_body(&mut self, body: BodyHandle);

    fn create_joint(&mut self, desc: &D6JointDesc) -> JointHandle;
    fn destroy_joint(&mut self, joint: JointHandle);

    /// 刚体及其形状是否已构建完成
    fn is_body_ready(&self, body: BodyHandle) -> bool;

    /// 世界空间姿态
    fn body_pose(&self, body: BodyHandle) -> Option<Pose>;
    /// 直接设置姿态（瞬移）
    fn set_body_pose(&mut self, body: BodyHandle, pose: Pose);
    /// 运动学刚体的下一帧目标姿态
    fn move_kinematic_body(&mut self, body: BodyHandle, pose: Pose);
    fn set_body_simulated(&mut self, body: BodyHandle, simulated: bool);
    fn set_body_kinematic(&mut self, body: BodyHandle, kinematic: bool);

    /// (线速度, 角速度)
    fn body_velocity(&self, body: BodyHandle) -> Option<(Vec3, Vec3)>;
    fn set_body_velocity(&mut self, body: BodyHandle, linear: Vec3, angular: Vec3);

    fn set_joint_enabled(&mut self, joint: JointHandle, enabled: bool);
    /// 重写驱动参数（刚度、阻尼、力上限）
    fn set_joint_drive(&mut self, joint: JointHandle, linear: DriveParams, angular: DriveParams);
    /// 驱动目标（关节空间）与目标角速度
    fn set_joint_drive_target(&mut self, joint: JointHandle, target: Pose, angular_velocity: Vec3);
    fn set_joint_drive_damping(&mut self, joint: JointHandle, linear_damping: f32, angular_damping: f32);

    fn step(&mut self, dt: f32);

    /// 取出自上次调用以来的接触事件
    fn drain_contact_events(&mut self) -> Vec<ContactEvent>;
}
