//! 物理动画运行时
//!
//! 每帧将动画姿态与布娃娃刚体/关节模拟混合成一个骨骼姿态。
//!
//! 模块结构：
//! - math: 刚体姿态 Pose 与插值工具
//! - skeleton: 骨骼层级与姿态（SkeletonAdapter）
//! - physics: 物理后端抽象（PhysicsBackend）与 Rapier 实现
//! - physical_animation: 状态机、采样器、求解器、构建器与系统

pub mod math;
pub mod physical_animation;
pub mod physics;
pub mod skeleton;

mod error;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{RagdollError, Result};
pub use math::Pose;
pub use physical_animation::{
    Character, CreationQueue, LimbBlendType, LimbStateType, LimbType, PhysicalAnimationComponent,
    PhysicalAnimationLimb, PhysicalAnimationSystem, RagdollHandle, RagdollJointIds, RagdollProfile,
    RagdollProfileType, RagdollSettings, SimulationStateType,
};
pub use physics::{BodyHandle, JointHandle, PhysicsBackend, RapierWorld};
pub use skeleton::{JointLink, JointSet, JointTransform, Skeleton, SkeletonAdapter, SkeletonPose};
