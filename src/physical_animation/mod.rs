//! 物理动画
//!
//! 核心设计思想：
//! - 整体状态机（Disabled / BlendIn / Enabled / BlendOut / Ragdoll）决定是否模拟并给出混合权重
//! - 肢体状态机（Kinematic / Transition / Simulation）决定单个肢体由动画还是马达驱动
//! - 采样器按肢体混合策略合成动画姿态与物理姿态，写回骨骼
//! - 求解器按碰撞状态得到送给马达的 adjusted_pose
//! - 构建器从骨骼绑定姿态生成刚体与 D6 关节
//!
//! 所有肢体姿态都在模型空间（相对角色世界变换）中计算。

pub mod builder;
pub mod component;
pub mod limb;
pub mod limb_state;
pub mod profile;
pub mod sampler;
pub mod settings;
pub mod simulation_state;
pub mod solver;
pub mod system;

pub use builder::RagdollBuilder;
pub use component::{CharacterView, PhysicalAnimationComponent, PROFILE_TRANSITION_TIME};
pub use limb::{LimbChains, LimbJoint, LimbType, PhysicalAnimationLimb, PhysicsLimbChain};
pub use limb_state::LimbStateType;
pub use profile::{
    DragForceDetails, LimbBlendType, LimbDetails, LimbStrengthDetails, MotorDriveDetails, ProfileLibrary,
    ProfileStrength, RagdollProfile, RagdollProfileType,
};
pub use sampler::DrivePoseSampler;
pub use settings::{RagdollJointIds, RagdollSettings};
pub use simulation_state::SimulationStateType;
pub use solver::DrivePoseSolver;
pub use system::{Character, CreationQueue, PhysicalAnimationSystem, RagdollHandle, RagdollRecord};
