//! 物理动画组件
//!
//! 每个布娃娃一份，独占其肢体、肢体链、附着体与状态机数据。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use glam::Vec3;

use super::limb::{LimbChains, PhysicalAnimationLimb};
use super::limb_state;
use super::profile::{LimbBlendType, ProfileStrength, RagdollProfile};
use super::settings::{RagdollJointIds, RagdollSettings};
use super::simulation_state::SimulationStateType;
use crate::math::{Pose, EPSILON};
use crate::physics::{get_config, BodyHandle, JointHandle, PhysicsBackend};
use crate::skeleton::{SkeletonAdapter, SkeletonPose};

/// 配置档切换后新旧混合策略共存的时长（秒）
pub const PROFILE_TRANSITION_TIME: f32 = 0.3;

/// 状态机与采样器访问角色的视图
pub struct CharacterView<'a> {
    pub skeleton: &'a mut dyn SkeletonAdapter,
    /// 动画系统给出的当前姿态（父关节相对）
    pub animation_pose: &'a SkeletonPose,
    /// 角色世界变换
    pub world: Pose,
}

/// 物理动画组件
#[derive(Clone, Debug)]
pub struct PhysicalAnimationComponent {
    pub settings: RagdollSettings,
    pub joint_ids: RagdollJointIds,
    /// 总质量（kg）
    pub mass: f32,

    // ========== 构建结果 ==========
    pub limbs: Vec<PhysicalAnimationLimb>,
    pub chains: LimbChains,
    /// 骨骼关节 → 肢体索引
    pub limb_by_joint: BTreeMap<usize, usize>,
    /// 肢体关节及其全部祖先，升序即自根向叶
    pub simulated_joints: BTreeSet<usize>,
    pub root_joint_id: usize,
    /// 骨盆幽灵体（运动学）及其与骨盆的固定关节
    pub pelvis_ghost: Option<BodyHandle>,
    pub pelvis_joint: Option<JointHandle>,

    // ========== 采样缓存（模型空间，按关节索引） ==========
    /// 混合后的姿态
    pub local_joint_poses: Vec<Pose>,
    /// 纯动画目标姿态
    pub local_target_poses: Vec<Pose>,

    // ========== 整体状态 ==========
    pub state: SimulationStateType,
    /// 当前 BlendIn/BlendOut 状态的计时
    pub state_blend_time: f32,
    pub blend_weight: f32,
    pub blend_in_time: f32,
    pub blend_out_time: f32,
    /// 采样器向动画/上一帧插值的系数
    pub blend_factor: f32,
    /// 肢体刚体是否处于模拟
    pub simulated: bool,
    /// 所有刚体都已就绪
    pub loaded: bool,

    // ========== 配置档 ==========
    pub profile: Option<Arc<RagdollProfile>>,
    pub strength: ProfileStrength,
    /// 配置档过渡剩余时间
    pub profile_blend_time: f32,
    pub target_position_blend_factor: f32,
    pub target_rotation_blend_factor: f32,

    // ========== 根运动 ==========
    pub velocity: Vec3,
    pub prev_position: Option<Vec3>,
}

impl Default for PhysicalAnimationComponent {
    fn default() -> Self {
        Self::new(RagdollSettings::default())
    }
}

impl PhysicalAnimationComponent {
    pub fn new(settings: RagdollSettings) -> Self {
        Self {
            settings,
            joint_ids: RagdollJointIds::default(),
            mass: 100.0,
            limbs: Vec::new(),
            chains: LimbChains::default(),
            limb_by_joint: BTreeMap::new(),
            simulated_joints: BTreeSet::new(),
            root_joint_id: 0,
            pelvis_ghost: None,
            pelvis_joint: None,
            local_joint_poses: Vec::new(),
            local_target_poses: Vec::new(),
            state: SimulationStateType::Disabled,
            state_blend_time: 0.0,
            blend_weight: 0.0,
            blend_in_time: 0.1,
            blend_out_time: 0.25,
            blend_factor: 0.75,
            simulated: false,
            loaded: false,
            profile: None,
            strength: ProfileStrength::Default,
            profile_blend_time: 0.0,
            target_position_blend_factor: 0.2,
            target_rotation_blend_factor: 0.2,
            velocity: Vec3::ZERO,
            prev_position: None,
        }
    }

    // ========================================================================
    // 查询
    // ========================================================================

    #[inline]
    pub fn is_built(&self) -> bool {
        !self.limbs.is_empty()
    }

    /// 整体状态不是 Disabled
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != SimulationStateType::Disabled
    }

    #[inline]
    pub fn limb(&self, index: usize) -> Option<&PhysicalAnimationLimb> {
        self.limbs.get(index)
    }

    pub fn limb_by_name(&self, name: &str) -> Option<&PhysicalAnimationLimb> {
        self.limbs.iter().find(|limb| limb.name == name)
    }

    #[inline]
    pub fn limb_index_for_joint(&self, joint: usize) -> Option<usize> {
        self.limb_by_joint.get(&joint).copied()
    }

    pub fn limb_index_for_body(&self, body: BodyHandle) -> Option<usize> {
        self.limbs.iter().position(|limb| limb.body == body)
    }

    #[inline]
    pub fn is_in_profile_transition(&self) -> bool {
        self.profile_blend_time > 0.0
    }

    /// 组件创建的全部刚体（肢体、附着体、骨盆幽灵体）
    pub fn bodies(&self) -> Vec<BodyHandle> {
        let mut bodies: Vec<BodyHandle> = self.limbs.iter().map(|limb| limb.body).collect();
        bodies.extend(self.limbs.iter().filter_map(|limb| limb.drive_joint.map(|j| j.body0)));
        bodies.extend(self.pelvis_ghost);
        bodies
    }

    /// 组件创建的全部关节
    pub fn joints(&self) -> Vec<JointHandle> {
        let mut joints: Vec<JointHandle> = self
            .limbs
            .iter()
            .flat_map(|limb| [limb.parent_joint, limb.drive_joint])
            .flatten()
            .map(|joint| joint.handle)
            .collect();
        joints.extend(self.pelvis_joint);
        joints
    }

    // ========================================================================
    // 配置档
    // ========================================================================

    /// 应用配置档
    ///
    /// 同一配置档与强度已生效且未强制时不做任何事，返回是否应用。
    pub fn try_to_apply_ragdoll_profile(
        &mut self,
        backend: &mut dyn PhysicsBackend,
        profile: &Arc<RagdollProfile>,
        strength: ProfileStrength,
        force: bool,
    ) -> bool {
        let unchanged = self
            .profile
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, profile))
            && self.strength == strength;
        if unchanged && !force {
            return false;
        }

        for limb in &mut self.limbs {
            let details = profile.details(limb.limb_type);
            let coeff = details.strength.coefficient(strength);

            limb.prev_blend_type = limb.blend_type;
            limb.blend_type = details.blend_type;
            limb.drag_force = details.drag_force;
            limb.drive_velocity_modifier = details.drive_velocity_modifier;
            limb.motor_drive = details.motor_drive.map(|mut motor| {
                motor.angular_stiffness *= coeff;
                motor.linear_stiffness *= coeff;
                motor
            });

            let Some(drive) = limb.drive_joint else {
                continue;
            };
            let (linear, angular) = limb
                .motor_drive
                .map(|motor| motor.drive_params())
                .unwrap_or_default();
            backend.set_joint_drive(drive.handle, linear, angular);
        }

        self.target_position_blend_factor = profile.target_position_blend_factor;
        self.target_rotation_blend_factor = profile.target_rotation_blend_factor;
        self.profile_blend_time = PROFILE_TRANSITION_TIME;
        self.profile = Some(Arc::clone(profile));
        self.strength = strength;

        if get_config().debug_log {
            log::debug!("[PhysAnim] 应用配置档 {:?} (强度 {:?})", profile.kind, strength);
        }
        true
    }

    /// 推进配置档过渡，结束时清除旧混合策略
    pub fn update_profile_transition(&mut self, dt: f32) {
        if !self.is_in_profile_transition() {
            return;
        }
        self.profile_blend_time -= dt;
        if self.profile_blend_time <= EPSILON {
            self.profile_blend_time = 0.0;
            for limb in &mut self.limbs {
                limb.prev_blend_type = LimbBlendType::empty();
            }
        }
    }

    // ========================================================================
    // 根运动
    // ========================================================================

    /// 用世界位置差估计根速度
    pub fn update_velocity(&mut self, position: Vec3, dt: f32) {
        if dt > EPSILON {
            if let Some(prev) = self.prev_position {
                self.velocity = (position - prev) / dt;
            }
        }
        self.prev_position = Some(position);
    }

    // ========================================================================
    // 刚体操作
    // ========================================================================

    /// 所有肢体刚体瞬移到动画姿态
    pub fn force_sync_limbs_to_animation(&self, backend: &mut dyn PhysicsBackend, view: &CharacterView<'_>) {
        for limb in &self.limbs {
            let Some(object) = view.skeleton.object_space_transform(view.animation_pose, limb.joint_id) else {
                continue;
            };
            backend.set_body_pose(limb.body, (view.world * object).normalized());
        }
    }

    pub fn reset_motor_drives(&self, backend: &mut dyn PhysicsBackend) {
        for limb in &self.limbs {
            limb_state::reset_drive(limb, backend);
        }
    }

    /// 切换肢体刚体的模拟开关，并清零速度
    pub fn set_limbs_simulated(&mut self, backend: &mut dyn PhysicsBackend, simulated: bool) {
        for limb in &mut self.limbs {
            backend.set_body_simulated(limb.body, simulated);
            backend.set_body_velocity(limb.body, Vec3::ZERO, Vec3::ZERO);
            limb.simulated = simulated;
        }
        self.simulated = simulated;
    }

    /// 启用/禁用骨盆固定关节与所有驱动关节
    pub fn set_anchor_joints_enabled(&self, backend: &mut dyn PhysicsBackend, enabled: bool) {
        if let Some(joint) = self.pelvis_joint {
            backend.set_joint_enabled(joint, enabled);
        }
        for limb in &self.limbs {
            if let Some(drive) = limb.drive_joint {
                backend.set_joint_enabled(drive.handle, enabled);
            }
        }
    }

    /// 附着体移到 world * target_pose，骨盆幽灵体移到根目标姿态
    pub fn place_attachments(&self, backend: &mut dyn PhysicsBackend, world: &Pose) {
        for limb in &self.limbs {
            if let Some(drive) = limb.drive_joint {
                backend.move_kinematic_body(drive.body0, (*world * limb.target_pose).normalized());
            }
        }
        if let (Some(ghost), Some(root)) = (self.pelvis_ghost, self.local_target_poses.get(self.root_joint_id)) {
            backend.move_kinematic_body(ghost, (*world * *root).normalized());
        }
    }

    /// 读取刚体姿态，转换到模型空间
    pub fn read_physics_poses(&mut self, backend: &dyn PhysicsBackend, world: &Pose) {
        let inv_world = world.inverse();
        for limb in &mut self.limbs {
            if let Some(body) = backend.body_pose(limb.body) {
                limb.physics_pose = (inv_world * body).normalized();
            }
        }
    }

    /// 销毁全部关节与刚体
    pub fn destroy(&mut self, backend: &mut dyn PhysicsBackend) {
        for joint in self.joints() {
            backend.destroy_joint(joint);
        }
        for body in self.bodies() {
            backend.destroy_body(body);
        }
        self.limbs.clear();
        self.chains = LimbChains::default();
        self.limb_by_joint.clear();
        self.simulated_joints.clear();
        self.pelvis_ghost = None;
        self.pelvis_joint = None;
        self.loaded = false;
        self.simulated = false;
    }
}
